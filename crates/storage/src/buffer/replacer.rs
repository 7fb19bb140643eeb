use super::FrameId;

/// Eviction policy over the set of unpinned, resident frames. Implementations
/// carry their own latch; no method blocks on I/O.
pub trait Replacer {
    /// Remove and return the frame that has been evictable the longest, or
    /// `None` when no frame is evictable.
    fn victim(&self) -> Option<FrameId>;

    /// Remove `frame_id` from the candidate set. Idempotent.
    fn pin(&self, frame_id: FrameId);

    /// Add `frame_id` to the candidate set as the most recently unpinned
    /// frame. A frame that is already present keeps its position.
    fn unpin(&self, frame_id: FrameId);

    /// Number of frames currently evictable.
    fn size(&self) -> usize;
}
