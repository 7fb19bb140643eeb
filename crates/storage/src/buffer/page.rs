use crate::PAGE_SIZE;

/// In-memory image of a single disk page.
#[derive(Debug, Clone)]
#[repr(align(64))]
pub struct Page([u8; PAGE_SIZE]);

impl Default for Page {
    fn default() -> Self {
        Self([0; PAGE_SIZE])
    }
}

impl Page {
    pub fn data(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.0.as_mut()
    }

    pub(super) fn reset(&mut self) {
        self.0.fill(0);
    }
}
