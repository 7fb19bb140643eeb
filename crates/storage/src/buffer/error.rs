use {
    crate::disk,
    snafu::{prelude::*, Backtrace},
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    #[snafu(display("all buffer frames are pinned"))]
    BufferPoolIsFull { backtrace: Backtrace },

    Disk {
        #[snafu(backtrace)]
        source: disk::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
