//! Persistent log sink
//!
//! The log is a single append-only text file. Implementations must not keep
//! any file, directory or volume open between calls: every operation opens
//! what it needs and releases it before returning.

pub mod sd_card;
pub mod time_source;

use core::fmt::{self, Write};

use heapless::String;
use thiserror_no_std::Error;

pub use sd_card::SdCardStorage;
pub use time_source::ClockTimeSource;

/// Owned error detail, truncated to fit.
pub type Detail = String<64>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("unable to mount volume: {0}")]
    Mount(Detail),
    #[error("unable to open file: {0}")]
    Open(Detail),
    #[error("unable to write file: {0}")]
    Write(Detail),
    #[error("unable to close file: {0}")]
    Close(Detail),
}

impl StorageError {
    pub fn mount(cause: &dyn fmt::Debug) -> Self {
        Self::Mount(detail(cause))
    }

    pub fn open(cause: &dyn fmt::Debug) -> Self {
        Self::Open(detail(cause))
    }

    pub fn write(cause: &dyn fmt::Debug) -> Self {
        Self::Write(detail(cause))
    }

    pub fn close(cause: &dyn fmt::Debug) -> Self {
        Self::Close(detail(cause))
    }
}

/// Debug-format `cause`, keeping as much as fits.
fn detail(cause: &dyn fmt::Debug) -> Detail {
    struct Truncating<'a>(&'a mut Detail);

    impl fmt::Write for Truncating<'_> {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for c in s.chars() {
                if self.0.push(c).is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    let mut detail = Detail::new();
    let _ = write!(Truncating(&mut detail), "{:?}", cause);
    detail
}

/// Append-only text log storage.
pub trait LogStorage {
    /// Check that the medium is present and its volume can be opened.
    fn mount(&mut self) -> Result<(), StorageError>;

    /// `true` when `file_name` does not exist or holds no bytes.
    fn is_empty(&mut self, file_name: &str) -> Result<bool, StorageError>;

    /// Append `data` to `file_name`, creating the file when missing.
    ///
    /// `on_open` runs once the file is open, right before the write. It is
    /// not called when opening fails.
    fn append(
        &mut self,
        file_name: &str,
        data: &[u8],
        on_open: impl FnOnce(),
    ) -> Result<(), StorageError>;
}
