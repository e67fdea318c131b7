//! Open modes and seek helpers.

use crate::error::{AioError, Result};

use std::fmt;
use std::fs::OpenOptions;
use std::io::SeekFrom;
use std::os::unix::fs::OpenOptionsExt;
use std::str::FromStr;

/// Read-ahead / write-behind threshold used when none is given.
pub const DEFAULT_BUFFER_SIZE: usize = 16 << 10;

/// Chunk size used when reading a whole file with `read(0, ..)`.
pub(crate) const WHOLE_FILE_CHUNK: usize = 16 << 10;

/// Capabilities derived from a mode string such as `"r"`, `"w+"` or `"ab"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
}

impl OpenMode {
    pub fn is_readable(&self) -> bool {
        self.read
    }

    pub fn is_writable(&self) -> bool {
        self.write
    }

    /// Writes always land at end-of-file and seeks never drain pending writes.
    pub fn is_append(&self) -> bool {
        self.append
    }

    pub fn truncates(&self) -> bool {
        self.truncate
    }

    /// Every mode creates a missing file, read-only ones included.
    pub(crate) fn open_options(&self) -> OpenOptions {
        let mut opts = OpenOptions::new();
        opts.read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate)
            .custom_flags(libc::O_CREAT)
            .mode(0o666);
        opts
    }
}

impl FromStr for OpenMode {
    type Err = AioError;

    fn from_str(mode: &str) -> Result<Self> {
        let mut chars = mode.chars();
        let mut parsed = match chars.next() {
            Some('r') => OpenMode {
                read: true,
                write: false,
                append: false,
                truncate: false,
            },
            Some('w') => OpenMode {
                read: false,
                write: true,
                append: false,
                truncate: true,
            },
            Some('a') => OpenMode {
                read: false,
                write: true,
                append: true,
                truncate: false,
            },
            _ => return Err(AioError::usage(format!("invalid mode {mode:?}"))),
        };

        let mut plus = false;
        for c in chars {
            match c {
                '+' if !plus => plus = true,
                'b' => {}
                _ => return Err(AioError::usage(format!("invalid mode {mode:?}"))),
            }
        }

        if plus {
            parsed.read = true;
            parsed.write = true;
        }

        Ok(parsed)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = if self.append {
            "a"
        } else if self.truncate {
            "w"
        } else {
            "r"
        };
        f.write_str(base)?;
        if self.read && self.write {
            f.write_str("+")?;
        }
        Ok(())
    }
}

/// Converts a raw `(offset, whence)` pair as used by `lseek(2)` into a
/// [`SeekFrom`]. Unknown `whence` values and negative absolute offsets are
/// usage errors.
pub fn seek_from_whence(pos: i64, whence: i32) -> Result<SeekFrom> {
    match whence {
        libc::SEEK_SET => u64::try_from(pos)
            .map(SeekFrom::Start)
            .map_err(|_| AioError::usage("file position invalid, less than 0")),
        libc::SEEK_CUR => Ok(SeekFrom::Current(pos)),
        libc::SEEK_END => Ok(SeekFrom::End(pos)),
        _ => Err(AioError::usage(
            "invalid seek point, use SEEK_SET, SEEK_CUR or SEEK_END",
        )),
    }
}
