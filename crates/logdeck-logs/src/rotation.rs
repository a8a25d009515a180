//! Rotation detection

use std::fs::Metadata;

/// Identity of the file behind a path. A change means the path was
/// rotated onto a new file even if the new file is already larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    dev: u64,
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn of(meta: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    pub fn of(_meta: &Metadata) -> Option<Self> {
        None
    }
}

/// Whether a reader positioned at `offset` on `previous` must restart
/// from the beginning of the file now described by `current`
pub fn is_rotated(
    previous: Option<FileIdentity>,
    offset: u64,
    current: &Metadata,
) -> bool {
    if current.len() < offset {
        return true;
    }
    match (previous, FileIdentity::of(current)) {
        (Some(prev), Some(now)) => prev != now,
        _ => false,
    }
}
