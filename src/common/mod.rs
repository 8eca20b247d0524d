//! Common types shared by the writer and the reader.

use crate::reflink::{ReflinkMode, TransferStats};

/// Knobs for a single compress or extract call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Whether block cloning is attempted before falling back to a copy.
    pub reflink: ReflinkMode,
}

impl Options {
    /// Options that never attempt a clone.
    pub fn copy_only() -> Self {
        Options { reflink: ReflinkMode::Never }
    }
}

/// What a compress or extract call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Directory entries, the root included.
    pub directories: u64,
    pub files: u64,
    /// Total file content bytes.
    pub bytes: u64,
    pub transfer: TransferStats,
}

impl std::fmt::Display for ArchiveSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} directories, {} files, {} bytes ({} cloned, {} copied)",
            self.directories, self.files, self.bytes, self.transfer.cloned, self.transfer.copied
        )
    }
}
