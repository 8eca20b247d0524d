use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `car` crate.
///
/// Failed reflink attempts never show up here: they are recovered inside
/// [`crate::reflink::transfer`] by falling back to a streaming copy.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// The command line did not select exactly one mode or lacks a required path.
    #[error("usage error: {0}")]
    Usage(String),

    /// The archive is corrupt or was not produced by this tool.
    #[error("invalid archive: {0}")]
    Format(String),

    /// A file or directory of the tree being archived could not be read.
    #[error("cannot read source '{}': {source}", path.display())]
    SourceIo { source: std::io::Error, path: PathBuf },

    /// A file or directory being extracted could not be created or written.
    #[error("cannot write destination '{}': {source}", path.display())]
    DestinationIo { source: std::io::Error, path: PathBuf },

    /// An I/O error on the archive file itself.
    #[error("I/O error on archive '{}': {source}", path.display())]
    Io { source: std::io::Error, path: PathBuf },
}

impl ArchiverError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ArchiverError::Format(msg.into())
    }

    pub(crate) fn source_io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiverError::SourceIo { source, path: path.into() }
    }

    pub(crate) fn destination_io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiverError::DestinationIo { source, path: path.into() }
    }

    pub(crate) fn archive_io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiverError::Io { source, path: path.into() }
    }

    /// True for errors caused by a corrupt or foreign archive.
    pub fn is_format(&self) -> bool {
        matches!(self, ArchiverError::Format(_))
    }
}

impl From<walkdir::Error> for ArchiverError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop detected"));
        ArchiverError::SourceIo { source, path }
    }
}
