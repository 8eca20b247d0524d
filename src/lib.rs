//! # car: a copy-on-write archiver
//!
//! Packs a directory tree into a single file and unpacks it again. On filesystems that
//! support block cloning (btrfs, XFS with reflink, bcachefs) file contents are not copied
//! into the archive at all: their extents are cloned, which makes archiving near-instant and
//! costs no extra space until either side is modified. Everywhere else a plain copy is used
//! and the archive is byte-for-byte identical.
//!
//! ## Key Modules
//!
//! - [`archive`]: the on-disk layout shared by the writer and reader.
//! - [`reflink`]: the clone-or-copy extent transfer primitive.
//! - [`compress`]: directory traversal and the two-phase archive writer.
//! - [`extract`]: header validation and tree reconstruction.
//! - [`cli`]: command-line parsing for the `car` binary.
//!
//! ## Examples
//!
//! ```no_run
//! use car::{compress, extract, Options};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), car::ArchiverError> {
//! let summary = compress(Path::new("photos"), Path::new("photos.car"), &Options::default())?;
//! println!("{summary}");
//! extract(Path::new("photos.car"), Path::new("restored"), &Options::default())?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cli;
pub mod cli_runner;
pub mod common;
pub mod compress;
pub mod error;
pub mod extract;
pub mod reflink;

// Platform filesystem layer
pub mod fsx;

pub use common::{ArchiveSummary, Options};
pub use compress::{compress, compress_paths};
pub use error::ArchiverError;
pub use extract::{extract, list};
pub use reflink::ReflinkMode;
