//! # Extraction Module
//!
//! Reads an archive back into a directory tree. The whole header is parsed and validated
//! before anything is created, so a corrupt or foreign archive fails without side effects.
//! File contents are moved out with the same clone-or-copy primitive the writer uses, just
//! in the other direction.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive::{Entry, EntryKind, Header};
use crate::common::{ArchiveSummary, Options};
use crate::reflink::{self, TransferError};
use crate::ArchiverError;

/// An open archive with its validated header.
pub struct ArchiveReader {
    file: File,
    path: PathBuf,
    header: Header,
}

impl ArchiveReader {
    /// Opens `path` and parses its header.
    pub fn open(path: &Path) -> Result<Self, ArchiverError> {
        let file = File::open(path).map_err(|e| ArchiverError::archive_io(e, path))?;
        let len = file
            .metadata()
            .map_err(|e| ArchiverError::archive_io(e, path))?
            .len();
        let header = Header::read_from(BufReader::new(&file), len, path)?;
        Ok(Self { file, path: path.to_path_buf(), header })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn entries(&self) -> &[Entry] {
        &self.header.entries
    }

    /// Recreates the archived tree under `dest_dir`.
    ///
    /// Directories are created as needed and may already exist. A file that already exists
    /// at an entry's path is a collision and aborts the extraction.
    pub fn extract_to(&self, dest_dir: &Path, options: &Options) -> Result<ArchiveSummary, ArchiverError> {
        let mut summary = ArchiveSummary::default();

        for entry in &self.header.entries {
            let target = target_path(dest_dir, entry);
            match entry.kind {
                EntryKind::Directory => {
                    fs::create_dir_all(&target).map_err(|e| ArchiverError::destination_io(e, &target))?;
                    debug!(path = %target.display(), "dir");
                    summary.directories += 1;
                }
                EntryKind::File { size, offset } => {
                    let stats = self.extract_file(&target, size, offset, options)?;
                    debug!(path = %target.display(), size, cloned = stats.cloned, copied = stats.copied, "file");
                    summary.files += 1;
                    summary.bytes += size;
                    summary.transfer += stats;
                }
            }
        }

        info!(%summary, "extracted {}", self.path.display());
        Ok(summary)
    }

    fn extract_file(
        &self,
        target: &Path,
        size: u64,
        offset: u64,
        options: &Options,
    ) -> Result<reflink::TransferStats, ArchiverError> {
        let dest_err = |e| ArchiverError::destination_io(e, target);

        let out = File::options()
            .read(true)
            .write(true)
            .create_new(true)
            .open(target)
            .map_err(dest_err)?;
        if size == 0 {
            return Ok(reflink::TransferStats::default());
        }
        out.set_len(size).map_err(dest_err)?;

        reflink::transfer(&self.file, offset, &out, 0, size, options.reflink).map_err(|e| match e {
            TransferError::Read(e) => ArchiverError::archive_io(e, &self.path),
            TransferError::Write(e) => ArchiverError::destination_io(e, target),
        })
    }
}

fn target_path(dest_dir: &Path, entry: &Entry) -> PathBuf {
    let relative = entry.path();
    if relative.as_os_str().is_empty() {
        dest_dir.to_path_buf()
    } else {
        dest_dir.join(relative)
    }
}

/// Extracts the archive at `archive_path` into `dest_dir`.
pub fn extract(archive_path: &Path, dest_dir: &Path, options: &Options) -> Result<ArchiveSummary, ArchiverError> {
    ArchiveReader::open(archive_path)?.extract_to(dest_dir, options)
}

/// Parses the archive and returns its entries without extracting anything.
pub fn list(archive_path: &Path) -> Result<Vec<Entry>, ArchiverError> {
    let reader = ArchiveReader::open(archive_path)?;
    Ok(reader.header.entries)
}

/// Writes one line per entry: type, size and name.
pub fn list_files<W: Write>(archive_path: &Path, out: &mut W) -> Result<(), ArchiverError> {
    let entries = list(archive_path)?;
    let out_err = |e: io::Error| ArchiverError::Io { source: e, path: PathBuf::from("<stdout>") };
    for entry in &entries {
        let (tag, size) = match entry.kind {
            EntryKind::Directory => ('d', 0),
            EntryKind::File { size, .. } => ('-', size),
        };
        writeln!(out, "{tag} {size:>12} {}", entry.display_name()).map_err(out_err)?;
    }
    Ok(())
}
