//! # Archive Writer
//!
//! Packs a directory tree into a single archive in two phases:
//!
//! 1. **Header phase**: walk the tree in preorder, record an entry per directory and regular
//!    file, and give every file a block-aligned slot in the data region. The header is then
//!    written and padded to the data-region base.
//! 2. **Data phase**: read the header back and place each file's bytes at its slot through
//!    [`crate::reflink::transfer`], cloning blocks where the filesystem allows.
//!
//! The archive is built in a temporary file next to the destination and only renamed into
//! place once complete, so a failed run never leaves a half-written archive behind.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::{align_up, Entry, EntryKind, Header};
use crate::common::{ArchiveSummary, Options};
use crate::reflink::{self, TransferError};
use crate::ArchiverError;

/// Mode requested for a new archive, before the umask.
#[cfg(unix)]
const ARCHIVE_MODE: u32 = 0o666;

/// Accumulates entries and the running data cursor for one compress call.
///
/// File offsets are relative to the data-region base until [`HeaderBuilder::finish`] knows
/// how large the header is.
#[derive(Debug, Default)]
pub struct HeaderBuilder {
    entries: Vec<Entry>,
    data_cursor: u64,
}

/// The finished header plus the total archive length it implies.
#[derive(Debug)]
pub struct Layout {
    pub header: Header,
    pub archive_len: u64,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_dir(&mut self, relative: &Path) -> std::io::Result<()> {
        self.entries.push(Entry::new(relative, EntryKind::Directory)?);
        Ok(())
    }

    /// Records a file and reserves `size` rounded up to the alignment in the data region.
    pub fn push_file(&mut self, relative: &Path, size: u64) -> std::io::Result<()> {
        let offset = self.data_cursor;
        self.entries.push(Entry::new(relative, EntryKind::File { size, offset })?);
        self.data_cursor += align_up(size);
        Ok(())
    }

    /// Fixes the data-region base and turns every relative offset into an absolute one.
    pub fn finish(mut self) -> Layout {
        let header_size = Header::size_for(&self.entries);
        for entry in &mut self.entries {
            if let EntryKind::File { offset, .. } = &mut entry.kind {
                *offset += header_size;
            }
        }
        Layout {
            archive_len: header_size + self.data_cursor,
            header: Header { header_size, entries: self.entries },
        }
    }
}

/// A source directory and the name its contents are stored under.
///
/// A single source is archived with an empty prefix, so its contents become the archive
/// root. With several sources each one keeps its own directory name.
#[derive(Debug, Clone)]
struct Root {
    prefix: PathBuf,
    dir: PathBuf,
}

impl Root {
    /// Maps a stored name back to the file it was read from, if it belongs to this root.
    fn source_path(&self, relative: &Path) -> Option<PathBuf> {
        relative.strip_prefix(&self.prefix).ok().map(|rest| self.dir.join(rest))
    }
}

fn roots_for(sources: &[PathBuf]) -> Result<Vec<Root>, ArchiverError> {
    for source in sources {
        let meta = std::fs::metadata(source).map_err(|e| ArchiverError::source_io(e, source))?;
        if !meta.is_dir() {
            return Err(ArchiverError::source_io(
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
                source,
            ));
        }
    }

    match sources {
        [] => Err(ArchiverError::Usage("no source directory given".into())),
        [only] => Ok(vec![Root { prefix: PathBuf::new(), dir: only.clone() }]),
        many => {
            let mut roots: Vec<Root> = Vec::with_capacity(many.len());
            for source in many {
                let name = source.file_name().ok_or_else(|| {
                    ArchiverError::Usage(format!("'{}' has no name to store it under", source.display()))
                })?;
                if roots.iter().any(|r| r.prefix.as_os_str() == name) {
                    return Err(ArchiverError::Usage(format!(
                        "more than one source is named '{}'",
                        name.to_string_lossy()
                    )));
                }
                roots.push(Root { prefix: PathBuf::from(name), dir: source.clone() });
            }
            Ok(roots)
        }
    }
}

/// Walks `source_dir` in preorder and builds the archive layout.
///
/// Children are visited in file-name order so the same tree always yields the same archive.
/// Symlinks are not followed; they and other special files are skipped.
pub fn plan(source_dir: &Path) -> Result<Layout, ArchiverError> {
    plan_roots(&[Root { prefix: PathBuf::new(), dir: source_dir.to_path_buf() }])
}

fn plan_roots(roots: &[Root]) -> Result<Layout, ArchiverError> {
    let mut builder = HeaderBuilder::new();
    builder.entries.push(Entry::root());

    for root in roots {
        for item in WalkDir::new(&root.dir).follow_links(false).sort_by_file_name() {
            let item = item?;
            let file_type = item.file_type();

            if item.depth() == 0 {
                if !root.prefix.as_os_str().is_empty() {
                    builder
                        .push_dir(&root.prefix)
                        .map_err(|e| ArchiverError::source_io(e, item.path()))?;
                }
                debug!(path = %item.path().display(), "dir");
                continue;
            }

            let relative = root.prefix.join(item.path().strip_prefix(&root.dir).unwrap_or(item.path()));
            if file_type.is_dir() {
                builder
                    .push_dir(&relative)
                    .map_err(|e| ArchiverError::source_io(e, item.path()))?;
                debug!(path = %item.path().display(), "dir");
            } else if file_type.is_file() {
                let size = item
                    .metadata()
                    .map_err(ArchiverError::from)?
                    .len();
                builder
                    .push_file(&relative, size)
                    .map_err(|e| ArchiverError::source_io(e, item.path()))?;
                debug!(path = %item.path().display(), size, "file");
            } else {
                warn!(path = %item.path().display(), "skipping: not a regular file or directory");
            }
        }
    }

    Ok(builder.finish())
}

/// Packs `source_dir` into a new archive at `archive_path`, replacing any existing file.
///
/// The directory's contents become the archive root, so extracting into `D` makes `D`
/// mirror `source_dir`.
pub fn compress(source_dir: &Path, archive_path: &Path, options: &Options) -> Result<ArchiveSummary, ArchiverError> {
    compress_paths(&[source_dir.to_path_buf()], archive_path, options)
}

/// Packs several directories into one archive.
///
/// With a single source this is [`compress`]. With more, every source is stored under its
/// own final path component, which must be present and distinct across the sources.
pub fn compress_paths(
    sources: &[PathBuf],
    archive_path: &Path,
    options: &Options,
) -> Result<ArchiveSummary, ArchiverError> {
    let roots = roots_for(sources)?;
    let layout = plan_roots(&roots)?;
    info!(
        sources = roots.len(),
        entries = layout.header.entries.len(),
        header_size = layout.header.header_size,
        archive_len = layout.archive_len,
        "writing {}",
        archive_path.display()
    );

    let parent = match archive_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let temp = temp_archive(&parent).map_err(|e| ArchiverError::archive_io(e, archive_path))?;

    write_header(temp.as_file(), &layout, archive_path)?;
    let summary = write_data(temp.as_file(), &layout, &roots, archive_path, options)?;

    temp.persist(archive_path)
        .map_err(|e| ArchiverError::archive_io(e.error, archive_path))?;

    info!(%summary, "archive complete");
    Ok(summary)
}

/// Creates the output file beside the destination. On Unix it is opened with mode `0666`,
/// so the process umask applies just as it does to any newly created file.
fn temp_archive(parent: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".car-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(ARCHIVE_MODE));
    }
    builder.tempfile_in(parent)
}

fn write_header(file: &File, layout: &Layout, archive_path: &Path) -> Result<(), ArchiverError> {
    let io_err = |e| ArchiverError::archive_io(e, archive_path);

    let mut writer = BufWriter::new(file);
    layout.header.write_to(&mut writer).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    drop(writer);

    // Reserve the whole data region up front so every clone lands inside the file and the
    // archive ends on a block boundary.
    file.set_len(layout.archive_len).map_err(io_err)?;
    Ok(())
}

/// Re-reads the header just written and places every file's bytes at its recorded offset.
fn write_data(
    mut file: &File,
    layout: &Layout,
    roots: &[Root],
    archive_path: &Path,
    options: &Options,
) -> Result<ArchiveSummary, ArchiverError> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| ArchiverError::archive_io(e, archive_path))?;
    let header = Header::read_from(BufReader::new(file), layout.archive_len, archive_path)?;

    let mut summary = ArchiveSummary::default();
    for entry in &header.entries {
        let (size, offset) = match entry.kind {
            EntryKind::Directory => {
                summary.directories += 1;
                continue;
            }
            EntryKind::File { size, offset } => (size, offset),
        };
        summary.files += 1;
        summary.bytes += size;
        if size == 0 {
            continue;
        }

        let source_path = roots
            .iter()
            .find_map(|root| root.source_path(&entry.path()))
            .ok_or_else(|| ArchiverError::format(format!("no source for entry {}", entry.display_name())))?;
        let source = File::open(&source_path).map_err(|e| ArchiverError::source_io(e, &source_path))?;
        let stats = reflink::transfer(&source, 0, file, offset, size, options.reflink).map_err(|e| match e {
            TransferError::Read(e) => ArchiverError::source_io(e, &source_path),
            TransferError::Write(e) => ArchiverError::archive_io(e, archive_path),
        })?;
        debug!(name = %entry.display_name(), offset, cloned = stats.cloned, copied = stats.copied, "placed");
        summary.transfer += stats;
    }
    Ok(summary)
}
