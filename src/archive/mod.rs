//! # Archive Format
//!
//! Byte layout shared by the writer ([`crate::compress`]) and the reader ([`crate::extract`]).
//! All integers are big-endian.
//!
//! ```text
//! 0      4            12
//! +------+------------+---------------------------+---------+----------------------+
//! | CAR! | header_size| entry records ...         | 0 pad   | data region          |
//! +------+------------+---------------------------+---------+----------------------+
//!                                                           ^ header_size (4 KiB aligned)
//! ```
//!
//! Each entry record is:
//!
//! | field       | width | notes                                  |
//! |-------------|-------|----------------------------------------|
//! | kind        | u8    | 1 = file, 2 = directory, 0 = end       |
//! | name_length | u32   | byte length of `name`                  |
//! | name        | bytes | `/`-separated path relative to the root |
//! | size        | u64   | files only                             |
//! | offset      | u64   | files only, absolute, 4 KiB aligned    |
//!
//! The first record is always the root directory, stored with an empty name. Records are
//! in preorder, so a directory always precedes everything nested under it. The zero padding
//! between the last record and `header_size` reads back as an end marker.

use std::collections::HashSet;
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::ArchiverError;

pub const MAGIC_BYTES: &[u8; 4] = b"CAR!";

/// Block size required by `FICLONERANGE`; every file extent starts on this boundary.
pub const ALIGNMENT: u64 = 4096;

/// Magic plus the stored `header_size`.
pub const PREAMBLE_SIZE: u64 = MAGIC_BYTES.len() as u64 + 8;

const KIND_END: u8 = 0;
const KIND_FILE: u8 = 1;
const KIND_DIR: u8 = 2;

/// Fixed part of a record: kind + name_length.
const RECORD_PREFIX: u64 = 1 + 4;
/// size + offset, files only.
const FILE_FIELDS: u64 = 8 + 8;

/// Rounds `n` up to the next multiple of [`ALIGNMENT`].
pub fn align_up(n: u64) -> u64 {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Rounds `n` down to a multiple of [`ALIGNMENT`].
pub fn align_down(n: u64) -> u64 {
    n & !(ALIGNMENT - 1)
}

/// What an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    /// A regular file whose `size` bytes live at the absolute archive position `offset`.
    File { size: u64, offset: u64 },
}

/// A single node of the archived tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    name: Vec<u8>,
    pub kind: EntryKind,
}

impl Entry {
    /// The root of the archived tree.
    pub fn root() -> Self {
        Entry { name: Vec::new(), kind: EntryKind::Directory }
    }

    /// Builds an entry from a path relative to the archived root.
    pub fn new(relative: &Path, kind: EntryKind) -> io::Result<Self> {
        Ok(Entry { name: encode_name(relative)?, kind })
    }

    /// Raw stored name bytes.
    pub fn name_bytes(&self) -> &[u8] {
        &self.name
    }

    /// The stored name as a relative path. Empty for the root.
    pub fn path(&self) -> PathBuf {
        decode_name(&self.name).unwrap_or_default()
    }

    /// The name for humans; the root shows as `.`.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            ".".to_string()
        } else {
            String::from_utf8_lossy(&self.name).into_owned()
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Number of bytes this record occupies in the header.
    pub fn encoded_len(&self) -> u64 {
        let fixed = match self.kind {
            EntryKind::Directory => RECORD_PREFIX,
            EntryKind::File { .. } => RECORD_PREFIX + FILE_FIELDS,
        };
        fixed + self.name.len() as u64
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let name_len = u32::try_from(self.name.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "entry name too long"))?;
        match self.kind {
            EntryKind::Directory => {
                w.write_all(&[KIND_DIR])?;
                w.write_all(&name_len.to_be_bytes())?;
                w.write_all(&self.name)?;
            }
            EntryKind::File { size, offset } => {
                w.write_all(&[KIND_FILE])?;
                w.write_all(&name_len.to_be_bytes())?;
                w.write_all(&self.name)?;
                w.write_all(&size.to_be_bytes())?;
                w.write_all(&offset.to_be_bytes())?;
            }
        }
        Ok(())
    }
}

/// The parsed header region of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Absolute, aligned offset where the data region starts.
    pub header_size: u64,
    /// Entries in preorder, root first.
    pub entries: Vec<Entry>,
}

impl Header {
    /// Computes the aligned data-region base for a set of entries.
    pub fn size_for(entries: &[Entry]) -> u64 {
        let records: u64 = entries.iter().map(Entry::encoded_len).sum();
        align_up(PREAMBLE_SIZE + records)
    }

    /// Serializes the preamble, every record and the zero padding up to `header_size`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(MAGIC_BYTES)?;
        w.write_all(&self.header_size.to_be_bytes())?;
        let mut written = PREAMBLE_SIZE;
        for entry in &self.entries {
            entry.write_to(w)?;
            written += entry.encoded_len();
        }
        if written > self.header_size {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "entries overflow header_size"));
        }
        io::copy(&mut io::repeat(0).take(self.header_size - written), w)?;
        Ok(())
    }

    /// Parses and validates a header. `archive_len` is the total archive length, used to
    /// bound every offset. `path` only provides context for I/O errors.
    ///
    /// Nothing is accepted until the whole header checks out, so callers can rely on a
    /// successful parse before creating anything on disk.
    pub fn read_from<R: Read>(reader: R, archive_len: u64, path: &Path) -> Result<Self, ArchiverError> {
        let mut parser = Parser { reader, pos: 0, path };

        let mut magic = [0u8; 4];
        parser.read_exact(&mut magic, "magic")?;
        if &magic != MAGIC_BYTES {
            return Err(ArchiverError::format("magic bytes mismatch, not a car archive"));
        }
        let header_size = parser.read_u64("header size")?;
        if header_size % ALIGNMENT != 0 || header_size < PREAMBLE_SIZE {
            return Err(ArchiverError::format(format!("header size {header_size} is not a valid aligned boundary")));
        }
        if header_size > archive_len {
            return Err(ArchiverError::format(format!(
                "header size {header_size} exceeds archive length {archive_len}"
            )));
        }

        let mut entries = Vec::new();
        while parser.pos < header_size {
            let kind = parser.read_u8("entry kind")?;
            if kind == KIND_END {
                break;
            }
            if kind != KIND_FILE && kind != KIND_DIR {
                return Err(ArchiverError::format(format!("unknown entry kind {kind} at offset {}", parser.pos - 1)));
            }
            let name_len = u64::from(parser.read_u32("name length")?);
            let fixed_tail = if kind == KIND_FILE { FILE_FIELDS } else { 0 };
            if parser.pos + name_len + fixed_tail > header_size {
                return Err(ArchiverError::format(format!(
                    "entry at offset {} runs past the header boundary",
                    parser.pos - RECORD_PREFIX
                )));
            }
            let mut name = vec![0u8; name_len as usize];
            parser.read_exact(&mut name, "entry name")?;

            let kind = if kind == KIND_FILE {
                let size = parser.read_u64("file size")?;
                let offset = parser.read_u64("file offset")?;
                EntryKind::File { size, offset }
            } else {
                EntryKind::Directory
            };
            entries.push(Entry { name, kind });
        }

        let header = Header { header_size, entries };
        header.validate(archive_len)?;
        Ok(header)
    }

    /// Checks names, preorder, and that file extents are aligned, in bounds and disjoint.
    pub fn validate(&self, archive_len: u64) -> Result<(), ArchiverError> {
        let mut dirs: HashSet<PathBuf> = HashSet::new();
        let mut seen: HashSet<&[u8]> = HashSet::new();
        let mut extents = Vec::new();

        for (i, entry) in self.entries.iter().enumerate() {
            let path = decode_name(&entry.name)?;
            if !seen.insert(entry.name.as_slice()) {
                return Err(ArchiverError::format(format!("duplicate entry '{}'", entry.display_name())));
            }
            match path.parent() {
                None => {
                    if i != 0 || !entry.is_dir() {
                        return Err(ArchiverError::format("root entry must be the first entry and a directory"));
                    }
                }
                Some(parent) => {
                    if !dirs.contains(parent) {
                        return Err(ArchiverError::format(format!(
                            "entry '{}' precedes its parent directory",
                            entry.display_name()
                        )));
                    }
                }
            }
            match entry.kind {
                EntryKind::Directory => {
                    dirs.insert(path);
                }
                EntryKind::File { size, offset } => {
                    if offset % ALIGNMENT != 0 {
                        return Err(ArchiverError::format(format!(
                            "file '{}' has unaligned offset {offset}",
                            entry.display_name()
                        )));
                    }
                    let end = offset.checked_add(size).filter(|&end| end <= archive_len);
                    let Some(end) = end else {
                        return Err(ArchiverError::format(format!(
                            "file '{}' extends beyond end of archive",
                            entry.display_name()
                        )));
                    };
                    if offset < self.header_size {
                        return Err(ArchiverError::format(format!(
                            "file '{}' points inside the header region",
                            entry.display_name()
                        )));
                    }
                    if size > 0 {
                        extents.push((offset, end, i));
                    }
                }
            }
        }
        if self.entries.is_empty() {
            return Err(ArchiverError::format("archive has no root entry"));
        }

        extents.sort_unstable();
        for pair in extents.windows(2) {
            let (_, prev_end, a) = pair[0];
            let (next_start, _, b) = pair[1];
            if next_start < prev_end {
                return Err(ArchiverError::format(format!(
                    "data of '{}' overlaps '{}'",
                    self.entries[a].display_name(),
                    self.entries[b].display_name()
                )));
            }
        }
        Ok(())
    }

    /// Iterates over file entries only, as `(entry, size, offset)`.
    pub fn files(&self) -> impl Iterator<Item = (&Entry, u64, u64)> {
        self.entries.iter().filter_map(|e| match e.kind {
            EntryKind::File { size, offset } => Some((e, size, offset)),
            EntryKind::Directory => None,
        })
    }
}

struct Parser<'a, R> {
    reader: R,
    pos: u64,
    path: &'a Path,
}

impl<R: Read> Parser<'_, R> {
    fn read_exact(&mut self, buf: &mut [u8], what: &str) -> Result<(), ArchiverError> {
        self.reader.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ArchiverError::format(format!("truncated archive while reading {what} at offset {}", self.pos))
            } else {
                ArchiverError::archive_io(e, self.path)
            }
        })?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn read_u8(&mut self, what: &str) -> Result<u8, ArchiverError> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b, what)?;
        Ok(b[0])
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, ArchiverError> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b, what)?;
        Ok(u32::from_be_bytes(b))
    }

    fn read_u64(&mut self, what: &str) -> Result<u64, ArchiverError> {
        let mut b = [0u8; 8];
        self.read_exact(&mut b, what)?;
        Ok(u64::from_be_bytes(b))
    }
}

/// Encodes a relative path as `/`-joined component bytes.
fn encode_name(relative: &Path) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("'{}' is not a plain relative path", relative.display()),
            ));
        };
        if !out.is_empty() {
            out.push(b'/');
        }
        out.extend_from_slice(&os_bytes(part)?);
    }
    Ok(out)
}

#[cfg(unix)]
fn os_bytes(part: &std::ffi::OsStr) -> io::Result<Vec<u8>> {
    use std::os::unix::ffi::OsStrExt;
    Ok(part.as_bytes().to_vec())
}

#[cfg(not(unix))]
fn os_bytes(part: &std::ffi::OsStr) -> io::Result<Vec<u8>> {
    part.to_str()
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "file name is not valid UTF-8"))
}

/// Decodes and validates stored name bytes. Rejects anything that could escape the
/// extraction root.
fn decode_name(bytes: &[u8]) -> Result<PathBuf, ArchiverError> {
    let mut path = PathBuf::new();
    if bytes.is_empty() {
        return Ok(path);
    }
    for part in bytes.split(|&b| b == b'/') {
        if part.is_empty() || part == b"." || part == b".." || part.contains(&0) {
            return Err(ArchiverError::format(format!(
                "unsafe entry name '{}'",
                String::from_utf8_lossy(bytes)
            )));
        }
        path.push(component_from_bytes(part)?);
    }
    Ok(path)
}

#[cfg(unix)]
fn component_from_bytes(part: &[u8]) -> Result<PathBuf, ArchiverError> {
    use std::os::unix::ffi::OsStrExt;
    Ok(PathBuf::from(std::ffi::OsStr::from_bytes(part)))
}

#[cfg(not(unix))]
fn component_from_bytes(part: &[u8]) -> Result<PathBuf, ArchiverError> {
    let s = std::str::from_utf8(part).map_err(|_| ArchiverError::format("entry name is not valid UTF-8"))?;
    if s.contains(['\\', ':']) {
        return Err(ArchiverError::format(format!("unsafe entry name component '{s}'")));
    }
    Ok(PathBuf::from(s))
}
