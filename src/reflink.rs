//! Extent transfer: move a byte range from one file into another, cloning whole blocks when
//! the filesystem lets us and copying otherwise.
//!
//! The same primitive serves both directions: the writer moves source files into the
//! archive, the reader moves archive extents back out into fresh files.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::AddAssign;

use tracing::debug;

use crate::archive::{align_down, ALIGNMENT};
use crate::fsx;

/// Buffer size for the streaming copy path.
pub const CHUNK_SIZE: usize = ALIGNMENT as usize;

/// Whether block cloning is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReflinkMode {
    /// Try to clone, copy on refusal.
    #[default]
    Auto,
    /// Always copy. Produces identical archives, only slower and without shared blocks.
    Never,
}

/// How many bytes of a transfer were shared vs. physically copied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub cloned: u64,
    pub copied: u64,
}

impl AddAssign for TransferStats {
    fn add_assign(&mut self, rhs: Self) {
        self.cloned += rhs.cloned;
        self.copied += rhs.copied;
    }
}

/// Which side of a transfer failed. Callers know which file is which and attach the path.
#[derive(Debug)]
pub enum TransferError {
    Read(io::Error),
    Write(io::Error),
}

/// Moves `len` bytes from `src` at `src_offset` to `dst` at `dst_offset`.
///
/// With [`ReflinkMode::Auto`] and `len >= ALIGNMENT`, the largest block-aligned prefix is
/// cloned first and the short tail is copied right after it. If the clone is refused for any
/// reason, the whole range is copied instead. A refused clone is never an error.
///
/// Both file positions are left wherever the copy path put them.
pub fn transfer(
    src: &File,
    src_offset: u64,
    dst: &File,
    dst_offset: u64,
    len: u64,
    mode: ReflinkMode,
) -> Result<TransferStats, TransferError> {
    let mut stats = TransferStats::default();
    let prefix = align_down(len);

    if mode == ReflinkMode::Auto && prefix > 0 {
        match fsx::clone_range(src, src_offset, dst, dst_offset, prefix) {
            Ok(()) => stats.cloned = prefix,
            Err(e) => {
                debug!(error = %e, len, "block clone refused, copying instead");
                copy_range(src, src_offset, dst, dst_offset, len)?;
                stats.copied = len;
                return Ok(stats);
            }
        }
    }

    let tail = len - stats.cloned;
    if tail > 0 {
        copy_range(src, src_offset + stats.cloned, dst, dst_offset + stats.cloned, tail)?;
        stats.copied = tail;
    }
    Ok(stats)
}

/// Plain positioned copy in [`CHUNK_SIZE`] pieces. A source shorter than `len` is a read error.
pub fn copy_range(
    mut src: &File,
    src_offset: u64,
    mut dst: &File,
    dst_offset: u64,
    len: u64,
) -> Result<(), TransferError> {
    src.seek(SeekFrom::Start(src_offset)).map_err(TransferError::Read)?;
    dst.seek(SeekFrom::Start(dst_offset)).map_err(TransferError::Write)?;

    let mut buf = [0u8; CHUNK_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(CHUNK_SIZE as u64) as usize;
        src.read_exact(&mut buf[..n]).map_err(TransferError::Read)?;
        dst.write_all(&buf[..n]).map_err(TransferError::Write)?;
        remaining -= n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn file_with(dir: &std::path::Path, name: &str, data: &[u8]) -> File {
        let mut f = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.join(name))
            .unwrap();
        f.write_all(data).unwrap();
        f
    }

    fn contents(mut f: &File) -> Vec<u8> {
        let mut out = Vec::new();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.read_to_end(&mut out).unwrap();
        out
    }

    fn random(len: usize) -> Vec<u8> {
        let mut v = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut v);
        v
    }

    #[test]
    fn small_range_is_only_copied() {
        let dir = tempfile::tempdir().unwrap();
        let data = random(1000);
        let src = file_with(dir.path(), "src", &data);
        let dst = file_with(dir.path(), "dst", &[]);

        let stats = transfer(&src, 0, &dst, 0, 1000, ReflinkMode::Auto).unwrap();
        assert_eq!(stats, TransferStats { cloned: 0, copied: 1000 });
        assert_eq!(contents(&dst), data);
    }

    #[test]
    fn never_mode_copies_everything() {
        let dir = tempfile::tempdir().unwrap();
        let data = random(3 * 4096 + 17);
        let src = file_with(dir.path(), "src", &data);
        let dst = file_with(dir.path(), "dst", &[]);

        let stats = transfer(&src, 0, &dst, 4096, data.len() as u64, ReflinkMode::Never).unwrap();
        assert_eq!(stats.cloned, 0);
        assert_eq!(stats.copied, data.len() as u64);
        let out = contents(&dst);
        assert!(out[..4096].iter().all(|&b| b == 0));
        assert_eq!(&out[4096..], &data[..]);
    }

    #[test]
    fn auto_mode_accounts_every_byte() {
        let dir = tempfile::tempdir().unwrap();
        let data = random(2 * 4096 + 100);
        let src = file_with(dir.path(), "src", &data);
        let dst = file_with(dir.path(), "dst", &[]);
        dst.set_len(4096 + data.len() as u64).unwrap();

        let stats = transfer(&src, 0, &dst, 4096, data.len() as u64, ReflinkMode::Auto).unwrap();
        assert_eq!(stats.cloned + stats.copied, data.len() as u64);
        assert!(stats.cloned == 0 || stats.cloned == 2 * 4096);
        assert_eq!(&contents(&dst)[4096..], &data[..]);
    }

    // No filesystem clones into an unaligned destination, so the whole range is copied.
    #[test]
    fn refused_clone_copies_the_whole_range() {
        let dir = tempfile::tempdir().unwrap();
        let len = 2 * 4096 + 5;
        let data = random(len);
        let src = file_with(dir.path(), "src", &data);
        let dst = file_with(dir.path(), "dst", &[]);
        dst.set_len(1 + len as u64).unwrap();

        let stats = transfer(&src, 0, &dst, 1, len as u64, ReflinkMode::Auto).unwrap();
        assert_eq!(stats, TransferStats { cloned: 0, copied: len as u64 });
        let out = contents(&dst);
        assert_eq!(out[0], 0);
        assert_eq!(&out[1..], &data[..]);
    }

    #[test]
    fn reads_from_an_offset() {
        let dir = tempfile::tempdir().unwrap();
        let data = random(8192 + 5);
        let src = file_with(dir.path(), "src", &data);
        let dst = file_with(dir.path(), "dst", &[]);

        transfer(&src, 4096, &dst, 0, 4096 + 5, ReflinkMode::Auto).unwrap();
        assert_eq!(contents(&dst), &data[4096..]);
    }

    #[test]
    fn short_source_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = file_with(dir.path(), "src", b"only a few bytes");
        let dst = file_with(dir.path(), "dst", &[]);

        match transfer(&src, 0, &dst, 0, 100, ReflinkMode::Never) {
            Err(TransferError::Read(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected read error, got {other:?}"),
        }
    }

    #[test]
    fn stats_accumulate() {
        let mut total = TransferStats::default();
        total += TransferStats { cloned: 4096, copied: 10 };
        total += TransferStats { cloned: 0, copied: 5 };
        assert_eq!(total, TransferStats { cloned: 4096, copied: 15 });
    }
}
