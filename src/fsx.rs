//! Platform filesystem layer.
//!
//! Everything else in the crate goes through [`clone_range`] to ask the filesystem for a
//! copy-on-write block clone. The platform work is done by `reflink-copy`: on Linux that is
//! the `FICLONERANGE` ioctl (btrfs, XFS with reflink, bcachefs, ...), on Windows block
//! cloning on ReFS. Wherever the filesystem can't share the blocks the call fails and the
//! caller falls back to copying.

use std::fs::File;
use std::io;
use std::num::NonZeroU64;

use reflink_copy::ReflinkBlockBuilder;

/// Clones `len` bytes of `src` starting at `src_offset` into `dst` at `dst_offset`, sharing
/// the underlying blocks. Offsets and `len` must be block aligned. Neither file position moves.
///
/// A zero-length range has nothing to share and is reported as [`io::ErrorKind::InvalidInput`].
pub fn clone_range(src: &File, src_offset: u64, dst: &File, dst_offset: u64, len: u64) -> io::Result<()> {
    let len = NonZeroU64::new(len)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cannot clone an empty range"))?;
    ReflinkBlockBuilder::new(src, dst, len)
        .from_offset(src_offset)
        .to_offset(dst_offset)
        .reflink_block()
}
