//! Block device abstraction: random read/write at byte offsets on the backing image.
//!
//! All persistence goes through this layer so the rest of the core is oblivious to the backing
//! store; only this module touches the `File` handle directly. Modeled on the seek-then-`read_exact`
//! / seek-then-`write_all` pattern `ext2.rs`'s `BlockGroupDescriptor::read`/`write` use in the
//! teacher repo.

use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A byte-addressed backing store for the filesystem image.
pub struct BlockDevice {
	file: File,
}

impl BlockDevice {
	/// Opens an existing image for reading and writing.
	pub fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		Ok(Self {
			file,
		})
	}

	/// Creates (or truncates) the image file at `path` and sets its length to `size_bytes`.
	pub fn create(path: &Path, size_bytes: u64) -> Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)?;
		file.set_len(size_bytes)?;
		Ok(Self {
			file,
		})
	}

	/// Returns the length of the image in bytes.
	pub fn len(&self) -> Result<u64> {
		Ok(self.file.metadata()?.len())
	}

	/// Reads `buf.len()` bytes starting at `offset`.
	pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.read_exact(buf)?;
		Ok(())
	}

	/// Writes `buf` starting at `offset`.
	pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.write_all(buf)?;
		Ok(())
	}

	/// Flushes buffered writes to the OS.
	pub fn flush(&mut self) -> Result<()> {
		self.file.flush()?;
		Ok(())
	}
}
