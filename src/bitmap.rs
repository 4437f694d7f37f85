//! Packed-bit allocation tracking for blocks and inodes.
//!
//! Bit `i` set means "allocated". Every mutation persists the single affected byte immediately,
//! per the spec's write-through bitmap contract; no flush is batched.

use crate::device::BlockDevice;
use crate::error::{Error, Result};

/// A packed bit array backing either the block or the inode bitmap.
pub struct Bitmap {
	bytes: Vec<u8>,
	/// Byte offset of the bitmap's region on disk.
	region_offset: u64,
}

fn ceil_div(n: u32, d: u32) -> u32 {
	n.div_ceil(d)
}

impl Bitmap {
	/// Reads a bitmap covering `bit_count` bits from `region_offset` on `dev`.
	pub fn load(dev: &mut BlockDevice, region_offset: u64, bit_count: u32) -> Result<Self> {
		let byte_count = ceil_div(bit_count, 8) as usize;
		let mut bytes = vec![0u8; byte_count];
		dev.read_at(region_offset, &mut bytes)?;
		Ok(Self {
			bytes,
			region_offset,
		})
	}

	/// Creates an all-clear bitmap of `bit_count` bits, not yet persisted.
	pub fn new_clear(region_offset: u64, bit_count: u32) -> Self {
		Self {
			bytes: vec![0u8; ceil_div(bit_count, 8) as usize],
			region_offset,
		}
	}

	/// Writes the whole bitmap out; used once at format time. Incremental mutations persist
	/// only the touched byte via [`Self::set`]/[`Self::clear`].
	pub fn write_all(&self, dev: &mut BlockDevice) -> Result<()> {
		dev.write_at(self.region_offset, &self.bytes)
	}

	pub fn is_set(&self, i: u32) -> bool {
		let (byte, bit) = (i / 8, i % 8);
		self.bytes[byte as usize] & (1 << bit) != 0
	}

	fn persist_byte(&self, dev: &mut BlockDevice, byte: u32) -> Result<()> {
		dev.write_at(self.region_offset + byte as u64, &self.bytes[byte as usize..byte as usize + 1])
	}

	/// Sets bit `i` and immediately persists the byte it lives in.
	pub fn set(&mut self, dev: &mut BlockDevice, i: u32) -> Result<()> {
		let (byte, bit) = (i / 8, i % 8);
		self.bytes[byte as usize] |= 1 << bit;
		self.persist_byte(dev, byte)
	}

	/// Clears bit `i` and immediately persists the byte it lives in. Returns whether the bit
	/// had actually been set (idempotent: clearing an already-clear bit is a no-op that still
	/// returns `false`).
	pub fn clear(&mut self, dev: &mut BlockDevice, i: u32) -> Result<bool> {
		let (byte, bit) = (i / 8, i % 8);
		let was_set = self.bytes[byte as usize] & (1 << bit) != 0;
		if was_set {
			self.bytes[byte as usize] &= !(1 << bit);
			self.persist_byte(dev, byte)?;
		}
		Ok(was_set)
	}

	/// Marks the half-open range `[start, end)` allocated, writing the whole bitmap once.
	/// Used only at format time to reserve the superblock/bitmap/inode-table region.
	pub fn reserve_range(&mut self, dev: &mut BlockDevice, start: u32, end: u32) -> Result<()> {
		for i in start..end {
			let (byte, bit) = (i / 8, i % 8);
			self.bytes[byte as usize] |= 1 << bit;
		}
		self.write_all(dev)
	}

	/// Allocates the first clear bit in `[first.. total)`, lowest index wins. Never considers
	/// bits below `first` (the reserved region). Returns [`Error::NoSpace`] when exhausted.
	pub fn alloc_block(&mut self, dev: &mut BlockDevice, first: u32, total: u32) -> Result<u32> {
		for i in first..total {
			if !self.is_set(i) {
				self.set(dev, i)?;
				return Ok(i);
			}
		}
		Err(Error::NoSpace)
	}

	/// Frees each non-zero index in `indices` (0 is the "no block" sentinel and is skipped).
	/// Returns the count of bits that were actually set (and thus really freed) — used by the
	/// caller to adjust `free_blocks`. Idempotent: freeing an already-free index is a no-op.
	pub fn free_blocks(&mut self, dev: &mut BlockDevice, indices: &[u32]) -> Result<u32> {
		let mut freed = 0;
		for &i in indices {
			if i == 0 {
				continue;
			}
			if self.clear(dev, i)? {
				freed += 1;
			}
		}
		Ok(freed)
	}

	/// Allocates a free inode starting the scan at `hint`, wrapping to `1` and stopping before
	/// `hint` again. Inode `0` (the root) is never considered. Returns the allocated index and
	/// the hint's new value (one past the allocated index, wrapping into `[1, inode_count)`).
	pub fn alloc_inode(&mut self, dev: &mut BlockDevice, hint: u32, inode_count: u32) -> Result<(u32, u32)> {
		let scan = (hint..inode_count).chain(1..hint.min(inode_count));
		for i in scan {
			if i == 0 {
				continue;
			}
			if !self.is_set(i) {
				self.set(dev, i)?;
				let mut next_hint = i + 1;
				if next_hint >= inode_count {
					next_hint = 1;
				}
				return Ok((i, next_hint));
			}
		}
		Err(Error::NoInode)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::NamedTempFile;

	fn scratch_dev() -> BlockDevice {
		let f = NamedTempFile::new().unwrap();
		BlockDevice::create(f.path(), 4096).unwrap()
	}

	#[test]
	fn alloc_lowest_index_wins() {
		let mut dev = scratch_dev();
		let mut bm = Bitmap::new_clear(0, 64);
		bm.write_all(&mut dev).unwrap();

		assert_eq!(bm.alloc_block(&mut dev, 0, 64).unwrap(), 0);
		assert_eq!(bm.alloc_block(&mut dev, 0, 64).unwrap(), 1);
	}

	#[test]
	fn free_idempotent() {
		let mut dev = scratch_dev();
		let mut bm = Bitmap::new_clear(0, 64);
		bm.write_all(&mut dev).unwrap();
		bm.set(&mut dev, 5).unwrap();

		assert_eq!(bm.free_blocks(&mut dev, &[0, 0]).unwrap(), 0);
		assert_eq!(bm.free_blocks(&mut dev, &[5]).unwrap(), 1);
		assert_eq!(bm.free_blocks(&mut dev, &[5]).unwrap(), 0);
	}

	#[test]
	fn alloc_inode_wraps_and_skips_root() {
		let mut dev = scratch_dev();
		let mut bm = Bitmap::new_clear(0, 8);
		bm.write_all(&mut dev).unwrap();
		bm.set(&mut dev, 0).unwrap();

		let (i, hint) = bm.alloc_inode(&mut dev, 5, 8).unwrap();
		assert_eq!(i, 5);
		let (i, hint) = bm.alloc_inode(&mut dev, hint, 8).unwrap();
		assert_eq!(i, 6);
		let (i, _) = bm.alloc_inode(&mut dev, hint, 8).unwrap();
		assert_eq!(i, 7);
	}
}
