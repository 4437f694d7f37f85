//! The superblock: a fixed header describing geometry and free counts, stored at offset 0.

use crate::device::BlockDevice;
use crate::error::{Error, Result};

/// The filesystem's magic number ("FSFS" read little-endian), matching the source's
/// `MAGIC_NUMBER`.
pub const MAGIC: u32 = 0x4653_4653;

/// The default block size in bytes, used when a caller doesn't override it at format time.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Fixed size of an inode record on disk.
pub const INODE_SIZE: u32 = 512;

/// Number of blocks reserved between the superblock and the first data block: one for the
/// superblock itself, one for the block bitmap, one for the inode bitmap.
const RESERVED_HEADER_BLOCKS: u32 = 3;

/// On-disk geometry and free-space header.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
	pub magic: u32,
	pub block_size: u32,
	pub total_blocks: u32,
	pub inode_count: u32,
	pub free_blocks: u32,
	pub free_inodes: u32,
	pub first_data_block: u32,
	/// Block index of the block bitmap (always 1).
	pub bitmap_block: u32,
	/// Block index of the inode bitmap (always 2).
	pub inode_bitmap_block: u32,
	/// Block index of the first block of the inode table (always 3).
	pub inode_table_block: u32,
	pub root_inode: u32,
	/// LRU inode cache capacity hint.
	pub cache_capacity: u32,
	pub snapshot_count: u32,
	pub next_snapshot_id: u32,
	/// Rolling cursor biasing inode allocation toward likely-free regions.
	pub free_inode_hint: u32,
}

/// Number of `u32` fields serialized; keep in sync with [`Superblock::to_bytes`].
const FIELD_COUNT: usize = 15;
/// Encoded size of the superblock payload (before block padding).
pub const ENCODED_SIZE: usize = FIELD_COUNT * 4;

impl Superblock {
	/// Computes geometry for a fresh image of `total_len` bytes and `block_size`-byte blocks,
	/// per the formula `first_data_block = 3 + inode_count * 512 / block_size`.
	pub fn new(total_len: u64, block_size: u32, cache_capacity: u32) -> Self {
		let total_blocks = (total_len / block_size as u64) as u32;
		let inode_count = total_blocks / 16;
		let inode_table_blocks = (inode_count * INODE_SIZE) / block_size;
		let first_data_block = RESERVED_HEADER_BLOCKS + inode_table_blocks;

		Self {
			magic: MAGIC,
			block_size,
			total_blocks,
			inode_count,
			free_blocks: total_blocks - first_data_block,
			// inode 0 is the permanently-allocated root.
			free_inodes: inode_count - 1,
			first_data_block,
			bitmap_block: 1,
			inode_bitmap_block: 2,
			inode_table_block: RESERVED_HEADER_BLOCKS,
			root_inode: 0,
			cache_capacity,
			snapshot_count: 0,
			next_snapshot_id: 1,
			free_inode_hint: 1,
		}
	}

	/// Serializes the superblock to its on-disk representation, padded to one block.
	pub fn to_bytes(&self, block_size: u32) -> Vec<u8> {
		let mut buf = vec![0u8; block_size as usize];
		let fields = [
			self.magic,
			self.block_size,
			self.total_blocks,
			self.inode_count,
			self.free_blocks,
			self.free_inodes,
			self.first_data_block,
			self.bitmap_block,
			self.inode_bitmap_block,
			self.inode_table_block,
			self.root_inode,
			self.cache_capacity,
			self.snapshot_count,
			self.next_snapshot_id,
			self.free_inode_hint,
		];
		for (i, field) in fields.iter().enumerate() {
			buf[i * 4..i * 4 + 4].copy_from_slice(&field.to_le_bytes());
		}
		buf
	}

	/// Parses a superblock out of a raw block, checking the magic number.
	pub fn from_bytes(buf: &[u8]) -> Result<Self> {
		let read_u32 = |i: usize| -> u32 {
			u32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap())
		};
		let magic = read_u32(0);
		if magic != MAGIC {
			return Err(Error::BadMagic);
		}
		Ok(Self {
			magic,
			block_size: read_u32(1),
			total_blocks: read_u32(2),
			inode_count: read_u32(3),
			free_blocks: read_u32(4),
			free_inodes: read_u32(5),
			first_data_block: read_u32(6),
			bitmap_block: read_u32(7),
			inode_bitmap_block: read_u32(8),
			inode_table_block: read_u32(9),
			root_inode: read_u32(10),
			cache_capacity: read_u32(11),
			snapshot_count: read_u32(12),
			next_snapshot_id: read_u32(13),
			free_inode_hint: read_u32(14),
		})
	}

	/// Reads the superblock from offset 0 of `dev`.
	pub fn read(dev: &mut BlockDevice) -> Result<Self> {
		// We don't know the block size yet, but the encoded payload always fits in the
		// smallest legal block (512 bytes).
		let mut buf = vec![0u8; 512];
		dev.read_at(0, &mut buf)?;
		Self::from_bytes(&buf)
	}

	/// Persists the superblock at offset 0 of `dev`.
	pub fn write(&self, dev: &mut BlockDevice) -> Result<()> {
		dev.write_at(0, &self.to_bytes(self.block_size))
	}

	/// Byte offset of the start of the inode table.
	pub fn inode_table_offset(&self) -> u64 {
		self.inode_table_block as u64 * self.block_size as u64
	}

	/// Byte offset of the reserved snapshot table region.
	pub fn snapshot_table_offset(&self) -> u64 {
		(self.first_data_block as u64 + 10) * self.block_size as u64
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn geometry_1mib_4096() {
		let sb = Superblock::new(1024 * 1024, 4096, 64);
		assert_eq!(sb.total_blocks, 256);
		assert_eq!(sb.inode_count, 16);
		assert_eq!(sb.first_data_block, 5);
		assert_eq!(sb.free_blocks, 251);
		assert_eq!(sb.free_inodes, 15);
	}

	#[test]
	fn round_trip() {
		let sb = Superblock::new(4 * 1024 * 1024, 4096, 64);
		let bytes = sb.to_bytes(4096);
		let sb2 = Superblock::from_bytes(&bytes).unwrap();
		assert_eq!(sb.total_blocks, sb2.total_blocks);
		assert_eq!(sb.first_data_block, sb2.first_data_block);
	}

	#[test]
	fn bad_magic() {
		let buf = vec![0u8; 512];
		assert!(matches!(Superblock::from_bytes(&buf), Err(Error::BadMagic)));
	}
}
