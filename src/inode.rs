//! The inode record: a fixed 512-byte structure describing one file, plus the tagged union
//! over inline payload vs. direct block list that the spec's Design Notes (§9) call for.

use crate::error::{Error, Result};

/// Maximum length of a filename, excluding the NUL terminator.
pub const MAX_NAME_LEN: usize = 223;
/// Size of the name field on disk (`MAX_NAME_LEN` bytes + terminator).
const NAME_FIELD: usize = 224;
/// Inline payloads up to this many bytes are stored directly in the inode.
pub const INLINE_THRESHOLD: u32 = 256;
/// Number of direct block pointers.
pub const DIRECT_BLOCKS: usize = 12;
/// Fixed size of one inode record on disk.
pub const INODE_RECORD_SIZE: usize = 512;
/// Sentinel meaning "no parent inode".
const NO_PARENT: u32 = u32::MAX;

/// A file or directory's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
	File,
	Directory,
}

/// The inode's data region: either inlined directly, or mapped through up to 12 direct blocks.
#[derive(Debug, Clone)]
pub enum InodeData {
	Inline(Vec<u8>),
	BlockMapped([u32; DIRECT_BLOCKS]),
}

impl InodeData {
	/// Returns the direct block list, or an all-zero list if this inode is inline.
	pub fn blocks(&self) -> [u32; DIRECT_BLOCKS] {
		match self {
			InodeData::Inline(_) => [0; DIRECT_BLOCKS],
			InodeData::BlockMapped(b) => *b,
		}
	}
}

/// An in-memory view of one inode record.
#[derive(Debug, Clone)]
pub struct Inode {
	pub name: String,
	pub size: u32,
	pub kind: Kind,
	pub used: bool,
	pub created: u32,
	pub modified: u32,
	/// The originating inode, for snapshot inodes.
	pub parent: Option<u32>,
	pub is_snapshot: bool,
	/// Number of live snapshots of this inode (meaningless on snapshot inodes themselves).
	pub snapshot_count: u32,
	pub data: InodeData,
	pub access_hint: u8,
	pub last_accessed_block: u32,
}

impl Inode {
	/// Returns an all-zero, unused inode record (what a freshly-cleared slot looks like).
	pub fn empty() -> Self {
		Self {
			name: String::new(),
			size: 0,
			kind: Kind::File,
			used: false,
			created: 0,
			modified: 0,
			parent: None,
			is_snapshot: false,
			snapshot_count: 0,
			data: InodeData::Inline(Vec::new()),
			access_hint: 0,
			last_accessed_block: 0,
		}
	}

	/// Number of direct blocks needed to hold `size` bytes at `block_size`.
	pub fn blocks_for_size(size: u32, block_size: u32) -> u32 {
		size.div_ceil(block_size)
	}

	/// Encodes the name into the fixed-width on-disk field.
	fn encode_name(name: &str) -> Result<[u8; NAME_FIELD]> {
		let bytes = name.as_bytes();
		if bytes.len() > MAX_NAME_LEN {
			return Err(Error::NameTooLong);
		}
		let mut field = [0u8; NAME_FIELD];
		field[..bytes.len()].copy_from_slice(bytes);
		Ok(field)
	}

	fn decode_name(field: &[u8]) -> String {
		let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
		String::from_utf8_lossy(&field[..end]).into_owned()
	}

	/// Serializes this inode to its fixed 512-byte on-disk form.
	pub fn to_bytes(&self) -> Result<[u8; INODE_RECORD_SIZE]> {
		let mut buf = [0u8; INODE_RECORD_SIZE];
		let name = Self::encode_name(&self.name)?;
		let mut off = 0;
		buf[off..off + NAME_FIELD].copy_from_slice(&name);
		off += NAME_FIELD;
		buf[off..off + 4].copy_from_slice(&self.size.to_le_bytes());
		off += 4;
		buf[off] = match self.kind {
			Kind::File => 0,
			Kind::Directory => 1,
		};
		off += 1;
		buf[off] = self.used as u8;
		off += 1;
		buf[off..off + 4].copy_from_slice(&self.created.to_le_bytes());
		off += 4;
		buf[off..off + 4].copy_from_slice(&self.modified.to_le_bytes());
		off += 4;
		buf[off..off + 4].copy_from_slice(&self.parent.unwrap_or(NO_PARENT).to_le_bytes());
		off += 4;
		buf[off] = self.is_snapshot as u8;
		off += 1;
		buf[off..off + 4].copy_from_slice(&self.snapshot_count.to_le_bytes());
		off += 4;
		buf[off] = match &self.data {
			InodeData::Inline(_) => 0,
			InodeData::BlockMapped(_) => 1,
		};
		off += 1;
		buf[off] = self.access_hint;
		off += 1;
		buf[off..off + 4].copy_from_slice(&self.last_accessed_block.to_le_bytes());
		off += 4;

		let data_region = &mut buf[off..off + 256];
		match &self.data {
			InodeData::Inline(bytes) => {
				data_region[..bytes.len()].copy_from_slice(bytes);
			},
			InodeData::BlockMapped(blocks) => {
				for (i, b) in blocks.iter().enumerate() {
					data_region[i * 4..i * 4 + 4].copy_from_slice(&b.to_le_bytes());
				}
				// Bytes [48..52) are the reserved single-indirect pointer; left zeroed, this
				// generation never populates it.
			},
		}

		Ok(buf)
	}

	/// Parses an inode record out of its raw 512-byte form.
	pub fn from_bytes(buf: &[u8]) -> Self {
		let mut off = 0;
		let name_field = &buf[off..off + NAME_FIELD];
		off += NAME_FIELD;
		let size = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		off += 4;
		let kind = if buf[off] == 1 { Kind::Directory } else { Kind::File };
		off += 1;
		let used = buf[off] != 0;
		off += 1;
		let created = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		off += 4;
		let modified = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		off += 4;
		let parent_raw = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		off += 4;
		let is_snapshot = buf[off] != 0;
		off += 1;
		let snapshot_count = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		off += 4;
		let data_tag = buf[off];
		off += 1;
		let access_hint = buf[off];
		off += 1;
		let last_accessed_block = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
		off += 4;

		let data_region = &buf[off..off + 256];
		let data = if data_tag == 1 {
			let mut blocks = [0u32; DIRECT_BLOCKS];
			for (i, b) in blocks.iter_mut().enumerate() {
				*b = u32::from_le_bytes(data_region[i * 4..i * 4 + 4].try_into().unwrap());
			}
			InodeData::BlockMapped(blocks)
		} else {
			InodeData::Inline(data_region[..size as usize].to_vec())
		};

		Self {
			name: Self::decode_name(name_field),
			size,
			kind,
			used,
			created,
			modified,
			parent: if parent_raw == NO_PARENT { None } else { Some(parent_raw) },
			is_snapshot,
			snapshot_count,
			data,
			access_hint,
			last_accessed_block,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn round_trip_inline() {
		let inode = Inode {
			name: "hello".to_string(),
			size: 5,
			kind: Kind::File,
			used: true,
			created: 100,
			modified: 200,
			parent: None,
			is_snapshot: false,
			snapshot_count: 0,
			data: InodeData::Inline(b"world".to_vec()),
			access_hint: 0,
			last_accessed_block: 0,
		};
		let bytes = inode.to_bytes().unwrap();
		let back = Inode::from_bytes(&bytes);
		assert_eq!(back.name, "hello");
		assert_eq!(back.size, 5);
		match back.data {
			InodeData::Inline(b) => assert_eq!(b, b"world"),
			_ => panic!("expected inline"),
		}
	}

	#[test]
	fn round_trip_block_mapped() {
		let inode = Inode {
			name: "big".to_string(),
			size: 5000,
			kind: Kind::File,
			used: true,
			created: 1,
			modified: 2,
			parent: Some(3),
			is_snapshot: true,
			snapshot_count: 0,
			data: InodeData::BlockMapped([7, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
			access_hint: 1,
			last_accessed_block: 7,
		};
		let bytes = inode.to_bytes().unwrap();
		let back = Inode::from_bytes(&bytes);
		assert_eq!(back.parent, Some(3));
		assert!(back.is_snapshot);
		assert_eq!(back.data.blocks()[0], 7);
		assert_eq!(back.data.blocks()[1], 8);
	}

	#[test]
	fn name_too_long_rejected() {
		let inode = Inode {
			name: "x".repeat(300),
			..Inode::empty()
		};
		assert!(matches!(inode.to_bytes(), Err(Error::NameTooLong)));
	}
}
