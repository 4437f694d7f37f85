//! Format and mount: building a fresh image's on-disk layout, and loading an existing one back
//! into a [`Session`].
//!
//! Grounded in `asfs.c`'s `format_disk`/`load_metadata`, restructured the way `ext2.rs`'s
//! `Ext2Factory::create` builds a fresh filesystem image field by field before handing back a
//! ready-to-use handle.

use crate::bitmap::Bitmap;
use crate::cache::Cache;
use crate::device::BlockDevice;
use crate::error::Result;
use crate::inode::{Inode, InodeData, Kind, INODE_RECORD_SIZE};
use crate::snapshot::{SnapshotEntry, SNAPSHOT_ENTRY_SIZE};
use crate::superblock::Superblock;
use crate::{Session, MAX_SNAPSHOTS};
use std::path::Path;

/// Current time as seconds since the Unix epoch, truncated to `u32` (matching the inode
/// record's compact timestamp fields).
pub(crate) fn now() -> u32 {
	utils::util::get_timestamp().as_secs() as u32
}

fn empty_snapshot_table() -> Vec<SnapshotEntry> {
	(0..MAX_SNAPSHOTS)
		.map(|_| SnapshotEntry {
			name: String::new(),
			original_inode: 0,
			snapshot_inode: 0,
			timestamp: 0,
		})
		.collect()
}

impl Session {
	/// Lays out a fresh image at `path`: superblock, block/inode bitmaps, a zeroed inode table,
	/// an empty snapshot table, and a root directory inode. `zero_fill` additionally zeroes the
	/// whole data region up front (the image is already zero from [`BlockDevice::create`]'s
	/// `set_len`, so this is mostly for images reformatted over an existing file).
	pub fn format(path: &Path, size_bytes: u64, block_size: u32, zero_fill: bool, cache_capacity: u32) -> Result<Self> {
		let mut dev = BlockDevice::create(path, size_bytes)?;
		let sb = Superblock::new(size_bytes, block_size, cache_capacity);

		if zero_fill {
			let zeros = vec![0u8; block_size as usize];
			for b in 0..sb.total_blocks {
				dev.write_at(b as u64 * block_size as u64, &zeros)?;
			}
		}

		let mut block_bitmap = Bitmap::new_clear(sb.bitmap_block as u64 * block_size as u64, sb.total_blocks);
		block_bitmap.reserve_range(&mut dev, 0, sb.first_data_block)?;

		let mut inode_bitmap = Bitmap::new_clear(sb.inode_bitmap_block as u64 * block_size as u64, sb.inode_count);
		inode_bitmap.write_all(&mut dev)?;

		let table_offset = sb.inode_table_offset();
		let table_bytes = vec![0u8; sb.inode_count as usize * INODE_RECORD_SIZE];
		dev.write_at(table_offset, &table_bytes)?;

		let snap_table_offset = sb.snapshot_table_offset();
		let snap_table_bytes = vec![0u8; SNAPSHOT_ENTRY_SIZE * MAX_SNAPSHOTS];
		dev.write_at(snap_table_offset, &snap_table_bytes)?;

		inode_bitmap.set(&mut dev, sb.root_inode)?;
		let root = Inode {
			name: "/".to_string(),
			size: 0,
			kind: Kind::Directory,
			used: true,
			created: now(),
			modified: now(),
			parent: None,
			is_snapshot: false,
			snapshot_count: 0,
			data: InodeData::Inline(Vec::new()),
			access_hint: 0,
			last_accessed_block: 0,
		};
		let root_bytes = root.to_bytes()?;
		dev.write_at(table_offset, &root_bytes)?;

		sb.write(&mut dev)?;
		dev.flush()?;

		Ok(Self {
			dev,
			sb,
			block_bitmap,
			inode_bitmap,
			cache: Cache::new(cache_capacity as usize),
			snapshots: empty_snapshot_table(),
		})
	}

	/// Opens an existing image and loads its metadata into a live session. `cache_capacity`
	/// overrides the capacity recorded in the superblock at format time, if given.
	pub fn mount(path: &Path, cache_capacity: Option<u32>) -> Result<Self> {
		let mut dev = BlockDevice::open(path)?;
		let sb = Superblock::read(&mut dev)?;

		let block_bitmap = Bitmap::load(&mut dev, sb.bitmap_block as u64 * sb.block_size as u64, sb.total_blocks)?;
		let inode_bitmap = Bitmap::load(&mut dev, sb.inode_bitmap_block as u64 * sb.block_size as u64, sb.inode_count)?;

		let capacity = cache_capacity.unwrap_or(sb.cache_capacity);
		let root_index = sb.root_inode;
		let mut session = Self {
			dev,
			sb,
			block_bitmap,
			inode_bitmap,
			cache: Cache::new(capacity as usize),
			snapshots: Vec::new(),
		};
		session.load_snapshot_table()?;

		// Warm the cache with the root inode, pinned so it's never evicted mid-session.
		let root = session.read_inode(root_index)?;
		if let Err(e) = session.cache.put(root_index, root, true) {
			eprintln!("imgfs: {e}");
		}

		Ok(session)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::NamedTempFile;

	fn scratch_path() -> NamedTempFile {
		NamedTempFile::new().unwrap()
	}

	#[test]
	fn format_then_mount_round_trips_geometry() {
		let f = scratch_path();
		let session = Session::format(f.path(), 1024 * 1024, 4096, false, 64).unwrap();
		let sb = session.info();
		assert_eq!(sb.total_blocks, 256);
		assert_eq!(sb.inode_count, 16);
		drop(session);

		let mut mounted = Session::mount(f.path(), None).unwrap();
		assert_eq!(mounted.info().total_blocks, 256);
		let files = mounted.list_files().unwrap();
		// The root directory is used but has no name matching user-visible files.
		assert_eq!(files.len(), 1);
	}

	#[test]
	fn mount_rejects_bad_magic() {
		let f = scratch_path();
		std::fs::write(f.path(), vec![0u8; 4096]).unwrap();
		assert!(Session::mount(f.path(), None).is_err());
	}
}
