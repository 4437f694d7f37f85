//! Core engine for a single-file block-structured filesystem: superblock, bitmap allocator,
//! inode table, pinned LRU inode cache, file engine and snapshot engine.
//!
//! A [`Session`] is the single mount-session value the spec's Design Notes (§9) call for: it
//! owns the backing file handle, the bitmaps, the cache and the snapshot table, and every public
//! operation is a method on it. There is no process-wide mutable state, unlike the source this
//! was distilled from.

pub mod bitmap;
pub mod cache;
pub mod device;
pub mod error;
pub mod file;
pub mod inode;
pub mod mount;
pub mod snapshot;
pub mod superblock;

use bitmap::Bitmap;
use cache::Cache;
use device::BlockDevice;
use error::Result;
use inode::{Inode, INODE_RECORD_SIZE};
use snapshot::SnapshotEntry;
use superblock::Superblock;

/// Maximum number of snapshot table entries.
pub const MAX_SNAPSHOTS: usize = 32;

/// An open mount session: one backing file, its metadata, and a live inode cache.
///
/// Every public filesystem operation takes `&mut Session`. Dropping the session closes the
/// backing file; nothing about the cache survives past that point, matching the spec's "the
/// cache is live only within a single session".
pub struct Session {
	dev: BlockDevice,
	sb: Superblock,
	block_bitmap: Bitmap,
	inode_bitmap: Bitmap,
	cache: Cache,
	/// Only the first `sb.snapshot_count` entries are meaningful.
	snapshots: Vec<SnapshotEntry>,
}

impl Session {
	/// Byte offset of inode `index`'s record within the inode table.
	fn inode_offset(&self, index: u32) -> u64 {
		self.sb.inode_table_offset() + index as u64 * INODE_RECORD_SIZE as u64
	}

	/// Reads inode `index` from the cache, falling back to disk on a miss.
	pub(crate) fn read_inode(&mut self, index: u32) -> Result<Inode> {
		if let Some(cached) = self.cache.get(index) {
			return Ok(cached);
		}
		let mut buf = [0u8; INODE_RECORD_SIZE];
		let offset = self.inode_offset(index);
		self.dev.read_at(offset, &mut buf)?;
		let inode = Inode::from_bytes(&buf);
		// A cold read is cached unpinned, per the cache's `get` contract.
		if let Err(e) = self.cache.put(index, inode.clone(), false) {
			eprintln!("imgfs: {e}");
		}
		Ok(inode)
	}

	/// Writes inode `index` to disk, then updates the cache (write-through: disk first).
	pub(crate) fn write_inode(&mut self, index: u32, inode: &Inode, pinned: bool) -> Result<()> {
		let bytes = inode.to_bytes()?;
		let offset = self.inode_offset(index);
		self.dev.write_at(offset, &bytes)?;
		if let Err(e) = self.cache.put(index, inode.clone(), pinned) {
			eprintln!("imgfs: {e}");
		}
		Ok(())
	}

	/// Re-persists the superblock. Called at the end of every mutating operation, since the
	/// bitmaps already persist byte-by-byte as they're touched but the free-space counters in
	/// the superblock only change in memory until this is called.
	pub(crate) fn save_superblock(&mut self) -> Result<()> {
		self.sb.write(&mut self.dev)
	}

	/// Linear scan of used, non-snapshot inodes for `name`, warm-started at the free-inode hint
	/// and wrapping, matching the source's `find_inode`. Snapshot inodes are never matched here:
	/// they keep the name of the file they were taken from, but are only reachable by snapshot
	/// name through the snapshot table.
	pub(crate) fn find_inode(&mut self, name: &str) -> Result<u32> {
		let hint = self.sb.free_inode_hint.min(self.sb.inode_count.max(1));
		let scan = (hint..self.sb.inode_count).chain(0..hint.min(self.sb.inode_count));
		for i in scan {
			if !self.inode_bitmap.is_set(i) {
				continue;
			}
			let inode = self.read_inode(i)?;
			if inode.used && !inode.is_snapshot && inode.name == name {
				return Ok(i);
			}
		}
		Err(error::Error::NotFound(name.to_string()))
	}

	/// Returns `(index, inode)` for every used inode, including the root and any snapshot
	/// inodes, ordered by inode index. Callers that want only user-visible files (e.g. the
	/// `list` CLI command) filter those out themselves.
	pub fn list_files(&mut self) -> Result<Vec<(u32, Inode)>> {
		let mut out = Vec::new();
		for i in 0..self.sb.inode_count {
			if !self.inode_bitmap.is_set(i) {
				continue;
			}
			let inode = self.read_inode(i)?;
			if inode.used {
				out.push((i, inode));
			}
		}
		Ok(out)
	}

	/// Returns a snapshot of the current superblock (counters, geometry).
	pub fn info(&self) -> Superblock {
		self.sb
	}

	/// Returns the live snapshot table entries.
	pub fn snapshots(&self) -> &[SnapshotEntry] {
		&self.snapshots[..self.sb.snapshot_count as usize]
	}
}
