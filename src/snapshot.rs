//! Snapshot table and snapshot engine: clone a file's data into a new inode, and relink on
//! restore.
//!
//! Grounded in `asfs.c`'s `create_snapshot`/`restore_snapshot`/`delete_snapshot`, restructured
//! into `Result`-returning `Session` methods. Restore is deep-copy (§9's Open Questions
//! resolution): the source's shallow restore aliases the live file's blocks with the snapshot's,
//! which this rewrite avoids by always allocating fresh blocks for the live inode.

use crate::error::{Error, Result};
use crate::inode::{Inode, InodeData, MAX_NAME_LEN};
use crate::{Session, MAX_SNAPSHOTS};

/// Size of one on-disk snapshot table entry.
pub const SNAPSHOT_ENTRY_SIZE: usize = 240;
const NAME_FIELD: usize = 224;

/// One row of the snapshot table: the name, the inodes it links, and when it was taken.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
	pub name: String,
	pub original_inode: u32,
	pub snapshot_inode: u32,
	pub timestamp: u32,
}

impl SnapshotEntry {
	fn to_bytes(&self) -> [u8; SNAPSHOT_ENTRY_SIZE] {
		let mut buf = [0u8; SNAPSHOT_ENTRY_SIZE];
		let name_bytes = self.name.as_bytes();
		let len = name_bytes.len().min(NAME_FIELD - 1);
		buf[..len].copy_from_slice(&name_bytes[..len]);
		buf[NAME_FIELD..NAME_FIELD + 4].copy_from_slice(&self.original_inode.to_le_bytes());
		buf[NAME_FIELD + 4..NAME_FIELD + 8].copy_from_slice(&self.snapshot_inode.to_le_bytes());
		buf[NAME_FIELD + 8..NAME_FIELD + 12].copy_from_slice(&self.timestamp.to_le_bytes());
		buf
	}

	fn from_bytes(buf: &[u8]) -> Self {
		let end = buf[..NAME_FIELD].iter().position(|&b| b == 0).unwrap_or(NAME_FIELD);
		let name = String::from_utf8_lossy(&buf[..end]).into_owned();
		let original_inode = u32::from_le_bytes(buf[NAME_FIELD..NAME_FIELD + 4].try_into().unwrap());
		let snapshot_inode = u32::from_le_bytes(buf[NAME_FIELD + 4..NAME_FIELD + 8].try_into().unwrap());
		let timestamp = u32::from_le_bytes(buf[NAME_FIELD + 8..NAME_FIELD + 12].try_into().unwrap());
		Self {
			name,
			original_inode,
			snapshot_inode,
			timestamp,
		}
	}
}

impl Session {
	/// Reads the fixed-size snapshot table region into `self.snapshots` (all `MAX_SNAPSHOTS`
	/// slots; only the first `sb.snapshot_count` are meaningful).
	pub(crate) fn load_snapshot_table(&mut self) -> Result<()> {
		let offset = self.sb.snapshot_table_offset();
		let mut buf = vec![0u8; SNAPSHOT_ENTRY_SIZE * MAX_SNAPSHOTS];
		self.dev.read_at(offset, &mut buf)?;
		self.snapshots = (0..MAX_SNAPSHOTS)
			.map(|i| SnapshotEntry::from_bytes(&buf[i * SNAPSHOT_ENTRY_SIZE..(i + 1) * SNAPSHOT_ENTRY_SIZE]))
			.collect();
		Ok(())
	}

	/// Persists the whole snapshot table region.
	fn save_snapshot_table(&mut self) -> Result<()> {
		let offset = self.sb.snapshot_table_offset();
		let mut buf = vec![0u8; SNAPSHOT_ENTRY_SIZE * MAX_SNAPSHOTS];
		for (i, entry) in self.snapshots.iter().enumerate() {
			buf[i * SNAPSHOT_ENTRY_SIZE..(i + 1) * SNAPSHOT_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
		}
		self.dev.write_at(offset, &buf)
	}

	fn find_snapshot(&self, snap_name: &str) -> Result<usize> {
		self.snapshots[..self.sb.snapshot_count as usize]
			.iter()
			.position(|s| s.name == snap_name)
			.ok_or_else(|| Error::NotFound(snap_name.to_string()))
	}

	/// Copies `original`'s data blocks into a fresh set of blocks, returning the new list
	/// (always length `DIRECT_BLOCKS`, trailing zeros for unused slots). On allocation failure,
	/// any blocks already allocated for the copy are rolled back.
	fn copy_blocks(&mut self, blocks: &[u32; 12], count: u32) -> Result<[u32; 12]> {
		let mut copy = [0u32; 12];
		for i in 0..count as usize {
			let alloc = self.block_bitmap.alloc_block(&mut self.dev, self.sb.first_data_block, self.sb.total_blocks);
			let new_block = match alloc {
				Ok(b) => b,
				Err(e) => {
					self.block_bitmap.free_blocks(&mut self.dev, &copy)?;
					return Err(e);
				},
			};
			let mut buf = vec![0u8; self.sb.block_size as usize];
			if let Err(e) = self.dev.read_at(blocks[i] as u64 * self.sb.block_size as u64, &mut buf) {
				self.block_bitmap.free_blocks(&mut self.dev, &copy)?;
				self.block_bitmap.free_blocks(&mut self.dev, &[new_block])?;
				return Err(e);
			}
			if let Err(e) = self.dev.write_at(new_block as u64 * self.sb.block_size as u64, &buf) {
				self.block_bitmap.free_blocks(&mut self.dev, &copy)?;
				self.block_bitmap.free_blocks(&mut self.dev, &[new_block])?;
				return Err(e);
			}
			copy[i] = new_block;
		}
		Ok(copy)
	}

	/// Clones `file_name`'s current data and metadata into a new inode, recorded under
	/// `snap_name` in the snapshot table.
	pub fn create_snapshot(&mut self, file_name: &str, snap_name: &str) -> Result<()> {
		if snap_name.len() > MAX_NAME_LEN {
			return Err(Error::NameTooLong);
		}
		if self.sb.snapshot_count as usize >= MAX_SNAPSHOTS {
			return Err(Error::TooManySnapshots);
		}
		let orig_index = self.find_inode(file_name)?;
		let orig = self.read_inode(orig_index)?;

		let (snap_index, hint) = self.inode_bitmap.alloc_inode(&mut self.dev, self.sb.free_inode_hint, self.sb.inode_count)?;
		self.sb.free_inode_hint = hint;
		self.sb.free_inodes -= 1;

		let mut snap = orig.clone();
		snap.is_snapshot = true;
		snap.parent = Some(orig_index);
		snap.snapshot_count = 0;
		snap.modified = crate::mount::now();

		let block_count = Inode::blocks_for_size(orig.size, self.sb.block_size).min(12);
		if let InodeData::BlockMapped(blocks) = &orig.data {
			match self.copy_blocks(blocks, block_count) {
				Ok(new_blocks) => {
					self.sb.free_blocks -= block_count;
					snap.data = InodeData::BlockMapped(new_blocks);
				},
				Err(e) => {
					self.inode_bitmap.clear(&mut self.dev, snap_index)?;
					self.sb.free_inodes += 1;
					self.save_superblock()?;
					return Err(e);
				},
			}
		}

		self.write_inode(snap_index, &snap, false)?;

		let mut orig_updated = orig;
		orig_updated.snapshot_count += 1;
		self.write_inode(orig_index, &orig_updated, false)?;

		self.snapshots[self.sb.snapshot_count as usize] = SnapshotEntry {
			name: snap_name.to_string(),
			original_inode: orig_index,
			snapshot_inode: snap_index,
			timestamp: crate::mount::now(),
		};
		self.sb.snapshot_count += 1;
		self.save_snapshot_table()?;
		self.save_superblock()
	}

	/// Replaces `file_name`'s data with a deep copy of the snapshot `snap_name`'s data. The
	/// live file's previous blocks are freed only after the copy succeeds, so the snapshot and
	/// the restored file never end up sharing storage.
	pub fn restore_snapshot(&mut self, file_name: &str, snap_name: &str) -> Result<()> {
		let live_index = self.find_inode(file_name)?;
		let slot = self.find_snapshot(snap_name)?;
		let snap_inode_index = self.snapshots[slot].snapshot_inode;

		let snap = self.read_inode(snap_inode_index)?;
		let live = self.read_inode(live_index)?;

		let new_block_count = Inode::blocks_for_size(snap.size, self.sb.block_size).min(12);
		let new_blocks = match &snap.data {
			InodeData::BlockMapped(blocks) => {
				let copy = self.copy_blocks(blocks, new_block_count)?;
				self.sb.free_blocks -= new_block_count;
				Some(copy)
			},
			InodeData::Inline(_) => None,
		};

		let old_block_count = Inode::blocks_for_size(live.size, self.sb.block_size).min(12);
		let freed = self.block_bitmap.free_blocks(&mut self.dev, &live.data.blocks()[..old_block_count as usize])?;
		self.sb.free_blocks += freed;

		let mut updated = live;
		updated.size = snap.size;
		updated.modified = crate::mount::now();
		updated.data = match (new_blocks, &snap.data) {
			(Some(blocks), _) => InodeData::BlockMapped(blocks),
			(None, InodeData::Inline(bytes)) => InodeData::Inline(bytes.clone()),
			_ => unreachable!(),
		};
		self.write_inode(live_index, &updated, false)?;
		self.save_superblock()
	}

	/// Removes `snap_name` from the table, freeing its inode and data blocks, and decrements
	/// the original's snapshot count.
	pub fn delete_snapshot(&mut self, snap_name: &str) -> Result<()> {
		let slot = self.find_snapshot(snap_name)?;
		let entry = self.snapshots[slot].clone();

		let snap_inode = self.read_inode(entry.snapshot_inode)?;
		let block_count = Inode::blocks_for_size(snap_inode.size, self.sb.block_size).min(12);
		let freed = self.block_bitmap.free_blocks(&mut self.dev, &snap_inode.data.blocks()[..block_count as usize])?;
		self.sb.free_blocks += freed;

		self.inode_bitmap.clear(&mut self.dev, entry.snapshot_inode)?;
		self.sb.free_inodes += 1;

		if let Ok(mut orig) = self.read_inode(entry.original_inode) {
			if orig.snapshot_count > 0 {
				orig.snapshot_count -= 1;
			}
			self.write_inode(entry.original_inode, &orig, false)?;
		}

		let count = self.sb.snapshot_count as usize;
		for i in slot..count - 1 {
			self.snapshots[i] = self.snapshots[i + 1].clone();
		}
		self.sb.snapshot_count -= 1;
		self.save_snapshot_table()?;
		self.save_superblock()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use tempfile::NamedTempFile;

	fn fresh_session() -> (NamedTempFile, Session) {
		let f = NamedTempFile::new().unwrap();
		let session = Session::format(f.path(), 1024 * 1024, 4096, false, 64).unwrap();
		(f, session)
	}

	#[test]
	fn create_and_restore_round_trips_original_bytes() {
		let (_f, mut session) = fresh_session();
		session.create("a.txt", b"version one").unwrap();
		session.create_snapshot("a.txt", "v1").unwrap();
		session.edit("a.txt", b"version two, much longer now").unwrap();
		assert_eq!(session.read("a.txt").unwrap(), b"version two, much longer now");

		session.restore_snapshot("a.txt", "v1").unwrap();
		assert_eq!(session.read("a.txt").unwrap(), b"version one");
	}

	#[test]
	fn restore_does_not_alias_snapshot_blocks() {
		let (_f, mut session) = fresh_session();
		let original = vec![1u8; 3000];
		session.create("big.bin", &original).unwrap();
		session.create_snapshot("big.bin", "v1").unwrap();

		session.restore_snapshot("big.bin", "v1").unwrap();
		session.edit("big.bin", &vec![2u8; 3000]).unwrap();

		// The snapshot's own data must be untouched by edits made after restore.
		let snap_index = session.snapshots()[0].snapshot_inode;
		let snap_inode = session.read_inode(snap_index).unwrap();
		match snap_inode.data {
			InodeData::BlockMapped(_) => {},
			_ => panic!("expected block-mapped snapshot"),
		}
		assert_eq!(session.read("big.bin").unwrap(), vec![2u8; 3000]);
	}

	#[test]
	fn delete_snapshot_compacts_table_and_frees_inode() {
		let (_f, mut session) = fresh_session();
		session.create("a.txt", b"data").unwrap();
		session.create_snapshot("a.txt", "v1").unwrap();
		session.create_snapshot("a.txt", "v2").unwrap();
		assert_eq!(session.snapshots().len(), 2);

		session.delete_snapshot("v1").unwrap();
		assert_eq!(session.snapshots().len(), 1);
		assert_eq!(session.snapshots()[0].name, "v2");
		assert!(matches!(session.restore_snapshot("a.txt", "v1"), Err(Error::NotFound(_))));
	}

	#[test]
	fn deleting_the_original_leaves_its_snapshot_readable() {
		let (_f, mut session) = fresh_session();
		session.create("a.txt", b"data").unwrap();
		session.create_snapshot("a.txt", "v1").unwrap();

		session.delete("a.txt").unwrap();
		assert!(matches!(session.read("a.txt"), Err(Error::NotFound(_))));

		let snap_index = session.snapshots()[0].snapshot_inode;
		let snap_inode = session.read_inode(snap_index).unwrap();
		match snap_inode.data {
			InodeData::Inline(bytes) => assert_eq!(bytes, b"data"),
			_ => panic!("expected inline snapshot data"),
		}
	}
}
