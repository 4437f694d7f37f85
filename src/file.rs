//! File engine: create, read, edit and delete operations on top of the inode/bitmap/cache
//! layers.
//!
//! Grounded in `asfs.c`'s `create_file`/`print_file_content`/`edit_file`/`delete_file`, each
//! turned into a `Result`-returning [`Session`] method.

use crate::error::{Error, Result};
use crate::inode::{Inode, InodeData, Kind, INLINE_THRESHOLD, MAX_NAME_LEN};
use crate::mount::now;
use crate::Session;

impl Session {
	fn name_in_use(&mut self, name: &str) -> Result<bool> {
		match self.find_inode(name) {
			Ok(_) => Ok(true),
			Err(Error::NotFound(_)) => Ok(false),
			Err(e) => Err(e),
		}
	}

	fn alloc_blocks_for(&mut self, bytes: &[u8]) -> Result<[u32; 12]> {
		let needed = Inode::blocks_for_size(bytes.len() as u32, self.sb.block_size).min(12);
		let mut blocks = [0u32; 12];
		for slot in blocks.iter_mut().take(needed as usize) {
			match self.block_bitmap.alloc_block(&mut self.dev, self.sb.first_data_block, self.sb.total_blocks) {
				Ok(b) => *slot = b,
				Err(e) => {
					self.block_bitmap.free_blocks(&mut self.dev, &blocks)?;
					return Err(e);
				},
			}
		}
		for (i, chunk) in bytes.chunks(self.sb.block_size as usize).enumerate() {
			let mut buf = vec![0u8; self.sb.block_size as usize];
			buf[..chunk.len()].copy_from_slice(chunk);
			self.dev.write_at(blocks[i] as u64 * self.sb.block_size as u64, &buf)?;
		}
		self.sb.free_blocks -= needed;
		Ok(blocks)
	}

	/// Creates a new regular file named `name` holding `bytes`. Payloads up to
	/// [`INLINE_THRESHOLD`] bytes are stored inline in the inode; larger payloads are spread
	/// across up to 12 direct blocks.
	pub fn create(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
		if name.len() > MAX_NAME_LEN {
			return Err(Error::NameTooLong);
		}
		if self.name_in_use(name)? {
			return Err(Error::NameExists(name.to_string()));
		}

		let (index, hint) = self.inode_bitmap.alloc_inode(&mut self.dev, self.sb.free_inode_hint, self.sb.inode_count)?;
		self.sb.free_inode_hint = hint;
		self.sb.free_inodes -= 1;

		let data = if bytes.len() as u32 <= INLINE_THRESHOLD {
			InodeData::Inline(bytes.to_vec())
		} else {
			match self.alloc_blocks_for(bytes) {
				Ok(blocks) => InodeData::BlockMapped(blocks),
				Err(e) => {
					self.inode_bitmap.clear(&mut self.dev, index)?;
					self.sb.free_inodes += 1;
					self.save_superblock()?;
					return Err(e);
				},
			}
		};

		let inode = Inode {
			name: name.to_string(),
			size: bytes.len() as u32,
			kind: Kind::File,
			used: true,
			created: now(),
			modified: now(),
			parent: None,
			is_snapshot: false,
			snapshot_count: 0,
			data,
			access_hint: 0,
			last_accessed_block: 0,
		};
		self.write_inode(index, &inode, true)?;
		self.save_superblock()
	}

	/// Returns the full contents of file `name`.
	pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
		let index = self.find_inode(name)?;
		let inode = self.read_inode(index)?;
		match &inode.data {
			InodeData::Inline(bytes) => Ok(bytes.clone()),
			InodeData::BlockMapped(blocks) => {
				let block_count = Inode::blocks_for_size(inode.size, self.sb.block_size);
				let mut out = Vec::with_capacity(inode.size as usize);
				for &b in blocks.iter().take(block_count as usize) {
					let mut buf = vec![0u8; self.sb.block_size as usize];
					self.dev.read_at(b as u64 * self.sb.block_size as u64, &mut buf)?;
					out.extend_from_slice(&buf);
				}
				out.truncate(inode.size as usize);
				Ok(out)
			},
		}
	}

	/// Replaces file `name`'s contents with `bytes`, converting between inline and block-mapped
	/// storage as the new size crosses [`INLINE_THRESHOLD`] in either direction. Old blocks are
	/// freed only after the new storage is successfully written.
	pub fn edit(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
		let index = self.find_inode(name)?;
		let old = self.read_inode(index)?;

		let new_data = if bytes.len() as u32 <= INLINE_THRESHOLD {
			InodeData::Inline(bytes.to_vec())
		} else {
			match self.alloc_blocks_for(bytes) {
				Ok(blocks) => InodeData::BlockMapped(blocks),
				Err(e) => return Err(e),
			}
		};

		if let InodeData::BlockMapped(old_blocks) = &old.data {
			let old_count = Inode::blocks_for_size(old.size, self.sb.block_size);
			let freed = self.block_bitmap.free_blocks(&mut self.dev, &old_blocks[..old_count as usize])?;
			self.sb.free_blocks += freed;
		}

		let mut updated = old;
		updated.size = bytes.len() as u32;
		updated.modified = now();
		updated.data = new_data;
		self.write_inode(index, &updated, false)?;
		self.save_superblock()
	}

	/// Deletes file `name`, freeing its inode and any data blocks it owns. Any snapshots taken
	/// of `name` are unaffected: snapshot inodes own their own deep-copied blocks, so they stay
	/// independently readable and restorable after the original is gone.
	pub fn delete(&mut self, name: &str) -> Result<()> {
		let index = self.find_inode(name)?;
		let inode = self.read_inode(index)?;

		if let InodeData::BlockMapped(blocks) = &inode.data {
			let count = Inode::blocks_for_size(inode.size, self.sb.block_size);
			let freed = self.block_bitmap.free_blocks(&mut self.dev, &blocks[..count as usize])?;
			self.sb.free_blocks += freed;
		}

		self.inode_bitmap.clear(&mut self.dev, index)?;
		self.sb.free_inodes += 1;
		self.write_inode(index, &Inode::empty(), false)?;
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
	fn create_and_read_inline() {
		let (_f, mut session) = fresh_session();
		session.create("hello.txt", b"hello world").unwrap();
		assert_eq!(session.read("hello.txt").unwrap(), b"hello world");
	}

	#[test]
	fn create_duplicate_name_rejected() {
		let (_f, mut session) = fresh_session();
		session.create("a.txt", b"one").unwrap();
		assert!(matches!(session.create("a.txt", b"two"), Err(Error::NameExists(_))));
	}

	#[test]
	fn create_and_read_block_mapped() {
		let (_f, mut session) = fresh_session();
		let payload = vec![0x42u8; 1000];
		session.create("big.bin", &payload).unwrap();
		assert_eq!(session.read("big.bin").unwrap(), payload);
	}

	#[test]
	fn edit_crosses_inline_to_block_mapped_threshold() {
		let (_f, mut session) = fresh_session();
		session.create("grow.txt", b"small").unwrap();
		let big = vec![0x7a; 2000];
		session.edit("grow.txt", &big).unwrap();
		assert_eq!(session.read("grow.txt").unwrap(), big);

		session.edit("grow.txt", b"shrunk").unwrap();
		assert_eq!(session.read("grow.txt").unwrap(), b"shrunk");
	}

	#[test]
	fn delete_frees_blocks_for_reuse() {
		let (_f, mut session) = fresh_session();
		let free_before = session.info().free_blocks;
		session.create("big.bin", &vec![1u8; 5000]).unwrap();
		assert!(session.info().free_blocks < free_before);
		session.delete("big.bin").unwrap();
		assert_eq!(session.info().free_blocks, free_before);
	}

	#[test]
	fn read_missing_file_errors() {
		let (_f, mut session) = fresh_session();
		assert!(matches!(session.read("nope.txt"), Err(Error::NotFound(_))));
	}
}
