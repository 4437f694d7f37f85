//! Bounded, pinned LRU cache for inode records, keyed by inode index.
//!
//! Per the spec's Design Notes (§9), the doubly-linked recency list is arena-backed: nodes live
//! in a slab (`Vec<Option<Entry>>`) and reference each other by index, never by pointer, which
//! sidesteps the raw back/forward pointer cycles the source's C implementation would have used.
//! A `HashMap<u32, usize>` gives O(1) lookup from inode index to slab slot.

use crate::error::{Error, Result};
use crate::inode::Inode;
use std::collections::HashMap;

struct Entry {
	inode_index: u32,
	record: Inode,
	pinned: bool,
	prev: Option<usize>,
	next: Option<usize>,
}

/// A bounded, write-through LRU cache of inode records.
pub struct Cache {
	capacity: usize,
	slab: Vec<Option<Entry>>,
	free_slots: Vec<usize>,
	index: HashMap<u32, usize>,
	/// Most-recently-used slot.
	head: Option<usize>,
	/// Least-recently-used slot; first eviction candidate.
	tail: Option<usize>,
}

impl Cache {
	/// Creates a cache of the given capacity. Capacity `0` disables caching entirely: every
	/// [`Self::get`] is a miss and every [`Self::put`] is a no-op success.
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			slab: Vec::new(),
			free_slots: Vec::new(),
			index: HashMap::new(),
			head: None,
			tail: None,
		}
	}

	fn unlink(&mut self, slot: usize) {
		let (prev, next) = {
			let e = self.slab[slot].as_ref().unwrap();
			(e.prev, e.next)
		};
		match prev {
			Some(p) => self.slab[p].as_mut().unwrap().next = next,
			None => self.head = next,
		}
		match next {
			Some(n) => self.slab[n].as_mut().unwrap().prev = prev,
			None => self.tail = prev,
		}
	}

	fn push_front(&mut self, slot: usize) {
		let old_head = self.head;
		{
			let e = self.slab[slot].as_mut().unwrap();
			e.prev = None;
			e.next = old_head;
		}
		if let Some(h) = old_head {
			self.slab[h].as_mut().unwrap().prev = Some(slot);
		}
		self.head = Some(slot);
		if self.tail.is_none() {
			self.tail = Some(slot);
		}
	}

	fn promote(&mut self, slot: usize) {
		if self.head == Some(slot) {
			return;
		}
		self.unlink(slot);
		self.push_front(slot);
	}

	/// Looks up `inode_index`, promoting it to most-recent on a hit.
	pub fn get(&mut self, inode_index: u32) -> Option<Inode> {
		if self.capacity == 0 {
			return None;
		}
		let slot = *self.index.get(&inode_index)?;
		self.promote(slot);
		Some(self.slab[slot].as_ref().unwrap().record.clone())
	}

	/// Inserts or overwrites the cached record for `inode_index`, promoting it to most-recent.
	///
	/// If the cache is absent the entry and is at capacity, the least-recently-used unpinned
	/// entry is evicted to make room. If every entry is pinned, the insertion is rejected: the
	/// cache is left unchanged and [`Error::CacheOverflow`] is returned. The caller (the file
	/// and snapshot engines) treats that as a non-fatal, best-effort failure — the write-through
	/// disk copy is already durable by the time `put` is called.
	pub fn put(&mut self, inode_index: u32, record: Inode, pinned: bool) -> Result<()> {
		if self.capacity == 0 {
			return Ok(());
		}

		if let Some(&slot) = self.index.get(&inode_index) {
			{
				let e = self.slab[slot].as_mut().unwrap();
				e.record = record;
				e.pinned = pinned;
			}
			self.promote(slot);
			return Ok(());
		}

		if self.index.len() >= self.capacity && !self.evict_one() {
			// Every existing entry is pinned: refuse to grow rather than evict the entry
			// we're about to insert (which would make the insertion a no-op).
			eprintln!("imgfs: cache overflow, all {} entries pinned", self.capacity);
			return Err(Error::CacheOverflow);
		}

		let slot = match self.free_slots.pop() {
			Some(s) => s,
			None => {
				self.slab.push(None);
				self.slab.len() - 1
			},
		};
		self.slab[slot] = Some(Entry {
			inode_index,
			record,
			pinned,
			prev: None,
			next: None,
		});
		self.push_front(slot);
		self.index.insert(inode_index, slot);
		Ok(())
	}

	/// Removes the least-recently-used unpinned entry, if any. Returns whether one was evicted.
	fn evict_one(&mut self) -> bool {
		let mut cur = self.tail;
		while let Some(slot) = cur {
			let (pinned, prev) = {
				let e = self.slab[slot].as_ref().unwrap();
				(e.pinned, e.prev)
			};
			if !pinned {
				self.remove_slot(slot);
				return true;
			}
			cur = prev;
		}
		false
	}

	fn remove_slot(&mut self, slot: usize) {
		self.unlink(slot);
		let inode_index = self.slab[slot].as_ref().unwrap().inode_index;
		self.index.remove(&inode_index);
		self.slab[slot] = None;
		self.free_slots.push(slot);
	}

	/// Number of entries currently cached.
	pub fn len(&self) -> usize {
		self.index.len()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::inode::Inode;

	fn rec() -> Inode {
		Inode::empty()
	}

	#[test]
	fn lru_evicts_first_inserted() {
		let mut cache = Cache::new(2);
		cache.put(1, rec(), false).unwrap();
		cache.put(2, rec(), false).unwrap();
		cache.put(3, rec(), false).unwrap();

		assert!(cache.get(1).is_none());
		assert!(cache.get(2).is_some());
		assert!(cache.get(3).is_some());
	}

	#[test]
	fn get_promotes_to_most_recent() {
		let mut cache = Cache::new(2);
		cache.put(1, rec(), false).unwrap();
		cache.put(2, rec(), false).unwrap();
		// Touch 1 so 2 becomes the LRU victim.
		cache.get(1);
		cache.put(3, rec(), false).unwrap();

		assert!(cache.get(2).is_none());
		assert!(cache.get(1).is_some());
		assert!(cache.get(3).is_some());
	}

	#[test]
	fn pin_respected_on_overflow() {
		let mut cache = Cache::new(2);
		cache.put(1, rec(), true).unwrap();
		cache.put(2, rec(), true).unwrap();

		let err = cache.put(3, rec(), false).unwrap_err();
		assert!(matches!(err, Error::CacheOverflow));
		assert_eq!(cache.len(), 2);
		assert!(cache.get(1).is_some());
		assert!(cache.get(2).is_some());
	}

	#[test]
	fn capacity_zero_disables_cache() {
		let mut cache = Cache::new(0);
		cache.put(1, rec(), false).unwrap();
		assert!(cache.get(1).is_none());
		assert_eq!(cache.len(), 0);
	}
}
