use parking_lot::Mutex;

use super::{InternedName, NameCache, NameId, SegmentedLru};

/// Name cache split into independent shards, each a [`SegmentedLru`] behind its own mutex.
/// Two ids in different shards never contend.
pub struct ShardedNameCache {
	shards: Box<[Mutex<SegmentedLru<NameId, InternedName>>]>,
	mask: usize,
}

impl ShardedNameCache {
	/// `shards` is rounded up to the next power of two
	#[must_use]
	pub fn new(shards: usize, shard_capacity: usize, protected_percent: u8) -> Self {
		let shards = shards.max(1).next_power_of_two();

		Self {
			shards: (0..shards)
				.map(|_| Mutex::new(SegmentedLru::new(shard_capacity, protected_percent)))
				.collect(),
			mask: shards - 1,
		}
	}

	#[must_use]
	pub fn shard_count(&self) -> usize {
		self.shards.len()
	}

	/// Ids are handed out sequentially, so a plain modulo would put runs of neighbours
	/// in neighbouring shards. Mix the bits first.
	pub(crate) fn shard_index(&self, id: NameId) -> usize {
		let mut hash = id.get().wrapping_mul(0x9E37_79B9);
		hash ^= hash >> 16;
		hash as usize & self.mask
	}

	fn shard(&self, id: NameId) -> &Mutex<SegmentedLru<NameId, InternedName>> {
		&self.shards[self.shard_index(id)]
	}
}

impl NameCache for ShardedNameCache {
	fn get(&self, id: NameId) -> Option<InternedName> {
		self.shard(id).lock().get(&id)
	}

	fn put(&self, id: NameId, name: InternedName) {
		self.shard(id).lock().put(id, name);
	}

	fn clear(&self) {
		for shard in self.shards.iter() {
			shard.lock().clear();
		}
	}

	fn len(&self) -> usize {
		self.shards.iter().map(|shard| shard.lock().len()).sum()
	}
}
