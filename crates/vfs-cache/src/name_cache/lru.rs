use std::{
	collections::{BTreeMap, HashMap},
	hash::Hash,
};

/// One generation of the segmented LRU. Recency is a monotonic tick, the oldest tick is
/// the least recently used key.
#[derive(Debug)]
struct Generation<K, V> {
	capacity: usize,
	slots: HashMap<K, (V, u64)>,
	recency: BTreeMap<u64, K>,
}

impl<K: Hash + Eq + Clone, V> Generation<K, V> {
	fn new(capacity: usize) -> Self {
		Self {
			capacity,
			slots: HashMap::new(),
			recency: BTreeMap::new(),
		}
	}

	fn len(&self) -> usize {
		self.slots.len()
	}

	fn contains(&self, key: &K) -> bool {
		self.slots.contains_key(key)
	}

	fn touch(&mut self, key: &K, tick: u64) -> Option<&V> {
		let (value, last_used) = self.slots.get_mut(key)?;
		self.recency.remove(last_used);
		*last_used = tick;
		self.recency.insert(tick, key.clone());
		Some(value)
	}

	fn replace(&mut self, key: &K, new_value: V, tick: u64) -> bool {
		match self.slots.get_mut(key) {
			Some((value, last_used)) => {
				*value = new_value;
				self.recency.remove(last_used);
				*last_used = tick;
				self.recency.insert(tick, key.clone());
				true
			}
			None => false,
		}
	}

	fn remove(&mut self, key: &K) -> Option<V> {
		let (value, last_used) = self.slots.remove(key)?;
		self.recency.remove(&last_used);
		Some(value)
	}

	fn pop_least_recent(&mut self) -> Option<(K, V)> {
		let (_, key) = self.recency.pop_first()?;
		self.slots.remove(&key).map(|(value, _)| (key, value))
	}

	/// Inserts a new key, returning whatever had to leave to make room for it
	fn insert(&mut self, key: K, value: V, tick: u64) -> Option<(K, V)> {
		let evicted = if self.slots.len() >= self.capacity {
			self.pop_least_recent()
		} else {
			None
		};

		self.recency.insert(tick, key.clone());
		self.slots.insert(key, (value, tick));

		evicted
	}

	fn clear(&mut self) {
		self.slots.clear();
		self.recency.clear();
	}
}

/// Segmented LRU: new keys land in a small probation generation, a second hit promotes them
/// to the protected generation. Keys evicted from protected are demoted back to probation
/// instead of being dropped, so only keys that go cold twice leave the cache.
///
/// Not synchronized, wrap it in a lock to share it (see [`super::ShardedNameCache`]).
#[derive(Debug)]
pub struct SegmentedLru<K, V> {
	probation: Generation<K, V>,
	protected: Generation<K, V>,
	tick: u64,
}

impl<K: Hash + Eq + Clone, V: Clone> SegmentedLru<K, V> {
	/// `protected_percent` of `capacity` goes to the protected generation, the rest to probation.
	/// Each generation holds at least one key.
	#[must_use]
	pub fn new(capacity: usize, protected_percent: u8) -> Self {
		let capacity = capacity.max(2);
		let protected = (capacity * usize::from(protected_percent.min(100)) / 100)
			.clamp(1, capacity - 1);

		Self {
			probation: Generation::new(capacity - protected),
			protected: Generation::new(protected),
			tick: 0,
		}
	}

	fn next_tick(&mut self) -> u64 {
		self.tick += 1;
		self.tick
	}

	pub fn get(&mut self, key: &K) -> Option<V> {
		let tick = self.next_tick();

		if let Some(value) = self.protected.touch(key, tick) {
			return Some(value.clone());
		}

		let value = self.probation.remove(key)?;

		if let Some((demoted_key, demoted_value)) =
			self.protected.insert(key.clone(), value.clone(), tick)
		{
			let tick = self.next_tick();
			// whatever falls out of probation now is gone for good
			self.probation.insert(demoted_key, demoted_value, tick);
		}

		Some(value)
	}

	/// Inserts or replaces a value. A fresh key starts on probation.
	pub fn put(&mut self, key: K, value: V) {
		let tick = self.next_tick();

		if self.protected.contains(&key) {
			self.protected.replace(&key, value, tick);
		} else if !self.probation.replace(&key, value.clone(), tick) {
			self.probation.insert(key, value, tick);
		}
	}

	pub fn remove(&mut self, key: &K) -> Option<V> {
		self.protected
			.remove(key)
			.or_else(|| self.probation.remove(key))
	}

	#[must_use]
	pub fn contains(&self, key: &K) -> bool {
		self.protected.contains(key) || self.probation.contains(key)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.protected.len() + self.probation.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.protected.capacity + self.probation.capacity
	}

	pub fn clear(&mut self) {
		self.protected.clear();
		self.probation.clear();
	}

	pub fn is_protected(&self, key: &K) -> bool {
		self.protected.contains(key)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_capacity_split() {
		let lru = SegmentedLru::<u32, u32>::new(9, 66);
		assert_eq!(lru.protected.capacity, 5);
		assert_eq!(lru.probation.capacity, 4);
		assert_eq!(lru.capacity(), 9);

		// degenerate splits still leave room in both generations
		let lru = SegmentedLru::<u32, u32>::new(2, 100);
		assert_eq!(lru.protected.capacity, 1);
		assert_eq!(lru.probation.capacity, 1);
	}

	#[test]
	fn test_second_hit_promotes() {
		let mut lru = SegmentedLru::new(6, 50);
		lru.put(1, "one");
		assert!(!lru.is_protected(&1));

		assert_eq!(lru.get(&1), Some("one"));
		assert!(lru.is_protected(&1));
	}

	#[test]
	fn test_probation_evicts_least_recent() {
		let mut lru = SegmentedLru::new(6, 50);
		for i in 0..4 {
			lru.put(i, i * 10);
		}

		// probation holds 3, so the first key is gone
		assert_eq!(lru.len(), 3);
		assert!(!lru.contains(&0));
		assert_eq!(lru.get(&3), Some(30));
	}

	#[test]
	fn test_protected_eviction_demotes() {
		let mut lru = SegmentedLru::new(4, 50);
		lru.put(1, 'a');
		lru.put(2, 'b');
		assert_eq!(lru.get(&1), Some('a'));
		assert_eq!(lru.get(&2), Some('b'));
		assert!(lru.is_protected(&1) && lru.is_protected(&2));

		lru.put(3, 'c');
		assert_eq!(lru.get(&3), Some('c'));

		// 1 was the coldest protected key, it got a second chance on probation
		assert!(lru.is_protected(&3));
		assert!(lru.contains(&1));
		assert!(!lru.is_protected(&1));
		assert_eq!(lru.len(), 3);
	}

	#[test]
	fn test_put_replaces_in_place() {
		let mut lru = SegmentedLru::new(4, 50);
		lru.put(1, 1);
		lru.get(&1);
		lru.put(1, 2);

		assert!(lru.is_protected(&1));
		assert_eq!(lru.get(&1), Some(2));
		assert_eq!(lru.len(), 1);
	}

	#[test]
	fn test_clear() {
		let mut lru = SegmentedLru::new(4, 50);
		lru.put(1, 1);
		lru.put(2, 2);
		lru.get(&2);
		lru.clear();

		assert!(lru.is_empty());
		assert_eq!(lru.get(&2), None);
	}
}
