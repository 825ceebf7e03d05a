use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::{Entry, FileId};

/// Id -> entry index. Holds entries weakly: an entry lives as long as its parent's
/// children snapshot (or the root table) references it.
#[derive(Default)]
pub(crate) struct EntryArena {
	entries: DashMap<FileId, Weak<Entry>>,
}

impl EntryArena {
	pub fn get(&self, id: FileId) -> Option<Arc<Entry>> {
		let entry = self.entries.get(&id)?.upgrade();

		if entry.is_none() {
			self.entries
				.remove_if(&id, |_, weak| weak.strong_count() == 0);
		}

		entry
	}

	pub fn insert(&self, entry: &Arc<Entry>) {
		self.entries.insert(entry.id(), Arc::downgrade(entry));
	}

	/// A still-valid entry registered under `id` that belongs to `parent`
	pub fn live_child_of(&self, id: FileId, parent: FileId) -> Option<Arc<Entry>> {
		self.get(id)
			.filter(|entry| entry.is_valid() && entry.parent_id() == Some(parent))
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Drops index slots whose entries are gone
	pub fn prune(&self) -> usize {
		let before = self.entries.len();
		self.entries.retain(|_, weak| weak.strong_count() > 0);
		before - self.entries.len()
	}
}

#[cfg(test)]
mod tests {
	use super::{super::EntryKind, *};
	use crate::{entry::EntryFlags, name_cache::NameId};

	fn entry(raw: u32, parent: Option<u32>) -> Arc<Entry> {
		Arc::new(Entry::new(
			FileId::new(raw).expect("non zero"),
			NameId::new(1).expect("non zero"),
			parent.and_then(FileId::new),
			EntryFlags::empty(),
			EntryKind::File,
			0,
		))
	}

	#[test]
	fn test_weak_slots_expire() {
		let arena = EntryArena::default();
		let kept = entry(1, None);
		arena.insert(&kept);
		arena.insert(&entry(2, None));

		assert!(arena.get(kept.id()).is_some());
		assert!(arena.get(FileId::new(2).expect("non zero")).is_none());
		assert_eq!(arena.len(), 1);
		assert_eq!(arena.prune(), 0);
	}

	#[test]
	fn test_live_child_of() {
		let arena = EntryArena::default();
		let child = entry(3, Some(1));
		arena.insert(&child);

		let one = FileId::new(1).expect("non zero");
		let two = FileId::new(2).expect("non zero");
		assert!(arena.live_child_of(child.id(), one).is_some());
		assert!(arena.live_child_of(child.id(), two).is_none());

		child.invalidate("gone", false);
		assert!(arena.live_child_of(child.id(), one).is_none());
	}
}
