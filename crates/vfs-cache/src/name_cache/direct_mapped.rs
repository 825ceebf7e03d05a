use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::{InternedName, NameCache, NameId};

struct Slot {
	id: NameId,
	name: InternedName,
}

/// Direct-mapped front for another [`NameCache`]: slot `id % len` remembers the last name
/// stored there. Writes are last-write-wins without any lock; a stale or overwritten slot only
/// costs a fallback to the inner cache, which stays authoritative.
pub struct DirectMappedCache<C> {
	slots: Box<[ArcSwapOption<Slot>]>,
	inner: C,
}

impl<C: NameCache> DirectMappedCache<C> {
	#[must_use]
	pub fn new(inner: C, slots: usize) -> Self {
		Self {
			slots: (0..slots.max(1)).map(|_| ArcSwapOption::empty()).collect(),
			inner,
		}
	}

	pub fn inner(&self) -> &C {
		&self.inner
	}

	fn slot(&self, id: NameId) -> &ArcSwapOption<Slot> {
		&self.slots[id.get() as usize % self.slots.len()]
	}

	fn remember(&self, id: NameId, name: InternedName) {
		self.slot(id).store(Some(Arc::new(Slot { id, name })));
	}

	pub(crate) fn fast_get(&self, id: NameId) -> Option<InternedName> {
		let guard = self.slot(id).load();

		(*guard)
			.as_ref()
			.filter(|slot| slot.id == id)
			.map(|slot| Arc::clone(&slot.name))
	}
}

impl<C: NameCache> NameCache for DirectMappedCache<C> {
	fn get(&self, id: NameId) -> Option<InternedName> {
		if let Some(name) = self.fast_get(id) {
			return Some(name);
		}

		let name = self.inner.get(id)?;
		self.remember(id, Arc::clone(&name));
		Some(name)
	}

	fn put(&self, id: NameId, name: InternedName) {
		self.inner.put(id, Arc::clone(&name));
		self.remember(id, name);
	}

	fn clear(&self) {
		self.inner.clear();
		for slot in self.slots.iter() {
			slot.store(None);
		}
	}

	fn len(&self) -> usize {
		self.inner.len()
	}
}
