//! A [`PersistentStore`] kept entirely in memory.
//!
//! Used by tests and by embedders that want to drive the cache without a real record store.
//! Every query is counted, so callers can assert exactly how often the cache went to the store.

use std::{
	collections::HashMap,
	sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;
use tracing::trace;

use crate::{
	directory::{names_equal, CaseSensitivity},
	entry::FileId,
	name_cache::NameId,
	store::{AttributeBits, ChildRecord, PersistentStore, StoreError},
};

/// How many times each store query ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
	pub find_child_record: u64,
	pub list_all_children: u64,
	pub attributes: u64,
	pub resolve_name_id: u64,
	pub resolve_name_text: u64,
}

impl StoreCallCounts {
	/// Queries that touch directory contents
	#[must_use]
	pub const fn child_queries(&self) -> u64 {
		self.find_child_record + self.list_all_children
	}
}

#[derive(Debug, Default)]
struct CallCounters {
	find_child_record: AtomicU64,
	list_all_children: AtomicU64,
	attributes: AtomicU64,
	resolve_name_id: AtomicU64,
	resolve_name_text: AtomicU64,
}

impl CallCounters {
	fn bump(counter: &AtomicU64) {
		counter.fetch_add(1, Ordering::Relaxed);
	}

	fn snapshot(&self) -> StoreCallCounts {
		StoreCallCounts {
			find_child_record: self.find_child_record.load(Ordering::Relaxed),
			list_all_children: self.list_all_children.load(Ordering::Relaxed),
			attributes: self.attributes.load(Ordering::Relaxed),
			resolve_name_id: self.resolve_name_id.load(Ordering::Relaxed),
			resolve_name_text: self.resolve_name_text.load(Ordering::Relaxed),
		}
	}

	fn reset(&self) {
		for counter in [
			&self.find_child_record,
			&self.list_all_children,
			&self.attributes,
			&self.resolve_name_id,
			&self.resolve_name_text,
		] {
			counter.store(0, Ordering::Relaxed);
		}
	}
}

#[derive(Debug)]
struct Record {
	parent: Option<FileId>,
	name_id: NameId,
	attributes: AttributeBits,
	deleted: bool,
	children: Vec<FileId>,
}

#[derive(Debug, Default)]
struct Inner {
	records: HashMap<FileId, Record>,
	/// Name text, indexed by `NameId - 1`
	names: Vec<Box<str>>,
	name_ids: HashMap<Box<str>, NameId>,
	last_id: u32,
}

impl Inner {
	fn intern(&mut self, name: &str) -> Result<NameId, StoreError> {
		if let Some(id) = self.name_ids.get(name) {
			return Ok(*id);
		}

		let id = u32::try_from(self.names.len() + 1)
			.ok()
			.and_then(NameId::new)
			.ok_or_else(|| StoreError::new("name id space exhausted"))?;

		self.names.push(name.into());
		self.name_ids.insert(name.into(), id);

		Ok(id)
	}

	fn name(&self, id: NameId) -> Option<&str> {
		self.names
			.get(id.get() as usize - 1)
			.map(AsRef::as_ref)
	}

	fn next_id(&mut self) -> Result<FileId, StoreError> {
		let id = self
			.last_id
			.checked_add(1)
			.and_then(FileId::new)
			.ok_or_else(|| StoreError::new("file id space exhausted"))?;
		self.last_id = id.get();

		Ok(id)
	}

	fn live(&self, id: FileId) -> Result<&Record, StoreError> {
		self.records
			.get(&id)
			.filter(|record| !record.deleted)
			.ok_or_else(|| StoreError::new(format!("unknown record <id='{id}'>")))
	}

	fn live_mut(&mut self, id: FileId) -> Result<&mut Record, StoreError> {
		self.records
			.get_mut(&id)
			.filter(|record| !record.deleted)
			.ok_or_else(|| StoreError::new(format!("unknown record <id='{id}'>")))
	}

	fn live_directory(&self, id: FileId) -> Result<&Record, StoreError> {
		let record = self.live(id)?;
		if record.attributes.is_directory() {
			Ok(record)
		} else {
			Err(StoreError::new(format!("record is not a directory <id='{id}'>")))
		}
	}

	/// Case-insensitive only when the directory says so, exact otherwise
	fn find_child(&self, parent: &Record, name: &str) -> Option<FileId> {
		let find = |case_sensitive| {
			parent.children.iter().copied().find(|child| {
				self.records
					.get(child)
					.and_then(|record| self.name(record.name_id))
					.is_some_and(|child_name| names_equal(child_name, name, case_sensitive))
			})
		};

		find(true).or_else(|| {
			matches!(
				CaseSensitivity::from_store(parent.attributes),
				CaseSensitivity::Insensitive
			)
			.then(|| find(false))
			.flatten()
		})
	}

	fn child_record(&self, id: FileId) -> Option<ChildRecord> {
		let record = self.records.get(&id).filter(|record| !record.deleted)?;

		Some(ChildRecord {
			id,
			name_id: record.name_id,
			attributes: record.attributes,
			known_empty: record.attributes.is_directory() && record.children.is_empty(),
		})
	}

	fn detach(&mut self, id: FileId) -> Result<(), StoreError> {
		if let Some(parent) = self.live(id)?.parent {
			self.live_mut(parent)?.children.retain(|child| *child != id);
		}

		Ok(())
	}
}

#[derive(Debug, Default)]
pub struct MemoryStore {
	inner: RwLock<Inner>,
	calls: CallCounters,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a parentless record. Roots are always directories.
	pub fn create_root(&self, name: &str, attributes: AttributeBits) -> Result<FileId, StoreError> {
		let mut inner = self.inner.write();

		let name_id = inner.intern(name)?;
		let id = inner.next_id()?;
		inner.records.insert(
			id,
			Record {
				parent: None,
				name_id,
				attributes: attributes | AttributeBits::DIRECTORY,
				deleted: false,
				children: Vec::new(),
			},
		);

		Ok(id)
	}

	pub fn create_child(
		&self,
		parent: FileId,
		name: &str,
		attributes: AttributeBits,
	) -> Result<FileId, StoreError> {
		let mut inner = self.inner.write();

		if inner.find_child(inner.live_directory(parent)?, name).is_some() {
			return Err(StoreError::new(format!(
				"'{name}' already exists in <dir='{parent}'>"
			)));
		}

		let name_id = inner.intern(name)?;
		let id = inner.next_id()?;
		inner.records.insert(
			id,
			Record {
				parent: Some(parent),
				name_id,
				attributes,
				deleted: false,
				children: Vec::new(),
			},
		);
		inner.live_mut(parent)?.children.push(id);

		trace!(%parent, %id, %name, "Created record");

		Ok(id)
	}

	/// Marks `id` and everything below it deleted
	pub fn delete(&self, id: FileId) -> Result<(), StoreError> {
		let mut inner = self.inner.write();

		inner.detach(id)?;

		let mut pending = vec![id];
		while let Some(id) = pending.pop() {
			if let Some(record) = inner.records.get_mut(&id) {
				record.deleted = true;
				pending.extend(record.children.drain(..));
			}
		}

		Ok(())
	}

	pub fn rename(&self, id: FileId, new_name: &str) -> Result<(), StoreError> {
		let mut inner = self.inner.write();

		let name_id = inner.intern(new_name)?;
		inner.live_mut(id)?.name_id = name_id;

		Ok(())
	}

	pub fn move_to(&self, id: FileId, new_parent: FileId) -> Result<(), StoreError> {
		let mut inner = self.inner.write();

		inner.live_directory(new_parent)?;
		inner.detach(id)?;
		inner.live_mut(id)?.parent = Some(new_parent);
		inner.live_mut(new_parent)?.children.push(id);

		Ok(())
	}

	pub fn set_attributes(&self, id: FileId, attributes: AttributeBits) -> Result<(), StoreError> {
		self.inner.write().live_mut(id)?.attributes = attributes;

		Ok(())
	}

	#[must_use]
	pub fn calls(&self) -> StoreCallCounts {
		self.calls.snapshot()
	}

	pub fn reset_calls(&self) {
		self.calls.reset();
	}
}

impl PersistentStore for MemoryStore {
	fn find_child_record(
		&self,
		parent: FileId,
		name: &str,
	) -> Result<Option<ChildRecord>, StoreError> {
		CallCounters::bump(&self.calls.find_child_record);

		let inner = self.inner.read();
		let parent = inner.live_directory(parent)?;

		Ok(inner
			.find_child(parent, name)
			.and_then(|id| inner.child_record(id)))
	}

	fn list_all_children(&self, parent: FileId) -> Result<Vec<ChildRecord>, StoreError> {
		CallCounters::bump(&self.calls.list_all_children);

		let inner = self.inner.read();

		Ok(inner
			.live_directory(parent)?
			.children
			.iter()
			.filter_map(|id| inner.child_record(*id))
			.collect())
	}

	fn attributes(&self, id: FileId) -> Result<AttributeBits, StoreError> {
		CallCounters::bump(&self.calls.attributes);

		Ok(self.inner.read().live(id)?.attributes)
	}

	fn resolve_name_id(&self, name: &str) -> Result<NameId, StoreError> {
		CallCounters::bump(&self.calls.resolve_name_id);

		self.inner.write().intern(name)
	}

	fn resolve_name_text(&self, id: NameId) -> Result<String, StoreError> {
		CallCounters::bump(&self.calls.resolve_name_text);

		self.inner
			.read()
			.name(id)
			.map(ToString::to_string)
			.ok_or_else(|| StoreError::new(format!("unknown name <id='{id}'>")))
	}

	fn is_deleted(&self, id: FileId) -> bool {
		self.inner
			.read()
			.records
			.get(&id)
			.map_or(true, |record| record.deleted)
	}
}
