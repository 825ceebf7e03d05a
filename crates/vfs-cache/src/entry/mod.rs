//! Cached representative of one persistent-store record.
//!
//! An [`Entry`] is identified by its store id alone. Its name is an interned [`NameId`],
//! its parent is another id (resolved through the arena), so no entry owns another one
//! except for a directory holding its children snapshot.

use std::{
	backtrace::Backtrace,
	fmt,
	hash::{Hash, Hasher},
	num::NonZeroU32,
	sync::{
		atomic::{AtomicU32, AtomicU64, Ordering},
		OnceLock,
	},
};

use parking_lot::RwLock;

use crate::{directory::DirectoryData, name_cache::NameId};

mod arena;
mod flags;

pub(crate) use arena::EntryArena;
pub(crate) use flags::AtomicEntryFlags;
pub use flags::{Attributes, CommonAttributes, DirectoryAttributes, EntryFlags, FileAttributes};

const MAX_REASON_LEN: usize = 256;

/// Stable id assigned by the persistent store. Zero is never a valid id.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(NonZeroU32);

impl FileId {
	#[must_use]
	pub const fn new(raw: u32) -> Option<Self> {
		match NonZeroU32::new(raw) {
			Some(id) => Some(Self(id)),
			None => None,
		}
	}

	#[must_use]
	pub const fn get(self) -> u32 {
		self.0.get()
	}
}

impl fmt::Display for FileId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Why an entry stopped being valid. The backtrace is only captured when
/// invalidation tracking is enabled.
#[derive(Debug)]
pub struct InvalidationRecord {
	pub reason: String,
	pub backtrace: Option<String>,
}

pub(crate) enum EntryKind {
	File,
	Directory(DirectoryData),
}

pub struct Entry {
	id: FileId,
	name_id: RwLock<NameId>,
	/// 0 = no parent
	parent: AtomicU32,
	flags: AtomicEntryFlags,
	stamp: AtomicU64,
	kind: EntryKind,
	invalidation: OnceLock<InvalidationRecord>,
}

impl Entry {
	pub(crate) fn new(
		id: FileId,
		name_id: NameId,
		parent: Option<FileId>,
		flags: EntryFlags,
		kind: EntryKind,
		stamp: u64,
	) -> Self {
		Self {
			id,
			name_id: RwLock::new(name_id),
			parent: AtomicU32::new(parent.map_or(0, FileId::get)),
			flags: AtomicEntryFlags::new(flags),
			stamp: AtomicU64::new(stamp),
			kind,
			invalidation: OnceLock::new(),
		}
	}

	#[must_use]
	pub const fn id(&self) -> FileId {
		self.id
	}

	#[must_use]
	pub fn name_id(&self) -> NameId {
		*self.name_id.read()
	}

	#[must_use]
	pub fn parent_id(&self) -> Option<FileId> {
		FileId::new(self.parent.load(Ordering::Acquire))
	}

	#[must_use]
	pub const fn is_directory(&self) -> bool {
		matches!(self.kind, EntryKind::Directory(_))
	}

	#[must_use]
	pub fn flags(&self) -> EntryFlags {
		self.flags.load()
	}

	#[must_use]
	pub fn attributes(&self) -> Attributes {
		Attributes::new(self.flags(), self.is_directory())
	}

	#[must_use]
	pub fn is_dirty(&self) -> bool {
		self.flags().contains(EntryFlags::DIRTY)
	}

	pub fn mark_clean(&self) {
		self.flags.set(EntryFlags::DIRTY, false);
	}

	#[must_use]
	pub fn is_valid(&self) -> bool {
		!self.flags().contains(EntryFlags::INVALID)
	}

	/// Present once the entry was invalidated
	#[must_use]
	pub fn invalidation(&self) -> Option<&InvalidationRecord> {
		self.invalidation.get()
	}

	#[must_use]
	pub fn modification_stamp(&self) -> u64 {
		self.stamp.load(Ordering::Acquire)
	}

	pub(crate) const fn directory(&self) -> Option<&DirectoryData> {
		match &self.kind {
			EntryKind::Directory(data) => Some(data),
			EntryKind::File => None,
		}
	}

	pub(crate) fn set_name_id(&self, name_id: NameId) {
		*self.name_id.write() = name_id;
	}

	pub(crate) fn set_parent(&self, parent: FileId) {
		self.parent.store(parent.get(), Ordering::Release);
	}

	pub(crate) fn set_flags(&self, flags: EntryFlags, value: bool) -> EntryFlags {
		self.flags.set(flags, value)
	}

	pub(crate) fn replace_flags(&self, mask: EntryFlags, flags: EntryFlags) -> EntryFlags {
		self.flags.replace(mask, flags)
	}

	pub(crate) fn touch(&self, stamp: u64) {
		self.stamp.store(stamp, Ordering::Release);
	}

	/// Terminal. Returns `false` if the entry was already invalid, the first reason wins.
	pub(crate) fn invalidate(&self, reason: &str, capture_backtrace: bool) -> bool {
		if self
			.set_flags(EntryFlags::INVALID, true)
			.contains(EntryFlags::INVALID)
		{
			return false;
		}

		let mut reason = reason.to_string();
		if reason.len() > MAX_REASON_LEN {
			let mut end = MAX_REASON_LEN;
			while !reason.is_char_boundary(end) {
				end -= 1;
			}
			reason.truncate(end);
		}

		self.invalidation.get_or_init(|| InvalidationRecord {
			reason,
			backtrace: capture_backtrace.then(|| Backtrace::force_capture().to_string()),
		});

		true
	}

	pub(crate) fn invalidation_reason(&self) -> String {
		self.invalidation
			.get()
			.map_or_else(|| "invalidated".to_string(), |record| record.reason.clone())
	}
}

impl PartialEq for Entry {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl Eq for Entry {}

impl Hash for Entry {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl fmt::Debug for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Entry")
			.field("id", &self.id)
			.field("name_id", &self.name_id())
			.field("parent", &self.parent_id())
			.field("directory", &self.is_directory())
			.field("flags", &self.flags())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashSet;

	use super::*;

	fn file(raw: u32) -> Entry {
		Entry::new(
			FileId::new(raw).expect("non zero"),
			NameId::new(1).expect("non zero"),
			None,
			EntryFlags::WRITABLE,
			EntryKind::File,
			0,
		)
	}

	#[test]
	fn test_identity_is_the_id() {
		let a = file(7);
		let b = file(7);
		b.set_name_id(NameId::new(99).expect("non zero"));

		assert_eq!(a, b);
		assert_eq!([a, b].into_iter().collect::<HashSet<_>>().len(), 1);
	}

	#[test]
	fn test_renaming_swaps_the_name_id() {
		let entry = file(3);
		assert_eq!(entry.name_id().get(), 1);

		entry.set_name_id(NameId::new(42).expect("non zero"));
		assert_eq!(entry.name_id().get(), 42);
	}

	#[test]
	fn test_invalidation_is_terminal() {
		let entry = file(1);
		assert!(entry.is_valid());

		assert!(entry.invalidate("deleted from disk", false));
		assert!(!entry.invalidate("second reason", true));

		assert!(!entry.is_valid());
		let record = entry.invalidation().expect("record kept");
		assert_eq!(record.reason, "deleted from disk");
		assert!(record.backtrace.is_none());
	}

	#[test]
	fn test_invalidation_reason_is_bounded() {
		let entry = file(1);
		entry.invalidate(&"é".repeat(300), true);

		let record = entry.invalidation().expect("record kept");
		assert!(record.reason.len() <= MAX_REASON_LEN);
		assert!(record.backtrace.is_some());
	}
}
