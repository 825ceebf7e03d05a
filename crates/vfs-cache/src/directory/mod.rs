//! Per-directory state: the children snapshot and the exclusive section guarding mutations.
//!
//! Children live in an immutable [`ChildList`] published through an [`ArcSwap`]. Readers load
//! the current snapshot without locking and binary-search it; writers take the directory's
//! section, build a new list and swap it in whole. The snapshot carries its own ordering policy
//! and the name each child was sorted by, so a reader can never pair an array with the wrong
//! comparator, nor see it unsorted when an entry gets renamed after the snapshot was taken.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};

use crate::{
	entry::{Entry, FileId},
	name_cache::NameId,
	store::AttributeBits,
};

mod adopted;
mod consistency;
pub(crate) mod merge;
mod order;

pub(crate) use adopted::AdoptedNames;
pub(crate) use consistency::check_children;
pub(crate) use order::{storage_order, warn_on_case_collision};
pub use order::{compare_names, names_equal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseSensitivity {
	Unknown,
	Sensitive,
	Insensitive,
}

impl CaseSensitivity {
	pub(crate) const fn from_store(bits: AttributeBits) -> Self {
		if !bits.contains(AttributeBits::CASE_SENSITIVITY_KNOWN) {
			Self::Unknown
		} else if bits.contains(AttributeBits::CHILDREN_CASE_SENSITIVE) {
			Self::Sensitive
		} else {
			Self::Insensitive
		}
	}

	/// The ordering policy to apply, falling back to `default` while unknown
	#[must_use]
	pub const fn resolve(self, default: bool) -> bool {
		match self {
			Self::Unknown => default,
			Self::Sensitive => true,
			Self::Insensitive => false,
		}
	}
}

/// A child together with the name it is sorted under in one snapshot
#[derive(Debug, Clone)]
pub(crate) struct Child {
	pub name: NameId,
	pub entry: Arc<Entry>,
}

impl Child {
	pub fn new(name: NameId, entry: Arc<Entry>) -> Self {
		Self { name, entry }
	}
}

/// Immutable snapshot of a directory's children
#[derive(Clone)]
pub(crate) struct ChildList {
	pub children: Arc<[Child]>,
	pub case_sensitive: bool,
	pub all_loaded: bool,
}

impl ChildList {
	pub fn empty(case_sensitive: bool, all_loaded: bool) -> Self {
		Self {
			children: Arc::new([]),
			case_sensitive,
			all_loaded,
		}
	}

	pub fn with_children(&self, children: impl Into<Arc<[Child]>>) -> Self {
		Self {
			children: children.into(),
			case_sensitive: self.case_sensitive,
			all_loaded: self.all_loaded,
		}
	}

	pub fn position_of(&self, id: FileId) -> Option<usize> {
		self.children.iter().position(|child| child.entry.id() == id)
	}

	pub fn entry(&self, index: usize) -> Arc<Entry> {
		Arc::clone(&self.children[index].entry)
	}

	pub fn entries(&self) -> Vec<Arc<Entry>> {
		self.children
			.iter()
			.map(|child| Arc::clone(&child.entry))
			.collect()
	}

	/// Same children, different flag
	pub fn loaded(&self, all_loaded: bool) -> Self {
		Self {
			children: Arc::clone(&self.children),
			case_sensitive: self.case_sensitive,
			all_loaded,
		}
	}
}

/// Mutable state only touched while holding the directory's section
#[derive(Debug)]
pub(crate) struct DirectorySection {
	pub adopted: AdoptedNames,
	/// The store was already asked for this directory's case sensitivity
	pub case_probed: bool,
}

pub(crate) struct DirectoryData {
	children: ArcSwap<ChildList>,
	section: Mutex<DirectorySection>,
}

impl DirectoryData {
	pub fn new(case_sensitive: bool, all_loaded: bool) -> Self {
		Self {
			children: ArcSwap::from_pointee(ChildList::empty(case_sensitive, all_loaded)),
			section: Mutex::new(DirectorySection {
				adopted: AdoptedNames::new(case_sensitive),
				case_probed: false,
			}),
		}
	}

	/// Lock-free read of the current children
	pub fn snapshot(&self) -> Arc<ChildList> {
		self.children.load_full()
	}

	/// Only call while holding the section
	pub fn publish(&self, list: ChildList) {
		self.children.store(Arc::new(list));
	}

	pub fn lock(&self) -> MutexGuard<'_, DirectorySection> {
		self.section.lock()
	}
}
