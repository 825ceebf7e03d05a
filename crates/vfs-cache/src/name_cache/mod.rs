//! # Name interning
//!
//! Every entry refers to its name by a [`NameId`], the text lives once in a [`NameCache`].
//! The default stack is a [`ShardedNameCache`] (one segmented-LRU per shard, each behind its
//! own mutex) optionally fronted by a [`DirectMappedCache`], a tiny last-write-wins array that
//! short-circuits the shard lookup for hot names. The shards are the source of truth.

use std::{fmt, num::NonZeroU32, sync::Arc};

mod direct_mapped;
mod interner;
mod lru;
mod sharded;

pub use direct_mapped::DirectMappedCache;
pub(crate) use interner::is_separator;
pub use interner::{NameInterner, NameInternerStats};
pub use lru::SegmentedLru;
pub use sharded::ShardedNameCache;

/// Shared immutable name text
pub type InternedName = Arc<str>;

/// Process-unique handle of an interned name. Zero is never a valid id.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(NonZeroU32);

impl NameId {
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

impl fmt::Display for NameId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Bounded id -> text cache. Implementations may forget any entry at any time,
/// callers must be able to recompute a missing name.
pub trait NameCache: Send + Sync {
	fn get(&self, id: NameId) -> Option<InternedName>;

	fn put(&self, id: NameId, name: InternedName);

	/// Forgets every cached name
	fn clear(&self);

	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
