//! Contract with the persistent record store and the other external collaborators.
//!
//! The cache never performs I/O itself. Everything it knows comes from a [`PersistentStore`],
//! and every call into it is a plain synchronous function call from the cache's point of view.

use std::{error::Error as StdError, fmt};

use bitflags::bitflags;
use thiserror::Error;

use super::{entry::FileId, name_cache::NameId};

bitflags! {
	/// Attribute bits as recorded by the persistent store
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct AttributeBits: u32 {
		const DIRECTORY = 1 << 0;
		const SYMLINK = 1 << 1;
		const SPECIAL = 1 << 2;
		const WRITABLE = 1 << 3;
		const HIDDEN = 1 << 4;
		/// Only meaningful for directories, and only together with `CASE_SENSITIVITY_KNOWN`
		const CHILDREN_CASE_SENSITIVE = 1 << 5;
		const CASE_SENSITIVITY_KNOWN = 1 << 6;
	}
}

impl AttributeBits {
	#[must_use]
	pub const fn is_directory(self) -> bool {
		self.contains(Self::DIRECTORY)
	}
}

/// One child as reported by the persistent store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRecord {
	pub id: FileId,
	pub name_id: NameId,
	pub attributes: AttributeBits,
	/// Directories only: the store knows this directory has no children at all
	pub known_empty: bool,
}

impl ChildRecord {
	#[must_use]
	pub const fn is_directory(&self) -> bool {
		self.attributes.is_directory()
	}
}

/// Error surfaced by a [`PersistentStore`] implementation
#[derive(Debug, Error)]
pub struct StoreError {
	message: String,
	#[source]
	source: Option<Box<dyn StdError + Send + Sync>>,
}

impl fmt::Display for StoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "persistent store error: {}", self.message)
	}
}

impl StoreError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: None,
		}
	}

	pub fn with_source(
		message: impl Into<String>,
		source: impl StdError + Send + Sync + 'static,
	) -> Self {
		Self {
			message: message.into(),
			source: Some(Box::new(source)),
		}
	}
}

/// The small slice of the persistent record store used by the cache, everything keyed by id
pub trait PersistentStore: Send + Sync {
	/// Looks up a child by name. On a case-insensitive parent the store may return a record
	/// whose canonical name differs in case from `name`.
	fn find_child_record(
		&self,
		parent: FileId,
		name: &str,
	) -> Result<Option<ChildRecord>, StoreError>;

	fn list_all_children(&self, parent: FileId) -> Result<Vec<ChildRecord>, StoreError>;

	fn attributes(&self, id: FileId) -> Result<AttributeBits, StoreError>;

	/// Returns the stable id of `name`, enumerating it if it was never seen before
	fn resolve_name_id(&self, name: &str) -> Result<NameId, StoreError>;

	fn resolve_name_text(&self, id: NameId) -> Result<String, StoreError>;

	fn is_deleted(&self, id: FileId) -> bool;
}

/// Receives single-entry refresh requests when a cached entry disagrees with the store.
/// The scheduler owns the reconciliation, the cache only asks.
pub trait RefreshScheduler: Send + Sync {
	fn schedule_refresh(&self, id: FileId);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
	Allow,
	Deny(String),
}

/// Allow-list consulted before a non-directory child is first wired into the tree
pub trait AccessPolicy: Send + Sync {
	fn check(&self, parent_path: &str, child_name: &str) -> AccessDecision;
}
