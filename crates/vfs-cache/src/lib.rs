//!
//! # VFS Cache
//!
//! In-memory mirror of a persistent, append-only file record store. Every record the store
//! reports becomes an [`Entry`]; directories keep their children in a sorted, copy-on-write
//! array that readers can search without taking any lock.
//!
//! What the cache takes care of:
//! - Lazy population: children are only fetched from the store when a lookup misses;
//! - Negative caching: names probed and found absent are "adopted" so they are not queried again;
//! - Case sensitivity per directory, which may only become known after the directory was loaded,
//!   in which case the children array is re-sorted under the new ordering;
//! - Interned names, shared by every entry through a sharded segmented-LRU cache;
//! - Batch population through a single-pass merge of sorted runs.
//!
//! ## Basic example
//!
//! ```
//! use sd_vfs_cache::{AttributeBits, FindOptions, MemoryStore, VfsCache, VfsCacheConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let root_id = store
//! 	.create_root("/", AttributeBits::DIRECTORY | AttributeBits::WRITABLE)
//! 	.unwrap();
//! store
//! 	.create_child(root_id, "a.txt", AttributeBits::WRITABLE)
//! 	.unwrap();
//!
//! let cache = VfsCache::new(store.clone(), VfsCacheConfig::default());
//! let root = cache.mount_root(root_id, "/").unwrap();
//!
//! let child = cache
//! 	.find_child(&root, "a.txt", FindOptions::default())
//! 	.unwrap()
//! 	.expect("a.txt exists in the store");
//!
//! assert_eq!(&*cache.name(&child).unwrap(), "a.txt");
//! assert_eq!(cache.path(&child).unwrap(), "/a.txt");
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod cache;
mod config;
mod directory;
mod entry;
mod error;
mod memory;
mod name_cache;
mod store;

pub use cache::{FindOptions, VfsCache};
pub use config::{ConfigError, NameCacheConfig, VfsCacheConfig};
pub use directory::{compare_names, names_equal, CaseSensitivity};
pub use entry::{
	Attributes, CommonAttributes, DirectoryAttributes, Entry, EntryFlags, FileAttributes, FileId,
	InvalidationRecord,
};
pub use error::{ConsistencyViolation, Error, InvalidNameError};
pub use memory::{MemoryStore, StoreCallCounts};
pub use name_cache::{
	DirectMappedCache, InternedName, NameCache, NameId, NameInterner, NameInternerStats,
	SegmentedLru, ShardedNameCache,
};
pub use store::{
	AccessDecision, AccessPolicy, AttributeBits, ChildRecord, PersistentStore, RefreshScheduler,
	StoreError,
};
