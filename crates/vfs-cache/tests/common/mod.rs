#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use sd_vfs_cache::{
	AttributeBits, ChildRecord, Entry, FileId, FindOptions, MemoryStore, PersistentStore,
	RefreshScheduler, VfsCache, VfsCacheConfig,
};

pub const SENSITIVE: AttributeBits = AttributeBits::DIRECTORY
	.union(AttributeBits::CHILDREN_CASE_SENSITIVE)
	.union(AttributeBits::CASE_SENSITIVITY_KNOWN);

pub const INSENSITIVE: AttributeBits =
	AttributeBits::DIRECTORY.union(AttributeBits::CASE_SENSITIVITY_KNOWN);

/// Case sensitivity not reported by the store
pub const UNKNOWN: AttributeBits = AttributeBits::DIRECTORY;

/// For tests that can't use `#[traced_test]`, set `RUST_LOG` to see the cache's logs
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

pub fn config(default_case_sensitive: bool) -> VfsCacheConfig {
	VfsCacheConfig {
		default_case_sensitive,
		check_consistency: true,
		track_invalidation: true,
		..Default::default()
	}
}

/// Remembers every refresh the cache asked for
#[derive(Default)]
pub struct RecordingScheduler(Mutex<Vec<FileId>>);

impl RecordingScheduler {
	pub fn requested(&self) -> Vec<FileId> {
		self.0.lock().clone()
	}
}

impl RefreshScheduler for RecordingScheduler {
	fn schedule_refresh(&self, id: FileId) {
		self.0.lock().push(id);
	}
}

pub struct Fixture {
	pub store: Arc<MemoryStore>,
	pub cache: VfsCache,
	pub root: Arc<Entry>,
}

impl Fixture {
	pub fn new(root_attributes: AttributeBits) -> Self {
		Self::with_config(root_attributes, config(true))
	}

	pub fn with_config(root_attributes: AttributeBits, config: VfsCacheConfig) -> Self {
		let store = Arc::new(MemoryStore::new());
		let root_id = store.create_root("/", root_attributes).unwrap();
		let cache = VfsCache::new(store.clone(), config);
		let root = cache.mount_root(root_id, "/").unwrap();

		Self { store, cache, root }
	}

	pub fn with_scheduler(root_attributes: AttributeBits) -> (Self, Arc<RecordingScheduler>) {
		let scheduler = Arc::new(RecordingScheduler::default());
		let store = Arc::new(MemoryStore::new());
		let root_id = store.create_root("/", root_attributes).unwrap();
		let cache =
			VfsCache::new(store.clone(), config(true)).with_refresh_scheduler(scheduler.clone());
		let root = cache.mount_root(root_id, "/").unwrap();

		(Self { store, cache, root }, scheduler)
	}

	pub fn create(&self, parent: FileId, name: &str, attributes: AttributeBits) -> FileId {
		self.store.create_child(parent, name, attributes).unwrap()
	}

	pub fn record(&self, parent: FileId, name: &str) -> ChildRecord {
		self.store
			.find_child_record(parent, name)
			.unwrap()
			.expect("record exists")
	}

	pub fn find(&self, dir: &Arc<Entry>, name: &str) -> Option<Arc<Entry>> {
		self.cache
			.find_child(dir, name, FindOptions::default())
			.unwrap()
	}

	pub fn names(&self, dir: &Arc<Entry>) -> Vec<String> {
		self.cache
			.cached_children(dir)
			.unwrap()
			.iter()
			.map(|child| self.cache.name(child).unwrap().to_string())
			.collect()
	}
}
