use std::{
	cmp::Ordering,
	collections::HashSet,
	sync::{
		atomic::{AtomicU64, Ordering as AtomicOrdering},
		Arc,
	},
};

use dashmap::DashMap;
use smallvec::SmallVec;
use tracing::{debug, error, instrument, trace, warn};

use crate::{
	config::VfsCacheConfig,
	directory::{
		check_children, compare_names, merge, storage_order, warn_on_case_collision,
		CaseSensitivity, Child, ChildList, DirectoryData, DirectorySection,
	},
	entry::{Attributes, Entry, EntryArena, EntryFlags, EntryKind, FileId},
	error::{Error, InvalidNameError},
	name_cache::{is_separator, InternedName, NameId, NameInterner},
	store::{
		AccessDecision, AccessPolicy, AttributeBits, ChildRecord, PersistentStore,
		RefreshScheduler,
	},
};

/// Tweaks for [`VfsCache::find_child`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
	/// Re-check the found entry against the store and schedule a refresh if it went stale
	pub refresh: bool,
	/// Strip leading and trailing separators from the requested name
	pub canonicalize: bool,
	/// Answer `None` instead of failing when the directory was invalidated
	pub tolerate_invalid: bool,
}

/// What the lock-free part of a lookup found out
enum Lookup<'name> {
	Found(Arc<Entry>),
	Absent,
	/// Not in the snapshot, the store has to be asked for this (canonical) name
	Miss(&'name str),
}

/// What to do when an entry lands on a name another child already has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conflict {
	/// The cached child stays, the store is asked to reconcile it
	KeepExisting,
	/// The newcomer is authoritative, the cached child is evicted
	ReplaceExisting,
}

pub struct VfsCache {
	store: Arc<dyn PersistentStore>,
	names: NameInterner,
	entries: EntryArena,
	roots: DashMap<FileId, Arc<Entry>>,
	refresh: Option<Arc<dyn RefreshScheduler>>,
	access_policy: Option<Arc<dyn AccessPolicy>>,
	config: VfsCacheConfig,
	stamp: AtomicU64,
}

impl VfsCache {
	pub fn new(store: Arc<dyn PersistentStore>, config: VfsCacheConfig) -> Self {
		Self {
			store,
			names: NameInterner::new(&config.name_cache),
			entries: EntryArena::default(),
			roots: DashMap::new(),
			refresh: None,
			access_policy: None,
			config,
			stamp: AtomicU64::new(0),
		}
	}

	#[must_use]
	pub fn with_refresh_scheduler(mut self, scheduler: Arc<dyn RefreshScheduler>) -> Self {
		self.refresh = Some(scheduler);
		self
	}

	#[must_use]
	pub fn with_access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
		self.access_policy = Some(policy);
		self
	}

	pub const fn config(&self) -> &VfsCacheConfig {
		&self.config
	}

	pub const fn interner(&self) -> &NameInterner {
		&self.names
	}

	fn next_stamp(&self) -> u64 {
		self.stamp.fetch_add(1, AtomicOrdering::Relaxed) + 1
	}

	/// Maps a single-segment name to its persistent id
	pub fn intern(&self, name: &str) -> Result<NameId, Error> {
		self.names
			.store(name, |name| self.store.resolve_name_id(name).map_err(Error::from))
	}

	pub fn name_text(&self, id: NameId) -> Result<InternedName, Error> {
		self.names
			.resolve(id, |id| self.store.resolve_name_text(id).map_err(Error::from))
	}

	pub fn name(&self, entry: &Entry) -> Result<InternedName, Error> {
		Self::ensure_valid_entry(entry)?;
		self.name_text(entry.name_id())
	}

	/// Full path from the entry's root, always `/`-separated
	pub fn path(&self, entry: &Entry) -> Result<String, Error> {
		let mut segments: SmallVec<[InternedName; 16]> = SmallVec::new();
		segments.push(self.name(entry)?);

		let mut parent = entry.parent_id();
		while let Some(id) = parent {
			let ancestor = self.entry(id).ok_or(Error::UnknownEntry(id))?;
			segments.push(self.name(&ancestor)?);
			parent = ancestor.parent_id();
		}

		let mut path = String::new();
		for segment in segments.iter().rev() {
			if !path.is_empty() && !path.ends_with(is_separator) {
				path.push('/');
			}
			path.push_str(segment);
		}

		Ok(path)
	}

	/// Any cached entry, valid or not, as long as something still references it
	pub fn entry(&self, id: FileId) -> Option<Arc<Entry>> {
		self.roots
			.get(&id)
			.map(|root| Arc::clone(&root))
			.or_else(|| self.entries.get(id))
	}

	pub fn parent(&self, entry: &Entry) -> Option<Arc<Entry>> {
		entry.parent_id().and_then(|parent| self.entry(parent))
	}

	/// Registers a parentless directory. Mounting the same id twice returns the same entry.
	#[instrument(skip(self), err)]
	pub fn mount_root(&self, id: FileId, name: &str) -> Result<Arc<Entry>, Error> {
		if let Some(root) = self.roots.get(&id) {
			return Ok(Arc::clone(&root));
		}

		let name_id = self.intern(name)?;
		let attributes = self.store.attributes(id)?;
		if !attributes.is_directory() {
			return Err(Error::NotADirectory(id));
		}

		let root = self
			.roots
			.entry(id)
			.or_insert_with(|| {
				let entry = Arc::new(self.new_entry(id, name_id, None, attributes, false));
				self.entries.insert(&entry);
				debug!(%id, %name, "Mounted root");
				entry
			})
			.clone();

		Ok(root)
	}

	pub fn roots(&self) -> Vec<Arc<Entry>> {
		self.roots.iter().map(|root| Arc::clone(&root)).collect()
	}

	fn new_entry(
		&self,
		id: FileId,
		name_id: NameId,
		parent: Option<&Entry>,
		attributes: AttributeBits,
		known_empty: bool,
	) -> Entry {
		let mut flags = EntryFlags::from_store(attributes);
		if parent.is_some_and(|parent| {
			parent
				.flags()
				.intersects(EntryFlags::SYMLINK | EntryFlags::HAS_SYMLINK_PARENT)
		}) {
			flags |= EntryFlags::HAS_SYMLINK_PARENT;
		}

		let kind = if attributes.is_directory() {
			let case_sensitive = CaseSensitivity::from_store(attributes)
				.resolve(self.config.default_case_sensitive);
			EntryKind::Directory(DirectoryData::new(case_sensitive, known_empty))
		} else {
			EntryKind::File
		};

		Entry::new(
			id,
			name_id,
			parent.map(Entry::id),
			flags,
			kind,
			self.next_stamp(),
		)
	}

	fn directory<'entry>(dir: &'entry Entry) -> Result<&'entry DirectoryData, Error> {
		dir.directory().ok_or(Error::NotADirectory(dir.id()))
	}

	fn ensure_valid_directory(dir: &Entry) -> Result<(), Error> {
		if dir.is_valid() {
			Ok(())
		} else {
			Err(Error::InvalidDirectory {
				id: dir.id(),
				reason: dir.invalidation_reason(),
			})
		}
	}

	fn ensure_valid_entry(entry: &Entry) -> Result<(), Error> {
		if entry.is_valid() {
			Ok(())
		} else {
			Err(Error::InvalidEntry {
				id: entry.id(),
				reason: entry.invalidation_reason(),
			})
		}
	}

	/// Binary search where `target` says how a child name compares to what we look for.
	/// Uses the names the children were sorted under, not whatever they are called now.
	fn search(
		&self,
		children: &[Child],
		mut target: impl FnMut(&str) -> Ordering,
	) -> Result<Result<usize, usize>, Error> {
		let (mut low, mut high) = (0, children.len());

		while low < high {
			let mid = low + (high - low) / 2;
			let name = self.name_text(children[mid].name)?;
			match target(&*name) {
				Ordering::Less => low = mid + 1,
				Ordering::Greater => high = mid,
				Ordering::Equal => return Ok(Ok(mid)),
			}
		}

		Ok(Err(low))
	}

	fn lookup(&self, list: &ChildList, name: &str) -> Result<Option<Arc<Entry>>, Error> {
		let case_sensitive = list.case_sensitive;

		Ok(self
			.search(&list.children, |child| compare_names(child, name, case_sensitive))?
			.ok()
			.map(|index| list.entry(index)))
	}

	/// Finds the child called `name`, asking the store only when the cache can't answer.
	///
	/// A cached hit never locks and never touches the store. A miss in a directory whose
	/// children are not all loaded takes the directory's section, so concurrent misses for the
	/// same name end up as a single store query. Absent names are remembered until the store
	/// says otherwise.
	pub fn find_child(
		&self,
		dir: &Arc<Entry>,
		name: &str,
		options: FindOptions,
	) -> Result<Option<Arc<Entry>>, Error> {
		if name.is_empty() {
			return Ok(None);
		}

		let data = Self::directory(dir)?;
		if !dir.is_valid() && options.tolerate_invalid {
			return Ok(None);
		}
		Self::ensure_valid_directory(dir)?;

		let list = data.snapshot();
		let found = match self.find_cached(&list, name, options.canonicalize)? {
			Lookup::Found(child) => Some(child),
			Lookup::Absent => None,
			Lookup::Miss(name) => self.find_in_store(dir, data, name, options.canonicalize)?,
		};

		if options.refresh {
			if let Some(child) = &found {
				if self.is_stale(child) {
					self.request_refresh(child.id());
					return self.find_child(
						dir,
						name,
						FindOptions {
							refresh: false,
							..options
						},
					);
				}
			}
		}

		Ok(found)
	}

	fn find_cached<'name>(
		&self,
		list: &ChildList,
		name: &'name str,
		canonicalize: bool,
	) -> Result<Lookup<'name>, Error> {
		if let Some(child) = self.lookup(list, name)? {
			return Ok(Lookup::Found(child));
		}

		let name = if canonicalize {
			let trimmed = canonical_name(name)?;
			if trimmed.is_empty() {
				return Ok(Lookup::Absent);
			}
			if trimmed.len() != name.len() {
				if let Some(child) = self.lookup(list, trimmed)? {
					return Ok(Lookup::Found(child));
				}
			}
			trimmed
		} else {
			name
		};

		if list.all_loaded {
			return Ok(Lookup::Absent);
		}

		Ok(Lookup::Miss(name))
	}

	#[instrument(skip(self, dir, data), fields(dir = %dir.id()), err)]
	fn find_in_store(
		&self,
		dir: &Arc<Entry>,
		data: &DirectoryData,
		name: &str,
		canonicalize: bool,
	) -> Result<Option<Arc<Entry>>, Error> {
		let mut section = data.lock();
		Self::ensure_valid_directory(dir)?;

		// Someone may have loaded it while we were waiting
		let mut list = data.snapshot();
		if let Some(child) = self.lookup(&list, name)? {
			return Ok(Some(child));
		}
		if list.all_loaded || section.adopted.contains(name) {
			return Ok(None);
		}

		if let Some(updated) = self.probe_case_sensitivity(dir, data, &mut section)? {
			list = updated;
			if let Some(child) = self.lookup(&list, name)? {
				return Ok(Some(child));
			}
			if section.adopted.contains(name) {
				return Ok(None);
			}
		}

		let Some(record) = self.store.find_child_record(dir.id(), name)? else {
			trace!(%name, "Not in store, adopting name");
			section.adopted.insert(name);
			self.check_if_enabled(dir, data, &section);
			return Ok(None);
		};

		// Cached under another spelling
		if let Some(index) = list.position_of(record.id) {
			return Ok(Some(list.entry(index)));
		}

		let canonical = self.name_text(record.name_id)?;
		if canonicalize && *canonical != *name {
			if let Some(child) = self.lookup(&list, &canonical)? {
				return Ok(Some(child));
			}
		}

		let child = self.materialize(dir, &record, &canonical)?;
		let child = self.insert_locked(
			dir,
			data,
			&mut section,
			&list,
			Child::new(record.name_id, child),
			Conflict::KeepExisting,
		)?;
		trace!(child = %child.id(), name = %canonical, "Loaded child from store");

		Ok(Some(child))
	}

	/// Asks the store once for a directory whose case sensitivity is still unknown, re-sorting
	/// the children if the answer differs from the default we were using
	fn probe_case_sensitivity(
		&self,
		dir: &Entry,
		data: &DirectoryData,
		section: &mut DirectorySection,
	) -> Result<Option<Arc<ChildList>>, Error> {
		if section.case_probed
			|| !matches!(Self::case_sensitivity(dir), CaseSensitivity::Unknown)
		{
			return Ok(None);
		}
		section.case_probed = true;

		let sensitivity = CaseSensitivity::from_store(self.store.attributes(dir.id())?);
		if matches!(sensitivity, CaseSensitivity::Unknown) {
			return Ok(None);
		}

		debug!(dir = %dir.id(), ?sensitivity, "Case sensitivity became known");
		self.apply_case_sensitivity(dir, data, section, sensitivity)
			.map(Some)
	}

	fn case_sensitivity(dir: &Entry) -> CaseSensitivity {
		match dir.attributes() {
			Attributes::Directory(attributes) => attributes.case_sensitivity(),
			Attributes::File(_) => CaseSensitivity::Unknown,
		}
	}

	/// Creates the entry for a store record, reusing a live one when the record was already
	/// materialized under this directory
	fn materialize(
		&self,
		dir: &Entry,
		record: &ChildRecord,
		name: &str,
	) -> Result<Arc<Entry>, Error> {
		if let Some(existing) = self.entries.live_child_of(record.id, dir.id()) {
			if existing.is_directory() == record.is_directory() {
				existing.set_name_id(record.name_id);
				return Ok(existing);
			}
		}

		if !record.is_directory() {
			self.check_access(dir, name)?;
		}

		let child = Arc::new(self.new_entry(
			record.id,
			record.name_id,
			Some(dir),
			record.attributes,
			record.known_empty,
		));
		self.entries.insert(&child);

		Ok(child)
	}

	fn check_access(&self, dir: &Entry, name: &str) -> Result<(), Error> {
		let Some(policy) = &self.access_policy else {
			return Ok(());
		};

		let parent_path = self.path(dir)?;

		if let AccessDecision::Deny(reason) = policy.check(&parent_path, name) {
			if self.config.enforce_access_policy {
				error!(%parent_path, %name, %reason, "Access to file denied");
				panic!("access to '{name}' in '{parent_path}' denied: {reason}");
			}
			trace!(%parent_path, %name, %reason, "Access policy would deny this file");
		}

		Ok(())
	}

	/// Inserts one child into `base`, which must be the directory's children as the caller
	/// wants them, and publishes the result. Must hold the directory's section. Nothing is
	/// published when this fails.
	fn insert_locked(
		&self,
		dir: &Entry,
		data: &DirectoryData,
		section: &mut DirectorySection,
		base: &ChildList,
		child: Child,
		conflict: Conflict,
	) -> Result<Arc<Entry>, Error> {
		let name = self.name_text(child.name)?;
		let case_sensitive = base.case_sensitive;
		let mut children = base.children.to_vec();

		// The store already replaced whatever answered to this name, under any spelling
		let mut evicted = SmallVec::<[Arc<Entry>; 2]>::new();
		if conflict == Conflict::ReplaceExisting {
			while let Ok(index) =
				self.search(&children, |other| compare_names(other, &name, case_sensitive))?
			{
				evicted.push(children.remove(index).entry);
			}
		}

		let index =
			match self.search(&children, |other| storage_order(other, &name, case_sensitive))? {
				Err(index) => index,
				Ok(index) => {
					let existing = Arc::clone(&children[index].entry);
					warn!(
						dir = %dir.id(),
						%name,
						existing = %existing.id(),
						incoming = %child.entry.id(),
						"Two records share a name, keeping the cached one"
					);
					self.request_refresh(existing.id());
					return Ok(existing);
				}
			};

		for neighbour in [index.checked_sub(1), Some(index)]
			.into_iter()
			.flatten()
			.filter_map(|index| children.get(index))
		{
			warn_on_case_collision(&self.name_text(neighbour.name)?, &name, case_sensitive);
		}

		for stale in &evicted {
			debug!(dir = %dir.id(), %name, evicted = %stale.id(), "Evicted stale child");
			self.request_refresh(stale.id());
		}

		let entry = Arc::clone(&child.entry);
		children.insert(index, child);
		data.publish(base.with_children(children));
		section.adopted.remove(&name);
		dir.touch(self.next_stamp());

		self.check_if_enabled(dir, data, section);

		Ok(entry)
	}

	/// Adds a record the caller just learned about. Returns the cached entry if the record
	/// is already a child.
	pub fn add_child(&self, dir: &Arc<Entry>, record: ChildRecord) -> Result<Arc<Entry>, Error> {
		let data = Self::directory(dir)?;
		let mut section = data.lock();
		Self::ensure_valid_directory(dir)?;

		let list = data.snapshot();
		if let Some(index) = list.position_of(record.id) {
			return Ok(list.entry(index));
		}

		let name = self.name_text(record.name_id)?;
		let child = self.materialize(dir, &record, &name)?;
		self.insert_locked(
			dir,
			data,
			&mut section,
			&list,
			Child::new(record.name_id, child),
			Conflict::KeepExisting,
		)
	}

	/// Adds many records at once. Records already present (by id) are skipped; the rest are
	/// sorted and merged with the cached children in one pass. With `all_loaded` the
	/// directory's children become authoritative and its adopted names are dropped.
	#[instrument(skip(self, dir, records), fields(dir = %dir.id(), count = records.len()), err)]
	pub fn create_and_add_children(
		&self,
		dir: &Arc<Entry>,
		records: Vec<ChildRecord>,
		all_loaded: bool,
	) -> Result<Vec<Arc<Entry>>, Error> {
		let data = Self::directory(dir)?;
		let mut section = data.lock();
		Self::ensure_valid_directory(dir)?;

		self.add_records_locked(dir, data, &mut section, records, all_loaded)
	}

	fn add_records_locked(
		&self,
		dir: &Entry,
		data: &DirectoryData,
		section: &mut DirectorySection,
		records: Vec<ChildRecord>,
		all_loaded: bool,
	) -> Result<Vec<Arc<Entry>>, Error> {
		let list = data.snapshot();
		let present = list
			.children
			.iter()
			.map(|child| child.entry.id())
			.collect::<HashSet<_>>();
		let mut fresh = records
			.into_iter()
			.filter(|record| !present.contains(&record.id))
			.collect::<Vec<_>>();

		let added = if fresh.len() <= 1 {
			match fresh.pop() {
				Some(record) => {
					let name = self.name_text(record.name_id)?;
					let child = self.materialize(dir, &record, &name)?;
					vec![self.insert_locked(
						dir,
						data,
						section,
						&list,
						Child::new(record.name_id, child),
						Conflict::KeepExisting,
					)?]
				}
				None => Vec::new(),
			}
		} else {
			self.merge_locked(dir, data, section, fresh)?
		};

		if all_loaded {
			data.publish(data.snapshot().loaded(true));
			if !section.adopted.is_empty() {
				trace!(
					dir = %dir.id(),
					adopted = section.adopted.len(),
					"Children are authoritative now, forgetting adopted names"
				);
				section.adopted.clear();
			}
			self.check_if_enabled(dir, data, section);
		}

		Ok(added)
	}

	fn merge_locked(
		&self,
		dir: &Entry,
		data: &DirectoryData,
		section: &mut DirectorySection,
		records: Vec<ChildRecord>,
	) -> Result<Vec<Arc<Entry>>, Error> {
		enum Slot {
			Cached(Child),
			Incoming(ChildRecord),
		}

		impl Slot {
			fn id(&self) -> FileId {
				match self {
					Self::Cached(child) => child.entry.id(),
					Self::Incoming(record) => record.id,
				}
			}
		}

		let list = data.snapshot();
		let case_sensitive = list.case_sensitive;
		let order = |(left, _): &(InternedName, Slot), (right, _): &(InternedName, Slot)| {
			storage_order(left, right, case_sensitive)
		};

		let mut incoming = records
			.into_iter()
			.map(|record| Ok((self.name_text(record.name_id)?, Slot::Incoming(record))))
			.collect::<Result<Vec<_>, Error>>()?;
		for (name, duplicate) in merge::sort_batch(&mut incoming, order) {
			warn!(
				dir = %dir.id(),
				%name,
				record = %duplicate.id(),
				"Dropping duplicate name in batch"
			);
			self.request_refresh(duplicate.id());
		}

		let cached = list
			.children
			.iter()
			.map(|child| Ok((self.name_text(child.name)?, Slot::Cached(child.clone()))))
			.collect::<Result<Vec<_>, Error>>()?;

		let merged = merge::merge_sorted_runs(cached, incoming, order);
		for (kept, (name, rejected)) in &merged.rejected {
			let existing = merged.items[*kept].1.id();
			warn!(
				dir = %dir.id(),
				%name,
				%existing,
				incoming = %rejected.id(),
				"Two records share a name, keeping the cached one"
			);
			self.request_refresh(existing);
		}

		let mut children = Vec::with_capacity(merged.items.len());
		let mut added = Vec::new();
		let mut previous: Option<InternedName> = None;

		for (name, slot) in merged.items {
			let child = match slot {
				Slot::Cached(child) => child,
				Slot::Incoming(record) => {
					if let Some(previous) = &previous {
						warn_on_case_collision(previous, &name, case_sensitive);
					}
					let entry = self.materialize(dir, &record, &name)?;
					section.adopted.remove(&name);
					added.push(Arc::clone(&entry));
					Child::new(record.name_id, entry)
				}
			};
			children.push(child);
			previous = Some(name);
		}

		data.publish(list.with_children(children));
		dir.touch(self.next_stamp());
		self.check_if_enabled(dir, data, section);

		trace!(dir = %dir.id(), added = added.len(), "Merged children");

		Ok(added)
	}

	/// Every child, loading the full listing from the store the first time
	#[instrument(skip(self, dir), fields(dir = %dir.id()), err)]
	pub fn children(&self, dir: &Arc<Entry>) -> Result<Vec<Arc<Entry>>, Error> {
		let data = Self::directory(dir)?;
		Self::ensure_valid_directory(dir)?;

		let list = data.snapshot();
		if list.all_loaded {
			return Ok(list.entries());
		}

		let mut section = data.lock();
		Self::ensure_valid_directory(dir)?;

		if !data.snapshot().all_loaded {
			let records = self.store.list_all_children(dir.id())?;
			self.add_records_locked(dir, data, &mut section, records, true)?;
		}

		Ok(data.snapshot().entries())
	}

	/// Children currently in memory, without asking the store
	pub fn cached_children(&self, dir: &Arc<Entry>) -> Result<Vec<Arc<Entry>>, Error> {
		Ok(Self::directory(dir)?.snapshot().entries())
	}

	pub fn cached_child_by_id(
		&self,
		dir: &Arc<Entry>,
		id: FileId,
	) -> Result<Option<Arc<Entry>>, Error> {
		let list = Self::directory(dir)?.snapshot();

		Ok(list.position_of(id).map(|index| list.entry(index)))
	}

	pub fn all_children_loaded(&self, dir: &Arc<Entry>) -> Result<bool, Error> {
		Ok(Self::directory(dir)?.snapshot().all_loaded)
	}

	/// Names currently known to be absent from `dir`, folded when it is case-insensitive
	pub fn adopted_names(&self, dir: &Arc<Entry>) -> Result<Vec<String>, Error> {
		Ok(Self::directory(dir)?
			.lock()
			.adopted
			.iter()
			.map(ToString::to_string)
			.collect())
	}

	/// Drops the child with `id` from the children. Its name is adopted unless the directory
	/// is fully loaded, since the store no longer has it either.
	pub fn remove_child(
		&self,
		dir: &Arc<Entry>,
		id: FileId,
	) -> Result<Option<Arc<Entry>>, Error> {
		Ok(self.remove_children(dir, &[id])?.pop())
	}

	pub fn remove_children(
		&self,
		dir: &Arc<Entry>,
		ids: &[FileId],
	) -> Result<Vec<Arc<Entry>>, Error> {
		let data = Self::directory(dir)?;
		let mut section = data.lock();
		Self::ensure_valid_directory(dir)?;

		Ok(self.remove_locked(dir, data, &mut section, ids))
	}

	fn remove_locked(
		&self,
		dir: &Entry,
		data: &DirectoryData,
		section: &mut DirectorySection,
		ids: &[FileId],
	) -> Vec<Arc<Entry>> {
		let ids = ids.iter().copied().collect::<HashSet<_>>();
		let list = data.snapshot();

		let (removed, kept): (Vec<_>, Vec<_>) = list
			.children
			.iter()
			.cloned()
			.partition(|child| ids.contains(&child.entry.id()));

		if removed.is_empty() {
			return Vec::new();
		}

		let updated = list.with_children(kept);
		if !updated.all_loaded {
			self.adopt_absent(&updated, section, removed.iter().map(|child| child.name));
		}

		data.publish(updated);
		dir.touch(self.next_stamp());
		self.check_if_enabled(dir, data, section);

		trace!(dir = %dir.id(), removed = removed.len(), "Removed children");

		removed.into_iter().map(|child| child.entry).collect()
	}

	/// Adopts the names nothing in `list` answers to anymore. Adoption only spares the store
	/// a query later on, so a name that can't be resolved right now is left out.
	fn adopt_absent(
		&self,
		list: &ChildList,
		section: &mut DirectorySection,
		names: impl IntoIterator<Item = NameId>,
	) {
		for name_id in names {
			let absent = self
				.name_text(name_id)
				.and_then(|name| Ok(self.lookup(list, &name)?.is_none().then_some(name)));

			match absent {
				Ok(Some(name)) => {
					section.adopted.insert(&name);
				}
				Ok(None) => {}
				Err(e) => warn!(name = %name_id, ?e, "Couldn't adopt removed name"),
			}
		}
	}

	/// Switches the ordering policy of `dir`, re-sorting its children if it changed
	#[instrument(skip(self, dir), fields(dir = %dir.id()), err)]
	pub fn set_case_sensitivity(
		&self,
		dir: &Arc<Entry>,
		sensitivity: CaseSensitivity,
	) -> Result<(), Error> {
		let data = Self::directory(dir)?;
		let mut section = data.lock();
		Self::ensure_valid_directory(dir)?;

		section.case_probed = true;
		self.apply_case_sensitivity(dir, data, &mut section, sensitivity)?;

		Ok(())
	}

	fn apply_case_sensitivity(
		&self,
		dir: &Entry,
		data: &DirectoryData,
		section: &mut DirectorySection,
		sensitivity: CaseSensitivity,
	) -> Result<Arc<ChildList>, Error> {
		dir.replace_flags(
			EntryFlags::KIND_SPECIFIC_0 | EntryFlags::KIND_SPECIFIC_1,
			EntryFlags::for_case_sensitivity(sensitivity),
		);

		let list = data.snapshot();
		let case_sensitive = sensitivity.resolve(self.config.default_case_sensitive);
		if case_sensitive == list.case_sensitive {
			return Ok(list);
		}

		let mut named = list
			.children
			.iter()
			.map(|child| Ok((self.name_text(child.name)?, child.clone())))
			.collect::<Result<Vec<_>, Error>>()?;
		named.sort_by(|(left, _), (right, _)| storage_order(left, right, case_sensitive));

		for pair in named.windows(2) {
			warn_on_case_collision(&pair[0].0, &pair[1].0, case_sensitive);
		}

		section.adopted.set_case_sensitive(case_sensitive);

		data.publish(ChildList {
			children: named.into_iter().map(|(_, child)| child).collect(),
			case_sensitive,
			all_loaded: list.all_loaded,
		});
		dir.touch(self.next_stamp());

		debug!(dir = %dir.id(), case_sensitive, "Re-sorted children");
		self.check_if_enabled(dir, data, section);

		Ok(data.snapshot())
	}

	/// Mirrors a rename the store already performed
	pub fn rename(&self, entry: &Arc<Entry>, new_name: &str) -> Result<(), Error> {
		Self::ensure_valid_entry(entry)?;
		let name_id = self.intern(new_name)?;

		let Some(parent) = self.parent(entry) else {
			entry.set_name_id(name_id);
			entry.touch(self.next_stamp());
			return Ok(());
		};

		let data = Self::directory(&parent)?;
		let mut section = data.lock();
		Self::ensure_valid_directory(&parent)?;

		let list = data.snapshot();
		let Some(index) = list.position_of(entry.id()) else {
			entry.set_name_id(name_id);
			entry.touch(self.next_stamp());
			return Ok(());
		};

		// A single publish takes the entry from its old position to the new one
		let mut others = list.children.to_vec();
		let previous = others.remove(index).name;
		let base = list.with_children(others);

		self.insert_locked(
			&parent,
			data,
			&mut section,
			&base,
			Child::new(name_id, Arc::clone(entry)),
			Conflict::ReplaceExisting,
		)?;
		entry.set_name_id(name_id);
		entry.touch(self.next_stamp());

		if !base.all_loaded {
			self.adopt_absent(&data.snapshot(), &mut section, [previous]);
		}

		trace!(entry = %entry.id(), name = %new_name, "Renamed");

		Ok(())
	}

	/// Mirrors a move the store already performed. Both directories are locked in id order,
	/// and the entry only leaves its old parent once it sits in the new one.
	pub fn move_entry(&self, entry: &Arc<Entry>, new_parent: &Arc<Entry>) -> Result<(), Error> {
		Self::ensure_valid_entry(entry)?;
		let target = Self::directory(new_parent)?;
		Self::ensure_valid_directory(new_parent)?;

		let old_parent = self.parent(entry);
		let source = match &old_parent {
			Some(parent) if parent.id() == new_parent.id() => return Ok(()),
			Some(parent) if parent.is_valid() => Some((parent, Self::directory(parent)?)),
			_ => None,
		};

		let (mut source_section, mut target_section) = match source {
			Some((parent, data)) if parent.id() < new_parent.id() => {
				let source_section = data.lock();
				(Some(source_section), target.lock())
			}
			Some((_, data)) => {
				let target_section = target.lock();
				(Some(data.lock()), target_section)
			}
			None => (None, target.lock()),
		};
		Self::ensure_valid_directory(new_parent)?;

		self.insert_locked(
			new_parent,
			target,
			&mut target_section,
			&target.snapshot(),
			Child::new(entry.name_id(), Arc::clone(entry)),
			Conflict::ReplaceExisting,
		)?;

		if let (Some((parent, data)), Some(section)) = (source, source_section.as_mut()) {
			self.remove_locked(parent, data, section, &[entry.id()]);
		}

		entry.set_parent(new_parent.id());
		entry.set_flags(
			EntryFlags::HAS_SYMLINK_PARENT,
			new_parent
				.flags()
				.intersects(EntryFlags::SYMLINK | EntryFlags::HAS_SYMLINK_PARENT),
		);

		trace!(entry = %entry.id(), parent = %new_parent.id(), "Moved");

		Ok(())
	}

	/// Removes `entry` from its parent, then invalidates it and everything cached below it
	#[instrument(skip(self, entry), fields(entry = %entry.id()), err)]
	pub fn delete(&self, entry: &Arc<Entry>, reason: &str) -> Result<(), Error> {
		if let Some(parent) = self.parent(entry) {
			if parent.is_valid() {
				self.remove_children(&parent, &[entry.id()])?;
			}
		}
		self.roots.remove(&entry.id());

		let mut invalidated = 0usize;
		let mut pending = vec![Arc::clone(entry)];
		while let Some(entry) = pending.pop() {
			if entry.invalidate(reason, self.config.track_invalidation) {
				invalidated += 1;
			}
			if let Some(data) = entry.directory() {
				pending.extend(data.snapshot().entries());
			}
		}

		debug!(invalidated, "Deleted");

		Ok(())
	}

	/// Applies attributes the store reported for `entry`. A change of kind can't be applied
	/// in place, the entry is handed to the refresh scheduler instead.
	pub fn update_attributes(
		&self,
		entry: &Arc<Entry>,
		attributes: AttributeBits,
	) -> Result<(), Error> {
		Self::ensure_valid_entry(entry)?;

		if attributes.is_directory() != entry.is_directory() {
			self.request_refresh(entry.id());
			return Ok(());
		}

		let mut mask = EntryFlags::WRITABLE | EntryFlags::HIDDEN | EntryFlags::SYMLINK;
		if !entry.is_directory() {
			mask |= EntryFlags::KIND_SPECIFIC_0;
		}
		entry.replace_flags(mask, EntryFlags::from_store(attributes) & mask);
		entry.touch(self.next_stamp());

		let sensitivity = CaseSensitivity::from_store(attributes);
		if entry.is_directory()
			&& !matches!(sensitivity, CaseSensitivity::Unknown)
			&& sensitivity != Self::case_sensitivity(entry)
		{
			self.set_case_sensitivity(entry, sensitivity)?;
		}

		Ok(())
	}

	pub fn mark_indexed(&self, entry: &Entry, indexed: bool) {
		let previous = entry.set_flags(EntryFlags::INDEXED, indexed);
		if previous.contains(EntryFlags::INDEXED) != indexed {
			entry.touch(self.next_stamp());
		}
	}

	/// Marks `entry` dirty, and its ancestors with it until one already was
	pub fn mark_dirty(&self, entry: &Arc<Entry>) {
		let mut current = Some(Arc::clone(entry));

		while let Some(entry) = current {
			if entry
				.set_flags(EntryFlags::DIRTY, true)
				.contains(EntryFlags::DIRTY)
			{
				break;
			}
			current = self.parent(&entry);
		}
	}

	/// Checks the ordering invariants of `dir`
	pub fn verify(&self, dir: &Arc<Entry>) -> Result<(), Error> {
		let data = Self::directory(dir)?;
		let section = data.lock();

		self.verify_locked(dir, data, &section)
	}

	fn verify_locked(
		&self,
		dir: &Entry,
		data: &DirectoryData,
		section: &DirectorySection,
	) -> Result<(), Error> {
		let list = data.snapshot();
		let names = list
			.children
			.iter()
			.map(|child| self.name_text(child.name))
			.collect::<Result<Vec<_>, Error>>()?;
		let children = list
			.children
			.iter()
			.zip(&names)
			.map(|(child, name)| (child.entry.id(), &**name))
			.collect::<Vec<_>>();

		check_children(dir.id(), &children, list.case_sensitive, &section.adopted)?;

		Ok(())
	}

	/// A broken directory index is a defect, not something callers can recover from
	fn check_if_enabled(&self, dir: &Entry, data: &DirectoryData, section: &DirectorySection) {
		if !self.config.check_consistency {
			return;
		}

		match self.verify_locked(dir, data, section) {
			Ok(()) => {}
			Err(Error::Consistency(violation)) => {
				error!(dir = %dir.id(), %violation, "Directory index is corrupted");
				panic!("{violation}");
			}
			Err(e) => warn!(dir = %dir.id(), ?e, "Couldn't verify directory"),
		}
	}

	/// Drops index slots of entries nothing references anymore
	pub fn prune(&self) -> usize {
		let pruned = self.entries.prune();
		debug!(pruned, remaining = self.entries.len(), "Pruned entry index");
		pruned
	}

	/// Forgets every cached name; entries keep their ids and resolve again on demand
	pub fn drop_name_cache(&self) {
		self.names.drop_all();
		debug!("Dropped name cache");
	}

	/// Whether the store disagrees with `entry` about its existence or kind
	fn is_stale(&self, entry: &Entry) -> bool {
		if self.store.is_deleted(entry.id()) {
			return true;
		}

		match self.store.attributes(entry.id()) {
			Ok(attributes) => attributes.is_directory() != entry.is_directory(),
			Err(e) => {
				warn!(entry = %entry.id(), ?e, "Couldn't read attributes, assuming stale");
				true
			}
		}
	}

	fn request_refresh(&self, id: FileId) {
		match &self.refresh {
			Some(scheduler) => {
				debug!(entry = %id, "Scheduling refresh");
				scheduler.schedule_refresh(id);
			}
			None => trace!(entry = %id, "No refresh scheduler, skipping refresh"),
		}
	}
}

/// Strips surrounding separators. Anything left with a separator inside is a path, not a name.
fn canonical_name(name: &str) -> Result<&str, InvalidNameError> {
	let trimmed = name.trim_matches(is_separator);

	if trimmed.contains(is_separator) {
		return Err(InvalidNameError::ContainsSeparator(name.to_string()));
	}

	Ok(trimmed)
}
