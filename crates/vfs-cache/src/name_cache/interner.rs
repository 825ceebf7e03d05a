use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

use tracing::trace;

use crate::{config::NameCacheConfig, error::InvalidNameError};

use super::{DirectMappedCache, InternedName, NameCache, NameId, ShardedNameCache};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NameInternerStats {
	pub hits: u64,
	pub misses: u64,
	pub cached: usize,
}

/// Front door of name interning: validates names, asks the store for ids and keeps the
/// id -> text mapping warm in a bounded [`NameCache`].
pub struct NameInterner {
	cache: Box<dyn NameCache>,
	hits: AtomicU64,
	misses: AtomicU64,
}

impl NameInterner {
	#[must_use]
	pub fn new(config: &NameCacheConfig) -> Self {
		let sharded = ShardedNameCache::new(
			config.shards,
			config.shard_capacity,
			config.protected_percent,
		);

		let cache: Box<dyn NameCache> = if config.l1_slots == 0 {
			Box::new(sharded)
		} else {
			Box::new(DirectMappedCache::new(sharded, config.l1_slots))
		};

		Self::with_cache(cache)
	}

	#[must_use]
	pub fn with_cache(cache: Box<dyn NameCache>) -> Self {
		Self {
			cache,
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
		}
	}

	/// Interns a single-segment name. `enumerate` maps the text to its persistent id,
	/// creating one if needed.
	pub fn store<E>(
		&self,
		name: &str,
		enumerate: impl FnOnce(&str) -> Result<NameId, E>,
	) -> Result<NameId, E>
	where
		E: From<InvalidNameError>,
	{
		validate_simple_name(name)?;

		let id = enumerate(name)?;
		self.cache.put(id, InternedName::from(name));

		Ok(id)
	}

	/// Returns the text of `id`, computing and caching it on a miss
	pub fn resolve<E>(
		&self,
		id: NameId,
		compute: impl FnOnce(NameId) -> Result<String, E>,
	) -> Result<InternedName, E> {
		if let Some(name) = self.cache.get(id) {
			self.hits.fetch_add(1, Ordering::Relaxed);
			return Ok(name);
		}

		self.misses.fetch_add(1, Ordering::Relaxed);
		trace!(%id, "Name cache miss");

		let name = InternedName::from(compute(id)?);
		self.cache.put(id, Arc::clone(&name));

		Ok(name)
	}

	/// Forgets every cached name, used after a global invalidation
	pub fn drop_all(&self) {
		self.cache.clear();
	}

	pub fn stats(&self) -> NameInternerStats {
		NameInternerStats {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			cached: self.cache.len(),
		}
	}
}

/// A simple name is one path segment. A lone separator is accepted because that is
/// what a unix root is called.
pub(crate) fn validate_simple_name(name: &str) -> Result<(), InvalidNameError> {
	if name.is_empty() {
		return Err(InvalidNameError::Empty);
	}

	if name.len() > 1 && name.contains(is_separator) {
		return Err(InvalidNameError::ContainsSeparator(name.to_string()));
	}

	Ok(())
}

pub(crate) const fn is_separator(c: char) -> bool {
	matches!(c, '/' | '\\')
}
