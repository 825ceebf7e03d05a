use std::collections::HashSet;

use super::order::fold_name;

/// Negative cache of a directory: names probed and confirmed absent.
/// In a case-insensitive directory names are kept folded, so case variants collapse.
#[derive(Debug, Default)]
pub(crate) struct AdoptedNames {
	case_sensitive: bool,
	names: HashSet<Box<str>>,
}

impl AdoptedNames {
	pub fn new(case_sensitive: bool) -> Self {
		Self {
			case_sensitive,
			names: HashSet::new(),
		}
	}

	fn key(&self, name: &str) -> Box<str> {
		if self.case_sensitive {
			name.into()
		} else {
			fold_name(name).into()
		}
	}

	pub fn insert(&mut self, name: &str) -> bool {
		let key = self.key(name);
		self.names.insert(key)
	}

	pub fn remove(&mut self, name: &str) -> bool {
		let key = self.key(name);
		self.names.remove(&key)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.names.contains(&self.key(name))
	}

	pub fn len(&self) -> usize {
		self.names.len()
	}

	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	pub fn clear(&mut self) {
		self.names.clear();
	}

	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.names.iter().map(AsRef::as_ref)
	}

	/// Switches policy, forgetting everything. An absence proven under one policy says nothing
	/// under the other one; the store will simply be asked again.
	pub fn set_case_sensitive(&mut self, case_sensitive: bool) {
		if self.case_sensitive != case_sensitive {
			self.case_sensitive = case_sensitive;
			self.names.clear();
		}
	}
}
