use std::{cmp::Ordering, collections::HashSet};

use crate::{entry::FileId, error::ConsistencyViolation};

use super::{storage_order, AdoptedNames};

/// Children must be strictly increasing in storage order, unique by id, and none of them
/// may also be an adopted name.
pub(crate) fn check_children(
	dir: FileId,
	children: &[(FileId, &str)],
	case_sensitive: bool,
	adopted: &AdoptedNames,
) -> Result<(), ConsistencyViolation> {
	for (index, pair) in children.windows(2).enumerate() {
		let ((_, left), (_, right)) = (pair[0], pair[1]);

		if storage_order(left, right, case_sensitive) != Ordering::Less {
			return Err(ConsistencyViolation::Unsorted {
				dir,
				index,
				left: left.to_string(),
				right: right.to_string(),
			});
		}
	}

	let mut seen = HashSet::with_capacity(children.len());
	for &(child, name) in children {
		if !seen.insert(child) {
			return Err(ConsistencyViolation::DuplicateChild { dir, child });
		}

		if adopted.contains(name) {
			return Err(ConsistencyViolation::AdoptedChild {
				dir,
				name: name.to_string(),
			});
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn id(raw: u32) -> FileId {
		FileId::new(raw).expect("non zero")
	}

	#[test]
	fn test_sorted_children_pass() {
		let children = [(id(1), "b"), (id(2), "aa"), (id(3), "ab")];
		assert!(check_children(id(9), &children, true, &AdoptedNames::new(true)).is_ok());
	}

	#[test]
	fn test_detects_misorder() {
		let children = [(id(1), "aa"), (id(2), "b")];
		assert!(matches!(
			check_children(id(9), &children, true, &AdoptedNames::new(true)),
			Err(ConsistencyViolation::Unsorted { index: 0, .. })
		));
	}

	#[test]
	fn test_detects_duplicates_and_double_presence() {
		let children = [(id(1), "a"), (id(1), "b")];
		assert!(matches!(
			check_children(id(9), &children, true, &AdoptedNames::new(true)),
			Err(ConsistencyViolation::DuplicateChild { .. })
		));

		let mut adopted = AdoptedNames::new(false);
		adopted.insert("A");
		let children = [(id(1), "a")];
		assert!(matches!(
			check_children(id(9), &children, false, &adopted),
			Err(ConsistencyViolation::AdoptedChild { .. })
		));
	}
}
