//! Child name ordering.
//!
//! Names compare by length first and then character by character, folding case per character
//! when the directory is case-insensitive. Folding one character at a time keeps the length
//! stable, so the order stays a strict total order even where full-string case mapping is not
//! bijective.

use std::{borrow::Cow, cmp::Ordering};

use tracing::warn;

/// Folds a single character to a case-insensitive representative. Characters whose case
/// mapping expands to several characters are kept as they are.
pub(crate) fn fold_char(c: char) -> char {
	if c.is_ascii() {
		return c.to_ascii_lowercase();
	}

	let mut upper = c.to_uppercase();
	let upper = match (upper.next(), upper.next()) {
		(Some(u), None) => u,
		_ => c,
	};

	let mut lower = upper.to_lowercase();
	match (lower.next(), lower.next()) {
		(Some(l), None) => l,
		_ => upper,
	}
}

pub(crate) fn fold_name(name: &str) -> Cow<'_, str> {
	if name.chars().all(|c| fold_char(c) == c) {
		Cow::Borrowed(name)
	} else {
		Cow::Owned(name.chars().map(fold_char).collect())
	}
}

/// Lookup order of a directory's children
#[must_use]
pub fn compare_names(left: &str, right: &str, case_sensitive: bool) -> Ordering {
	if case_sensitive {
		return left.len().cmp(&right.len()).then_with(|| left.cmp(right));
	}

	left.chars()
		.count()
		.cmp(&right.chars().count())
		.then_with(|| left.chars().map(fold_char).cmp(right.chars().map(fold_char)))
}

#[must_use]
pub fn names_equal(left: &str, right: &str, case_sensitive: bool) -> bool {
	compare_names(left, right, case_sensitive) == Ordering::Equal
}

/// Storage order: the lookup order, with a case-sensitive tiebreak for names that only differ
/// in case. Two such children should not coexist in a case-insensitive directory, but the store
/// can still report them (e.g. a case-sensitive directory whose sensitivity was misdetected).
/// We keep both, ordered deterministically.
pub(crate) fn storage_order(left: &str, right: &str, case_sensitive: bool) -> Ordering {
	compare_names(left, right, case_sensitive).then_with(|| left.cmp(right))
}

/// Logs when two distinct names collide under the current ordering.
/// Returns whether they did.
// TODO: decide whether such collisions should be rejected outright once we know which
// filesystems actually produce them
pub(crate) fn warn_on_case_collision(existing: &str, incoming: &str, case_sensitive: bool) -> bool {
	let collides = existing != incoming && names_equal(existing, incoming, case_sensitive);

	if collides {
		warn!(
			%existing,
			%incoming,
			"Names only differ in case inside a case-insensitive directory, ordering them case-sensitively"
		);
	}

	collides
}
