use std::cmp::Ordering;

/// Result of merging an incoming sorted run into an existing one
pub(crate) struct Merged<T> {
	pub items: Vec<T>,
	/// Incoming items that compared equal to an item already present and were dropped,
	/// each with the index in `items` of the one that stayed
	pub rejected: Vec<(usize, T)>,
}

/// Interleaves two runs sorted by `order` in a single pass. The existing run is never
/// re-sorted; on a tie the existing item wins and the incoming one is rejected.
pub(crate) fn merge_sorted_runs<T>(
	existing: impl IntoIterator<Item = T>,
	incoming: impl IntoIterator<Item = T>,
	mut order: impl FnMut(&T, &T) -> Ordering,
) -> Merged<T> {
	let mut existing = existing.into_iter().peekable();
	let mut incoming = incoming.into_iter().peekable();

	let (existing_len, _) = existing.size_hint();
	let (incoming_len, _) = incoming.size_hint();
	let mut items = Vec::with_capacity(existing_len + incoming_len);
	let mut rejected = Vec::new();

	loop {
		let next = match (existing.peek(), incoming.peek()) {
			(Some(left), Some(right)) => order(left, right),
			(Some(_), None) => Ordering::Less,
			(None, Some(_)) => Ordering::Greater,
			(None, None) => break,
		};

		match next {
			Ordering::Less => items.extend(existing.next()),
			Ordering::Greater => items.extend(incoming.next()),
			Ordering::Equal => {
				items.extend(existing.next());
				let kept = items.len() - 1;
				rejected.extend(incoming.next().map(|item| (kept, item)));
			}
		}
	}

	Merged { items, rejected }
}

/// Sorts a batch and drops later duplicates inside it, returning them
pub(crate) fn sort_batch<T>(
	batch: &mut Vec<T>,
	mut order: impl FnMut(&T, &T) -> Ordering,
) -> Vec<T> {
	batch.sort_by(&mut order);

	let mut duplicates = Vec::new();
	let mut kept: Vec<T> = Vec::with_capacity(batch.len());
	for item in batch.drain(..) {
		match kept.last() {
			Some(last) if order(last, &item) == Ordering::Equal => duplicates.push(item),
			_ => kept.push(item),
		}
	}
	*batch = kept;

	duplicates
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_interleaves_runs() {
		let merged = merge_sorted_runs(["b", "d"], ["a", "c", "e"], |l, r| l.cmp(r));
		assert_eq!(merged.items, ["a", "b", "c", "d", "e"]);
		assert!(merged.rejected.is_empty());
	}

	#[test]
	fn test_existing_wins_ties() {
		let merged = merge_sorted_runs(
			[("a", 1), ("c", 1)],
			[("a", 2), ("b", 2)],
			|l, r| l.0.cmp(r.0),
		);
		assert_eq!(merged.items, [("a", 1), ("b", 2), ("c", 1)]);
		assert_eq!(merged.rejected, [(0, ("a", 2))]);
	}

	#[test]
	fn test_empty_sides() {
		let merged = merge_sorted_runs(Vec::<u8>::new(), vec![1, 2], Ord::cmp);
		assert_eq!(merged.items, [1, 2]);

		let merged = merge_sorted_runs(vec![1, 2], Vec::<u8>::new(), Ord::cmp);
		assert_eq!(merged.items, [1, 2]);
	}

	#[test]
	fn test_sort_batch_drops_duplicates() {
		let mut batch = vec![("c", 1), ("a", 2), ("c", 3)];
		let duplicates = sort_batch(&mut batch, |l, r| l.0.cmp(r.0));

		assert_eq!(batch, [("a", 2), ("c", 1)]);
		assert_eq!(duplicates, [("c", 3)]);
	}
}
