use std::sync::Arc;

use sd_vfs_cache::{AttributeBits, CaseSensitivity};
use tracing_test::traced_test;

mod common;

use common::{config, Fixture, INSENSITIVE, SENSITIVE, UNKNOWN};

#[test]
#[traced_test]
fn cold_lookup_then_hit_through_nested_directories() {
	let fixture = Fixture::new(SENSITIVE);
	let docs = fixture.create(fixture.root.id(), "docs", SENSITIVE);
	let file = fixture.create(docs, "notes.md", AttributeBits::WRITABLE);
	fixture.store.reset_calls();

	let docs_entry = fixture.find(&fixture.root, "docs").expect("docs exists");
	let entry = fixture.find(&docs_entry, "notes.md").expect("notes exist");
	assert_eq!(entry.id(), file);
	assert_eq!(fixture.store.calls().find_child_record, 2);
	assert_eq!(fixture.cache.path(&entry).unwrap(), "/docs/notes.md");

	fixture.store.reset_calls();
	let again = fixture.find(&docs_entry, "notes.md").unwrap();
	assert!(Arc::ptr_eq(&entry, &again));
	assert_eq!(fixture.store.calls().child_queries(), 0);
}

#[test]
fn fully_loaded_directories_answer_misses_without_the_store() {
	let fixture = Fixture::new(SENSITIVE);
	for name in ["a", "b", "c"] {
		fixture.create(fixture.root.id(), name, AttributeBits::empty());
	}
	fixture.cache.children(&fixture.root).unwrap();
	fixture.store.reset_calls();

	for _ in 0..3 {
		assert!(fixture.find(&fixture.root, "missing").is_none());
	}

	assert_eq!(fixture.store.calls().child_queries(), 0);
	assert!(fixture.cache.adopted_names(&fixture.root).unwrap().is_empty());
}

#[test]
fn adopted_name_is_resurrected_by_a_batch() {
	let fixture = Fixture::new(SENSITIVE);

	assert!(fixture.find(&fixture.root, "later").is_none());
	assert_eq!(fixture.cache.adopted_names(&fixture.root).unwrap(), ["later"]);

	fixture.create(fixture.root.id(), "later", AttributeBits::empty());
	let record = fixture.record(fixture.root.id(), "later");
	let added = fixture
		.cache
		.create_and_add_children(&fixture.root, vec![record], false)
		.unwrap();

	assert_eq!(added.len(), 1);
	assert!(fixture.cache.adopted_names(&fixture.root).unwrap().is_empty());
	assert_eq!(
		fixture.find(&fixture.root, "later").map(|entry| entry.id()),
		Some(record.id)
	);
	assert!(fixture.cache.verify(&fixture.root).is_ok());
}

#[test]
#[traced_test]
fn bulk_merge_interleaves_without_touching_cached_children() {
	let fixture = Fixture::new(SENSITIVE);
	for name in ["a", "b", "c", "d", "e"] {
		fixture.create(fixture.root.id(), name, AttributeBits::empty());
	}
	let b = fixture.find(&fixture.root, "b").unwrap();
	let d = fixture.find(&fixture.root, "d").unwrap();
	assert_eq!(fixture.names(&fixture.root), ["b", "d"]);

	let batch = ["e", "a", "c"]
		.map(|name| fixture.record(fixture.root.id(), name))
		.to_vec();
	let added = fixture
		.cache
		.create_and_add_children(&fixture.root, batch, false)
		.unwrap();

	assert_eq!(added.len(), 3);
	assert_eq!(fixture.names(&fixture.root), ["a", "b", "c", "d", "e"]);

	let children = fixture.cache.cached_children(&fixture.root).unwrap();
	assert!(Arc::ptr_eq(&children[1], &b));
	assert!(Arc::ptr_eq(&children[3], &d));
}

#[test]
#[traced_test]
fn batches_skip_present_ids_and_inner_duplicates() {
	let fixture = Fixture::new(SENSITIVE);
	for name in ["x", "y"] {
		fixture.create(fixture.root.id(), name, AttributeBits::empty());
	}
	fixture.find(&fixture.root, "x").unwrap();

	let x = fixture.record(fixture.root.id(), "x");
	let y = fixture.record(fixture.root.id(), "y");
	let added = fixture
		.cache
		.create_and_add_children(&fixture.root, vec![x, y, y], true)
		.unwrap();

	assert_eq!(added.iter().map(|entry| entry.id()).collect::<Vec<_>>(), [y.id]);
	assert_eq!(fixture.names(&fixture.root), ["x", "y"]);
	assert!(fixture.cache.all_children_loaded(&fixture.root).unwrap());
	assert!(logs_contain("Dropping duplicate name in batch"));
}

#[test]
fn case_insensitive_directory_resolves_variants_to_one_entry() {
	let fixture = Fixture::new(INSENSITIVE);
	fixture.create(fixture.root.id(), "Makefile", AttributeBits::empty());

	let first = fixture.find(&fixture.root, "Makefile").unwrap();
	let second = fixture.find(&fixture.root, "MAKEFILE").unwrap();
	let third = fixture.find(&fixture.root, "makefile").unwrap();

	assert!(Arc::ptr_eq(&first, &second));
	assert!(Arc::ptr_eq(&first, &third));
	assert_eq!(fixture.names(&fixture.root), ["Makefile"]);
	assert_eq!(fixture.store.calls().find_child_record, 1);
}

#[test]
#[traced_test]
fn case_collisions_are_kept_in_a_deterministic_order() {
	// The store itself doesn't know the policy and compares exactly, the cache defaults to
	// case-insensitive ordering
	let fixture = Fixture::with_config(UNKNOWN, config(false));
	let upper = fixture.create(fixture.root.id(), "README", AttributeBits::empty());
	let lower = fixture.create(fixture.root.id(), "readme", AttributeBits::empty());

	fixture.cache.children(&fixture.root).unwrap();

	assert_eq!(fixture.names(&fixture.root), ["README", "readme"]);
	assert!(logs_contain("only differ in case"));
	assert!(fixture.cache.verify(&fixture.root).is_ok());

	let found = fixture.find(&fixture.root, "ReadMe").unwrap();
	assert!(found.id() == upper || found.id() == lower);
}

#[test]
fn becoming_case_sensitive_forgets_adopted_names() {
	let fixture = Fixture::with_config(UNKNOWN, config(false));
	fixture.create(fixture.root.id(), "b", AttributeBits::empty());
	fixture.find(&fixture.root, "b").unwrap();
	assert!(fixture.find(&fixture.root, "Missing").is_none());
	assert_eq!(fixture.cache.adopted_names(&fixture.root).unwrap(), ["missing"]);

	fixture
		.cache
		.set_case_sensitivity(&fixture.root, CaseSensitivity::Sensitive)
		.unwrap();

	assert!(fixture.cache.adopted_names(&fixture.root).unwrap().is_empty());
	assert!(fixture.cache.verify(&fixture.root).is_ok());
	assert!(fixture.find(&fixture.root, "B").is_none());
	assert!(fixture.find(&fixture.root, "b").is_some());
}

#[test]
fn children_merges_with_what_was_cached() {
	let fixture = Fixture::new(SENSITIVE);
	let ids = ["one", "two", "three"]
		.map(|name| fixture.create(fixture.root.id(), name, AttributeBits::empty()));
	let two = fixture.find(&fixture.root, "two").unwrap();

	let children = fixture.cache.children(&fixture.root).unwrap();

	assert_eq!(children.len(), 3);
	assert!(children.iter().any(|child| Arc::ptr_eq(child, &two)));
	assert_eq!(fixture.names(&fixture.root), ["one", "two", "three"]);
	for id in ids {
		assert!(fixture
			.cache
			.cached_child_by_id(&fixture.root, id)
			.unwrap()
			.is_some());
	}
}

#[test]
fn modification_stamps_grow() {
	let fixture = Fixture::new(SENSITIVE);
	fixture.create(fixture.root.id(), "a", AttributeBits::empty());
	let before = fixture.root.modification_stamp();

	let child = fixture.find(&fixture.root, "a").unwrap();

	assert!(fixture.root.modification_stamp() > before);
	assert!(child.modification_stamp() > before);
}

#[test]
#[traced_test]
fn replaced_records_are_refreshed_whatever_the_batch_size() {
	for siblings in [&[][..], &["y"][..], &["w", "y", "z"][..]] {
		let (fixture, scheduler) = Fixture::with_scheduler(SENSITIVE);
		let root_id = fixture.root.id();
		let stale = fixture.create(root_id, "x", AttributeBits::empty());
		let cached = fixture.find(&fixture.root, "x").unwrap();

		fixture.store.delete(stale).unwrap();
		let replacement = fixture.create(root_id, "x", AttributeBits::empty());
		for name in siblings {
			fixture.create(root_id, name, AttributeBits::empty());
		}

		fixture.cache.children(&fixture.root).unwrap();

		assert_eq!(scheduler.requested(), [stale], "siblings: {siblings:?}");
		assert_ne!(stale, replacement);
		assert!(Arc::ptr_eq(&fixture.find(&fixture.root, "x").unwrap(), &cached));
		assert_eq!(fixture.names(&fixture.root).len(), siblings.len() + 1);
	}

	assert!(logs_contain("Two records share a name"));
}
