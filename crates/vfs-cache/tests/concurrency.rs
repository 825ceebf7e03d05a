use std::{
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Barrier,
	},
	thread,
};

use sd_vfs_cache::AttributeBits;
use tracing_test::traced_test;

mod common;

use common::{Fixture, SENSITIVE};

const THREADS: usize = 16;

#[test]
#[traced_test]
fn concurrent_misses_collapse_into_one_store_query() {
	let fixture = Fixture::new(SENSITIVE);
	let id = fixture.create(fixture.root.id(), "shared", AttributeBits::empty());
	fixture.store.reset_calls();

	let barrier = Barrier::new(THREADS);
	let found = thread::scope(|scope| {
		let handles = (0..THREADS)
			.map(|_| {
				scope.spawn(|| {
					barrier.wait();
					fixture.find(&fixture.root, "shared").expect("exists")
				})
			})
			.collect::<Vec<_>>();

		handles
			.into_iter()
			.map(|handle| handle.join().unwrap())
			.collect::<Vec<_>>()
	});

	assert_eq!(fixture.store.calls().find_child_record, 1);
	assert!(found.iter().all(|entry| entry.id() == id));
	assert!(found.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn concurrent_misses_for_absent_names_adopt_once() {
	let fixture = Fixture::new(SENSITIVE);
	fixture.store.reset_calls();

	let barrier = Barrier::new(THREADS);
	thread::scope(|scope| {
		for _ in 0..THREADS {
			scope.spawn(|| {
				barrier.wait();
				assert!(fixture.find(&fixture.root, "ghost").is_none());
			});
		}
	});

	assert_eq!(fixture.store.calls().find_child_record, 1);
	assert_eq!(fixture.cache.adopted_names(&fixture.root).unwrap(), ["ghost"]);
}

#[test]
fn readers_always_see_published_children_while_a_writer_merges() {
	let fixture = Fixture::new(SENSITIVE);
	let stable = fixture.create(fixture.root.id(), "stable", AttributeBits::empty());
	fixture.find(&fixture.root, "stable").unwrap();

	let names = (0..200).map(|i| format!("file-{i:03}")).collect::<Vec<_>>();
	for name in &names {
		fixture.create(fixture.root.id(), name, AttributeBits::empty());
	}

	thread::scope(|scope| {
		for _ in 0..4 {
			scope.spawn(|| {
				for _ in 0..500 {
					let entry = fixture
						.find(&fixture.root, "stable")
						.expect("never disappears");
					assert_eq!(entry.id(), stable);
				}
			});
		}

		scope.spawn(|| {
			for chunk in names.chunks(20) {
				let records = chunk
					.iter()
					.map(|name| fixture.record(fixture.root.id(), name))
					.collect();
				fixture
					.cache
					.create_and_add_children(&fixture.root, records, false)
					.unwrap();
			}
		});
	});

	assert_eq!(fixture.cache.cached_children(&fixture.root).unwrap().len(), 201);
	assert!(fixture.cache.verify(&fixture.root).is_ok());
}

#[test]
fn distinct_names_load_in_parallel() {
	let fixture = Fixture::new(SENSITIVE);
	let names = (0..THREADS).map(|i| format!("n{i}")).collect::<Vec<_>>();
	for name in &names {
		fixture.create(fixture.root.id(), name, AttributeBits::empty());
	}

	thread::scope(|scope| {
		for name in &names {
			let fixture = &fixture;
			scope.spawn(move || {
				assert!(fixture.find(&fixture.root, name).is_some());
			});
		}
	});

	assert_eq!(fixture.names(&fixture.root).len(), THREADS);
	assert!(fixture.cache.verify(&fixture.root).is_ok());
}

#[test]
fn renames_never_hide_siblings_from_readers() {
	let fixture = Fixture::new(SENSITIVE);
	let names = (0..63).map(|i| format!("n{i:02}")).collect::<Vec<_>>();
	for name in &names {
		fixture.create(fixture.root.id(), name, AttributeBits::empty());
	}
	fixture.cache.children(&fixture.root).unwrap();
	let flipping = fixture.find(&fixture.root, "n31").unwrap();
	let done = AtomicBool::new(false);

	thread::scope(|scope| {
		for _ in 0..4 {
			scope.spawn(|| {
				while !done.load(Ordering::Acquire) {
					for name in ["n00", "n30", "n40", "n62"] {
						assert!(
							fixture.find(&fixture.root, name).is_some(),
							"{name} went missing"
						);
					}
				}
			});
		}

		scope.spawn(|| {
			for round in 0..2_000 {
				let name = if round % 2 == 0 { "zzzz" } else { "n31" };
				fixture.store.rename(flipping.id(), name).unwrap();
				fixture.cache.rename(&flipping, name).unwrap();
			}
			done.store(true, Ordering::Release);
		});
	});

	assert_eq!(&*fixture.cache.name(&flipping).unwrap(), "n31");
	assert_eq!(fixture.names(&fixture.root), names);
	assert!(fixture.cache.verify(&fixture.root).is_ok());
}
