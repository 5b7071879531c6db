//! Readers querying the index while a writer flushes and commits.

use memindex::index::{DocIdAndFeatures, FieldIndex, FieldIndexConfig, IndexInserter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const NUM_WORDS: u32 = 50;
const ROUNDS: u32 = 40;

fn word(i: u32) -> String {
    format!("w{:03}", i)
}

#[test]
fn test_readers_see_complete_lists() {
    let index = FieldIndex::new(FieldIndexConfig {
        offset_bits: 20,
        initial_buffer_entries: 256,
        max_buffer_entries: 4096,
        ..Default::default()
    })
    .unwrap();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for reader in 0..4u32 {
            let index = &index;
            let done = &done;
            s.spawn(move || {
                let mut i = reader;
                while !done.load(Ordering::Acquire) {
                    // the view carries its own generation guard
                    if let Some(view) = index.find(&word(i % NUM_WORDS)) {
                        // documents are added in rounds 1, 2, 3, ... so a
                        // complete list is always 1..=len
                        let docs: Vec<u32> = view.doc_ids().collect();
                        let expected: Vec<u32> = (1..=docs.len() as u32).collect();
                        assert_eq!(docs, expected);
                        for doc_id in docs {
                            let features = view.features(doc_id).unwrap();
                            assert_eq!(features[0].positions, vec![doc_id]);
                        }
                    }
                    i = i.wrapping_add(7);
                }
            });
        }

        s.spawn(|| {
            let mut inserter = index.inserter();
            for round in 1..=ROUNDS {
                inserter.rewind();
                for i in 0..NUM_WORDS {
                    inserter.set_next_word(&word(i));
                    inserter.add(
                        round,
                        &DocIdAndFeatures::with_positions(round, vec![round], round + 1),
                    );
                }
                inserter.flush();
                inserter.commit();
            }
            done.store(true, Ordering::Release);
        });
    });

    assert_eq!(index.num_words(), NUM_WORDS as usize);
    for i in 0..NUM_WORDS {
        assert_eq!(index.doc_freq(&word(i)), ROUNDS as usize);
    }
    assert_eq!(index.generation_handler().reader_count(), 0);
}

#[test]
fn test_guard_delays_reclaim() {
    let index = FieldIndex::new(FieldIndexConfig::default()).unwrap();
    let mut inserter = index.inserter();
    inserter.set_next_word("a");
    inserter.add(1, &DocIdAndFeatures::with_positions(1, vec![0], 1));
    inserter.flush();
    inserter.commit();

    let guard = index.take_generation_guard();
    let old = index.find("a").unwrap();

    inserter.rewind();
    inserter.set_next_word("a");
    inserter.remove(1);
    inserter.add(1, &DocIdAndFeatures::with_positions(1, vec![5], 6));
    inserter.flush();
    inserter.commit();
    inserter.commit();

    // the old list and its features are still on hold for the guard
    assert!(index.stats().features.allocated_bytes_on_hold > 0);
    assert_eq!(old.features(1).unwrap()[0].positions, vec![0]);
    assert_eq!(index.find("a").unwrap().features(1).unwrap()[0].positions, vec![5]);

    drop(guard);
    inserter.commit();
    // the view still pins its generation
    assert!(index.stats().features.allocated_bytes_on_hold > 0);
    drop(old);
    inserter.commit();
    assert_eq!(index.stats().features.allocated_bytes_on_hold, 0);
}

#[test]
fn test_readers_survive_buffer_reuse() {
    let index = FieldIndex::new(FieldIndexConfig {
        offset_bits: 22,
        initial_buffer_entries: 16,
        max_buffer_entries: 16,
        ..Default::default()
    })
    .unwrap();
    {
        let mut inserter = index.inserter();
        inserter.set_next_word("hot");
        inserter.add(1, &DocIdAndFeatures::with_positions(1, vec![0, 1], 2));
        inserter.flush();
        inserter.commit();
    }
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for _ in 0..3 {
            let index = &index;
            let done = &done;
            s.spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let view = index.find("hot").unwrap();
                    let features = view.features(1).unwrap();
                    // both positions are written from the same round
                    assert_eq!(features[0].positions[0] + 1, features[0].positions[1]);
                    assert_eq!(view.get(1).unwrap().data.num_occs(), 2);
                }
            });
        }

        s.spawn(|| {
            let mut inserter = index.inserter();
            for round in 1..=2000u32 {
                inserter.rewind();
                inserter.set_next_word("hot");
                inserter.remove(1);
                inserter.add(
                    1,
                    &DocIdAndFeatures::with_positions(1, vec![round, round + 1], round + 2),
                );
                inserter.flush();
                inserter.commit();
            }
            done.store(true, Ordering::Release);
        });
    });

    let view = index.find("hot").unwrap();
    assert_eq!(view.features(1).unwrap()[0].positions, vec![2000, 2001]);
    assert_eq!(index.generation_handler().reader_count(), 1);
}
