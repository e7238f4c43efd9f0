//! Property-based tests (fuzzing) for the chunk codec, the cloud storage
//! adapter and collection validation.
//!
//! Uses proptest to generate random values, limits and malformed documents
//! and verify round-trips hold and validation never panics.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::HashMap;
use std::sync::Arc;
use proptest::prelude::*;
use serde_json::{json, Value};

use finance_sync::chunking::{char_len, chunk_count, join, split};
use finance_sync::{BoundedStore, Collection, MemoryBridge, sanitize_all};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Text mixing ASCII with multi-byte characters so fragment boundaries land
/// inside UTF-8 sequences if the codec counted bytes.
fn mixed_text_strategy(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            4 => prop::char::range('a', 'z'),
            1 => Just('ё'),
            1 => Just('₸'),
            1 => Just('🧾'),
        ],
        1..max_len,
    )
    .prop_map(|chars| chars.into_iter().collect())
}

/// Arbitrary JSON values (including wrong shapes for every collection)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        any::<f64>().prop_map(|f| serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,   // depth
        64,  // max nodes
        10,  // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map("[a-z]{0,8}", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn indexed(fragments: &[&str]) -> HashMap<usize, String> {
    fragments
        .iter()
        .enumerate()
        .map(|(i, f)| (i, (*f).to_string()))
        .collect()
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// =============================================================================
// Chunk codec
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn fuzz_split_join_round_trip(text in mixed_text_strategy(600), limit in 1usize..64) {
        let fragments = split(&text, limit);
        prop_assert_eq!(fragments.len(), chunk_count(char_len(&text), limit));
        prop_assert_eq!(join(&indexed(&fragments), fragments.len()).unwrap(), text);
    }

    #[test]
    fn fuzz_fragments_respect_limit(text in mixed_text_strategy(600), limit in 1usize..64) {
        let fragments = split(&text, limit);
        for fragment in &fragments {
            prop_assert!(!fragment.is_empty());
            prop_assert!(char_len(fragment) <= limit);
        }
        // Only the last fragment may be short
        for fragment in fragments.iter().rev().skip(1) {
            prop_assert_eq!(char_len(fragment), limit);
        }
    }

    #[test]
    fn fuzz_join_reports_first_missing_fragment(
        text in mixed_text_strategy(300),
        limit in 1usize..16,
        drop_seed in any::<usize>(),
    ) {
        let fragments = split(&text, limit);
        let missing = drop_seed % fragments.len();
        let mut map = indexed(&fragments);
        map.remove(&missing);

        let err = join(&map, fragments.len()).unwrap_err();
        prop_assert_eq!(err.index, missing);
        prop_assert_eq!(err.count, fragments.len());
    }
}

// =============================================================================
// Cloud storage adapter
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fuzz_bounded_store_round_trip(text in mixed_text_strategy(400), limit in 4usize..50) {
        let bridge = Arc::new(MemoryBridge::new(limit));
        let store = BoundedStore::new(bridge.clone(), limit);

        let fetched = block_on(async {
            store.put("finance_transactions", &text).await.unwrap();
            store.fetch("finance_transactions").await.unwrap()
        });
        prop_assert_eq!(fetched.as_deref(), Some(text.as_str()));

        // Every stored entry fits the platform limit
        for key in bridge.keys() {
            let value = bridge.peek(&key).unwrap();
            prop_assert!(char_len(&value) <= limit);
        }
    }

    #[test]
    fn fuzz_bounded_store_layout_matches_size(text in mixed_text_strategy(400), limit in 4usize..50) {
        let bridge = Arc::new(MemoryBridge::new(limit));
        let store = BoundedStore::new(bridge.clone(), limit);
        block_on(store.put("k", &text)).unwrap();

        if char_len(&text) <= limit {
            prop_assert_eq!(bridge.keys(), vec!["k".to_string()]);
        } else {
            let count = chunk_count(char_len(&text), limit);
            prop_assert!(!bridge.contains("k"));
            prop_assert_eq!(bridge.peek("k_chunks"), Some(count.to_string()));
            prop_assert_eq!(bridge.len(), count + 1);
        }
    }

    #[test]
    fn fuzz_bounded_store_overwrite_reads_latest(
        first in mixed_text_strategy(300),
        second in mixed_text_strategy(300),
        limit in 4usize..40,
    ) {
        let bridge = Arc::new(MemoryBridge::new(limit));
        let store = BoundedStore::new(bridge, limit);

        let fetched = block_on(async {
            store.put("k", &first).await.unwrap();
            store.put("k", &second).await.unwrap();
            store.fetch("k").await.unwrap()
        });
        prop_assert_eq!(fetched, Some(second));
    }

    #[test]
    fn fuzz_bounded_store_missing_fragment_is_incomplete(
        text in mixed_text_strategy(300),
        limit in 4usize..20,
        drop_seed in any::<usize>(),
    ) {
        prop_assume!(char_len(&text) > limit);
        let bridge = Arc::new(MemoryBridge::new(limit));
        let store = BoundedStore::new(bridge.clone(), limit);
        block_on(store.put("k", &text)).unwrap();

        let count = chunk_count(char_len(&text), limit);
        let missing = drop_seed % count;
        bridge.evict(&format!("k_{}", missing));

        let result = block_on(store.fetch("k"));
        prop_assert!(
            matches!(result, Err(finance_sync::StorageError::IncompleteChunkSet { index, .. }) if index == missing),
            "expected IncompleteChunkSet at index {}, got {:?}", missing, result
        );
    }
}

// =============================================================================
// Collection validation
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn fuzz_sanitize_never_panics(value in arbitrary_json_strategy(), index in 0usize..8) {
        let collection = Collection::ALL[index];
        let (out, changed) = collection.sanitize(Some(value.clone()));

        if collection == Collection::ExpensePlan {
            prop_assert!(out.is_number());
        } else {
            prop_assert!(out.is_array());
        }
        if !changed {
            prop_assert_eq!(out, value);
        }
    }

    #[test]
    fn fuzz_sanitized_currencies_always_include_kzt(value in arbitrary_json_strategy()) {
        let (out, _) = Collection::Currencies.sanitize(Some(value));
        let has_kzt = out
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c.get("code") == Some(&json!("KZT")));
        prop_assert!(has_kzt);
    }

    #[test]
    fn fuzz_sanitize_is_idempotent(value in arbitrary_json_strategy(), index in 0usize..8) {
        let collection = Collection::ALL[index];
        let (once, _) = collection.sanitize(Some(value));
        let (twice, changed) = collection.sanitize(Some(once.clone()));
        prop_assert!(!changed);
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn fuzz_sanitize_all_fills_every_collection(
        values in prop::collection::vec(arbitrary_json_strategy(), 8),
        present in prop::collection::vec(any::<bool>(), 8),
    ) {
        let loaded = Collection::ALL
            .into_iter()
            .zip(values)
            .zip(present)
            .filter_map(|((c, v), keep)| keep.then_some((c, v)))
            .collect();
        let (set, _) = sanitize_all(loaded);
        prop_assert_eq!(set.len(), 8);
    }
}
