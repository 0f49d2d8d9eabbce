use super::*;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashSet};

// -------------------- Helpers --------------------

/// Verifies ordering per level, the tower property, node heights and the
/// active level.
fn check_invariants<K, V, C: Comparator<K>>(list: &SkipList<K, V, C>) {
    let mut below: Option<HashSet<usize>> = None;
    for level in 0..MAX_LEVEL {
        let mut seen = HashSet::new();
        let mut prev: Option<usize> = None;
        let mut cur = list.head[level];
        while let Some(id) = cur {
            let node = list.node(id);
            assert!(node.forward.len() > level, "node linked above its height");
            if let Some(p) = prev {
                assert_eq!(
                    list.cmp.compare(&list.node(p).key, &node.key),
                    Ordering::Less,
                    "level {} is not strictly increasing",
                    level
                );
            }
            seen.insert(id);
            prev = Some(id);
            cur = node.forward[level];
        }
        if let Some(lower) = &below {
            assert!(seen.is_subset(lower), "tower property broken at level {}", level);
        }
        if level >= list.level {
            assert!(seen.is_empty(), "links above the active level");
        }
        below = Some(seen);
    }

    if list.level > 1 {
        assert!(list.head[list.level - 1].is_some());
    }

    let live: Vec<usize> = (0..list.nodes.len())
        .filter(|&i| list.nodes[i].is_some())
        .collect();
    assert_eq!(live.len(), list.len());
    for id in live {
        let height = list.node(id).forward.len();
        for level in 0..height {
            let mut cur = list.head[level];
            let mut found = false;
            while let Some(n) = cur {
                if n == id {
                    found = true;
                    break;
                }
                cur = list.node(n).forward[level];
            }
            assert!(found, "node missing from level {} of its tower", level);
        }
    }
}

fn int_list() -> SkipList<i64, String> {
    SkipList::with_seed(OrdComparator, 0x5EED)
}

fn keys_of<V, C>(list: &SkipList<i64, V, C>) -> Vec<i64> {
    list.iter().map(|(k, _)| *k).collect()
}

// -------------------- Empty list --------------------

#[test]
fn new_list_is_empty() {
    let list = int_list();
    assert_eq!(list.size(), 0);
    assert!(list.is_empty());
    assert_eq!(list.level(), 1);
    assert!(list.find(&1).is_none());
    assert!(!list.cursor().valid());
    assert_eq!(list.iter().count(), 0);
    check_invariants(&list);
}

#[test]
fn default_uses_comparator_default() {
    let mut list: SkipList<u32, u32> = SkipList::default();
    list.insert(2, 20);
    list.insert(1, 10);
    assert_eq!(list.find(&1), Some(&10));
}

// -------------------- Insert / Find --------------------

#[test]
fn insert_and_find() {
    let mut list = int_list();
    list.insert(3, "value3".to_string());
    list.insert(1, "value1".to_string());
    list.insert(7, "value7".to_string());
    list.insert(5, "value5".to_string());

    assert_eq!(list.size(), 4);
    assert_eq!(list.find(&7).map(String::as_str), Some("value7"));
    assert_eq!(list.find(&1).map(String::as_str), Some("value1"));
    assert!(list.find(&4).is_none());
    assert!(list.find(&0).is_none());
    assert!(list.find(&8).is_none());
    assert!(list.contains_key(&5));
    check_invariants(&list);
}

#[test]
fn iteration_is_sorted_without_duplicates() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut input: Vec<i64> = (0..2_000).map(|i| (i * 7919) % 1_009).collect();
    input.shuffle(&mut rng);

    let mut list = int_list();
    for k in &input {
        list.insert(*k, k.to_string());
    }

    let keys = keys_of(&list);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));

    let mut expected: Vec<i64> = input.clone();
    expected.sort_unstable();
    expected.dedup();
    assert_eq!(keys, expected);
    assert_eq!(list.size(), expected.len());
    check_invariants(&list);
}

#[test]
fn insert_existing_key_updates_in_place() {
    let mut list = int_list();
    assert_eq!(list.insert(1, "a".to_string()), None);
    assert_eq!(list.insert(1, "b".to_string()), Some("a".to_string()));

    assert_eq!(list.size(), 1);
    assert_eq!(list.find(&1).map(String::as_str), Some("b"));
    assert_eq!(list.nodes.len(), 1, "update must not allocate a node");
}

// -------------------- Delete --------------------

#[test]
fn delete_present_key() {
    let mut list = int_list();
    for k in 0..10 {
        list.insert(k, format!("v{}", k));
    }

    assert!(list.delete(&4));
    assert_eq!(list.size(), 9);
    assert!(list.find(&4).is_none());
    assert_eq!(keys_of(&list), vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
    check_invariants(&list);
}

#[test]
fn delete_absent_key_is_noop() {
    let mut list = int_list();
    list.insert(1, "a".to_string());
    list.insert(3, "c".to_string());
    let level = list.level();

    assert!(!list.delete(&2));
    assert!(!list.delete(&0));
    assert!(!list.delete(&99));
    assert_eq!(list.size(), 2);
    assert_eq!(list.level(), level);
    assert_eq!(keys_of(&list), vec![1, 3]);
}

#[test]
fn remove_returns_value() {
    let mut list = int_list();
    list.insert(10, "ten".to_string());
    assert_eq!(list.remove(&10), Some("ten".to_string()));
    assert_eq!(list.remove(&10), None);
}

#[test]
fn delete_everything_shrinks_level_to_one() {
    let mut list = int_list();
    for k in 0..500 {
        list.insert(k, String::new());
    }
    assert!(list.level() > 1);

    for k in 0..500 {
        assert!(list.delete(&k));
    }
    assert!(list.is_empty());
    assert_eq!(list.level(), 1);
    check_invariants(&list);
}

#[test]
fn freed_slots_are_reused() {
    let mut list = int_list();
    for k in 0..8 {
        list.insert(k, String::new());
    }
    for k in 0..4 {
        list.delete(&k);
    }
    for k in 100..104 {
        list.insert(k, String::new());
    }
    assert_eq!(list.nodes.len(), 8);
    check_invariants(&list);
}

// -------------------- Randomized model check --------------------

#[test]
fn matches_btreemap_under_random_workload() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut list = int_list();
    let mut model = BTreeMap::new();

    for step in 0..10_000 {
        let key: i64 = rng.gen_range(0..300);
        if rng.gen_bool(0.6) {
            let value = format!("{}-{}", key, step);
            assert_eq!(list.insert(key, value.clone()), model.insert(key, value));
        } else {
            assert_eq!(list.remove(&key), model.remove(&key));
        }
        if step % 1_000 == 0 {
            check_invariants(&list);
        }
    }

    check_invariants(&list);
    assert_eq!(list.size(), model.len());
    let ours: Vec<(i64, String)> = list.iter().map(|(k, v)| (*k, v.clone())).collect();
    let theirs: Vec<(i64, String)> = model.into_iter().collect();
    assert_eq!(ours, theirs);
}

// -------------------- Level generator --------------------

#[test]
fn random_levels_follow_geometric_distribution() {
    let mut list: SkipList<u32, ()> = SkipList::with_seed(OrdComparator, 1);
    let n = 20_000;
    let mut total = 0usize;
    for _ in 0..n {
        let level = list.random_level();
        assert!((1..=MAX_LEVEL).contains(&level));
        total += level;
    }
    // E[level] = 1 / (1 - p) = 4/3
    let mean = total as f64 / n as f64;
    assert!(mean > 1.25 && mean < 1.42, "mean level {}", mean);
}

#[test]
fn same_seed_builds_same_towers() {
    let mut a: SkipList<u32, ()> = SkipList::with_seed(OrdComparator, 99);
    let mut b: SkipList<u32, ()> = SkipList::with_seed(OrdComparator, 99);
    for k in 0..200 {
        a.insert(k, ());
        b.insert(k, ());
    }
    let heights = |l: &SkipList<u32, ()>| -> Vec<usize> {
        l.nodes.iter().flatten().map(|n| n.forward.len()).collect()
    };
    assert_eq!(heights(&a), heights(&b));
    assert_eq!(a.level(), b.level());
}

// -------------------- Cursor --------------------

#[test]
fn cursor_walks_in_order() {
    let mut list = int_list();
    for k in [3, 1, 7, 5] {
        list.insert(k, format!("value{}", k));
    }

    let mut cursor = list.cursor();
    let mut seen = Vec::new();
    while cursor.valid() {
        seen.push((*cursor.key(), cursor.value().clone()));
        cursor.advance();
    }
    assert_eq!(
        seen,
        vec![
            (1, "value1".to_string()),
            (3, "value3".to_string()),
            (5, "value5".to_string()),
            (7, "value7".to_string()),
        ]
    );
}

#[test]
fn cursor_seek_lands_on_successor() {
    let mut list = int_list();
    for k in [10, 20, 30] {
        list.insert(k, String::new());
    }
    let mut cursor = list.cursor();

    cursor.seek(&20);
    assert_eq!(*cursor.key(), 20);

    cursor.seek(&15);
    assert_eq!(*cursor.key(), 20);

    cursor.seek(&i64::MIN);
    assert_eq!(*cursor.key(), 10);

    cursor.seek(&31);
    assert!(!cursor.valid());

    cursor.seek_to_first();
    assert_eq!(*cursor.key(), 10);
}

#[test]
#[should_panic(expected = "exhausted")]
fn cursor_key_on_exhausted_panics() {
    let list = int_list();
    let cursor = list.cursor();
    let _ = cursor.key();
}

#[test]
#[should_panic(expected = "exhausted")]
fn cursor_advance_past_end_panics() {
    let mut list = int_list();
    list.insert(1, String::new());
    let mut cursor = list.cursor();
    cursor.advance();
    cursor.advance();
}

#[test]
fn range_from_starts_at_lower_bound() {
    let mut list = int_list();
    for k in 0..10 {
        list.insert(k * 2, String::new());
    }
    let keys: Vec<i64> = list.range_from(&11).map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![12, 14, 16, 18]);
}

// -------------------- Comparators --------------------

#[test]
fn bytewise_comparator_orders_prefix_first() {
    let cmp = BytewiseComparator;
    assert_eq!(cmp.compare(&b"ab"[..], &b"abc"[..]), Ordering::Less);
    assert_eq!(cmp.compare(&b"abd"[..], &b"abc"[..]), Ordering::Greater);
    assert_eq!(cmp.compare(&b""[..], &b""[..]), Ordering::Equal);
    assert_eq!(cmp.compare(&[0xFFu8][..], &[0x00u8, 0x00][..]), Ordering::Greater);
}

#[test]
fn byte_keys_support_slice_lookups() {
    let mut list: SkipList<Vec<u8>, Vec<u8>, BytewiseComparator> =
        SkipList::with_seed(BytewiseComparator, 3);
    list.insert(b"banana".to_vec(), b"2".to_vec());
    list.insert(b"apple".to_vec(), b"1".to_vec());
    list.insert(b"app".to_vec(), b"0".to_vec());

    assert_eq!(list.find(b"apple".as_slice()), Some(&b"1".to_vec()));
    assert!(list.find(b"appl".as_slice()).is_none());

    let keys: Vec<&[u8]> = list.iter().map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![&b"app"[..], &b"apple"[..], &b"banana"[..]]);

    assert!(list.delete(b"app".as_slice()));
    assert_eq!(list.size(), 2);
    check_invariants(&list);
}

#[test]
fn reverse_comparator_iterates_descending() {
    let mut list = SkipList::with_seed(ReverseComparator(OrdComparator), 11);
    for k in [2u8, 9, 4, 1] {
        list.insert(k, ());
    }
    let keys: Vec<u8> = list.iter().map(|(k, _)| *k).collect();
    assert_eq!(keys, vec![9, 4, 2, 1]);
}

// -------------------- Misc --------------------

#[test]
fn clear_resets_everything() {
    let mut list = int_list();
    for k in 0..100 {
        list.insert(k, String::new());
    }
    list.clear();
    assert!(list.is_empty());
    assert_eq!(list.level(), 1);
    assert!(list.find(&5).is_none());
    list.insert(5, "again".to_string());
    assert_eq!(list.size(), 1);
    check_invariants(&list);
}

#[test]
fn debug_prints_entries_in_order() {
    let mut list = int_list();
    list.insert(2, "b".to_string());
    list.insert(1, "a".to_string());
    assert_eq!(format!("{:?}", list), r#"{1: "a", 2: "b"}"#);
}

#[test]
fn into_iterator_for_reference() {
    let mut list = int_list();
    list.insert(1, "x".to_string());
    let mut n = 0;
    for (k, v) in &list {
        assert_eq!((*k, v.as_str()), (1, "x"));
        n += 1;
    }
    assert_eq!(n, 1);
}
