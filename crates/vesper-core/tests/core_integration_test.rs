//! Cross-module flows: tables holding structured keys, equality with
//! assumption rollback, collection through tables, shared rendering.

use vesper_core::{
    equal, eqv, hash_equal, write_value, Equiv, HashTable, ManagedCell, ManagedObjectPool, Value,
};

fn no_roots(_epoch: u8, _mark: &mut dyn FnMut(&Value)) {}

#[test]
fn update_then_freeze_scenario() {
    let t = HashTable::new(None, true, Equiv::Equal);
    assert!(t.set(Value::string("key"), Value::fixnum(1)));
    assert!(t.set(Value::string("key"), Value::fixnum(2)));
    assert_eq!(t.get(&Value::string("key")), Some(Value::fixnum(2)));
    assert_eq!(t.count(), 1);

    let frozen = t.clone_table(false);
    assert!(!frozen.set(Value::string("key"), Value::fixnum(3)));
    assert_eq!(frozen.get(&Value::string("key")), Some(Value::fixnum(2)));
}

#[test]
fn tables_compare_structurally_across_layouts() {
    // Same mappings, different capacities and insertion orders.
    let a = HashTable::new(Some(3), true, Equiv::Equal);
    a.set(Value::string("x"), Value::fixnum(1));
    a.set(Value::string("y"), Value::fixnum(2));
    let b = HashTable::new(Some(17), true, Equiv::Equal);
    b.set(Value::string("y"), Value::fixnum(2));
    b.set(Value::string("x"), Value::fixnum(1));
    let (va, vb) = (Value::table(a), Value::table(b));
    assert!(equal(&va, &vb));
    assert_eq!(hash_equal(&va), hash_equal(&vb));
}

#[test]
fn table_equality_ignores_mutability_but_not_relation() {
    let a = HashTable::new(None, true, Equiv::Equal);
    a.set(Value::fixnum(1), Value::fixnum(2));
    let frozen = a.clone_table(false);
    assert!(equal(&Value::table(a), &Value::table(frozen)));

    let c = HashTable::new(None, true, Equiv::Eqv);
    c.set(Value::fixnum(1), Value::fixnum(2));
    let d = HashTable::new(None, true, Equiv::Equal);
    d.set(Value::fixnum(1), Value::fixnum(2));
    assert!(!equal(&Value::table(c), &Value::table(d)));
}

#[test]
fn mapping_match_rolls_back_failed_candidates() {
    // Both left keys are structurally equal, so the first candidate
    // the scan tries can match the key and still fail on the value;
    // the tentative key assumption must not leak into later probes.
    let left = HashTable::new(Some(1), true, Equiv::Eqv);
    let k1 = Value::mcons(Value::fixnum(1), Value::fixnum(2));
    let k2 = Value::mcons(Value::fixnum(1), Value::fixnum(2));
    left.set(k1.clone(), Value::fixnum(10));
    left.set(k2.clone(), Value::fixnum(20));

    let right = HashTable::new(Some(1), true, Equiv::Eqv);
    let k3 = Value::mcons(Value::fixnum(1), Value::fixnum(2));
    let k4 = Value::mcons(Value::fixnum(1), Value::fixnum(2));
    right.set(k3.clone(), Value::fixnum(20));
    right.set(k4.clone(), Value::fixnum(10));

    assert!(equal(&Value::table(left), &Value::table(right)));
}

#[test]
fn mismatched_values_fail_the_mapping_match() {
    let a = HashTable::new(None, true, Equiv::Equal);
    a.set(Value::string("k"), Value::fixnum(1));
    let b = HashTable::new(None, true, Equiv::Equal);
    b.set(Value::string("k"), Value::fixnum(2));
    assert!(!equal(&Value::table(a), &Value::table(b)));
}

#[test]
fn structured_keys_resolve_through_equal_tables() {
    let t = HashTable::new(None, true, Equiv::Equal);
    let key = Value::list(vec![Value::string("a"), Value::fixnum(1)]);
    t.set(key, Value::string("hit"));
    let probe = Value::list(vec![Value::string("a"), Value::fixnum(1)]);
    assert_eq!(t.get(&probe), Some(Value::string("hit")));
}

#[test]
fn a_table_can_key_another_table() {
    let inner_a = HashTable::new(None, true, Equiv::Equal);
    inner_a.set(Value::fixnum(1), Value::fixnum(2));
    let inner_b = HashTable::new(None, true, Equiv::Equal);
    inner_b.set(Value::fixnum(1), Value::fixnum(2));

    let outer = HashTable::new(None, true, Equiv::Equal);
    outer.set(Value::table(inner_a), Value::string("found"));
    // A structurally equal but distinct table reaches the same cell.
    assert_eq!(
        outer.get(&Value::table(inner_b)),
        Some(Value::string("found"))
    );
}

#[test]
fn eqv_table_distinguishes_what_equal_table_merges() {
    let by_eqv = HashTable::new(None, true, Equiv::Eqv);
    by_eqv.set(Value::string("k"), Value::fixnum(1));
    // A fresh string is a different key under eqv.
    assert_eq!(by_eqv.get(&Value::string("k")), None);
    assert_eq!(by_eqv.count(), 1);

    // But canonical numbers collapse under eqv.
    by_eqv.set(Value::rational(4, 2).unwrap(), Value::string("two"));
    assert_eq!(by_eqv.get(&Value::fixnum(2)), Some(Value::string("two")));
}

#[test]
fn collection_reclaims_cycle_through_a_table() {
    let mut pool = ManagedObjectPool::new();
    {
        let table_value = Value::table(HashTable::new(Some(7), true, Equiv::Eqv));
        let knot = Value::mcons(table_value.clone(), Value::Null);
        if let Value::Table(t) = &table_value {
            t.set(Value::symbol("self"), knot.clone());
        }
        pool.manage(&table_value);
        assert_eq!(pool.stats().tracked, 2);
    }
    let swept = pool.collect(no_roots);
    assert!(swept >= 1);
    assert_eq!(pool.stats().tracked, 0);
    assert_eq!(pool.collect(no_roots), 0);
}

#[test]
fn rooted_table_survives_collection_intact() {
    let mut pool = ManagedObjectPool::new();
    let table_value = Value::table(HashTable::new(None, true, Equiv::Equal));
    if let Value::Table(t) = &table_value {
        t.set(Value::string("k"), Value::mcons(Value::fixnum(1), Value::Null));
    }
    pool.manage(&table_value);
    let swept = pool.collect(|_epoch, mark| mark(&table_value));
    assert_eq!(swept, 0);
    if let Value::Table(t) = &table_value {
        assert_eq!(t.count(), 1);
        let v = t.get(&Value::string("k")).unwrap();
        assert!(equal(&v, &Value::mcons(Value::fixnum(1), Value::Null)));
    }
}

#[test]
fn custom_procedures_are_marked_through_the_table() {
    use std::rc::Rc;
    use vesper_core::CustomProcs;

    let mut pool = ManagedObjectPool::new();
    let eql = Value::procedure(vec![]);
    let procs = CustomProcs {
        eql: eql.clone(),
        hsh: Value::procedure(vec![]),
        has: Value::procedure(vec![]),
        get: Value::procedure(vec![]),
        set: Value::procedure(vec![]),
        upd: Value::procedure(vec![]),
        del: Value::procedure(vec![]),
    };
    let table_value = Value::table(HashTable::new(Some(3), true, Equiv::Custom(Rc::new(procs))));
    pool.manage(&table_value);
    // All seven procedures registered alongside the table.
    assert_eq!(pool.stats().tracked, 8);
    let swept = pool.collect(|_epoch, mark| mark(&table_value));
    assert_eq!(swept, 0);
    if let Value::Opaque(o) = &eql {
        assert_ne!(o.header().tag(), 0);
    }
}

#[test]
fn custom_tables_compare_by_procedure_identity() {
    use std::rc::Rc;
    use vesper_core::CustomProcs;

    let shared_eql = Value::procedure(vec![]);
    let shared_hsh = Value::procedure(vec![]);
    let make = |eql: &Value, hsh: &Value| {
        CustomProcs {
            eql: eql.clone(),
            hsh: hsh.clone(),
            has: Value::procedure(vec![]),
            get: Value::procedure(vec![]),
            set: Value::procedure(vec![]),
            upd: Value::procedure(vec![]),
            del: Value::procedure(vec![]),
        }
    };
    let a = HashTable::new(None, true, Equiv::Custom(Rc::new(make(&shared_eql, &shared_hsh))));
    let b = HashTable::new(None, true, Equiv::Custom(Rc::new(make(&shared_eql, &shared_hsh))));
    assert!(equal(&Value::table(a), &Value::table(b)));

    let other_eql = Value::procedure(vec![]);
    let c = HashTable::new(None, true, Equiv::Custom(Rc::new(make(&shared_eql, &shared_hsh))));
    let d = HashTable::new(None, true, Equiv::Custom(Rc::new(make(&other_eql, &shared_hsh))));
    assert!(!equal(&Value::table(c), &Value::table(d)));
}

#[test]
fn shared_structure_renders_once_with_labels() {
    let shared = Value::mcons(Value::fixnum(1), Value::Null);
    let outer = Value::vector(vec![shared.clone(), shared.clone()], false);
    assert_eq!(write_value(&outer), "#(#0=(1) #0#)");
}

#[test]
fn normalization_scenario_from_rationals() {
    assert!(!equal(&Value::rational(2, 4).unwrap(), &Value::fixnum(0)));
    assert!(equal(&Value::rational(4, 2).unwrap(), &Value::fixnum(2)));
    assert!(eqv(&Value::rational(4, 2).unwrap(), &Value::fixnum(2)));
}

#[test]
fn snapshot_order_is_stable_under_clone() {
    let t = HashTable::new(Some(4), true, Equiv::Equal);
    for i in 0..10 {
        t.set(Value::fixnum(i), Value::fixnum(i * 10));
    }
    let snapshot = t.entries();
    let cloned = t.clone_table(true);
    assert!(equal(&snapshot, &cloned.entries()));
}
