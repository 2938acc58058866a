use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::equiv::{eq, hash_eq, hash_equal, hash_eqv};
use crate::pool::{ManagedCell, ObjHeader};
use crate::value::Value;

/// Default number of buckets for fresh tables.
pub const DEFAULT_CAPACITY: usize = 499;

// ── Equivalence choice ────────────────────────────────────────────

/// The seven user procedures backing a [`Equiv::Custom`] table. Held
/// by identity; marking traverses each.
#[derive(Debug, Clone)]
pub struct CustomProcs {
    pub eql: Value,
    pub hsh: Value,
    pub has: Value,
    pub get: Value,
    pub set: Value,
    pub upd: Value,
    pub del: Value,
}

impl CustomProcs {
    pub fn all(&self) -> [Value; 7] {
        [
            self.eql.clone(),
            self.hsh.clone(),
            self.has.clone(),
            self.get.clone(),
            self.set.clone(),
            self.upd.clone(),
            self.del.clone(),
        ]
    }
}

/// Which equivalence relation a table probes with.
///
/// `Custom` tables are opaque to the core: their lookups run in user
/// code, routed through the raw bucket hooks by the embedder. The
/// built-in dispatch path refuses them.
#[derive(Debug, Clone)]
pub enum Equiv {
    Eq,
    Eqv,
    Equal,
    Custom(Rc<CustomProcs>),
}

// ── Cells & entries ───────────────────────────────────────────────

/// The one-slot mutable container a bucket entry stores its value in.
/// Iterators can retain the cell and keep reading or updating that
/// mapping through it; cells compare by identity.
#[derive(Debug)]
pub struct ValueCell {
    slot: RefCell<Value>,
}

impl ValueCell {
    pub fn new(v: Value) -> Self {
        ValueCell {
            slot: RefCell::new(v),
        }
    }

    pub fn get(&self) -> Value {
        self.slot.borrow().clone()
    }

    pub fn set(&self, v: Value) {
        *self.slot.borrow_mut() = v;
    }

    pub(crate) fn mark_value(&self, epoch: u8) {
        self.slot.borrow().mark(epoch);
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: Value,
    cell: Rc<ValueCell>,
}

// ── HashTable ─────────────────────────────────────────────────────

/// A chained-bucket mapping from Value to Value.
///
/// Entries are appended to their bucket and iterated newest-first, so
/// the observable chain order matches prepend-to-chain semantics.
/// There is no automatic resizing; `clear` with a capacity is the only
/// resize path.
#[derive(Debug)]
pub struct HashTable {
    header: ObjHeader,
    buckets: RefCell<Vec<Vec<Entry>>>,
    count: Cell<usize>,
    mutable: bool,
    equiv: RefCell<Equiv>,
}

impl HashTable {
    pub fn new(capacity: Option<usize>, mutable: bool, equiv: Equiv) -> Self {
        let cap = capacity.unwrap_or(DEFAULT_CAPACITY).max(1);
        HashTable {
            header: ObjHeader::new(),
            buckets: RefCell::new(vec![Vec::new(); cap]),
            count: Cell::new(0),
            mutable,
            equiv: RefCell::new(equiv),
        }
    }

    /// Structural copy: same capacity, equivalence, count, bucket
    /// assignment and chain order, but fresh cells.
    pub fn clone_table(&self, mutable: bool) -> HashTable {
        let buckets = self
            .buckets
            .borrow()
            .iter()
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|e| Entry {
                        key: e.key.clone(),
                        cell: Rc::new(ValueCell::new(e.cell.get())),
                    })
                    .collect()
            })
            .collect();
        HashTable {
            header: ObjHeader::new(),
            buckets: RefCell::new(buckets),
            count: Cell::new(self.count.get()),
            mutable,
            equiv: RefCell::new(self.equiv.borrow().clone()),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.borrow().len()
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn equiv(&self) -> Equiv {
        self.equiv.borrow().clone()
    }

    /// Whether structural equality between the two tables is defined:
    /// same built-in relation, or both custom with identical `eql` and
    /// `hsh` procedure handles.
    pub fn compatible_equiv(&self, other: &HashTable) -> bool {
        match (&*self.equiv.borrow(), &*other.equiv.borrow()) {
            (Equiv::Eq, Equiv::Eq)
            | (Equiv::Eqv, Equiv::Eqv)
            | (Equiv::Equal, Equiv::Equal) => true,
            (Equiv::Custom(a), Equiv::Custom(b)) => {
                eq(&a.eql, &b.eql) && eq(&a.hsh, &b.hsh)
            }
            _ => false,
        }
    }

    /// Reset all buckets; with a capacity, reallocate to it. Refused
    /// (false) on immutable tables.
    pub fn clear(&self, capacity: Option<usize>) -> bool {
        if !self.mutable {
            return false;
        }
        let cap = capacity.map(|c| c.max(1)).unwrap_or_else(|| self.bucket_count());
        if capacity.is_some() {
            log::debug!("table clear: reallocating to {cap} buckets");
        }
        *self.buckets.borrow_mut() = vec![Vec::new(); cap];
        self.count.set(0);
        true
    }

    // -- Built-in dispatch (refused for custom tables) --

    fn guard_builtin(&self) {
        if matches!(&*self.equiv.borrow(), Equiv::Custom(_)) {
            panic!("custom hash table reached the built-in dispatch path");
        }
    }

    fn key_hash(&self, key: &Value) -> u64 {
        match &*self.equiv.borrow() {
            Equiv::Eq => hash_eq(key),
            Equiv::Eqv => hash_eqv(key),
            Equiv::Equal => hash_equal(key),
            Equiv::Custom(_) => unreachable!("guarded before hashing"),
        }
    }

    fn key_eql(&self, a: &Value, b: &Value) -> bool {
        match &*self.equiv.borrow() {
            Equiv::Eq => crate::equiv::eq(a, b),
            Equiv::Eqv => crate::equiv::eqv(a, b),
            Equiv::Equal => crate::equiv::equal(a, b),
            Equiv::Custom(_) => unreachable!("guarded before probing"),
        }
    }

    fn bucket_index(&self, key: &Value) -> usize {
        (self.key_hash(key) % self.bucket_count() as u64) as usize
    }

    /// Newest-first position of the key within its bucket.
    fn find(&self, bid: usize, key: &Value) -> Option<(usize, Rc<ValueCell>)> {
        let buckets = self.buckets.borrow();
        buckets[bid]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, e)| self.key_eql(&e.key, key))
            .map(|(i, e)| (i, e.cell.clone()))
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.get_cell(key).map(|cell| cell.get())
    }

    pub fn get_cell(&self, key: &Value) -> Option<Rc<ValueCell>> {
        self.guard_builtin();
        let bid = self.bucket_index(key);
        self.find(bid, key).map(|(_, cell)| cell)
    }

    /// Update the mapping for `key`, or prepend a new one. Refused
    /// (false) on immutable tables, with no side effects.
    pub fn set(&self, key: Value, value: Value) -> bool {
        self.guard_builtin();
        let bid = self.bucket_index(&key);
        match self.find(bid, &key) {
            Some((_, cell)) => {
                if !self.mutable {
                    return false;
                }
                cell.set(value);
                true
            }
            None => {
                if !self.mutable {
                    return false;
                }
                self.buckets.borrow_mut()[bid].push(Entry {
                    key,
                    cell: Rc::new(ValueCell::new(value)),
                });
                self.count.set(self.count.get() + 1);
                true
            }
        }
    }

    /// Remove the mapping for `key`, preserving the relative order of
    /// the remaining entries. Deleting an absent key from a mutable
    /// table succeeds vacuously; any delete on an immutable table is
    /// refused.
    pub fn delete(&self, key: &Value) -> bool {
        self.guard_builtin();
        if !self.mutable {
            return false;
        }
        let bid = self.bucket_index(key);
        match self.find(bid, key) {
            Some((i, _)) => {
                self.buckets.borrow_mut()[bid].remove(i);
                self.count.set(self.count.get() - 1);
                true
            }
            None => true,
        }
    }

    // -- Raw bucket hooks (custom dispatch) --

    /// Prepend a mapping to bucket `bid` without consulting the
    /// equivalence. Returns the fresh cell, or None when immutable.
    pub fn add_raw(&self, bid: usize, key: Value, value: Value) -> Option<Rc<ValueCell>> {
        if !self.mutable {
            return None;
        }
        let bid = bid % self.bucket_count();
        let cell = Rc::new(ValueCell::new(value));
        self.buckets.borrow_mut()[bid].push(Entry {
            key,
            cell: cell.clone(),
        });
        self.count.set(self.count.get() + 1);
        Some(cell)
    }

    /// Remove the entry of bucket `bid` holding exactly this cell.
    pub fn remove_raw(&self, bid: usize, cell: &Rc<ValueCell>) -> bool {
        if !self.mutable {
            return false;
        }
        let bid = bid % self.bucket_count();
        let mut buckets = self.buckets.borrow_mut();
        match buckets[bid].iter().position(|e| Rc::ptr_eq(&e.cell, cell)) {
            Some(i) => {
                buckets[bid].remove(i);
                self.count.set(self.count.get() - 1);
                true
            }
            None => false,
        }
    }

    /// One bucket's chain as (key, cell) pairs, newest first.
    pub fn bucket_at(&self, bid: usize) -> Vec<(Value, Rc<ValueCell>)> {
        let buckets = self.buckets.borrow();
        match buckets.get(bid) {
            Some(bucket) => bucket
                .iter()
                .rev()
                .map(|e| (e.key.clone(), e.cell.clone()))
                .collect(),
            None => Vec::new(),
        }
    }

    // -- Snapshots --

    /// All mappings in iteration order: bucket index ascending, chains
    /// newest first.
    pub fn mappings(&self) -> Vec<(Value, Value)> {
        self.buckets
            .borrow()
            .iter()
            .flat_map(|bucket| bucket.iter().rev().map(|e| (e.key.clone(), e.cell.get())))
            .collect()
    }

    pub fn keys(&self) -> Value {
        Value::list(self.mappings().into_iter().map(|(k, _)| k).collect::<Vec<_>>())
    }

    pub fn values(&self) -> Value {
        Value::list(self.mappings().into_iter().map(|(_, v)| v).collect::<Vec<_>>())
    }

    /// Snapshot as a list of `(key . value)` pairs.
    pub fn entries(&self) -> Value {
        Value::list(
            self.mappings()
                .into_iter()
                .map(|(k, v)| Value::cons(k, v))
                .collect::<Vec<_>>(),
        )
    }
}

impl ManagedCell for HashTable {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn object_kind(&self) -> &'static str {
        "table"
    }

    fn mark_children(&self, epoch: u8) {
        for bucket in self.buckets.borrow().iter() {
            for e in bucket {
                e.key.mark(epoch);
                e.cell.mark_value(epoch);
            }
        }
        if let Equiv::Custom(procs) = &*self.equiv.borrow() {
            for p in procs.all() {
                p.mark(epoch);
            }
        }
    }

    /// Sever all outgoing references: one empty bucket, count zero,
    /// equivalence reset to Eq.
    fn cleanup(&self) {
        *self.buckets.borrow_mut() = vec![Vec::new()];
        self.count.set(0);
        *self.equiv.borrow_mut() = Equiv::Eq;
    }
}

// ── Tests ─────────────────────────────────────────────────────────
