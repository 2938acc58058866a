use std::cell::Cell;
use std::rc::{Rc, Weak};

use hashbrown::HashMap;

use crate::table::Equiv;
use crate::value::Value;

// ── Object header ─────────────────────────────────────────────────

/// Per-object collector state embedded in every heap cell that can
/// participate in a reference cycle.
///
/// `tag` holds the epoch of the object's last mark; 0 means "never
/// marked", which is why the pool's epoch counter skips 0. `managed`
/// records whether the object has been registered with a pool.
#[derive(Debug, Default)]
pub struct ObjHeader {
    tag: Cell<u8>,
    managed: Cell<bool>,
}

impl ObjHeader {
    pub fn new() -> Self {
        ObjHeader {
            tag: Cell::new(0),
            managed: Cell::new(false),
        }
    }

    #[inline]
    pub fn tag(&self) -> u8 {
        self.tag.get()
    }

    #[inline]
    pub fn set_tag(&self, epoch: u8) {
        self.tag.set(epoch);
    }

    #[inline]
    pub fn is_managed(&self) -> bool {
        self.managed.get()
    }

    #[inline]
    pub fn set_managed(&self, managed: bool) {
        self.managed.set(managed);
    }
}

// ── ManagedCell ───────────────────────────────────────────────────

/// A heap cell tracked by the pool.
///
/// `mark` sets the tag before descending, so re-entering the same
/// object within one cycle terminates immediately. `cleanup` severs
/// the object's outgoing references (resetting it to an empty/default
/// state) so plain refcounting can finish reclaiming a cycle; it must
/// be idempotent.
pub trait ManagedCell {
    fn header(&self) -> &ObjHeader;

    /// Kind label used for pool statistics.
    fn object_kind(&self) -> &'static str;

    /// Mark every child value with `epoch`. Called at most once per
    /// object per cycle; implementations do not need their own guard.
    fn mark_children(&self, epoch: u8);

    /// Sever all outgoing references, leaving the object observably
    /// empty. Safe to call repeatedly.
    fn cleanup(&self);

    fn mark(&self, epoch: u8) {
        let header = self.header();
        if header.tag() != epoch {
            header.set_tag(epoch);
            self.mark_children(epoch);
        }
    }
}

// ── Pool ──────────────────────────────────────────────────────────

/// Snapshot of pool counters, as returned by [`ManagedObjectPool::stats`].
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Objects currently on the tracked list.
    pub tracked: usize,
    /// Completed collection cycles.
    pub cycles: u64,
    /// Epoch tag used by the most recent cycle (0 before the first).
    pub last_epoch: u8,
    /// Entries swept by the most recent cycle.
    pub last_reclaimed: usize,
    /// Total registrations per object kind over the pool's lifetime.
    pub registered_by_kind: HashMap<&'static str, u64>,
}

/// Tracks heap objects whose internal references may form cycles and
/// periodically breaks unreachable cycles so the underlying refcounts
/// complete deallocation.
///
/// The pool holds only weak references; it never keeps an object
/// alive. Collection is synchronous and must run at a safe point (no
/// table mutation in flight).
pub struct ManagedObjectPool {
    tracked: Vec<Weak<dyn ManagedCell>>,
    epoch: u8,
    cycles: u64,
    last_reclaimed: usize,
    registered: HashMap<&'static str, u64>,
}

impl ManagedObjectPool {
    pub fn new() -> Self {
        ManagedObjectPool {
            tracked: Vec::new(),
            epoch: 0,
            cycles: 0,
            last_reclaimed: 0,
            registered: HashMap::new(),
        }
    }

    /// Register a heap object with the pool. Registering an object
    /// that is already managed is a no-op.
    pub fn register(&mut self, obj: Rc<dyn ManagedCell>) {
        if obj.header().is_managed() {
            return;
        }
        obj.header().set_managed(true);
        *self.registered.entry(obj.object_kind()).or_insert(0) += 1;
        self.tracked.push(Rc::downgrade(&obj));
    }

    /// Register every cycle-capable heap cell reachable from `v` that
    /// is not yet managed. Recursion is gated by the `managed` flag,
    /// so cyclic values terminate.
    pub fn manage(&mut self, v: &Value) {
        match v {
            Value::Pair(p) => {
                self.manage(&p.0);
                self.manage(&p.1);
            }
            Value::Tagged(t) => {
                self.manage(&t.0);
                self.manage(&t.1);
            }
            Value::Syntax(s) => self.manage(&s.payload),
            Value::Values(inner) => self.manage(inner),
            Value::MPair(m) => {
                if !m.header().is_managed() {
                    self.register(m.clone());
                    let (car, cdr) = m.parts();
                    self.manage(&car);
                    self.manage(&cdr);
                }
            }
            Value::Box(b) => {
                if !b.header().is_managed() {
                    self.register(b.clone());
                    self.manage(&b.get());
                }
            }
            Value::Vector(vec) => {
                if !vec.header().is_managed() {
                    self.register(vec.clone());
                    for item in vec.items() {
                        self.manage(&item);
                    }
                }
            }
            Value::Array(arr) => {
                if !arr.header().is_managed() {
                    self.register(arr.clone());
                    for item in arr.items() {
                        self.manage(&item);
                    }
                }
            }
            Value::Record(rec) => {
                if !rec.header().is_managed() {
                    self.register(rec.clone());
                    for field in rec.fields() {
                        self.manage(&field);
                    }
                }
            }
            Value::Opaque(obj) => {
                if !obj.header().is_managed() {
                    self.register(obj.clone());
                    for slot in obj.slots() {
                        self.manage(&slot);
                    }
                }
            }
            Value::Table(t) => {
                if !t.header().is_managed() {
                    self.register(t.clone());
                    for (k, val) in t.mappings() {
                        self.manage(&k);
                        self.manage(&val);
                    }
                    if let Equiv::Custom(procs) = t.equiv() {
                        for p in procs.all() {
                            self.manage(&p);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Run one mark-and-sweep cycle.
    ///
    /// The embedder contributes the root set through `mark_roots`,
    /// which receives the cycle's epoch and a marking function to
    /// apply to every root value. Returns the number of tracked
    /// entries swept (cycle-broken objects plus entries whose object
    /// had already died).
    pub fn collect<F>(&mut self, mark_roots: F) -> usize
    where
        F: FnOnce(u8, &mut dyn FnMut(&Value)),
    {
        self.epoch = if self.epoch == u8::MAX { 1 } else { self.epoch + 1 };
        let epoch = self.epoch;
        mark_roots(epoch, &mut |v: &Value| v.mark(epoch));

        let mut reclaimed = 0usize;
        self.tracked.retain(|weak| match weak.upgrade() {
            None => {
                reclaimed += 1;
                false
            }
            Some(obj) => {
                if obj.header().tag() == epoch {
                    true
                } else {
                    obj.cleanup();
                    obj.header().set_managed(false);
                    reclaimed += 1;
                    false
                }
            }
        });

        self.cycles += 1;
        self.last_reclaimed = reclaimed;
        log::debug!(
            "pool cycle {} (epoch {}): swept {}, {} tracked",
            self.cycles,
            epoch,
            reclaimed,
            self.tracked.len()
        );
        reclaimed
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            tracked: self.tracked.len(),
            cycles: self.cycles,
            last_epoch: self.epoch,
            last_reclaimed: self.last_reclaimed,
            registered_by_kind: self.registered.clone(),
        }
    }
}

impl Default for ManagedObjectPool {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────
