use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use hashbrown::HashSet;

use crate::number::normalized;
use crate::table::{Equiv, HashTable};
use crate::value::{Type, Value};

/// Side-effect-free probe consulted by long-running traversals; when
/// it returns true the traversal stops and yields a sentinel result.
pub type AbortProbe<'a> = &'a dyn Fn() -> bool;

// ── eq / eqv ──────────────────────────────────────────────────────

/// Identity equivalence. Numeric operands are compared in canonical
/// form; heap handles by pointer; immutable wrappers recurse.
pub fn eq(a: &Value, b: &Value) -> bool {
    eqv(a, b)
}

/// Equivalent. Coincides with [`eq`]: numeric variants are already
/// canonical, so no cross-representation promotion happens here.
pub fn eqv(a: &Value, b: &Value) -> bool {
    if a.is_number() || b.is_number() {
        if !(a.is_number() && b.is_number()) {
            return false;
        }
        return match (&normalized(a), &normalized(b)) {
            (Value::Fixnum(x), Value::Fixnum(y)) => x == y,
            (Value::Bignum(x), Value::Bignum(y)) => x == y,
            (Value::Rational(x), Value::Rational(y)) => {
                x.numer() == y.numer() && x.denom() == y.denom()
            }
            (Value::Flonum(x), Value::Flonum(y)) => {
                x.to_bits() == y.to_bits() && !x.is_nan()
            }
            (Value::Complex(xr, xi), Value::Complex(yr, yi)) => {
                xr.to_bits() == yr.to_bits()
                    && xi.to_bits() == yi.to_bits()
                    && !xr.is_nan()
                    && !xi.is_nan()
            }
            _ => false,
        };
    }
    match (a, b) {
        (Value::Undef, Value::Undef)
        | (Value::Void, Value::Void)
        | (Value::Eof, Value::Eof)
        | (Value::Null, Value::Null)
        | (Value::True, Value::True)
        | (Value::False, Value::False) => true,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Uninit(x), Value::Uninit(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y),
        (Value::Bytes(x), Value::Bytes(y)) => Rc::ptr_eq(x, y),
        (Value::Pair(x), Value::Pair(y)) => {
            Rc::ptr_eq(x, y) || (eqv(&x.0, &y.0) && eqv(&x.1, &y.1))
        }
        (Value::MPair(x), Value::MPair(y)) => Rc::ptr_eq(x, y),
        (Value::Box(x), Value::Box(y)) => Rc::ptr_eq(x, y),
        (Value::Vector(x), Value::Vector(y)) => Rc::ptr_eq(x, y),
        (Value::Array(x), Value::Array(y)) => Rc::ptr_eq(x, y),
        (Value::Record(x), Value::Record(y)) => Rc::ptr_eq(x, y),
        (Value::Table(x), Value::Table(y)) => Rc::ptr_eq(x, y),
        (Value::Opaque(x), Value::Opaque(y)) => Rc::ptr_eq(x, y),
        (Value::Tagged(x), Value::Tagged(y)) => {
            Rc::ptr_eq(x, y) || (eqv(&x.0, &y.0) && eqv(&x.1, &y.1))
        }
        (Value::Syntax(x), Value::Syntax(y)) => {
            Rc::ptr_eq(x, y) || (x.pos == y.pos && eqv(&x.payload, &y.payload))
        }
        (Value::Values(x), Value::Values(y)) => Rc::ptr_eq(x, y) || eqv(x, y),
        _ => false,
    }
}

// ── equal ─────────────────────────────────────────────────────────

struct EqualCtx<'a> {
    /// Unordered handle pairs currently assumed equal.
    assumed: HashSet<(usize, usize)>,
    probe: Option<AbortProbe<'a>>,
    aborted: bool,
}

impl EqualCtx<'_> {
    fn check_abort(&mut self) -> bool {
        if !self.aborted {
            if let Some(p) = self.probe {
                if p() {
                    self.aborted = true;
                }
            }
        }
        self.aborted
    }
}

fn pair_key(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Assume the handle pair equal for the duration of `f`; the tentative
/// assumption is withdrawn again when `f` reports a mismatch.
fn with_assumption<F>(ctx: &mut EqualCtx, a: usize, b: usize, f: F) -> bool
where
    F: FnOnce(&mut EqualCtx) -> bool,
{
    let key = pair_key(a, b);
    if !ctx.assumed.insert(key) {
        return true;
    }
    let result = f(ctx);
    if !result {
        ctx.assumed.remove(&key);
    }
    result
}

fn addr<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as usize
}

/// Structural equivalence. Terminates on shared and cyclic inputs.
pub fn equal(a: &Value, b: &Value) -> bool {
    equal_with_probe(a, b, None).unwrap_or(false)
}

/// Structural equivalence with an abort probe; `None` when aborted.
pub fn equal_with_probe(a: &Value, b: &Value, probe: Option<AbortProbe>) -> Option<bool> {
    let mut ctx = EqualCtx {
        assumed: HashSet::new(),
        probe,
        aborted: false,
    };
    let result = equal_rec(a, b, &mut ctx);
    if ctx.aborted {
        None
    } else {
        Some(result)
    }
}

fn equal_rec(a: &Value, b: &Value, ctx: &mut EqualCtx) -> bool {
    if ctx.check_abort() {
        return false;
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || *x.borrow() == *y.borrow(),
        (Value::Bytes(x), Value::Bytes(y)) => Rc::ptr_eq(x, y) || *x.borrow() == *y.borrow(),
        (Value::Pair(x), Value::Pair(y)) => {
            Rc::ptr_eq(x, y) || (equal_rec(&x.0, &y.0, ctx) && equal_rec(&x.1, &y.1, ctx))
        }
        (Value::MPair(x), Value::MPair(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            with_assumption(ctx, addr(x), addr(y), |ctx| {
                let (xa, xd) = x.parts();
                let (ya, yd) = y.parts();
                equal_rec(&xa, &ya, ctx) && equal_rec(&xd, &yd, ctx)
            })
        }
        (Value::Box(x), Value::Box(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            with_assumption(ctx, addr(x), addr(y), |ctx| {
                equal_rec(&x.get(), &y.get(), ctx)
            })
        }
        (Value::Vector(x), Value::Vector(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            if x.is_growable() != y.is_growable() || x.len() != y.len() {
                return false;
            }
            with_assumption(ctx, addr(x), addr(y), |ctx| {
                let (xs, ys) = (x.items(), y.items());
                xs.iter().zip(ys.iter()).all(|(xi, yi)| equal_rec(xi, yi, ctx))
            })
        }
        (Value::Array(x), Value::Array(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            if x.len() != y.len() {
                return false;
            }
            with_assumption(ctx, addr(x), addr(y), |ctx| {
                let (xs, ys) = (x.items(), y.items());
                xs.iter().zip(ys.iter()).all(|(xi, yi)| equal_rec(xi, yi, ctx))
            })
        }
        (Value::Record(x), Value::Record(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            if x.kind() != y.kind() {
                return false;
            }
            let (xs, ys) = (x.fields(), y.fields());
            if xs.len() != ys.len() {
                return false;
            }
            with_assumption(ctx, addr(x), addr(y), |ctx| {
                xs.iter().zip(ys.iter()).all(|(xi, yi)| equal_rec(xi, yi, ctx))
            })
        }
        (Value::Table(x), Value::Table(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            if !x.compatible_equiv(y) || x.count() != y.count() {
                return false;
            }
            with_assumption(ctx, addr(x), addr(y), |ctx| tables_match(x, y, ctx))
        }
        (Value::Tagged(x), Value::Tagged(y)) => {
            Rc::ptr_eq(x, y) || (eqv(&x.0, &y.0) && equal_rec(&x.1, &y.1, ctx))
        }
        (Value::Syntax(x), Value::Syntax(y)) => {
            Rc::ptr_eq(x, y) || (x.pos == y.pos && equal_rec(&x.payload, &y.payload, ctx))
        }
        (Value::Values(x), Value::Values(y)) => Rc::ptr_eq(x, y) || equal_rec(x, y, ctx),
        _ => eqv(a, b),
    }
}

/// O(n·m) mapping match: every right mapping must find an equal left
/// mapping. Assumptions made while testing a candidate are rolled back
/// to the last committed checkpoint when the candidate fails.
fn tables_match(x: &HashTable, y: &HashTable, ctx: &mut EqualCtx) -> bool {
    let left = x.mappings();
    let mut checkpoint = ctx.assumed.clone();
    for (rk, rv) in y.mappings() {
        let mut found = false;
        for (lk, lv) in &left {
            if equal_rec(lk, &rk, ctx) && equal_rec(lv, &rv, ctx) {
                found = true;
                break;
            }
            if ctx.aborted {
                return false;
            }
            ctx.assumed = checkpoint.clone();
        }
        if !found {
            return false;
        }
        checkpoint = ctx.assumed.clone();
    }
    true
}

// ── Hashers ───────────────────────────────────────────────────────

fn leaf<T: Hash + ?Sized>(x: &T) -> u64 {
    let mut h = DefaultHasher::new();
    x.hash(&mut h);
    h.finish()
}

/// Child hashes are mixed with a prime multiplier; the domain type tag
/// seeds the accumulator.
fn mix(h: u64, x: u64) -> u64 {
    h.wrapping_mul(31).wrapping_add(x)
}

/// Identity hash; coincides with [`hash_eqv`].
pub fn hash_eq(v: &Value) -> u64 {
    hash_eqv(v)
}

/// Hash matching [`eqv`]: canonical numeric form, pointer identity for
/// heap cells, structural over immutable wrappers.
pub fn hash_eqv(v: &Value) -> u64 {
    let tag = v.datum_type() as u64;
    match &normalized(v) {
        Value::Undef | Value::Void | Value::Eof | Value::Null => mix(tag, 0),
        Value::True => mix(tag, 1),
        Value::False => mix(tag, 0),
        Value::Symbol(s) | Value::Uninit(s) => mix(tag, leaf(s)),
        Value::Char(c) => mix(tag, *c as u64),
        Value::Fixnum(n) => mix(Type::Fixnum as u64, leaf(n)),
        Value::Bignum(b) => mix(Type::Bignum as u64, leaf(&**b)),
        Value::Rational(r) => mix(
            mix(Type::Rational as u64, leaf(r.numer())),
            leaf(r.denom()),
        ),
        Value::Flonum(f) => mix(Type::Flonum as u64, f.to_bits()),
        Value::Complex(re, im) => {
            mix(mix(Type::Complex as u64, re.to_bits()), im.to_bits())
        }
        Value::Str(s) => mix(tag, Rc::as_ptr(s) as u64),
        Value::Bytes(b) => mix(tag, Rc::as_ptr(b) as u64),
        Value::Pair(p) => mix(mix(tag, hash_eqv(&p.0)), hash_eqv(&p.1)),
        Value::MPair(m) => mix(tag, Rc::as_ptr(m) as u64),
        Value::Box(b) => mix(tag, Rc::as_ptr(b) as u64),
        Value::Vector(x) => mix(tag, Rc::as_ptr(x) as u64),
        Value::Array(x) => mix(tag, Rc::as_ptr(x) as u64),
        Value::Record(x) => mix(tag, Rc::as_ptr(x) as u64),
        Value::Table(x) => mix(tag, Rc::as_ptr(x) as u64),
        Value::Opaque(x) => mix(tag, Rc::as_ptr(x) as u64),
        Value::Tagged(t) => mix(mix(tag, hash_eqv(&t.0)), hash_eqv(&t.1)),
        Value::Syntax(s) => mix(
            mix(mix(tag, s.pos.line as u64), s.pos.col as u64),
            hash_eqv(&s.payload),
        ),
        Value::Values(inner) => mix(tag, hash_eqv(inner)),
    }
}

struct HashCtx<'a> {
    /// Handles on the current descent path; revisiting one means a
    /// cycle, which hashes to 0.
    visiting: HashSet<usize>,
    probe: Option<AbortProbe<'a>>,
    aborted: bool,
}

impl HashCtx<'_> {
    fn check_abort(&mut self) -> bool {
        if !self.aborted {
            if let Some(p) = self.probe {
                if p() {
                    self.aborted = true;
                }
            }
        }
        self.aborted
    }
}

/// Hash matching [`equal`]. Cycles are cut by a per-call visited set:
/// re-entering a handle already on the descent path contributes 0.
pub fn hash_equal(v: &Value) -> u64 {
    hash_equal_with_probe(v, None).unwrap_or(0)
}

/// Structural hash with an abort probe; `None` when aborted.
pub fn hash_equal_with_probe(v: &Value, probe: Option<AbortProbe>) -> Option<u64> {
    let mut ctx = HashCtx {
        visiting: HashSet::new(),
        probe,
        aborted: false,
    };
    let h = hash_equal_rec(v, &mut ctx);
    if ctx.aborted {
        None
    } else {
        Some(h)
    }
}

fn hash_visiting<T, F>(ctx: &mut HashCtx, rc: &Rc<T>, f: F) -> u64
where
    F: FnOnce(&mut HashCtx) -> u64,
{
    let key = Rc::as_ptr(rc) as usize;
    if !ctx.visiting.insert(key) {
        return 0;
    }
    let h = f(ctx);
    ctx.visiting.remove(&key);
    h
}

fn hash_equal_rec(v: &Value, ctx: &mut HashCtx) -> u64 {
    if ctx.check_abort() {
        return 0;
    }
    let tag = v.datum_type() as u64;
    match v {
        Value::Str(s) => mix(tag, leaf(s.borrow().as_str())),
        Value::Bytes(b) => mix(tag, leaf(b.borrow().as_slice())),
        Value::Pair(p) => mix(
            mix(tag, hash_equal_rec(&p.0, ctx)),
            hash_equal_rec(&p.1, ctx),
        ),
        Value::MPair(m) => hash_visiting(ctx, m, |ctx| {
            let (car, cdr) = m.parts();
            mix(mix(tag, hash_equal_rec(&car, ctx)), hash_equal_rec(&cdr, ctx))
        }),
        Value::Box(b) => {
            hash_visiting(ctx, b, |ctx| mix(tag, hash_equal_rec(&b.get(), ctx)))
        }
        Value::Vector(x) => hash_visiting(ctx, x, |ctx| {
            let mut h = mix(tag, x.is_growable() as u64);
            for item in x.items() {
                h = mix(h, hash_equal_rec(&item, ctx));
            }
            h
        }),
        Value::Array(x) => hash_visiting(ctx, x, |ctx| {
            let mut h = mix(tag, x.len() as u64);
            for item in x.items() {
                h = mix(h, hash_equal_rec(&item, ctx));
            }
            h
        }),
        Value::Record(x) => hash_visiting(ctx, x, |ctx| {
            let mut h = mix(tag, leaf(&x.kind()));
            for field in x.fields() {
                h = mix(h, hash_equal_rec(&field, ctx));
            }
            h
        }),
        Value::Table(t) => hash_visiting(ctx, t, |ctx| hash_table_contents(t, ctx)),
        Value::Tagged(t) => mix(mix(tag, hash_eqv(&t.0)), hash_equal_rec(&t.1, ctx)),
        Value::Syntax(s) => mix(
            mix(mix(tag, s.pos.line as u64), s.pos.col as u64),
            hash_equal_rec(&s.payload, ctx),
        ),
        Value::Values(inner) => mix(tag, hash_equal_rec(inner, ctx)),
        other => hash_eqv(other),
    }
}

/// Mapping hashes combine with a wrapping sum so two equal tables hash
/// alike regardless of bucket assignment and chain order.
fn hash_table_contents(t: &HashTable, ctx: &mut HashCtx) -> u64 {
    let mut h = mix(Type::Table as u64, t.count() as u64);
    match t.equiv() {
        Equiv::Eq => h = mix(h, 1),
        Equiv::Eqv => h = mix(h, 2),
        Equiv::Equal => h = mix(h, 3),
        Equiv::Custom(procs) => {
            h = mix(h, 4);
            h = mix(h, hash_eqv(&procs.eql));
            h = mix(h, hash_eqv(&procs.hsh));
        }
    }
    let mut sum = 0u64;
    for (k, val) in t.mappings() {
        sum = sum.wrapping_add(mix(hash_equal_rec(&k, ctx), hash_equal_rec(&val, ctx)));
    }
    mix(h, sum)
}

// ── Tests ─────────────────────────────────────────────────────────
