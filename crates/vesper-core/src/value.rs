use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use lasso::{Rodeo, Spur};
use num_bigint::BigInt;

use crate::number::Rational;
use crate::pool::{ManagedCell, ObjHeader};
use crate::table::HashTable;

// ── Symbol interning ──────────────────────────────────────────────

thread_local! {
    static INTERNER: RefCell<Rodeo> = RefCell::new(Rodeo::default());
}

/// Intern a string, returning a Spur key.
pub fn intern(s: &str) -> Spur {
    INTERNER.with(|r| r.borrow_mut().get_or_intern(s))
}

/// Resolve a Spur key back to a String.
pub fn resolve(spur: Spur) -> String {
    INTERNER.with(|r| r.borrow().resolve(&spur).to_string())
}

/// Resolve a Spur and call f with the &str, avoiding allocation.
pub fn with_resolved<F, R>(spur: Spur, f: F) -> R
where
    F: FnOnce(&str) -> R,
{
    INTERNER.with(|r| {
        let interner = r.borrow();
        f(interner.resolve(&spur))
    })
}

// ── Heap cell types ───────────────────────────────────────────────

/// A mutable cons cell.
#[derive(Debug)]
pub struct MutPair {
    header: ObjHeader,
    cell: RefCell<(Value, Value)>,
}

impl MutPair {
    pub fn new(car: Value, cdr: Value) -> Self {
        MutPair {
            header: ObjHeader::new(),
            cell: RefCell::new((car, cdr)),
        }
    }

    pub fn car(&self) -> Value {
        self.cell.borrow().0.clone()
    }

    pub fn cdr(&self) -> Value {
        self.cell.borrow().1.clone()
    }

    pub fn parts(&self) -> (Value, Value) {
        self.cell.borrow().clone()
    }

    pub fn set_car(&self, v: Value) {
        self.cell.borrow_mut().0 = v;
    }

    pub fn set_cdr(&self, v: Value) {
        self.cell.borrow_mut().1 = v;
    }
}

impl ManagedCell for MutPair {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn object_kind(&self) -> &'static str {
        "mpair"
    }

    fn mark_children(&self, epoch: u8) {
        let cell = self.cell.borrow();
        cell.0.mark(epoch);
        cell.1.mark(epoch);
    }

    fn cleanup(&self) {
        *self.cell.borrow_mut() = (Value::Null, Value::Null);
    }
}

/// A one-slot mutable container.
#[derive(Debug)]
pub struct MutBox {
    header: ObjHeader,
    slot: RefCell<Value>,
}

impl MutBox {
    pub fn new(v: Value) -> Self {
        MutBox {
            header: ObjHeader::new(),
            slot: RefCell::new(v),
        }
    }

    pub fn get(&self) -> Value {
        self.slot.borrow().clone()
    }

    pub fn set(&self, v: Value) {
        *self.slot.borrow_mut() = v;
    }
}

impl ManagedCell for MutBox {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn object_kind(&self) -> &'static str {
        "box"
    }

    fn mark_children(&self, epoch: u8) {
        self.slot.borrow().mark(epoch);
    }

    fn cleanup(&self) {
        *self.slot.borrow_mut() = Value::Null;
    }
}

/// A vector of values, growable or fixed-length.
#[derive(Debug)]
pub struct VectorObj {
    header: ObjHeader,
    growable: bool,
    items: RefCell<Vec<Value>>,
}

impl VectorObj {
    pub fn new(items: Vec<Value>, growable: bool) -> Self {
        VectorObj {
            header: ObjHeader::new(),
            growable,
            items: RefCell::new(items),
        }
    }

    pub fn is_growable(&self) -> bool {
        self.growable
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn item(&self, i: usize) -> Option<Value> {
        self.items.borrow().get(i).cloned()
    }

    pub fn items(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    pub fn set_item(&self, i: usize, v: Value) -> bool {
        let mut items = self.items.borrow_mut();
        match items.get_mut(i) {
            Some(slot) => {
                *slot = v;
                true
            }
            None => false,
        }
    }

    /// Append to a growable vector; refused (false) on fixed-length ones.
    pub fn push(&self, v: Value) -> bool {
        if !self.growable {
            return false;
        }
        self.items.borrow_mut().push(v);
        true
    }
}

impl ManagedCell for VectorObj {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn object_kind(&self) -> &'static str {
        "vector"
    }

    fn mark_children(&self, epoch: u8) {
        for item in self.items.borrow().iter() {
            item.mark(epoch);
        }
    }

    fn cleanup(&self) {
        self.items.borrow_mut().clear();
    }
}

/// A fixed-shape array of values. Elements are mutable, the shape is not.
#[derive(Debug)]
pub struct ArrayObj {
    header: ObjHeader,
    items: RefCell<Vec<Value>>,
}

impl ArrayObj {
    pub fn new(items: Vec<Value>) -> Self {
        ArrayObj {
            header: ObjHeader::new(),
            items: RefCell::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn item(&self, i: usize) -> Option<Value> {
        self.items.borrow().get(i).cloned()
    }

    pub fn items(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    pub fn set_item(&self, i: usize, v: Value) -> bool {
        let mut items = self.items.borrow_mut();
        match items.get_mut(i) {
            Some(slot) => {
                *slot = v;
                true
            }
            None => false,
        }
    }
}

impl ManagedCell for ArrayObj {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn object_kind(&self) -> &'static str {
        "array"
    }

    fn mark_children(&self, epoch: u8) {
        for item in self.items.borrow().iter() {
            item.mark(epoch);
        }
    }

    fn cleanup(&self) {
        self.items.borrow_mut().clear();
    }
}

/// A record: user-defined product type identified by a kind symbol.
#[derive(Debug)]
pub struct RecordObj {
    header: ObjHeader,
    kind: Spur,
    fields: RefCell<Vec<Value>>,
}

impl RecordObj {
    pub fn new(kind: Spur, fields: Vec<Value>) -> Self {
        RecordObj {
            header: ObjHeader::new(),
            kind,
            fields: RefCell::new(fields),
        }
    }

    pub fn kind(&self) -> Spur {
        self.kind
    }

    pub fn field(&self, i: usize) -> Option<Value> {
        self.fields.borrow().get(i).cloned()
    }

    pub fn fields(&self) -> Vec<Value> {
        self.fields.borrow().clone()
    }

    pub fn set_field(&self, i: usize, v: Value) -> bool {
        let mut fields = self.fields.borrow_mut();
        match fields.get_mut(i) {
            Some(slot) => {
                *slot = v;
                true
            }
            None => false,
        }
    }
}

impl ManagedCell for RecordObj {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn object_kind(&self) -> &'static str {
        "record"
    }

    fn mark_children(&self, epoch: u8) {
        for field in self.fields.borrow().iter() {
            field.mark(epoch);
        }
    }

    fn cleanup(&self) {
        self.fields.borrow_mut().clear();
    }
}

/// Which opaque runtime handle an [`OpaqueObj`] stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpaqueKind {
    Procedure,
    Special,
    Env,
    Port,
    Object,
    Promise,
    Error,
}

impl OpaqueKind {
    pub fn name(self) -> &'static str {
        match self {
            OpaqueKind::Procedure => "procedure",
            OpaqueKind::Special => "special",
            OpaqueKind::Env => "env",
            OpaqueKind::Port => "port",
            OpaqueKind::Object => "object",
            OpaqueKind::Promise => "promise",
            OpaqueKind::Error => "error",
        }
    }
}

/// An opaque runtime handle (procedure, environment, port, ...).
///
/// The core only needs identity comparison and the ability to mark and
/// sever the values the handle captures; everything else about these
/// objects belongs to the embedder.
#[derive(Debug)]
pub struct OpaqueObj {
    header: ObjHeader,
    kind: OpaqueKind,
    slots: RefCell<Vec<Value>>,
}

impl OpaqueObj {
    pub fn new(kind: OpaqueKind, slots: Vec<Value>) -> Self {
        OpaqueObj {
            header: ObjHeader::new(),
            kind,
            slots: RefCell::new(slots),
        }
    }

    pub fn kind(&self) -> OpaqueKind {
        self.kind
    }

    pub fn slots(&self) -> Vec<Value> {
        self.slots.borrow().clone()
    }
}

impl ManagedCell for OpaqueObj {
    fn header(&self) -> &ObjHeader {
        &self.header
    }

    fn object_kind(&self) -> &'static str {
        self.kind.name()
    }

    fn mark_children(&self, epoch: u8) {
        for slot in self.slots.borrow().iter() {
            slot.mark(epoch);
        }
    }

    fn cleanup(&self) {
        self.slots.borrow_mut().clear();
    }
}

/// Source position carried by syntax values; compared by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub line: u32,
    pub col: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A syntax object: a payload annotated with its source position.
#[derive(Debug)]
pub struct SyntaxObj {
    pub pos: SourcePos,
    pub payload: Value,
}

// ── Value ─────────────────────────────────────────────────────────

/// The uniform tagged datum used throughout the interpreter.
///
/// Immutable payloads live inline (or behind a plain `Rc` when too
/// large); shared mutable cells sit behind `Rc`-managed objects that
/// carry the collector header.
#[derive(Clone)]
pub enum Value {
    Undef,
    Void,
    Eof,
    Null,
    True,
    False,
    Symbol(Spur),
    Uninit(Spur),
    Char(u16),
    Fixnum(i64),
    Bignum(Rc<BigInt>),
    Rational(Rc<Rational>),
    Flonum(f64),
    Complex(f64, f64),
    Str(Rc<RefCell<String>>),
    Bytes(Rc<RefCell<Vec<u8>>>),
    Pair(Rc<(Value, Value)>),
    MPair(Rc<MutPair>),
    Box(Rc<MutBox>),
    Vector(Rc<VectorObj>),
    Array(Rc<ArrayObj>),
    Record(Rc<RecordObj>),
    Table(Rc<HashTable>),
    Opaque(Rc<OpaqueObj>),
    Tagged(Rc<(Value, Value)>),
    Syntax(Rc<SyntaxObj>),
    Values(Rc<Value>),
}

/// Domain type discriminator, used in type errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Undef,
    Void,
    Eof,
    Null,
    Boolean,
    Symbol,
    Uninit,
    Char,
    Fixnum,
    Bignum,
    Rational,
    Flonum,
    Complex,
    Str,
    Bytes,
    Pair,
    MPair,
    Box,
    Vector,
    Array,
    Record,
    Table,
    Procedure,
    Special,
    Env,
    Port,
    Object,
    Promise,
    Error,
    Tagged,
    Syntax,
    Values,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Undef => "undef",
            Type::Void => "void",
            Type::Eof => "eof",
            Type::Null => "null",
            Type::Boolean => "boolean",
            Type::Symbol => "symbol",
            Type::Uninit => "uninit",
            Type::Char => "char",
            Type::Fixnum => "fixnum",
            Type::Bignum => "bignum",
            Type::Rational => "rational",
            Type::Flonum => "flonum",
            Type::Complex => "complex",
            Type::Str => "string",
            Type::Bytes => "bytes",
            Type::Pair => "pair",
            Type::MPair => "mpair",
            Type::Box => "box",
            Type::Vector => "vector",
            Type::Array => "array",
            Type::Record => "record",
            Type::Table => "table",
            Type::Procedure => "procedure",
            Type::Special => "special",
            Type::Env => "env",
            Type::Port => "port",
            Type::Object => "object",
            Type::Promise => "promise",
            Type::Error => "error",
            Type::Tagged => "tagged",
            Type::Syntax => "syntax",
            Type::Values => "values",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Constructors ──────────────────────────────────────────────────

impl Value {
    pub fn bool(b: bool) -> Value {
        if b {
            Value::True
        } else {
            Value::False
        }
    }

    pub fn fixnum(n: i64) -> Value {
        Value::Fixnum(n)
    }

    pub fn bignum(n: BigInt) -> Value {
        Value::Bignum(Rc::new(n))
    }

    pub fn flonum(f: f64) -> Value {
        Value::Flonum(f)
    }

    pub fn complex(re: f64, im: f64) -> Value {
        Value::Complex(re, im)
    }

    pub fn char_code(cu: u16) -> Value {
        Value::Char(cu)
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(intern(name))
    }

    pub fn uninit(name: &str) -> Value {
        Value::Uninit(intern(name))
    }

    pub fn string(s: &str) -> Value {
        Value::Str(Rc::new(RefCell::new(s.to_string())))
    }

    pub fn bytes(b: Vec<u8>) -> Value {
        Value::Bytes(Rc::new(RefCell::new(b)))
    }

    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new((car, cdr)))
    }

    pub fn mcons(car: Value, cdr: Value) -> Value {
        Value::MPair(Rc::new(MutPair::new(car, cdr)))
    }

    /// Build a proper list of immutable pairs.
    pub fn list<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(Value::Null, |acc, v| Value::cons(v, acc))
    }

    /// Build a proper list of mutable pairs.
    pub fn mlist<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(Value::Null, |acc, v| Value::mcons(v, acc))
    }

    pub fn boxed(v: Value) -> Value {
        Value::Box(Rc::new(MutBox::new(v)))
    }

    pub fn vector(items: Vec<Value>, growable: bool) -> Value {
        Value::Vector(Rc::new(VectorObj::new(items, growable)))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(ArrayObj::new(items)))
    }

    pub fn record(kind: &str, fields: Vec<Value>) -> Value {
        Value::Record(Rc::new(RecordObj::new(intern(kind), fields)))
    }

    pub fn table(t: HashTable) -> Value {
        Value::Table(Rc::new(t))
    }

    pub fn opaque(kind: OpaqueKind, slots: Vec<Value>) -> Value {
        Value::Opaque(Rc::new(OpaqueObj::new(kind, slots)))
    }

    pub fn procedure(slots: Vec<Value>) -> Value {
        Value::opaque(OpaqueKind::Procedure, slots)
    }

    pub fn tagged(tag: Value, payload: Value) -> Value {
        Value::Tagged(Rc::new((tag, payload)))
    }

    pub fn syntax(line: u32, col: u32, payload: Value) -> Value {
        Value::Syntax(Rc::new(SyntaxObj {
            pos: SourcePos { line, col },
            payload,
        }))
    }

    pub fn values(payload: Value) -> Value {
        Value::Values(Rc::new(payload))
    }
}

// ── Inspection ────────────────────────────────────────────────────

impl Value {
    pub fn datum_type(&self) -> Type {
        match self {
            Value::Undef => Type::Undef,
            Value::Void => Type::Void,
            Value::Eof => Type::Eof,
            Value::Null => Type::Null,
            Value::True | Value::False => Type::Boolean,
            Value::Symbol(_) => Type::Symbol,
            Value::Uninit(_) => Type::Uninit,
            Value::Char(_) => Type::Char,
            Value::Fixnum(_) => Type::Fixnum,
            Value::Bignum(_) => Type::Bignum,
            Value::Rational(_) => Type::Rational,
            Value::Flonum(_) => Type::Flonum,
            Value::Complex(..) => Type::Complex,
            Value::Str(_) => Type::Str,
            Value::Bytes(_) => Type::Bytes,
            Value::Pair(_) => Type::Pair,
            Value::MPair(_) => Type::MPair,
            Value::Box(_) => Type::Box,
            Value::Vector(_) => Type::Vector,
            Value::Array(_) => Type::Array,
            Value::Record(_) => Type::Record,
            Value::Table(_) => Type::Table,
            Value::Opaque(o) => match o.kind() {
                OpaqueKind::Procedure => Type::Procedure,
                OpaqueKind::Special => Type::Special,
                OpaqueKind::Env => Type::Env,
                OpaqueKind::Port => Type::Port,
                OpaqueKind::Object => Type::Object,
                OpaqueKind::Promise => Type::Promise,
                OpaqueKind::Error => Type::Error,
            },
            Value::Tagged(_) => Type::Tagged,
            Value::Syntax(_) => Type::Syntax,
            Value::Values(_) => Type::Values,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.datum_type().name()
    }

    /// All values are truthy except the `#f` singleton.
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::False)
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        matches!(self, Value::False)
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Fixnum(_)
                | Value::Bignum(_)
                | Value::Rational(_)
                | Value::Flonum(_)
                | Value::Complex(..)
        )
    }

    /// Exact numbers: integers and rationals.
    #[inline]
    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            Value::Fixnum(_) | Value::Bignum(_) | Value::Rational(_)
        )
    }

    #[inline]
    pub fn is_inexact(&self) -> bool {
        matches!(self, Value::Flonum(_) | Value::Complex(..))
    }

    pub fn as_fixnum(&self) -> Option<i64> {
        match self {
            Value::Fixnum(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flonum(&self) -> Option<f64> {
        match self {
            Value::Flonum(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Spur> {
        match self {
            Value::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_char_code(&self) -> Option<u16> {
        match self {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// Call f with the text of a string value.
    pub fn with_string<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&str) -> R,
    {
        match self {
            Value::Str(s) => Some(f(&s.borrow())),
            _ => None,
        }
    }

    /// Whether this value contains any heap cell that can participate
    /// in a reference cycle, i.e. whether a fresh value must enter the
    /// managed pool.
    pub fn requires_tracking(&self) -> bool {
        match self {
            Value::MPair(_)
            | Value::Box(_)
            | Value::Vector(_)
            | Value::Array(_)
            | Value::Record(_)
            | Value::Table(_)
            | Value::Opaque(_) => true,
            Value::Pair(p) => p.0.requires_tracking() || p.1.requires_tracking(),
            Value::Tagged(t) => t.0.requires_tracking() || t.1.requires_tracking(),
            Value::Syntax(s) => s.payload.requires_tracking(),
            Value::Values(inner) => inner.requires_tracking(),
            _ => false,
        }
    }

    /// Descend into heap children, setting their epoch tag. Handles
    /// already tagged with `epoch` are not revisited.
    pub fn mark(&self, epoch: u8) {
        match self {
            Value::Pair(p) => {
                p.0.mark(epoch);
                p.1.mark(epoch);
            }
            Value::Tagged(t) => {
                t.0.mark(epoch);
                t.1.mark(epoch);
            }
            Value::Syntax(s) => s.payload.mark(epoch),
            Value::Values(inner) => inner.mark(epoch),
            Value::MPair(m) => m.mark(epoch),
            Value::Box(b) => b.mark(epoch),
            Value::Vector(v) => v.mark(epoch),
            Value::Array(a) => a.mark(epoch),
            Value::Record(r) => r.mark(epoch),
            Value::Opaque(o) => o.mark(epoch),
            Value::Table(t) => t.mark(epoch),
            _ => {}
        }
    }
}

// ── Equality / rendering glue ─────────────────────────────────────

/// `==` is structural (`equal`) equivalence; use [`crate::equiv::eq`]
/// or [`crate::equiv::eqv`] for the finer relations.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        crate::equiv::equal(self, other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::write::display_value(self))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::write::write_value(self))
    }
}

// ── Tests ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(!Value::False.is_truthy());
        assert!(Value::True.is_truthy());
        assert!(Value::Null.is_truthy());
        assert!(Value::Undef.is_truthy());
        assert!(Value::fixnum(0).is_truthy());
        assert!(Value::string("").is_truthy());
    }

    #[test]
    fn type_names() {
        assert_eq!(Value::fixnum(1).type_name(), "fixnum");
        assert_eq!(Value::flonum(1.0).type_name(), "flonum");
        assert_eq!(Value::True.type_name(), "boolean");
        assert_eq!(Value::string("x").type_name(), "string");
        assert_eq!(Value::procedure(vec![]).type_name(), "procedure");
        assert_eq!(
            Value::opaque(OpaqueKind::Env, vec![]).type_name(),
            "env"
        );
    }

    #[test]
    fn symbols_intern_to_identical_keys() {
        let a = Value::symbol("foo");
        let b = Value::symbol("foo");
        let c = Value::symbol("bar");
        assert_eq!(a.as_symbol(), b.as_symbol());
        assert_ne!(a.as_symbol(), c.as_symbol());
        assert_eq!(resolve(a.as_symbol().unwrap()), "foo");
    }

    #[test]
    fn list_builder_folds_right() {
        let l = Value::list(vec![Value::fixnum(1), Value::fixnum(2)]);
        match &l {
            Value::Pair(p) => {
                assert_eq!(p.0.as_fixnum(), Some(1));
                match &p.1 {
                    Value::Pair(q) => {
                        assert_eq!(q.0.as_fixnum(), Some(2));
                        assert!(q.1.is_null());
                    }
                    other => panic!("expected pair, got {other:?}"),
                }
            }
            other => panic!("expected pair, got {other:?}"),
        }
    }

    #[test]
    fn tracking_recurses_through_immutable_wrappers() {
        assert!(!Value::fixnum(1).requires_tracking());
        assert!(!Value::string("s").requires_tracking());
        assert!(Value::mcons(Value::Null, Value::Null).requires_tracking());
        let wrapped = Value::cons(
            Value::fixnum(1),
            Value::cons(Value::boxed(Value::Null), Value::Null),
        );
        assert!(wrapped.requires_tracking());
        let plain = Value::cons(Value::fixnum(1), Value::Null);
        assert!(!plain.requires_tracking());
    }

    #[test]
    fn mark_tags_reachable_cells_once() {
        let inner = Value::mcons(Value::Null, Value::Null);
        let outer = Value::vector(vec![inner.clone(), inner.clone()], false);
        outer.mark(7);
        if let (Value::Vector(v), Value::MPair(m)) = (&outer, &inner) {
            assert_eq!(v.header().tag(), 7);
            assert_eq!(m.header().tag(), 7);
        }
    }

    #[test]
    fn mark_terminates_on_cycles() {
        let a = Value::mcons(Value::Null, Value::Null);
        if let Value::MPair(m) = &a {
            m.set_car(a.clone());
            m.set_cdr(a.clone());
        }
        a.mark(3);
        if let Value::MPair(m) = &a {
            assert_eq!(m.header().tag(), 3);
        }
    }

    #[test]
    fn growable_flag_gates_push() {
        let fixed = VectorObj::new(vec![Value::fixnum(1)], false);
        assert!(!fixed.push(Value::fixnum(2)));
        assert_eq!(fixed.len(), 1);
        let growable = VectorObj::new(vec![], true);
        assert!(growable.push(Value::fixnum(2)));
        assert_eq!(growable.len(), 1);
    }
}
