use std::fmt::Write as _;
use std::rc::Rc;

use hashbrown::{HashMap, HashSet};

use crate::equiv::AbortProbe;
use crate::value::{with_resolved, Value};

/// Render in `write` syntax: strings quoted and escaped, chars as
/// literals, shared/cyclic aggregates labeled `#N=` / `#N#`.
pub fn write_value(v: &Value) -> String {
    render(v, false, None)
}

/// Render in `display` syntax: strings raw, chars as themselves.
pub fn display_value(v: &Value) -> String {
    render(v, true, None)
}

/// `write` with an abort probe; returns the partial output on abort.
pub fn write_with_probe(v: &Value, probe: Option<AbortProbe>) -> String {
    render(v, false, probe)
}

/// `display` with an abort probe; returns the partial output on abort.
pub fn display_with_probe(v: &Value, probe: Option<AbortProbe>) -> String {
    render(v, true, probe)
}

fn render(v: &Value, display: bool, probe: Option<AbortProbe>) -> String {
    let mut scan = Scan::default();
    scan_value(v, &mut scan);
    let mut em = Emitter {
        out: String::new(),
        labels: scan.labels,
        emitted: HashSet::new(),
        display,
        probe,
        aborted: false,
    };
    em.emit(v);
    em.out
}

fn addr<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as usize
}

// ── Label pre-scan ────────────────────────────────────────────────

/// First pass over the graph: aggregates reached a second time get a
/// datum label, numbered in order of second encounter.
#[derive(Default)]
struct Scan {
    seen: HashSet<usize>,
    labels: HashMap<usize, usize>,
}

impl Scan {
    /// Returns true when the aggregate's children still need scanning.
    fn enter(&mut self, addr: usize) -> bool {
        if self.seen.insert(addr) {
            true
        } else {
            if !self.labels.contains_key(&addr) {
                let n = self.labels.len();
                self.labels.insert(addr, n);
            }
            false
        }
    }
}

fn scan_value(v: &Value, s: &mut Scan) {
    match v {
        Value::Pair(p) | Value::Tagged(p) => {
            scan_value(&p.0, s);
            scan_value(&p.1, s);
        }
        Value::Syntax(syn) => scan_value(&syn.payload, s),
        Value::Values(inner) => scan_value(inner, s),
        Value::MPair(m) => {
            if s.enter(addr(m)) {
                let (car, cdr) = m.parts();
                scan_value(&car, s);
                scan_value(&cdr, s);
            }
        }
        Value::Box(b) => {
            if s.enter(addr(b)) {
                scan_value(&b.get(), s);
            }
        }
        Value::Vector(x) => {
            if s.enter(addr(x)) {
                for item in x.items() {
                    scan_value(&item, s);
                }
            }
        }
        Value::Array(x) => {
            if s.enter(addr(x)) {
                for item in x.items() {
                    scan_value(&item, s);
                }
            }
        }
        Value::Record(x) => {
            if s.enter(addr(x)) {
                for field in x.fields() {
                    scan_value(&field, s);
                }
            }
        }
        // Tables and opaque handles render without their contents, so
        // they never need labels and the scan stops at them.
        _ => {}
    }
}

// ── Emission ──────────────────────────────────────────────────────

struct Emitter<'a> {
    out: String,
    labels: HashMap<usize, usize>,
    emitted: HashSet<usize>,
    display: bool,
    probe: Option<AbortProbe<'a>>,
    aborted: bool,
}

enum ChainStep {
    Item(Value, Value),
    Dot(Value),
    End,
}

impl Emitter<'_> {
    fn abort_check(&mut self) -> bool {
        if !self.aborted {
            if let Some(p) = self.probe {
                if p() {
                    self.aborted = true;
                }
            }
        }
        self.aborted
    }

    /// Emit the `#N=` prefix on an aggregate's first occurrence, or
    /// the whole `#N#` back-reference on later ones (returning true).
    fn open_label(&mut self, addr: usize) -> bool {
        if let Some(&n) = self.labels.get(&addr) {
            if self.emitted.insert(addr) {
                let _ = write!(self.out, "#{n}=");
                false
            } else {
                let _ = write!(self.out, "#{n}#");
                true
            }
        } else {
            false
        }
    }

    fn emit(&mut self, v: &Value) {
        if self.abort_check() {
            return;
        }
        match v {
            Value::Undef => self.out.push_str("#<undef>"),
            Value::Void => self.out.push_str("#<void>"),
            Value::Eof => self.out.push_str("#<eof>"),
            Value::Null => self.out.push_str("()"),
            Value::True => self.out.push_str("#t"),
            Value::False => self.out.push_str("#f"),
            Value::Symbol(s) => with_resolved(*s, |name| self.out.push_str(name)),
            Value::Uninit(s) => {
                self.out.push_str("#<uninit ");
                with_resolved(*s, |name| self.out.push_str(name));
                self.out.push('>');
            }
            Value::Char(cu) => self.emit_char(*cu),
            Value::Fixnum(n) => {
                let _ = write!(self.out, "{n}");
            }
            Value::Bignum(b) => {
                let _ = write!(self.out, "{b}");
            }
            Value::Rational(r) => {
                let _ = write!(self.out, "{}/{}", r.numer(), r.denom());
            }
            Value::Flonum(f) => push_flonum(&mut self.out, *f),
            Value::Complex(re, im) => {
                push_flonum(&mut self.out, *re);
                let mut part = String::new();
                push_flonum(&mut part, *im);
                if !part.starts_with('-') && !part.starts_with('+') {
                    self.out.push('+');
                }
                self.out.push_str(&part);
                self.out.push('i');
            }
            Value::Str(s) => {
                if self.display {
                    self.out.push_str(&s.borrow());
                } else {
                    push_escaped(&mut self.out, &s.borrow());
                }
            }
            Value::Bytes(b) => {
                self.out.push_str("#u8(");
                for (i, byte) in b.borrow().iter().enumerate() {
                    if i > 0 {
                        self.out.push(' ');
                    }
                    let _ = write!(self.out, "{byte}");
                }
                self.out.push(')');
            }
            Value::Pair(p) => self.emit_chain(p.0.clone(), p.1.clone()),
            Value::MPair(m) => {
                if self.open_label(addr(m)) {
                    return;
                }
                let (car, cdr) = m.parts();
                self.emit_chain(car, cdr);
            }
            Value::Box(b) => {
                if self.open_label(addr(b)) {
                    return;
                }
                self.out.push_str("#&");
                self.emit(&b.get());
            }
            Value::Vector(x) => {
                if self.open_label(addr(x)) {
                    return;
                }
                self.out.push_str("#(");
                for (i, item) in x.items().iter().enumerate() {
                    if i > 0 {
                        self.out.push(' ');
                    }
                    self.emit(item);
                }
                self.out.push(')');
            }
            Value::Array(x) => {
                if self.open_label(addr(x)) {
                    return;
                }
                self.out.push_str("#a(");
                for (i, item) in x.items().iter().enumerate() {
                    if i > 0 {
                        self.out.push(' ');
                    }
                    self.emit(item);
                }
                self.out.push(')');
            }
            Value::Record(x) => {
                if self.open_label(addr(x)) {
                    return;
                }
                self.out.push_str("#<record ");
                with_resolved(x.kind(), |name| self.out.push_str(name));
                for field in x.fields() {
                    self.out.push(' ');
                    self.emit(&field);
                }
                self.out.push('>');
            }
            Value::Table(t) => {
                let _ = write!(self.out, "#<table {}>", t.count());
            }
            Value::Opaque(o) => {
                let _ = write!(self.out, "#<{}>", o.kind().name());
            }
            Value::Tagged(t) => {
                self.out.push_str("#<tagged ");
                self.emit(&t.0);
                self.out.push(' ');
                self.emit(&t.1);
                self.out.push('>');
            }
            Value::Syntax(s) => {
                let _ = write!(self.out, "#<syntax {} ", s.pos);
                self.emit(&s.payload);
                self.out.push('>');
            }
            Value::Values(inner) => {
                self.out.push_str("#<values");
                match proper_list_items(inner) {
                    Some(items) => {
                        for item in items {
                            self.out.push(' ');
                            self.emit(&item);
                        }
                    }
                    None => {
                        self.out.push(' ');
                        self.emit(inner);
                    }
                }
                self.out.push('>');
            }
        }
    }

    /// Walk a cdr chain, emitting space-separated elements and a
    /// ` . tail)` when the chain ends in a non-null value. Labeled
    /// handles terminate the walk and render as the dotted tail.
    fn emit_chain(&mut self, head_car: Value, head_cdr: Value) {
        self.out.push('(');
        self.emit(&head_car);
        let mut tail = head_cdr;
        loop {
            if self.abort_check() {
                return;
            }
            let step = match &tail {
                Value::Null => ChainStep::End,
                Value::Pair(p) => ChainStep::Item(p.0.clone(), p.1.clone()),
                Value::MPair(m) if !self.labels.contains_key(&addr(m)) => {
                    let (car, cdr) = m.parts();
                    ChainStep::Item(car, cdr)
                }
                other => ChainStep::Dot(other.clone()),
            };
            match step {
                ChainStep::Item(car, cdr) => {
                    self.out.push(' ');
                    self.emit(&car);
                    tail = cdr;
                }
                ChainStep::Dot(t) => {
                    self.out.push_str(" . ");
                    self.emit(&t);
                    break;
                }
                ChainStep::End => break,
            }
        }
        self.out.push(')');
    }

    fn emit_char(&mut self, cu: u16) {
        if self.display {
            if let Some(c) = char::from_u32(cu as u32) {
                self.out.push(c);
                return;
            }
            // Unpaired surrogate: fall through to the write form.
        }
        if let Some(name) = char_name(cu) {
            let _ = write!(self.out, "#\\{name}");
            return;
        }
        match char::from_u32(cu as u32) {
            Some(c) if !c.is_control() && !c.is_whitespace() => {
                let _ = write!(self.out, "#\\{c}");
            }
            _ => {
                let _ = write!(self.out, "#\\u{cu:X}");
            }
        }
    }
}

/// Collect the elements of a proper list (immutable pairs ending in
/// null); None for anything else.
fn proper_list_items(v: &Value) -> Option<Vec<Value>> {
    let mut items = Vec::new();
    let mut cur = v.clone();
    loop {
        match cur {
            Value::Null => return Some(items),
            Value::Pair(p) => {
                items.push(p.0.clone());
                cur = p.1.clone();
            }
            _ => return None,
        }
    }
}

fn char_name(cu: u16) -> Option<&'static str> {
    match cu {
        0x00 => Some("nul"),
        0x07 => Some("alarm"),
        0x08 => Some("backspace"),
        0x09 => Some("tab"),
        0x0A => Some("newline"),
        0x0B => Some("vtab"),
        0x0C => Some("page"),
        0x0D => Some("return"),
        0x1B => Some("escape"),
        0x20 => Some("space"),
        0x7F => Some("delete"),
        _ => None,
    }
}

fn push_flonum(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("+nan.0");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "+inf.0" } else { "-inf.0" });
    } else if f.fract() == 0.0 {
        let _ = write!(out, "{f:.1}");
    } else {
        let _ = write!(out, "{f}");
    }
}

fn push_escaped(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{0B}' => out.push_str("\\v"),
            '\u{0C}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            '\u{1B}' => out.push_str("\\e"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 || c as u32 == 0x7F => {
                let _ = write!(out, "\\u{:X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

// ── Tests ─────────────────────────────────────────────────────────
