use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::error::CoreError;
use crate::value::Value;

// ── Rational ──────────────────────────────────────────────────────

/// An exact rational, canonical: lowest terms, denominator > 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rational {
    numer: BigInt,
    denom: BigInt,
}

impl Rational {
    pub fn new(numer: BigInt, denom: BigInt) -> Result<Rational, CoreError> {
        if denom.is_zero() {
            return Err(CoreError::DivisionByZero);
        }
        let (mut n, mut d) = (numer, denom);
        if d.is_negative() {
            n = -n;
            d = -d;
        }
        let g = n.gcd(&d);
        if !g.is_one() {
            n /= &g;
            d /= &g;
        }
        Ok(Rational { numer: n, denom: d })
    }

    pub fn numer(&self) -> &BigInt {
        &self.numer
    }

    pub fn denom(&self) -> &BigInt {
        &self.denom
    }

    pub fn to_f64(&self) -> f64 {
        let n = self.numer.to_f64().unwrap_or(f64::NAN);
        let d = self.denom.to_f64().unwrap_or(f64::NAN);
        n / d
    }
}

impl Value {
    /// Integer constructor that picks the smallest representation.
    pub fn integer(n: BigInt) -> Value {
        match n.to_i64() {
            Some(i) => Value::Fixnum(i),
            None => Value::Bignum(Rc::new(n)),
        }
    }

    pub fn rational(numer: i64, denom: i64) -> Result<Value, CoreError> {
        Value::rational_big(BigInt::from(numer), BigInt::from(denom))
    }

    pub fn rational_big(numer: BigInt, denom: BigInt) -> Result<Value, CoreError> {
        Ok(Value::Rational(Rc::new(Rational::new(numer, denom)?)))
    }
}

// ── Canonical form ────────────────────────────────────────────────

/// The canonical numeric form used by equivalence and comparison:
/// a bignum that fits a fixnum becomes a fixnum, a rational with
/// denominator one becomes its numerator, a complex with positive-zero
/// imaginary part and non-NaN real becomes a flonum. Idempotent;
/// identity on everything non-numeric.
pub fn normalized(v: &Value) -> Value {
    match v {
        Value::Bignum(b) => match b.to_i64() {
            Some(i) => Value::Fixnum(i),
            None => v.clone(),
        },
        Value::Rational(r) => {
            if r.denom().is_one() {
                Value::integer(r.numer().clone())
            } else {
                v.clone()
            }
        }
        Value::Complex(re, im) => {
            if im.to_bits() == 0 && !re.is_nan() {
                Value::Flonum(*re)
            } else {
                v.clone()
            }
        }
        _ => v.clone(),
    }
}

// ── Comparison predicates ─────────────────────────────────────────

enum NumRepr {
    Exact { n: BigInt, d: BigInt },
    Real(f64),
    Cplx(f64, f64),
}

fn repr(v: &Value) -> Result<NumRepr, CoreError> {
    match v {
        Value::Fixnum(n) => Ok(NumRepr::Exact {
            n: BigInt::from(*n),
            d: BigInt::one(),
        }),
        Value::Bignum(b) => Ok(NumRepr::Exact {
            n: (**b).clone(),
            d: BigInt::one(),
        }),
        Value::Rational(r) => Ok(NumRepr::Exact {
            n: r.numer().clone(),
            d: r.denom().clone(),
        }),
        Value::Flonum(f) => Ok(NumRepr::Real(*f)),
        Value::Complex(re, im) => Ok(NumRepr::Cplx(*re, *im)),
        other => Err(CoreError::type_error("number", other.type_name())),
    }
}

fn exact_to_f64(n: &BigInt, d: &BigInt) -> f64 {
    n.to_f64().unwrap_or(f64::NAN) / d.to_f64().unwrap_or(f64::NAN)
}

/// Mathematical equality across numeric variants. Exact and inexact
/// operands compare by value, signed zeros compare equal, NaN is never
/// equal to anything. Non-numbers are a type error.
pub fn num_eq(a: &Value, b: &Value) -> Result<bool, CoreError> {
    let (ra, rb) = (repr(a)?, repr(b)?);
    Ok(match (ra, rb) {
        (NumRepr::Exact { n: an, d: ad }, NumRepr::Exact { n: bn, d: bd }) => {
            an * bd == bn * ad
        }
        (NumRepr::Exact { n, d }, NumRepr::Real(f))
        | (NumRepr::Real(f), NumRepr::Exact { n, d }) => exact_to_f64(&n, &d) == f,
        (NumRepr::Real(x), NumRepr::Real(y)) => x == y,
        (NumRepr::Cplx(ar, ai), NumRepr::Cplx(br, bi)) => ar == br && ai == bi,
        (NumRepr::Cplx(re, im), NumRepr::Real(f))
        | (NumRepr::Real(f), NumRepr::Cplx(re, im)) => im == 0.0 && re == f,
        (NumRepr::Cplx(re, im), NumRepr::Exact { n, d })
        | (NumRepr::Exact { n, d }, NumRepr::Cplx(re, im)) => {
            im == 0.0 && re == exact_to_f64(&n, &d)
        }
    })
}

/// Total order over the reals. Complex operands and NaN are not
/// orderable; non-numbers are a type error.
pub fn num_cmp(a: &Value, b: &Value) -> Result<Ordering, CoreError> {
    let (ra, rb) = (repr(a)?, repr(b)?);
    match (ra, rb) {
        (NumRepr::Cplx(..), _) | (_, NumRepr::Cplx(..)) => {
            Err(CoreError::not_comparable(a.datum_type(), b.datum_type()))
        }
        (NumRepr::Exact { n: an, d: ad }, NumRepr::Exact { n: bn, d: bd }) => {
            // Denominators are positive, so cross-multiplying preserves order.
            Ok((an * bd).cmp(&(bn * ad)))
        }
        (NumRepr::Exact { n, d }, NumRepr::Real(f)) => exact_to_f64(&n, &d)
            .partial_cmp(&f)
            .ok_or_else(|| CoreError::not_comparable(a.datum_type(), b.datum_type())),
        (NumRepr::Real(f), NumRepr::Exact { n, d }) => f
            .partial_cmp(&exact_to_f64(&n, &d))
            .ok_or_else(|| CoreError::not_comparable(a.datum_type(), b.datum_type())),
        (NumRepr::Real(x), NumRepr::Real(y)) => x
            .partial_cmp(&y)
            .ok_or_else(|| CoreError::not_comparable(a.datum_type(), b.datum_type())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Type;

    fn rat(n: i64, d: i64) -> Rational {
        Rational::new(BigInt::from(n), BigInt::from(d)).unwrap()
    }

    #[test]
    fn rationals_canonicalise_to_lowest_terms() {
        let r = rat(2, 4);
        assert_eq!(r.numer(), &BigInt::from(1));
        assert_eq!(r.denom(), &BigInt::from(2));
    }

    #[test]
    fn rational_denominator_is_positive() {
        let r = rat(1, -2);
        assert_eq!(r.numer(), &BigInt::from(-1));
        assert_eq!(r.denom(), &BigInt::from(2));
        let r = rat(-3, -6);
        assert_eq!(r.numer(), &BigInt::from(1));
        assert_eq!(r.denom(), &BigInt::from(2));
    }

    #[test]
    fn zero_denominator_is_an_error() {
        assert_eq!(
            Rational::new(BigInt::from(1), BigInt::zero()),
            Err(CoreError::DivisionByZero)
        );
    }

    #[test]
    fn normalized_demotes_unit_denominator() {
        let v = Value::rational(4, 2).unwrap();
        assert!(matches!(normalized(&v), Value::Fixnum(2)));
        let v = Value::rational(2, 4).unwrap();
        assert!(matches!(normalized(&v), Value::Rational(_)));
    }

    #[test]
    fn normalized_demotes_small_bignum() {
        let v = Value::bignum(BigInt::from(42));
        assert!(matches!(normalized(&v), Value::Fixnum(42)));
        let big = BigInt::from(i64::MAX) * 2;
        let v = Value::bignum(big);
        assert!(matches!(normalized(&v), Value::Bignum(_)));
    }

    #[test]
    fn normalized_collapses_real_complex() {
        assert!(matches!(
            normalized(&Value::complex(2.5, 0.0)),
            Value::Flonum(f) if f == 2.5
        ));
        // Negative-zero imaginary part carries sign information.
        assert!(matches!(
            normalized(&Value::complex(2.5, -0.0)),
            Value::Complex(..)
        ));
        // NaN real never collapses.
        assert!(matches!(
            normalized(&Value::complex(f64::NAN, 0.0)),
            Value::Complex(..)
        ));
    }

    #[test]
    fn normalized_is_idempotent() {
        for v in [
            Value::rational(4, 2).unwrap(),
            Value::bignum(BigInt::from(7)),
            Value::complex(1.0, 0.0),
            Value::flonum(-0.0),
            Value::fixnum(3),
        ] {
            let once = normalized(&v);
            let twice = normalized(&once);
            assert!(crate::equiv::eqv(&once, &twice));
        }
    }

    #[test]
    fn num_eq_crosses_exactness() {
        assert!(num_eq(&Value::fixnum(2), &Value::flonum(2.0)).unwrap());
        assert!(num_eq(&Value::rational(1, 2).unwrap(), &Value::flonum(0.5)).unwrap());
        assert!(!num_eq(&Value::fixnum(2), &Value::flonum(2.5)).unwrap());
        assert!(num_eq(&Value::flonum(0.0), &Value::flonum(-0.0)).unwrap());
        assert!(!num_eq(&Value::flonum(f64::NAN), &Value::flonum(f64::NAN)).unwrap());
        assert!(num_eq(&Value::complex(2.0, -0.0), &Value::flonum(2.0)).unwrap());
    }

    #[test]
    fn num_eq_rejects_non_numbers() {
        assert_eq!(
            num_eq(&Value::string("1"), &Value::fixnum(1)),
            Err(CoreError::type_error("number", "string"))
        );
    }

    #[test]
    fn num_cmp_orders_mixed_exactness() {
        assert_eq!(
            num_cmp(&Value::rational(1, 3).unwrap(), &Value::flonum(0.5)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            num_cmp(&Value::fixnum(3), &Value::fixnum(3)).unwrap(),
            Ordering::Equal
        );
        assert_eq!(
            num_cmp(
                &Value::bignum(BigInt::from(i64::MAX) * 3),
                &Value::fixnum(i64::MAX)
            )
            .unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn num_cmp_rejects_complex_and_nan() {
        assert_eq!(
            num_cmp(&Value::complex(1.0, 2.0), &Value::fixnum(1)),
            Err(CoreError::not_comparable(Type::Complex, Type::Fixnum))
        );
        assert_eq!(
            num_cmp(&Value::flonum(f64::NAN), &Value::flonum(1.0)),
            Err(CoreError::not_comparable(Type::Flonum, Type::Flonum))
        );
    }
}
