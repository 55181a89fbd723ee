//! Scan predicates and their evaluation against decoded values.

use crate::{error::Error, pattern::PatternRule, Alignment, Type, Value};
use std::fmt;

macro_rules! value_match {
    ($expr_a:expr, $expr_b:expr, $a:ident $op:tt $b:ident) => {
        match ($expr_a, $expr_b) {
            (Value::U8($a), Value::U8($b)) => $a $op $b,
            (Value::I8($a), Value::I8($b)) => $a $op $b,
            (Value::U16($a), Value::U16($b)) => $a $op $b,
            (Value::I16($a), Value::I16($b)) => $a $op $b,
            (Value::U32($a), Value::U32($b)) => $a $op $b,
            (Value::I32($a), Value::I32($b)) => $a $op $b,
            (Value::U64($a), Value::U64($b)) => $a $op $b,
            (Value::I64($a), Value::I64($b)) => $a $op $b,
            // non-finite floats never satisfy a relational operator, not
            // even equality. a NaN therefore always reads as changed.
            (Value::F32($a), Value::F32($b)) => {
                $a.is_finite() && $b.is_finite() && ($a $op $b)
            }
            (Value::F64($a), Value::F64($b)) => {
                $a.is_finite() && $b.is_finite() && ($a $op $b)
            }
            (Value::String($a), Value::String($b)) => $a $op $b,
            (Value::Bytes($a), Value::Bytes($b)) => $a $op $b,
            _ => false,
        }
    };
}

/// The comparison a scan pass applies at every candidate.
#[derive(Debug, Clone)]
pub enum ScanOp {
    /// Match values exactly equal to the given one.
    Exact(Value),
    /// Match values within the given inclusive range.
    InRange(Value, Value),
    /// Match values greater than or equal to the given one.
    Gte(Value),
    /// Match values less than the given one.
    Lt(Value),
    /// Match values which differ from the previous generation.
    Changed,
    /// Match values identical to the previous generation.
    Unchanged,
    /// Match values strictly greater than the previous generation.
    Increased,
    /// Match values strictly less than the previous generation.
    Decreased,
    /// Match offsets where a compiled pattern rule fires.
    Pattern(PatternRule),
}

impl ScanOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exact(..) => "exact",
            Self::InRange(..) => "in-range",
            Self::Gte(..) => "greater-or-equal",
            Self::Lt(..) => "less-than",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Increased => "increased",
            Self::Decreased => "decreased",
            Self::Pattern(..) => "pattern",
        }
    }

    /// Test if the operator compares against a previous generation.
    pub fn requires_prior(&self) -> bool {
        matches!(
            self,
            Self::Changed | Self::Unchanged | Self::Increased | Self::Decreased
        )
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern(..))
    }

    fn literal(&self) -> Option<&Value> {
        match self {
            Self::Exact(value) | Self::Gte(value) | Self::Lt(value) => Some(value),
            Self::InRange(min, ..) => Some(min),
            _ => None,
        }
    }
}

impl fmt::Display for ScanOp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(value) => write!(fmt, "== {}", value),
            Self::InRange(min, max) => write!(fmt, "in [{}, {}]", min, max),
            Self::Gte(value) => write!(fmt, ">= {}", value),
            Self::Lt(value) => write!(fmt, "< {}", value),
            Self::Pattern(rule) => write!(fmt, "pattern {}", rule),
            other => other.name().fmt(fmt),
        }
    }
}

/// A fully validated scan predicate.
///
/// Construction is the single place where operator/type combinations are
/// checked, so scan passes can match exhaustively without re-validating.
#[derive(Debug, Clone)]
pub struct Predicate {
    op: ScanOp,
    ty: Type,
    alignment: Alignment,
}

impl Predicate {
    pub fn new(op: ScanOp, ty: Type, alignment: Alignment) -> Result<Predicate, Error> {
        match &op {
            ScanOp::InRange(..) | ScanOp::Increased | ScanOp::Decreased if !ty.is_numeric() => {
                return Err(Error::InvalidOperatorForType(op.name(), ty));
            }
            ScanOp::Pattern(..) => {
                return Ok(Predicate { op, ty, alignment });
            }
            _ if ty == Type::Regex => {
                // regex is match-only; every value operator needs a decode.
                return Err(Error::InvalidOperatorForType(op.name(), ty));
            }
            _ => {}
        }

        if let Some(value) = op.literal() {
            if !ty.matches_value(value) {
                return Err(Error::TypeMismatch(value.ty(), ty));
            }
        }

        if let ScanOp::InRange(min, max) = &op {
            if !ty.matches_value(max) {
                return Err(Error::TypeMismatch(max.ty(), ty));
            }

            if value_match!(min, max, a > b) {
                return Err(Error::InvalidOperatorForType("in-range (empty)", ty));
            }
        }

        Ok(Predicate { op, ty, alignment })
    }

    pub fn op(&self) -> &ScanOp {
        &self.op
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    pub fn requires_prior(&self) -> bool {
        self.op.requires_prior()
    }

    pub fn is_pattern(&self) -> bool {
        self.op.is_pattern()
    }

    /// Test a freshly decoded value, with the previous generation's captured
    /// value as comparison basis where the operator needs one.
    pub fn test(&self, prior: Option<&Value>, value: &Value) -> bool {
        match &self.op {
            ScanOp::Exact(expected) => value_match!(value, expected, a == b),
            ScanOp::InRange(min, max) => {
                value_match!(value, min, a >= b) && value_match!(value, max, a <= b)
            }
            ScanOp::Gte(expected) => value_match!(value, expected, a >= b),
            ScanOp::Lt(expected) => value_match!(value, expected, a < b),
            ScanOp::Changed => match prior {
                Some(prior) => !value_eq(value, prior),
                None => false,
            },
            ScanOp::Unchanged => match prior {
                Some(prior) => value_eq(value, prior),
                None => false,
            },
            ScanOp::Increased => match prior {
                Some(prior) => value_match!(value, prior, a > b),
                None => false,
            },
            ScanOp::Decreased => match prior {
                Some(prior) => value_match!(value, prior, a < b),
                None => false,
            },
            // pattern rules fire on whole windows, never per-value.
            ScanOp::Pattern(..) => false,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.ty, self.op)
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    value_match!(a, b, a == b)
}

#[cfg(test)]
mod tests {
    use super::{Predicate, ScanOp};
    use crate::{Alignment, Error, Type, Value};

    fn predicate(op: ScanOp, ty: Type) -> Predicate {
        Predicate::new(op, ty, Alignment::DEFAULT).unwrap()
    }

    #[test]
    fn test_exact() {
        let p = predicate(ScanOp::Exact(Value::I32(42)), Type::I32);

        assert!(p.test(None, &Value::I32(42)));
        assert!(!p.test(None, &Value::I32(41)));
        assert!(!p.test(None, &Value::U32(42)));
    }

    #[test]
    fn test_range_inclusive() {
        let p = predicate(
            ScanOp::InRange(Value::I32(10), Value::I32(20)),
            Type::I32,
        );

        assert!(p.test(None, &Value::I32(10)));
        assert!(p.test(None, &Value::I32(20)));
        assert!(!p.test(None, &Value::I32(21)));
    }

    #[test]
    fn test_prior_comparisons() {
        let changed = predicate(ScanOp::Changed, Type::U8);
        let unchanged = predicate(ScanOp::Unchanged, Type::U8);
        let increased = predicate(ScanOp::Increased, Type::U8);

        let old = Value::U8(5);

        assert!(changed.test(Some(&old), &Value::U8(6)));
        assert!(!changed.test(Some(&old), &Value::U8(5)));
        assert!(unchanged.test(Some(&old), &Value::U8(5)));
        assert!(increased.test(Some(&old), &Value::U8(6)));
        assert!(!increased.test(Some(&old), &Value::U8(5)));

        // no prior generation: never matches.
        assert!(!changed.test(None, &Value::U8(6)));
        assert!(!increased.test(None, &Value::U8(6)));
    }

    #[test]
    fn test_nan_semantics() {
        let exact = predicate(ScanOp::Exact(Value::F32(f32::NAN)), Type::F32);
        assert!(!exact.test(None, &Value::F32(f32::NAN)));

        let unchanged = predicate(ScanOp::Unchanged, Type::F32);
        let changed = predicate(ScanOp::Changed, Type::F32);
        let nan = Value::F32(f32::NAN);

        assert!(!unchanged.test(Some(&nan), &nan));
        assert!(changed.test(Some(&nan), &nan));

        let inf = Value::F32(f32::INFINITY);
        let gte = predicate(ScanOp::Gte(Value::F32(0.0)), Type::F32);
        assert!(!gte.test(None, &inf));
    }

    #[test]
    fn test_construction_rejections() {
        assert!(matches!(
            Predicate::new(ScanOp::Increased, Type::String(8), Alignment::DEFAULT),
            Err(Error::InvalidOperatorForType("increased", ..))
        ));
        assert!(matches!(
            Predicate::new(ScanOp::Decreased, Type::Bytes(4), Alignment::DEFAULT),
            Err(Error::InvalidOperatorForType(..))
        ));
        assert!(matches!(
            Predicate::new(
                ScanOp::InRange(Value::String(vec![]), Value::String(vec![])),
                Type::String(4),
                Alignment::DEFAULT
            ),
            Err(Error::InvalidOperatorForType(..))
        ));
        assert!(matches!(
            Predicate::new(ScanOp::Exact(Value::U32(1)), Type::Regex, Alignment::DEFAULT),
            Err(Error::InvalidOperatorForType(..))
        ));
        assert!(matches!(
            Predicate::new(ScanOp::Exact(Value::U32(1)), Type::I32, Alignment::DEFAULT),
            Err(Error::TypeMismatch(..))
        ));
    }

    #[test]
    fn test_string_ops() {
        let p = predicate(
            ScanOp::Exact(Value::String(b"abc".to_vec())),
            Type::String(3),
        );

        assert!(p.test(None, &Value::String(b"abc".to_vec())));
        assert!(!p.test(None, &Value::String(b"abd".to_vec())));

        // lexicographic ordering is allowed for strings.
        let p = predicate(
            ScanOp::Lt(Value::String(b"b".to_vec())),
            Type::String(1),
        );
        assert!(p.test(None, &Value::String(b"a".to_vec())));
    }
}
