//! Runtime values, the type-tag taxonomy, and evaluation errors.
//!
//! Values are immutable and closed: every combination rule and every
//! expression case matches exhaustively over this enum, so an
//! unsupported pairing is a compile-visible arm, not a runtime
//! downcast. All numeric variants carry `rust_decimal::Decimal` or
//! `i64`; there is no `f64` anywhere in the evaluation path.

use std::collections::BTreeMap;
use std::fmt;

use fiscal_core::{Periodicity, Window};
use rust_decimal::Decimal;

use crate::period::{window_granularity, Granularity};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors raised during evaluation. All are fatal: the `evaluate` call
/// aborts on the first one, with no partial results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// No entity with that name exists in the program.
    UnknownEntity { name: String },
    /// No tax with that name exists in the program.
    UnknownTax { name: String },
    /// An entity exists but declares no field with that name.
    UnknownField { entity: String, field: String },
    /// An expression reference could not be bound in context --
    /// indicates a bug in the upstream resolution stage.
    UnresolvedReference { name: String },
    /// A field declared as a parameter has no externally supplied
    /// value. A configuration error, not an evaluation bug.
    MissingParameter { entity: String, field: String },
    /// A field has neither an expression, a sum marker, nor a
    /// parameter marker.
    UnresolvedField { entity: String, field: String },
    /// `sum`/`multiply` invoked on a value pair with no defined rule.
    UnsupportedCombination {
        op: &'static str,
        left: String,
        right: String,
    },
    /// Every condition of a `when` expression was false.
    NoClauseSatisfied,
    /// No window clause contains the requested period and no periodic
    /// roll-up applies.
    NoWindowMatched { period: String },
    /// A field's value depends on itself.
    CyclicDependency { scope: String, field: String },
    /// No payment row exists for that (entity, tax) pair.
    PaymentNotFound { entity: String, tax: String },
    /// A result accessor was asked for a name that does not exist.
    NotFound { kind: &'static str, name: String },
    /// A value of the wrong shape reached an operation.
    TypeError { message: String },
    /// Checked arithmetic overflowed.
    Overflow { message: String },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnknownEntity { name } => write!(f, "unknown entity: {}", name),
            EvalError::UnknownTax { name } => write!(f, "unknown tax: {}", name),
            EvalError::UnknownField { entity, field } => {
                write!(f, "entity '{}' has no field '{}'", entity, field)
            }
            EvalError::UnresolvedReference { name } => {
                write!(f, "unresolved reference: {}", name)
            }
            EvalError::MissingParameter { entity, field } => {
                write!(f, "missing parameter value for {}.{}", entity, field)
            }
            EvalError::UnresolvedField { entity, field } => {
                write!(
                    f,
                    "field {}.{} has no expression, sum marker or parameter marker",
                    entity, field
                )
            }
            EvalError::UnsupportedCombination { op, left, right } => {
                write!(f, "cannot {} {} and {}", op, left, right)
            }
            EvalError::NoClauseSatisfied => {
                write!(f, "no 'when' clause condition was satisfied")
            }
            EvalError::NoWindowMatched { period } => {
                write!(f, "no time window matches period {}", period)
            }
            EvalError::CyclicDependency { scope, field } => {
                write!(f, "cyclic dependency evaluating {}.{}", scope, field)
            }
            EvalError::PaymentNotFound { entity, tax } => {
                write!(f, "no payment computed for entity '{}' under tax '{}'", entity, tax)
            }
            EvalError::NotFound { kind, name } => write!(f, "{} '{}' not found", kind, name),
            EvalError::TypeError { message } => write!(f, "type error: {}", message),
            EvalError::Overflow { message } => write!(f, "numeric overflow: {}", message),
        }
    }
}

impl std::error::Error for EvalError {}

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// A reference to a geography declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoRef {
    Country(String),
    Region(String),
    City(String),
}

/// One clause of a time-alternatives value.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAlternative {
    pub window: Window,
    pub value: Value,
}

/// One tier of a progressive rate table. `limit: None` is the
/// open-ended `[above]` tier, always last.
#[derive(Debug, Clone, PartialEq)]
pub struct Bracket {
    pub limit: Option<Decimal>,
    pub rate: Value,
}

/// The closed set of runtime values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Decimal(Decimal),
    /// Stored out of 100; multiplying with an amount divides by 100.
    Percentage(Decimal),
    Bool(bool),
    Periodic {
        value: Box<Value>,
        periodicity: Periodicity,
    },
    /// A value whose definition differs across time windows. The
    /// windows need not partition time.
    TimeAlternatives(Vec<TimeAlternative>),
    /// Ownership map: entity name to percentage out of 100. Not
    /// required to sum to 100.
    Shares(BTreeMap<String, Decimal>),
    Brackets(Vec<Bracket>),
    Geo(GeoRef),
    /// A reference to an entity, by name.
    Entity(String),
    /// Explicit absence, distinct from zero.
    NoValue,
}

impl Value {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "Int",
            Value::Decimal(_) => "Decimal",
            Value::Percentage(_) => "Percentage",
            Value::Bool(_) => "Bool",
            Value::Periodic { .. } => "Periodic",
            Value::TimeAlternatives(_) => "TimeAlternatives",
            Value::Shares(_) => "Shares",
            Value::Brackets(_) => "Brackets",
            Value::Geo(_) => "Geo",
            Value::Entity(_) => "Entity",
            Value::NoValue => "NoValue",
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EvalError::TypeError {
                message: format!("expected Bool, got {}", other.type_name()),
            }),
        }
    }

    /// How this value varies over time: constants never, periodic
    /// values at their periodicity, time-alternatives at the finest
    /// granularity among their windows.
    pub fn granularity(&self) -> Granularity {
        match self {
            Value::Periodic { periodicity, .. } => match periodicity {
                Periodicity::Monthly => Granularity::Monthly,
                Periodicity::Yearly => Granularity::Yearly,
            },
            Value::TimeAlternatives(alternatives) => alternatives
                .iter()
                .map(|a| window_granularity(&a.window))
                .fold(Granularity::Constant, Granularity::min),
            _ => Granularity::Constant,
        }
    }
}

// ──────────────────────────────────────────────
// Type tags
// ──────────────────────────────────────────────

/// Type tags, used only to decide the monthly-to-yearly roll-up and
/// legal combinations -- never as a general type system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Decimal,
    Percentage,
    Bool,
    Shares,
    Brackets,
    NoType,
    Periodic(Box<ValueType>, Periodicity),
    /// Not statically known (references, field accesses).
    Unknown,
}

/// Common supertype of two tags: equal tags are their own supertype,
/// `NoType` is an identity, anything else degrades to `Unknown`.
pub fn common_supertype(a: ValueType, b: ValueType) -> ValueType {
    if a == b {
        a
    } else if a == ValueType::NoType {
        b
    } else if b == ValueType::NoType {
        a
    } else {
        ValueType::Unknown
    }
}

/// Common supertype of a list; an empty list has no type.
pub fn common_supertype_of(types: impl IntoIterator<Item = ValueType>) -> ValueType {
    types
        .into_iter()
        .reduce(common_supertype)
        .unwrap_or(ValueType::NoType)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
