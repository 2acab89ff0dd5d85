//! Expression evaluation against a context and a period.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use fiscal_core::{BracketLimit, Expr, Periodicity, Reference};

use crate::context::EvaluationContext;
use crate::numeric::{as_decimal, multiply, sum_pair, sum_values};
use crate::period::{window_contains, Period, MONTHS};
use crate::types::{
    common_supertype, common_supertype_of, Bracket, EvalError, GeoRef, Value, ValueType,
};

/// Evaluate an expression for a period.
pub fn eval(
    expr: &Expr,
    ctx: &EvaluationContext<'_>,
    period: &Period,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Decimal(d) => Ok(Value::Decimal(*d)),
        Expr::Percentage(p) => Ok(Value::Percentage(*p)),

        Expr::Reference(reference) => eval_reference(reference, ctx, period),

        Expr::Shares(entries) => {
            let mut shares = BTreeMap::new();
            for entry in entries {
                let share = match eval(&entry.share, ctx, period)? {
                    Value::Percentage(p) => p,
                    other => {
                        return Err(EvalError::TypeError {
                            message: format!(
                                "share of {} must be a percentage, got {}",
                                entry.owner,
                                other.type_name()
                            ),
                        });
                    }
                };
                shares.insert(entry.owner.clone(), share);
            }
            Ok(Value::Shares(shares))
        }

        Expr::Sum(a, b) => {
            let left = eval(a, ctx, period)?;
            let right = eval(b, ctx, period)?;
            sum_pair(&left, &right)
        }

        Expr::PercentOf { percent, base } => {
            let percent = eval(percent, ctx, period)?;
            let base = eval(base, ctx, period)?;
            multiply(&percent, &base)
        }

        Expr::FieldAccess { scope, field } => match eval(scope, ctx, period)? {
            Value::Entity(name) => ctx.field_value(&name, field, period),
            other => Err(EvalError::TypeError {
                message: format!(
                    "field {} accessed on a {}, not an entity",
                    field,
                    other.type_name()
                ),
            }),
        },

        Expr::Equality(a, b) => {
            let left = eval(a, ctx, period)?;
            let right = eval(b, ctx, period)?;
            Ok(Value::Bool(values_equal(&left, &right)))
        }

        Expr::When(clauses) => {
            for clause in clauses {
                if eval(&clause.condition, ctx, period)?.as_bool()? {
                    return eval(&clause.value, ctx, period);
                }
            }
            Err(EvalError::NoClauseSatisfied)
        }

        Expr::Windowed(clauses) => {
            for clause in clauses {
                if window_contains(&clause.window, period) {
                    return eval(&clause.value, ctx, period);
                }
            }
            // A yearly ask over monthly-periodic alternatives whose
            // windows all cut across the year: sum the twelve months.
            if period.is_yearly() && is_monthly_periodic(&expr_type(expr)) {
                return monthly_roll_up(expr, ctx, period.year());
            }
            Err(EvalError::NoWindowMatched {
                period: period.to_string(),
            })
        }

        Expr::Periodic { value, periodicity } => {
            if *periodicity == Periodicity::Monthly && period.is_yearly() {
                return monthly_roll_up(expr, ctx, period.year());
            }
            Ok(Value::Periodic {
                value: Box::new(eval(value, ctx, period)?),
                periodicity: *periodicity,
            })
        }

        Expr::Brackets(entries) => {
            let mut brackets = Vec::with_capacity(entries.len());
            for entry in entries {
                let limit = match &entry.limit {
                    BracketLimit::To(e) => Some(as_decimal(&eval(e, ctx, period)?)?),
                    BracketLimit::Above => None,
                };
                brackets.push(Bracket {
                    limit,
                    rate: eval(&entry.value, ctx, period)?,
                });
            }
            Ok(Value::Brackets(brackets))
        }

        Expr::ApplyBrackets { brackets, amount } => {
            let brackets = eval(brackets, ctx, period)?;
            let amount = eval(amount, ctx, period)?;
            multiply(&brackets, &amount)
        }
    }
}

fn eval_reference(
    reference: &Reference,
    ctx: &EvaluationContext<'_>,
    period: &Period,
) -> Result<Value, EvalError> {
    match reference {
        Reference::Entity(name) => Ok(Value::Entity(name.clone())),
        Reference::EntityField { entity, field } => ctx.field_value(entity, field, period),
        Reference::TaxField { tax, field } => {
            let entity = ctx
                .current_entity()
                .ok_or_else(|| EvalError::UnresolvedReference {
                    name: format!("{}.{}", tax, field),
                })?;
            ctx.tax_field_value(tax, &entity.name, field, period)
        }
        Reference::Country(name) => Ok(Value::Geo(GeoRef::Country(name.clone()))),
        Reference::Region(name) => Ok(Value::Geo(GeoRef::Region(name.clone()))),
        Reference::City(name) => Ok(Value::Geo(GeoRef::City(name.clone()))),
    }
}

/// Evaluate `expr` for each month of `year` and sum the twelve
/// unwrapped values. Every month must produce a monthly periodic.
fn monthly_roll_up(
    expr: &Expr,
    ctx: &EvaluationContext<'_>,
    year: i32,
) -> Result<Value, EvalError> {
    let mut months = Vec::with_capacity(12);
    for month in MONTHS {
        let value = eval(expr, ctx, &Period::monthly(month, year))?;
        match value {
            Value::Periodic {
                value,
                periodicity: Periodicity::Monthly,
            } => months.push(*value),
            other => {
                return Err(EvalError::TypeError {
                    message: format!(
                        "expected a monthly value for {:?} {}, got {}",
                        month,
                        year,
                        other.type_name()
                    ),
                });
            }
        }
    }
    sum_values(months)
}

/// Structural equality with numeric promotion across Int and Decimal.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(n), Value::Decimal(d)) | (Value::Decimal(d), Value::Int(n)) => {
            Decimal::from(*n) == *d
        }
        _ => a == b,
    }
}

fn is_monthly_periodic(t: &ValueType) -> bool {
    matches!(t, ValueType::Periodic(_, Periodicity::Monthly))
}

/// The static type of an expression, without evaluating it.
/// References and field accesses are `Unknown` at this level.
pub fn expr_type(expr: &Expr) -> ValueType {
    match expr {
        Expr::Int(_) => ValueType::Int,
        Expr::Decimal(_) => ValueType::Decimal,
        Expr::Percentage(_) => ValueType::Percentage,
        Expr::Reference(_) | Expr::FieldAccess { .. } => ValueType::Unknown,
        Expr::Shares(_) => ValueType::Shares,
        Expr::Sum(a, b) => common_supertype(expr_type(a), expr_type(b)),
        Expr::PercentOf { .. } => ValueType::Decimal,
        Expr::Equality(_, _) => ValueType::Bool,
        Expr::When(clauses) => {
            common_supertype_of(clauses.iter().map(|c| expr_type(&c.value)))
        }
        Expr::Windowed(clauses) => {
            common_supertype_of(clauses.iter().map(|c| expr_type(&c.value)))
        }
        Expr::Periodic { value, periodicity } => {
            ValueType::Periodic(Box::new(expr_type(value)), *periodicity)
        }
        Expr::Brackets(_) => ValueType::Brackets,
        Expr::ApplyBrackets { .. } => ValueType::Decimal,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
