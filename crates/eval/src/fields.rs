//! Field resolution: explicit expressions, `sum` aggregation over
//! declared contributions, and externally supplied parameters.

use rust_decimal::Decimal;

use fiscal_core::{Contribution, EntityDecl, FieldDecl, TaxDecl};

use crate::context::EvaluationContext;
use crate::expr;
use crate::numeric::{as_decimal, multiply, sum_values};
use crate::period::Period;
use crate::types::{EvalError, Value};

/// Resolve one entity field for a period. An explicit expression
/// wins; a `sum` field aggregates matching contributions from across
/// the program; a `parameter` field reads the run's parameter map.
pub fn entity_field(
    ctx: &EvaluationContext<'_>,
    entity: &EntityDecl,
    field: &FieldDecl,
    period: &Period,
) -> Result<Value, EvalError> {
    if let Some(e) = &field.expr {
        return expr::eval(e, ctx, period);
    }
    if field.is_sum {
        return sum_contributions(ctx, entity, &field.name, period);
    }
    if field.is_parameter {
        return ctx.parameter_value(&entity.name, &field.name);
    }
    Err(EvalError::UnresolvedField {
        entity: entity.name.clone(),
        field: field.name.clone(),
    })
}

/// Resolve one tax field. Taxes carry explicit expressions only; the
/// context's fallback to the target entity's fields happens before
/// this is reached.
pub fn tax_field(
    ctx: &EvaluationContext<'_>,
    tax: &TaxDecl,
    field: &str,
    period: &Period,
) -> Result<Value, EvalError> {
    let decl = tax.field(field).ok_or_else(|| EvalError::UnknownField {
        entity: tax.name.clone(),
        field: field.to_string(),
    })?;
    if let Some(e) = &decl.expr {
        return expr::eval(e, ctx, period);
    }
    if decl.is_parameter {
        return ctx.parameter_value(&tax.name, field);
    }
    Err(EvalError::UnresolvedField {
        entity: tax.name.clone(),
        field: field.to_string(),
    })
}

/// The amount an entity owes for a tax in a period. A declared
/// `amount` field is normative; otherwise the amount is
/// `taxable * rate` under the multiplication table, which also covers
/// progressive bracket rates.
pub fn tax_amount(
    ctx: &EvaluationContext<'_>,
    tax: &TaxDecl,
    entity: &EntityDecl,
    period: &Period,
) -> Result<Decimal, EvalError> {
    if tax.has_field("amount") {
        let amount = ctx.tax_field_value(&tax.name, &entity.name, "amount", period)?;
        return as_decimal(&amount);
    }
    let taxable = ctx.tax_field_value(&tax.name, &entity.name, "taxable", period)?;
    let rate = ctx.tax_field_value(&tax.name, &entity.name, "rate", period)?;
    as_decimal(&multiply(&taxable, &rate)?)
}

/// Gather every contribution declared anywhere in the program that
/// targets `(target.name, field)`, in declaration order, and sum
/// them. No matching contributions yields `NoValue`.
fn sum_contributions(
    ctx: &EvaluationContext<'_>,
    target: &EntityDecl,
    field: &str,
    period: &Period,
) -> Result<Value, EvalError> {
    let mut parts = Vec::new();
    for source in ctx.program().entities() {
        for source_field in &source.fields {
            let contribution = match &source_field.contribution {
                Some(c) if c.field() == field => c,
                _ => continue,
            };
            match contribution {
                Contribution::SameEntity { .. } => {
                    if source.name != target.name {
                        continue;
                    }
                    parts.push(ctx.field_value(&source.name, &source_field.name, period)?);
                }
                Contribution::OtherEntity { entity, .. } => {
                    if entity != &target.name {
                        continue;
                    }
                    parts.push(ctx.field_value(&source.name, &source_field.name, period)?);
                }
                Contribution::Owners { .. } => {
                    let share = match owner_share(ctx, source, &target.name, period)? {
                        Some(s) if !s.is_zero() => s,
                        _ => continue,
                    };
                    let value = ctx.field_value(&source.name, &source_field.name, period)?;
                    parts.push(multiply(&Value::Percentage(share), &value)?);
                }
            }
        }
    }
    sum_values(parts)
}

/// The percentage share `owner` holds of `company`, from the
/// company's `owners` field. A company without an `owners` field, or
/// an owner absent from the table, contributes nothing.
fn owner_share(
    ctx: &EvaluationContext<'_>,
    company: &EntityDecl,
    owner: &str,
    period: &Period,
) -> Result<Option<Decimal>, EvalError> {
    if company.field("owners").is_none() {
        return Ok(None);
    }
    let owners = ctx.field_value(&company.name, "owners", period)?;
    match owners {
        Value::Shares(map) => Ok(map.get(owner).copied()),
        other => Err(EvalError::TypeError {
            message: format!(
                "owners of {} must be shares, got {}",
                company.name,
                other.type_name()
            ),
        }),
    }
}
