//! Evaluation engine for fiscal programs.
//!
//! Takes a validated [`fiscal_core::Program`], a [`Period`] and a set
//! of external [`Parameters`], computes every entity field and every
//! applicable tax payment, and assembles them into an [`EvalResult`].
//!
//! Money and rates are exact decimals throughout; there is no f64
//! anywhere in the pipeline. Field resolution is memoized per
//! (scope, field, period) and cycles between field definitions are
//! detected and reported rather than recursed into.

pub mod assemble;
pub mod context;
pub mod expr;
pub mod fields;
pub mod numeric;
pub mod period;
pub mod types;

use std::collections::BTreeMap;

use fiscal_core::{EntityKind, Program};

pub use assemble::{CompanyValues, EvalResult, PersonValues, TaxInfo, TaxPayment};
pub use context::{EvaluationContext, Parameters, Scope};
pub use period::{Granularity, Period};
pub use types::{Bracket, EvalError, GeoRef, TimeAlternative, Value};

/// Evaluate a program for one period.
///
/// Every field of every entity is computed, then the amount of each
/// declared tax for each entity it applies to. The result is fully
/// deterministic: the same program, period and parameters always
/// produce an equal [`EvalResult`].
pub fn evaluate(
    program: &Program,
    period: Period,
    parameters: &Parameters,
) -> Result<EvalResult, EvalError> {
    let ctx = EvaluationContext::new(program, parameters);

    let mut persons = Vec::new();
    let mut companies = Vec::new();
    for entity in program.entities() {
        let mut values = BTreeMap::new();
        for field in &entity.fields {
            let value = ctx.field_value(&entity.name, &field.name, &period)?;
            values.insert(field.name.clone(), value);
        }
        match &entity.kind {
            EntityKind::Person => persons.push(PersonValues {
                name: entity.name.clone(),
                fields: values,
            }),
            EntityKind::Company(company_type) => companies.push(CompanyValues {
                name: entity.name.clone(),
                company_type: company_type.clone(),
                fields: values,
            }),
        }
    }

    let mut taxes = Vec::new();
    let mut payments = Vec::new();
    for tax in program.taxes() {
        taxes.push(TaxInfo {
            name: tax.name.clone(),
            target: tax.target.clone(),
        });
        for entity in program.entities() {
            if !tax.applies_to(entity) {
                continue;
            }
            let amount = fields::tax_amount(&ctx, tax, entity, &period)?;
            payments.push(TaxPayment {
                entity: entity.name.clone(),
                tax: tax.name.clone(),
                amount,
            });
        }
    }

    Ok(EvalResult {
        period,
        countries: program.countries().to_vec(),
        regions: program.regions().to_vec(),
        cities: program.cities().to_vec(),
        persons,
        companies,
        taxes,
        payments,
    })
}
