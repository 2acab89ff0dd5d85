//! Interchange JSON deserialization.
//!
//! The external parsing/resolution stage hands the evaluator a
//! resolved AST as a JSON bundle: `{ "declarations": [ ... ] }` where
//! each declaration carries a `kind` discriminator. Decimal amounts,
//! percentages and bracket limits travel as strings so no precision is
//! lost on the way in; months are 1-12 integers.
//!
//! Unknown kinds are rejected: the resolver and the evaluator move in
//! lockstep, so an unrecognized construct means a malformed bundle,
//! not a newer producer.

use rust_decimal::Decimal;
use serde_json::Value as Json;
use time::Month;

use crate::ast::*;
use crate::error::ProgramError;
use crate::program::Program;

impl Program {
    /// Deserialize and validate a program from an interchange bundle.
    pub fn from_interchange(bundle: &Json) -> Result<Program, ProgramError> {
        let declarations = bundle
            .get("declarations")
            .and_then(|d| d.as_array())
            .ok_or_else(|| err("bundle missing 'declarations' array"))?;

        let mut decls = Vec::with_capacity(declarations.len());
        for declaration in declarations {
            let kind = declaration
                .get("kind")
                .and_then(|k| k.as_str())
                .ok_or_else(|| err("declaration missing 'kind' field"))?;
            decls.push(match kind {
                "countries" => parse_countries(declaration)?,
                "regions" => Declaration::Regions {
                    country: get_str(declaration, "country")?,
                    names: get_name_list(declaration, "names")?,
                },
                "cities" => Declaration::Cities {
                    region: get_str(declaration, "region")?,
                    names: get_name_list(declaration, "names")?,
                },
                "company_type" => Declaration::CompanyType(CompanyTypeDecl {
                    name: get_str(declaration, "name")?,
                }),
                "entity" => Declaration::Entity(EntityDecl {
                    name: get_str(declaration, "name")?,
                    kind: parse_entity_kind(declaration.get("type"))?,
                    fields: parse_fields(declaration)?,
                }),
                "tax" => Declaration::Tax(TaxDecl {
                    name: get_str(declaration, "name")?,
                    target: parse_entity_kind(declaration.get("target"))?,
                    fields: parse_fields(declaration)?,
                }),
                other => {
                    return Err(err(&format!("unknown declaration kind '{}'", other)));
                }
            });
        }

        Program::new(decls)
    }
}

// ──────────────────────────────────────────────
// Declaration parsing
// ──────────────────────────────────────────────

fn parse_countries(v: &Json) -> Result<Declaration, ProgramError> {
    let list = v
        .get("countries")
        .and_then(|c| c.as_array())
        .ok_or_else(|| err("countries declaration missing 'countries' array"))?;
    let mut countries = Vec::with_capacity(list.len());
    for c in list {
        countries.push(CountryDecl {
            name: get_str(c, "name")?,
            eu: c.get("eu").and_then(|b| b.as_bool()).unwrap_or(false),
        });
    }
    Ok(Declaration::Countries(countries))
}

/// `"person"` or `{ "company": "<company type>" }`.
fn parse_entity_kind(v: Option<&Json>) -> Result<EntityKind, ProgramError> {
    match v {
        Some(Json::String(s)) if s == "person" => Ok(EntityKind::Person),
        Some(Json::Object(obj)) => {
            let company = obj
                .get("company")
                .and_then(|c| c.as_str())
                .ok_or_else(|| err("entity type object missing 'company'"))?;
            Ok(EntityKind::Company(company.to_string()))
        }
        _ => Err(err("entity type must be \"person\" or {\"company\": ...}")),
    }
}

fn parse_fields(v: &Json) -> Result<Vec<FieldDecl>, ProgramError> {
    let list = v
        .get("fields")
        .and_then(|f| f.as_array())
        .ok_or_else(|| err("declaration missing 'fields' array"))?;
    let mut fields = Vec::with_capacity(list.len());
    for f in list {
        fields.push(parse_field(f)?);
    }
    Ok(fields)
}

fn parse_field(v: &Json) -> Result<FieldDecl, ProgramError> {
    let name = get_str(v, "name")?;
    let expr = match v.get("expr") {
        Some(e) => Some(parse_expr(e)?),
        None => None,
    };
    let contribution = match v.get("contributes") {
        Some(c) => Some(parse_contribution(c)?),
        None => None,
    };
    Ok(FieldDecl {
        name,
        expr,
        is_sum: v.get("sum").and_then(|b| b.as_bool()).unwrap_or(false),
        is_parameter: v.get("parameter").and_then(|b| b.as_bool()).unwrap_or(false),
        contribution,
    })
}

/// `{ "field": "income", "to": "self" | "owners" | { "entity": "X" } }`.
fn parse_contribution(v: &Json) -> Result<Contribution, ProgramError> {
    let field = get_str(v, "field")?;
    match v.get("to") {
        Some(Json::String(s)) if s == "self" => Ok(Contribution::SameEntity { field }),
        Some(Json::String(s)) if s == "owners" => Ok(Contribution::Owners { field }),
        Some(Json::Object(obj)) => {
            let entity = obj
                .get("entity")
                .and_then(|e| e.as_str())
                .ok_or_else(|| err("contribution target object missing 'entity'"))?;
            Ok(Contribution::OtherEntity {
                entity: entity.to_string(),
                field,
            })
        }
        _ => Err(err(
            "contribution 'to' must be \"self\", \"owners\" or {\"entity\": ...}",
        )),
    }
}

// ──────────────────────────────────────────────
// Expression parsing
// ──────────────────────────────────────────────

fn parse_expr(v: &Json) -> Result<Expr, ProgramError> {
    let kind = v
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or_else(|| err("expression missing 'kind' field"))?;
    match kind {
        "int" => {
            let n = v
                .get("value")
                .and_then(|n| n.as_i64())
                .ok_or_else(|| err("int expression missing integer 'value'"))?;
            Ok(Expr::Int(n))
        }
        "decimal" => Ok(Expr::Decimal(get_decimal(v, "value")?)),
        "percentage" => Ok(Expr::Percentage(get_decimal(v, "value")?)),
        "reference" => {
            let target = v
                .get("target")
                .ok_or_else(|| err("reference missing 'target'"))?;
            Ok(Expr::Reference(parse_reference(target)?))
        }
        "shares" => {
            let entries = get_arr(v, "entries")?;
            let mut shares = Vec::with_capacity(entries.len());
            for entry in entries {
                shares.push(ShareEntry {
                    owner: get_str(entry, "owner")?,
                    share: parse_child(entry, "share")?,
                });
            }
            Ok(Expr::Shares(shares))
        }
        "sum" => Ok(Expr::Sum(
            Box::new(parse_child(v, "left")?),
            Box::new(parse_child(v, "right")?),
        )),
        "percent_of" => Ok(Expr::PercentOf {
            percent: Box::new(parse_child(v, "percent")?),
            base: Box::new(parse_child(v, "base")?),
        }),
        "field_access" => Ok(Expr::FieldAccess {
            scope: Box::new(parse_child(v, "scope")?),
            field: get_str(v, "field")?,
        }),
        "equals" => Ok(Expr::Equality(
            Box::new(parse_child(v, "left")?),
            Box::new(parse_child(v, "right")?),
        )),
        "when" => {
            let clauses = get_arr(v, "clauses")?;
            let mut parsed = Vec::with_capacity(clauses.len());
            for clause in clauses {
                parsed.push(WhenClause {
                    condition: parse_child(clause, "condition")?,
                    value: parse_child(clause, "value")?,
                });
            }
            Ok(Expr::When(parsed))
        }
        "windowed" => {
            let clauses = get_arr(v, "clauses")?;
            let mut parsed = Vec::with_capacity(clauses.len());
            for clause in clauses {
                let window = clause
                    .get("window")
                    .ok_or_else(|| err("windowed clause missing 'window'"))?;
                parsed.push(TimeClause {
                    window: parse_window(window)?,
                    value: parse_child(clause, "value")?,
                });
            }
            Ok(Expr::Windowed(parsed))
        }
        "periodic" => Ok(Expr::Periodic {
            value: Box::new(parse_child(v, "value")?),
            periodicity: parse_periodicity(v)?,
        }),
        "brackets" => {
            let entries = get_arr(v, "entries")?;
            let mut parsed = Vec::with_capacity(entries.len());
            for entry in entries {
                let limit = if entry.get("above").and_then(|b| b.as_bool()) == Some(true) {
                    BracketLimit::Above
                } else {
                    BracketLimit::To(parse_child(entry, "to")?)
                };
                parsed.push(BracketEntry {
                    limit,
                    value: parse_child(entry, "value")?,
                });
            }
            Ok(Expr::Brackets(parsed))
        }
        "apply_brackets" => Ok(Expr::ApplyBrackets {
            brackets: Box::new(parse_child(v, "brackets")?),
            amount: Box::new(parse_child(v, "amount")?),
        }),
        other => Err(err(&format!("unknown expression kind '{}'", other))),
    }
}

fn parse_reference(v: &Json) -> Result<Reference, ProgramError> {
    let obj = v
        .as_object()
        .ok_or_else(|| err("reference target must be a JSON object"))?;
    if let Some(tax) = obj.get("tax").and_then(|t| t.as_str()) {
        return Ok(Reference::TaxField {
            tax: tax.to_string(),
            field: get_str(v, "field")?,
        });
    }
    if let Some(entity) = obj.get("entity").and_then(|e| e.as_str()) {
        return match obj.get("field").and_then(|f| f.as_str()) {
            Some(field) => Ok(Reference::EntityField {
                entity: entity.to_string(),
                field: field.to_string(),
            }),
            None => Ok(Reference::Entity(entity.to_string())),
        };
    }
    if let Some(name) = obj.get("country").and_then(|c| c.as_str()) {
        return Ok(Reference::Country(name.to_string()));
    }
    if let Some(name) = obj.get("region").and_then(|r| r.as_str()) {
        return Ok(Reference::Region(name.to_string()));
    }
    if let Some(name) = obj.get("city").and_then(|c| c.as_str()) {
        return Ok(Reference::City(name.to_string()));
    }
    Err(err("unrecognized reference target"))
}

/// `{ "before" | "since" | "after": { "year": 2018, "month": 7 } }`.
/// A missing month means a year date, pinned to January.
fn parse_window(v: &Json) -> Result<Window, ProgramError> {
    let obj = v
        .as_object()
        .ok_or_else(|| err("window must be a JSON object"))?;
    for (key, make) in [
        ("before", Window::Before as fn(MonthDate) -> Window),
        ("since", Window::Since as fn(MonthDate) -> Window),
        ("after", Window::After as fn(MonthDate) -> Window),
    ] {
        if let Some(date) = obj.get(key) {
            return Ok(make(parse_month_date(date)?));
        }
    }
    Err(err("window must be one of 'before', 'since', 'after'"))
}

fn parse_month_date(v: &Json) -> Result<MonthDate, ProgramError> {
    let year = v
        .get("year")
        .and_then(|y| y.as_i64())
        .ok_or_else(|| err("date missing integer 'year'"))? as i32;
    let month_number = v.get("month").and_then(|m| m.as_u64()).unwrap_or(1);
    let month = u8::try_from(month_number)
        .ok()
        .and_then(|n| Month::try_from(n).ok())
        .ok_or_else(|| err(&format!("invalid month number {}", month_number)))?;
    Ok(MonthDate { year, month })
}

fn parse_periodicity(v: &Json) -> Result<Periodicity, ProgramError> {
    match v.get("periodicity").and_then(|p| p.as_str()) {
        Some("monthly") => Ok(Periodicity::Monthly),
        Some("yearly") => Ok(Periodicity::Yearly),
        _ => Err(err("periodicity must be 'monthly' or 'yearly'")),
    }
}

// ──────────────────────────────────────────────
// JSON helpers
// ──────────────────────────────────────────────

fn err(message: &str) -> ProgramError {
    ProgramError::Interchange {
        message: message.to_string(),
    }
}

fn get_str(v: &Json, field: &str) -> Result<String, ProgramError> {
    v.get(field)
        .and_then(|s| s.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| err(&format!("missing string field '{}'", field)))
}

fn get_arr<'a>(v: &'a Json, field: &str) -> Result<&'a [Json], ProgramError> {
    v.get(field)
        .and_then(|a| a.as_array())
        .map(|a| a.as_slice())
        .ok_or_else(|| err(&format!("missing array field '{}'", field)))
}

fn get_name_list(v: &Json, field: &str) -> Result<Vec<String>, ProgramError> {
    let arr = get_arr(v, field)?;
    arr.iter()
        .map(|n| {
            n.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| err(&format!("'{}' entries must be strings", field)))
        })
        .collect()
}

/// Decimals travel as strings so no binary-float rounding sneaks in.
fn get_decimal(v: &Json, field: &str) -> Result<Decimal, ProgramError> {
    let s = get_str(v, field)?;
    Decimal::from_str_exact(&s).map_err(|e| err(&format!("invalid decimal '{}': {}", s, e)))
}

fn parse_child(v: &Json, field: &str) -> Result<Expr, ProgramError> {
    let child = v
        .get(field)
        .ok_or_else(|| err(&format!("missing expression field '{}'", field)))?;
    parse_expr(child)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
