//! Assembly of a full evaluation run into a queryable result:
//! geography, per-entity field values, and tax payments.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::{json, Value as Json};

use fiscal_core::{CityDecl, CountryDecl, EntityKind, RegionDecl};

use crate::period::Period;
use crate::types::{EvalError, GeoRef, Value};

/// A person's evaluated fields for the run's period.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonValues {
    pub name: String,
    pub fields: BTreeMap<String, Value>,
}

/// A company's evaluated fields for the run's period.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyValues {
    pub name: String,
    pub company_type: String,
    pub fields: BTreeMap<String, Value>,
}

impl CompanyValues {
    /// The ownership table, when the company declares one.
    pub fn ownership(&self) -> Option<&BTreeMap<String, Decimal>> {
        match self.fields.get("owners") {
            Some(Value::Shares(shares)) => Some(shares),
            _ => None,
        }
    }
}

/// A tax declaration surfaced on the result.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxInfo {
    pub name: String,
    pub target: EntityKind,
}

/// One assessed payment: what `entity` owes for `tax` over the run's
/// period.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxPayment {
    pub entity: String,
    pub tax: String,
    pub amount: Decimal,
}

/// The complete outcome of evaluating a program for one period.
/// Construction is deterministic: collections follow declaration
/// order, field maps are sorted by name.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    pub period: Period,
    pub countries: Vec<CountryDecl>,
    pub regions: Vec<RegionDecl>,
    pub cities: Vec<CityDecl>,
    pub persons: Vec<PersonValues>,
    pub companies: Vec<CompanyValues>,
    pub taxes: Vec<TaxInfo>,
    pub payments: Vec<TaxPayment>,
}

impl EvalResult {
    pub fn country(&self, name: &str) -> Result<&CountryDecl, EvalError> {
        self.countries
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| not_found("country", name))
    }

    pub fn region(&self, name: &str) -> Result<&RegionDecl, EvalError> {
        self.regions
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| not_found("region", name))
    }

    pub fn city(&self, name: &str) -> Result<&CityDecl, EvalError> {
        self.cities
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| not_found("city", name))
    }

    pub fn regions_of(&self, country: &str) -> Vec<&RegionDecl> {
        self.regions.iter().filter(|r| r.country == country).collect()
    }

    pub fn cities_of_region(&self, region: &str) -> Vec<&CityDecl> {
        self.cities.iter().filter(|c| c.region == region).collect()
    }

    pub fn cities_of_country(&self, country: &str) -> Vec<&CityDecl> {
        self.cities
            .iter()
            .filter(|c| {
                self.regions
                    .iter()
                    .any(|r| r.name == c.region && r.country == country)
            })
            .collect()
    }

    pub fn person(&self, name: &str) -> Result<&PersonValues, EvalError> {
        self.persons
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| not_found("person", name))
    }

    pub fn company(&self, name: &str) -> Result<&CompanyValues, EvalError> {
        self.companies
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| not_found("company", name))
    }

    pub fn tax(&self, name: &str) -> Result<&TaxInfo, EvalError> {
        self.taxes
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| not_found("tax", name))
    }

    /// The evaluated fields of any entity, person or company.
    pub fn entity_fields(&self, name: &str) -> Result<&BTreeMap<String, Value>, EvalError> {
        if let Some(person) = self.persons.iter().find(|p| p.name == name) {
            return Ok(&person.fields);
        }
        if let Some(company) = self.companies.iter().find(|c| c.name == name) {
            return Ok(&company.fields);
        }
        Err(EvalError::UnknownEntity {
            name: name.to_string(),
        })
    }

    /// The city an entity resides in, from its `city` field.
    pub fn entity_city(&self, name: &str) -> Result<String, EvalError> {
        match self.entity_fields(name)?.get("city") {
            Some(Value::Geo(GeoRef::City(city))) => Ok(city.clone()),
            Some(other) => Err(EvalError::TypeError {
                message: format!("city of {} is a {}", name, other.type_name()),
            }),
            None => Err(EvalError::UnknownField {
                entity: name.to_string(),
                field: "city".to_string(),
            }),
        }
    }

    /// The region an entity resides in, derived from its city.
    pub fn entity_region(&self, name: &str) -> Result<String, EvalError> {
        let city = self.entity_city(name)?;
        Ok(self.city(&city)?.region.clone())
    }

    /// The country an entity resides in, derived via its region.
    pub fn entity_country(&self, name: &str) -> Result<String, EvalError> {
        let region = self.entity_region(name)?;
        Ok(self.region(&region)?.country.clone())
    }

    /// The assessed amount `entity` owes for `tax`.
    pub fn tax_payment(&self, entity: &str, tax: &str) -> Result<Decimal, EvalError> {
        self.payments
            .iter()
            .find(|p| p.entity == entity && p.tax == tax)
            .map(|p| p.amount)
            .ok_or_else(|| EvalError::PaymentNotFound {
                entity: entity.to_string(),
                tax: tax.to_string(),
            })
    }

    /// A deterministic JSON rendering of the whole result.
    pub fn to_json(&self) -> Json {
        json!({
            "period": self.period.to_string(),
            "countries": self.countries.iter().map(|c| json!({
                "name": c.name,
                "eu": c.eu,
            })).collect::<Vec<_>>(),
            "regions": self.regions.iter().map(|r| json!({
                "name": r.name,
                "country": r.country,
            })).collect::<Vec<_>>(),
            "cities": self.cities.iter().map(|c| json!({
                "name": c.name,
                "region": c.region,
            })).collect::<Vec<_>>(),
            "persons": self.persons.iter().map(|p| json!({
                "name": p.name,
                "fields": fields_to_json(&p.fields),
            })).collect::<Vec<_>>(),
            "companies": self.companies.iter().map(|c| json!({
                "name": c.name,
                "type": c.company_type,
                "fields": fields_to_json(&c.fields),
            })).collect::<Vec<_>>(),
            "taxes": self.taxes.iter().map(|t| json!({
                "name": t.name,
                "target": match &t.target {
                    EntityKind::Person => json!("person"),
                    EntityKind::Company(company_type) => json!({ "company": company_type }),
                },
            })).collect::<Vec<_>>(),
            "payments": self.payments.iter().map(|p| json!({
                "entity": p.entity,
                "tax": p.tax,
                "amount": p.amount.to_string(),
            })).collect::<Vec<_>>(),
        })
    }
}

fn not_found(kind: &'static str, name: &str) -> EvalError {
    EvalError::NotFound {
        kind,
        name: name.to_string(),
    }
}

fn fields_to_json(fields: &BTreeMap<String, Value>) -> Json {
    let mut out = serde_json::Map::new();
    for (name, value) in fields {
        out.insert(name.clone(), value_to_json(value));
    }
    Json::Object(out)
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Int(n) => json!(n),
        Value::Decimal(d) => json!(d.to_string()),
        Value::Percentage(p) => json!(format!("{}%", p)),
        Value::Bool(b) => json!(b),
        Value::Periodic { value, periodicity } => json!({
            "value": value_to_json(value),
            "per": match periodicity {
                fiscal_core::Periodicity::Monthly => "month",
                fiscal_core::Periodicity::Yearly => "year",
            },
        }),
        Value::TimeAlternatives(alternatives) => Json::Array(
            alternatives
                .iter()
                .map(|a| json!({
                    "window": format!("{:?}", a.window),
                    "value": value_to_json(&a.value),
                }))
                .collect(),
        ),
        Value::Shares(shares) => {
            let mut out = serde_json::Map::new();
            for (owner, share) in shares {
                out.insert(owner.clone(), json!(format!("{}%", share)));
            }
            Json::Object(out)
        }
        Value::Brackets(brackets) => Json::Array(
            brackets
                .iter()
                .map(|b| match b.limit {
                    Some(limit) => json!({
                        "to": limit.to_string(),
                        "rate": value_to_json(&b.rate),
                    }),
                    None => json!({
                        "above": true,
                        "rate": value_to_json(&b.rate),
                    }),
                })
                .collect(),
        ),
        Value::Geo(GeoRef::Country(name))
        | Value::Geo(GeoRef::Region(name))
        | Value::Geo(GeoRef::City(name)) => json!(name),
        Value::Entity(name) => json!(name),
        Value::NoValue => Json::Null,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
