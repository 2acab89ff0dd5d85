//! End-to-end evaluation of interchange bundles: geography, field
//! resolution, ownership flows and tax assessment.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::json;
use time::Month;

use fiscal_core::{Periodicity, Program};
use fiscal_eval::{evaluate, EvalError, Parameters, Period, Value};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn load(bundle: serde_json::Value) -> Program {
    Program::from_interchange(&bundle).unwrap()
}

fn no_params() -> Parameters {
    BTreeMap::new()
}

fn geography() -> Vec<serde_json::Value> {
    vec![
        json!({ "kind": "countries", "countries": [ { "name": "Italy", "eu": true } ] }),
        json!({ "kind": "regions", "country": "Italy", "names": ["Piedmont", "Lombardy"] }),
        json!({ "kind": "cities", "region": "Piedmont", "names": ["Torino"] }),
    ]
}

fn windowed_compensation() -> serde_json::Value {
    json!({ "kind": "windowed", "clauses": [
        { "window": { "before": { "year": 2018, "month": 7 } },
          "value": { "kind": "periodic", "periodicity": "monthly",
                     "value": { "kind": "int", "value": 0 } } },
        { "window": { "since": { "year": 2018, "month": 7 } },
          "value": { "kind": "periodic", "periodicity": "monthly",
                     "value": { "kind": "int", "value": 2000 } } }
    ]})
}

#[test]
fn geography_round_trips_through_the_result() {
    let mut declarations = geography();
    declarations.push(json!({
        "kind": "entity", "name": "Federico", "type": "person",
        "fields": [
            { "name": "city",
              "expr": { "kind": "reference", "target": { "city": "Torino" } } }
        ]
    }));
    let program = load(json!({ "declarations": declarations }));
    let result = evaluate(&program, Period::yearly(2018), &no_params()).unwrap();

    assert!(result.country("Italy").unwrap().eu);
    assert_eq!(result.regions_of("Italy").len(), 2);
    assert_eq!(result.cities_of_region("Piedmont").len(), 1);
    assert_eq!(result.entity_city("Federico").unwrap(), "Torino");
    assert_eq!(result.entity_region("Federico").unwrap(), "Piedmont");
    assert_eq!(result.entity_country("Federico").unwrap(), "Italy");
}

#[test]
fn windowed_monthly_income_rolls_up_over_the_year() {
    let program = load(json!({ "declarations": [
        { "kind": "entity", "name": "Federico", "type": "person",
          "fields": [
            { "name": "net_compensation",
              "expr": windowed_compensation(),
              "contributes": { "field": "income", "to": "self" } },
            { "name": "income", "sum": true }
          ]
        }
    ]}));

    // Six months at zero, six at 2000.
    let yearly = evaluate(&program, Period::yearly(2018), &no_params()).unwrap();
    let fields = yearly.entity_fields("Federico").unwrap();
    assert_eq!(fields.get("income"), Some(&Value::Int(12_000)));
    assert_eq!(fields.get("net_compensation"), Some(&Value::Int(12_000)));

    // A single month stays a monthly periodic.
    let october = evaluate(
        &program,
        Period::monthly(Month::October, 2018),
        &no_params(),
    )
    .unwrap();
    assert_eq!(
        october.entity_fields("Federico").unwrap().get("income"),
        Some(&Value::Periodic {
            value: Box::new(Value::Int(2000)),
            periodicity: Periodicity::Monthly,
        })
    );
}

#[test]
fn dividends_flow_to_owners_by_share() {
    let program = load(json!({ "declarations": [
        { "kind": "company_type", "name": "SRL" },
        { "kind": "entity", "name": "Federico", "type": "person",
          "fields": [ { "name": "income", "sum": true } ] },
        { "kind": "entity", "name": "Marco", "type": "person",
          "fields": [ { "name": "income", "sum": true } ] },
        { "kind": "entity", "name": "FCS", "type": { "company": "SRL" },
          "fields": [
            { "name": "owners", "expr": { "kind": "shares", "entries": [
                { "owner": "Federico",
                  "share": { "kind": "percentage", "value": "66" } },
                { "owner": "Marco",
                  "share": { "kind": "percentage", "value": "34" } }
            ]}},
            { "name": "dividends", "expr": { "kind": "int", "value": 500 },
              "contributes": { "field": "income", "to": "owners" } }
          ]
        }
    ]}));
    let result = evaluate(&program, Period::yearly(2018), &no_params()).unwrap();

    let federico = result.entity_fields("Federico").unwrap();
    assert_eq!(federico.get("income"), Some(&Value::Decimal(dec("330"))));
    let marco = result.entity_fields("Marco").unwrap();
    assert_eq!(marco.get("income"), Some(&Value::Decimal(dec("170"))));

    let ownership = result.company("FCS").unwrap().ownership().unwrap();
    assert_eq!(ownership.get("Federico"), Some(&dec("66")));
}

#[test]
fn flat_rate_tax_switches_rate_across_years() {
    let program = load(json!({ "declarations": [
        { "kind": "company_type", "name": "SRL" },
        { "kind": "entity", "name": "Strumenta", "type": { "company": "SRL" },
          "fields": [
            { "name": "gross_profit", "expr": { "kind": "int", "value": 100_000 } },
            { "name": "taxable", "expr": { "kind": "percent_of",
                "percent": { "kind": "percentage", "value": "120" },
                "base": { "kind": "reference",
                          "target": { "entity": "Strumenta", "field": "gross_profit" } } } }
          ]
        },
        { "kind": "tax", "name": "ires", "target": { "company": "SRL" },
          "fields": [
            { "name": "rate", "expr": { "kind": "windowed", "clauses": [
                { "window": { "before": { "year": 2017 } },
                  "value": { "kind": "percentage", "value": "27.5" } },
                { "window": { "since": { "year": 2017 } },
                  "value": { "kind": "percentage", "value": "24" } }
            ]}}
          ]
        }
    ]}));

    // The tax declares no amount: it is taxable * rate, with taxable
    // found on the assessed company.
    let y2016 = evaluate(&program, Period::yearly(2016), &no_params()).unwrap();
    assert_eq!(y2016.tax("ires").unwrap().name, "ires");
    assert_eq!(y2016.tax_payment("Strumenta", "ires").unwrap(), dec("33000.0"));

    let y2017 = evaluate(&program, Period::yearly(2017), &no_params()).unwrap();
    assert_eq!(y2017.tax_payment("Strumenta", "ires").unwrap(), dec("28800.0"));
}

/// National and regional tables share limits and sum tier-by-tier;
/// the town table has its own limits and is applied separately.
fn progressive_tax_program() -> Program {
    let national = json!({ "kind": "brackets", "entries": [
        { "to": { "kind": "int", "value": 15_000 }, "value": { "kind": "percentage", "value": "23" } },
        { "to": { "kind": "int", "value": 28_000 }, "value": { "kind": "percentage", "value": "27" } },
        { "to": { "kind": "int", "value": 55_000 }, "value": { "kind": "percentage", "value": "38" } },
        { "to": { "kind": "int", "value": 75_000 }, "value": { "kind": "percentage", "value": "41" } },
        { "above": true, "value": { "kind": "percentage", "value": "43" } }
    ]});
    let regional = json!({ "kind": "brackets", "entries": [
        { "to": { "kind": "int", "value": 15_000 }, "value": { "kind": "percentage", "value": "1.62" } },
        { "to": { "kind": "int", "value": 28_000 }, "value": { "kind": "percentage", "value": "2.13" } },
        { "to": { "kind": "int", "value": 55_000 }, "value": { "kind": "percentage", "value": "2.75" } },
        { "to": { "kind": "int", "value": 75_000 }, "value": { "kind": "percentage", "value": "3.32" } },
        { "above": true, "value": { "kind": "percentage", "value": "3.33" } }
    ]});
    let town = json!({ "kind": "brackets", "entries": [
        { "to": { "kind": "int", "value": 11_670 }, "value": { "kind": "percentage", "value": "0" } },
        { "above": true, "value": { "kind": "percentage", "value": "0.8" } }
    ]});
    let taxable = json!({ "kind": "reference", "target": { "tax": "irpef", "field": "taxable" } });
    load(json!({ "declarations": [
        { "kind": "entity", "name": "Federico", "type": "person",
          "fields": [ { "name": "taxable", "parameter": true } ] },
        { "kind": "tax", "name": "irpef", "target": "person",
          "fields": [
            { "name": "rate", "expr": { "kind": "sum", "left": national, "right": regional } },
            { "name": "town_rate", "expr": town },
            { "name": "amount", "expr": { "kind": "sum",
                "left": { "kind": "apply_brackets",
                          "brackets": { "kind": "reference",
                                        "target": { "tax": "irpef", "field": "rate" } },
                          "amount": taxable },
                "right": { "kind": "apply_brackets",
                           "brackets": { "kind": "reference",
                                         "target": { "tax": "irpef", "field": "town_rate" } },
                           "amount": taxable }
            }}
          ]
        }
    ]}))
}

fn progressive_amount(taxable: &str) -> Decimal {
    let program = progressive_tax_program();
    let mut parameters: Parameters = BTreeMap::new();
    parameters.insert(
        ("Federico".to_string(), "taxable".to_string()),
        Value::Decimal(dec(taxable)),
    );
    let result = evaluate(&program, Period::yearly(2018), &parameters).unwrap();
    result.tax_payment("Federico", "irpef").unwrap()
}

#[test]
fn progressive_tax_on_zero_income_owes_nothing() {
    assert_eq!(progressive_amount("0"), dec("0"));
}

#[test]
fn progressive_tax_within_the_first_tier() {
    assert_eq!(progressive_amount("5000"), dec("1231.0"));
}

#[test]
fn progressive_tax_across_every_tier() {
    assert_eq!(progressive_amount("90000"), dec("34922.54"));
}

#[test]
fn evaluation_is_deterministic() {
    let program = progressive_tax_program();
    let mut parameters: Parameters = BTreeMap::new();
    parameters.insert(
        ("Federico".to_string(), "taxable".to_string()),
        Value::Decimal(dec("42000")),
    );
    let a = evaluate(&program, Period::yearly(2018), &parameters).unwrap();
    let b = evaluate(&program, Period::yearly(2018), &parameters).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_json(), b.to_json());
}

#[test]
fn mutually_recursive_fields_are_reported_as_a_cycle() {
    let program = load(json!({ "declarations": [
        { "kind": "entity", "name": "Federico", "type": "person",
          "fields": [
            { "name": "a", "expr": { "kind": "reference",
                "target": { "entity": "Federico", "field": "b" } } },
            { "name": "b", "expr": { "kind": "reference",
                "target": { "entity": "Federico", "field": "a" } } }
          ]
        }
    ]}));
    let err = evaluate(&program, Period::yearly(2018), &no_params()).unwrap_err();
    assert!(matches!(err, EvalError::CyclicDependency { .. }));
}

#[test]
fn unsupplied_parameter_is_reported() {
    let program = load(json!({ "declarations": [
        { "kind": "entity", "name": "Federico", "type": "person",
          "fields": [ { "name": "taxable", "parameter": true } ] }
    ]}));
    let err = evaluate(&program, Period::yearly(2018), &no_params()).unwrap_err();
    assert_eq!(
        err,
        EvalError::MissingParameter {
            entity: "Federico".to_string(),
            field: "taxable".to_string(),
        }
    );
}

#[test]
fn supplied_parameter_flows_into_dependent_fields() {
    let program = load(json!({ "declarations": [
        { "kind": "entity", "name": "Federico", "type": "person",
          "fields": [
            { "name": "working_days", "parameter": true },
            { "name": "expenses", "expr": { "kind": "sum",
                "left": { "kind": "reference",
                          "target": { "entity": "Federico", "field": "working_days" } },
                "right": { "kind": "int", "value": 100 } } }
          ]
        }
    ]}));
    let mut parameters: Parameters = BTreeMap::new();
    parameters.insert(
        ("Federico".to_string(), "working_days".to_string()),
        Value::Int(220),
    );
    let result = evaluate(&program, Period::yearly(2018), &parameters).unwrap();
    assert_eq!(
        result.entity_fields("Federico").unwrap().get("expenses"),
        Some(&Value::Int(320))
    );
}

#[test]
fn when_clause_selects_on_residence() {
    let mut declarations = geography();
    declarations.push(json!({
        "kind": "entity", "name": "Federico", "type": "person",
        "fields": [
            { "name": "city",
              "expr": { "kind": "reference", "target": { "city": "Torino" } } },
            { "name": "deduction", "expr": { "kind": "when", "clauses": [
                { "condition": { "kind": "equals",
                    "left": { "kind": "reference",
                              "target": { "entity": "Federico", "field": "city" } },
                    "right": { "kind": "reference", "target": { "city": "Torino" } } },
                  "value": { "kind": "int", "value": 1000 } }
            ]}}
        ]
    }));
    let program = load(json!({ "declarations": declarations }));
    let result = evaluate(&program, Period::yearly(2018), &no_params()).unwrap();
    assert_eq!(
        result.entity_fields("Federico").unwrap().get("deduction"),
        Some(&Value::Int(1000))
    );
}

#[test]
fn when_with_no_satisfied_clause_is_an_error() {
    let program = load(json!({ "declarations": [
        { "kind": "entity", "name": "Federico", "type": "person",
          "fields": [
            { "name": "deduction", "expr": { "kind": "when", "clauses": [
                { "condition": { "kind": "equals",
                    "left": { "kind": "int", "value": 1 },
                    "right": { "kind": "int", "value": 2 } },
                  "value": { "kind": "int", "value": 1000 } }
            ]}}
          ]
        }
    ]}));
    let err = evaluate(&program, Period::yearly(2018), &no_params()).unwrap_err();
    assert_eq!(err, EvalError::NoClauseSatisfied);
}
