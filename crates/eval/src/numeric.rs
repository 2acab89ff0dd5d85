//! Value combination rules: `sum`, `multiply`, and progressive
//! bracket application.
//!
//! The tables here are total over the supported type pairs and fail
//! loudly (`UnsupportedCombination`) on everything else -- no silent
//! coercion. All arithmetic is checked `rust_decimal`/`i64`; overflow
//! is an error, never a panic or a wrap.

use rust_decimal::Decimal;

use crate::types::{Bracket, EvalError, Value};

/// Sum a collection of contributions. Empty input is `NoValue`; a
/// singleton is returned unchanged.
pub fn sum_values(values: Vec<Value>) -> Result<Value, EvalError> {
    let mut iter = values.into_iter();
    let first = match iter.next() {
        Some(v) => v,
        None => return Ok(Value::NoValue),
    };
    iter.try_fold(first, |acc, v| sum_pair(&acc, &v))
}

/// Sum two values per the combination table.
pub fn sum_pair(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        // NoValue is the identity of sum.
        (Value::NoValue, other) | (other, Value::NoValue) => Ok(other.clone()),

        (Value::Int(a), Value::Int(b)) => {
            let n = a.checked_add(*b).ok_or_else(|| EvalError::Overflow {
                message: format!("{} + {}", a, b),
            })?;
            Ok(Value::Int(n))
        }
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(checked_add(*a, *b)?)),
        (Value::Int(a), Value::Decimal(b)) => {
            Ok(Value::Decimal(checked_add(Decimal::from(*a), *b)?))
        }
        (Value::Decimal(a), Value::Int(b)) => {
            Ok(Value::Decimal(checked_add(*a, Decimal::from(*b))?))
        }
        (Value::Percentage(a), Value::Percentage(b)) => {
            Ok(Value::Percentage(checked_add(*a, *b)?))
        }

        (
            Value::Periodic {
                value: a,
                periodicity: pa,
            },
            Value::Periodic {
                value: b,
                periodicity: pb,
            },
        ) if pa == pb => Ok(Value::Periodic {
            value: Box::new(sum_pair(a, b)?),
            periodicity: *pa,
        }),

        // Time-alternatives combine window-by-window, and only when
        // both sides declare the identical ordered window list.
        (Value::TimeAlternatives(a), Value::TimeAlternatives(b))
            if a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.window == y.window) =>
        {
            let mut combined = Vec::with_capacity(a.len());
            for (x, y) in a.iter().zip(b) {
                combined.push(crate::types::TimeAlternative {
                    window: x.window,
                    value: sum_pair(&x.value, &y.value)?,
                });
            }
            Ok(Value::TimeAlternatives(combined))
        }

        // Bracket tables combine tier-by-tier when the ordered limits
        // match exactly (national + regional IRPEF rates).
        (Value::Brackets(a), Value::Brackets(b))
            if a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.limit == y.limit) =>
        {
            let mut combined = Vec::with_capacity(a.len());
            for (x, y) in a.iter().zip(b) {
                combined.push(Bracket {
                    limit: x.limit,
                    rate: sum_pair(&x.rate, &y.rate)?,
                });
            }
            Ok(Value::Brackets(combined))
        }

        _ => Err(unsupported("sum", left, right)),
    }
}

/// Multiply two values per the combination table. Percentages divide
/// by 100 against the amount; a bracket table on either side is
/// applied progressively to the other.
pub fn multiply(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Percentage(p), Value::Int(n)) | (Value::Int(n), Value::Percentage(p)) => {
            Ok(Value::Decimal(percent_of(*p, Decimal::from(*n))?))
        }
        (Value::Percentage(p), Value::Decimal(d)) | (Value::Decimal(d), Value::Percentage(p)) => {
            Ok(Value::Decimal(percent_of(*p, *d)?))
        }
        (Value::Brackets(brackets), amount @ (Value::Int(_) | Value::Decimal(_)))
        | (amount @ (Value::Int(_) | Value::Decimal(_)), Value::Brackets(brackets)) => {
            Ok(Value::Decimal(apply_brackets(brackets, as_decimal(amount)?)?))
        }
        (Value::Int(a), Value::Int(b)) => {
            let n = a.checked_mul(*b).ok_or_else(|| EvalError::Overflow {
                message: format!("{} * {}", a, b),
            })?;
            Ok(Value::Int(n))
        }
        (Value::Decimal(a), Value::Decimal(b)) => Ok(Value::Decimal(checked_mul(*a, *b)?)),
        (Value::Int(a), Value::Decimal(b)) | (Value::Decimal(b), Value::Int(a)) => {
            Ok(Value::Decimal(checked_mul(Decimal::from(*a), *b)?))
        }
        _ => Err(unsupported("multiply", left, right)),
    }
}

/// Apply a progressive rate table to an amount: for each tier, the
/// portion of the amount in [low, high) -- low being the previous
/// tier's limit or zero, high the tier's own limit or unbounded --
/// multiplied by the tier's rate, all summed.
pub fn apply_brackets(brackets: &[Bracket], amount: Decimal) -> Result<Decimal, EvalError> {
    let mut low = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    for bracket in brackets {
        let ceiling = match bracket.limit {
            Some(high) => amount.min(high),
            None => amount,
        };
        let portion = (ceiling - low).max(Decimal::ZERO);
        let part = multiply(&Value::Decimal(portion), &bracket.rate)?;
        total = checked_add(total, as_decimal(&part)?)?;
        if let Some(high) = bracket.limit {
            low = high;
        }
    }
    Ok(total)
}

/// Coerce a numeric value to Decimal, promoting Int.
pub fn as_decimal(value: &Value) -> Result<Decimal, EvalError> {
    match value {
        Value::Int(n) => Ok(Decimal::from(*n)),
        Value::Decimal(d) => Ok(*d),
        other => Err(EvalError::TypeError {
            message: format!("expected a numeric value, got {}", other.type_name()),
        }),
    }
}

fn percent_of(percentage: Decimal, amount: Decimal) -> Result<Decimal, EvalError> {
    let product = checked_mul(percentage, amount)?;
    product
        .checked_div(Decimal::ONE_HUNDRED)
        .ok_or_else(|| EvalError::Overflow {
            message: format!("{}% of {}", percentage, amount),
        })
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, EvalError> {
    a.checked_add(b).ok_or_else(|| EvalError::Overflow {
        message: format!("{} + {}", a, b),
    })
}

fn checked_mul(a: Decimal, b: Decimal) -> Result<Decimal, EvalError> {
    a.checked_mul(b).ok_or_else(|| EvalError::Overflow {
        message: format!("{} * {}", a, b),
    })
}

fn unsupported(op: &'static str, left: &Value, right: &Value) -> EvalError {
    EvalError::UnsupportedCombination {
        op,
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeAlternative;
    use fiscal_core::{MonthDate, Periodicity, Window};
    use std::str::FromStr;
    use time::Month;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn pct(s: &str) -> Value {
        Value::Percentage(dec(s))
    }

    /// The national IRPEF table.
    fn national() -> Vec<Bracket> {
        vec![
            Bracket { limit: Some(dec("15000")), rate: pct("23") },
            Bracket { limit: Some(dec("28000")), rate: pct("27") },
            Bracket { limit: Some(dec("55000")), rate: pct("38") },
            Bracket { limit: Some(dec("75000")), rate: pct("41") },
            Bracket { limit: None, rate: pct("43") },
        ]
    }

    fn regional() -> Vec<Bracket> {
        vec![
            Bracket { limit: Some(dec("15000")), rate: pct("1.62") },
            Bracket { limit: Some(dec("28000")), rate: pct("2.13") },
            Bracket { limit: Some(dec("55000")), rate: pct("2.75") },
            Bracket { limit: Some(dec("75000")), rate: pct("3.32") },
            Bracket { limit: None, rate: pct("3.33") },
        ]
    }

    fn town() -> Vec<Bracket> {
        vec![
            Bracket { limit: Some(dec("11670")), rate: pct("0") },
            Bracket { limit: None, rate: pct("0.8") },
        ]
    }

    #[test]
    fn int_sum() {
        assert_eq!(
            sum_pair(&Value::Int(2), &Value::Int(40)).unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn mixed_sum_promotes_to_decimal() {
        assert_eq!(
            sum_pair(&Value::Int(2), &Value::Decimal(dec("0.5"))).unwrap(),
            Value::Decimal(dec("2.5"))
        );
        assert_eq!(
            sum_pair(&Value::Decimal(dec("0.5")), &Value::Int(2)).unwrap(),
            Value::Decimal(dec("2.5"))
        );
    }

    #[test]
    fn novalue_is_sum_identity() {
        assert_eq!(
            sum_pair(&Value::NoValue, &Value::Int(7)).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            sum_pair(&Value::Int(7), &Value::NoValue).unwrap(),
            Value::Int(7)
        );
    }

    #[test]
    fn sum_values_empty_and_singleton() {
        assert_eq!(sum_values(vec![]).unwrap(), Value::NoValue);
        assert_eq!(sum_values(vec![Value::Int(5)]).unwrap(), Value::Int(5));
    }

    #[test]
    fn twelve_monthly_contributions_roll_up() {
        let months = vec![Value::Int(2000); 12];
        assert_eq!(sum_values(months).unwrap(), Value::Int(24_000));
    }

    #[test]
    fn int_sum_overflow_is_an_error() {
        let result = sum_pair(&Value::Int(i64::MAX), &Value::Int(1));
        assert!(matches!(result, Err(EvalError::Overflow { .. })));
    }

    #[test]
    fn percentage_times_int() {
        assert_eq!(
            multiply(&pct("23"), &Value::Int(5000)).unwrap(),
            Value::Decimal(dec("1150"))
        );
        // Symmetric.
        assert_eq!(
            multiply(&Value::Int(500), &pct("66")).unwrap(),
            Value::Decimal(dec("330"))
        );
    }

    #[test]
    fn percentage_times_decimal() {
        assert_eq!(
            multiply(&Value::Decimal(dec("120000")), &pct("27.5")).unwrap(),
            Value::Decimal(dec("33000"))
        );
    }

    #[test]
    fn bool_sum_unsupported() {
        let result = sum_pair(&Value::Bool(true), &Value::Bool(false));
        assert_eq!(
            result,
            Err(EvalError::UnsupportedCombination {
                op: "sum",
                left: "Bool".to_string(),
                right: "Bool".to_string(),
            })
        );
    }

    #[test]
    fn periodic_sum_requires_same_periodicity() {
        let monthly = |n| Value::Periodic {
            value: Box::new(Value::Int(n)),
            periodicity: Periodicity::Monthly,
        };
        let yearly = Value::Periodic {
            value: Box::new(Value::Int(1)),
            periodicity: Periodicity::Yearly,
        };
        assert_eq!(sum_pair(&monthly(1), &monthly(2)).unwrap(), monthly(3));
        assert!(matches!(
            sum_pair(&monthly(1), &yearly),
            Err(EvalError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn time_alternatives_sum_window_by_window() {
        let before = Window::Before(MonthDate::new(2018, Month::July));
        let since = Window::Since(MonthDate::new(2018, Month::July));
        let alt = |w, n| TimeAlternative {
            window: w,
            value: Value::Int(n),
        };
        let a = Value::TimeAlternatives(vec![alt(before, 1), alt(since, 2)]);
        let b = Value::TimeAlternatives(vec![alt(before, 10), alt(since, 20)]);
        assert_eq!(
            sum_pair(&a, &b).unwrap(),
            Value::TimeAlternatives(vec![alt(before, 11), alt(since, 22)])
        );

        // Mismatched window lists do not combine.
        let c = Value::TimeAlternatives(vec![alt(since, 5)]);
        assert!(matches!(
            sum_pair(&a, &c),
            Err(EvalError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn same_limit_bracket_tables_sum_per_tier() {
        let combined = sum_pair(&Value::Brackets(national()), &Value::Brackets(regional()))
            .unwrap();
        match combined {
            Value::Brackets(tiers) => {
                assert_eq!(tiers[0].rate, pct("24.62"));
                assert_eq!(tiers[1].rate, pct("29.13"));
                assert_eq!(tiers[4].rate, pct("46.33"));
            }
            other => panic!("expected Brackets, got {:?}", other),
        }
    }

    #[test]
    fn mismatched_bracket_limits_do_not_sum() {
        let result = sum_pair(&Value::Brackets(national()), &Value::Brackets(town()));
        assert!(matches!(
            result,
            Err(EvalError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn brackets_apply_marginally() {
        // 5000 sits entirely in the first tier.
        assert_eq!(apply_brackets(&national(), dec("5000")).unwrap(), dec("1150"));
        // 90000 spans all five tiers:
        // 15000*23% + 13000*27% + 27000*38% + 20000*41% + 15000*43%
        assert_eq!(
            apply_brackets(&national(), dec("90000")).unwrap(),
            dec("31870")
        );
    }

    #[test]
    fn brackets_apply_to_zero_amount() {
        assert_eq!(apply_brackets(&national(), dec("0")).unwrap(), dec("0"));
    }

    #[test]
    fn combined_tables_reproduce_the_irpef_fixtures() {
        // national+regional share limits and sum per tier; the town
        // table has different limits and is applied separately.
        let core = match sum_pair(&Value::Brackets(national()), &Value::Brackets(regional()))
            .unwrap()
        {
            Value::Brackets(tiers) => tiers,
            other => panic!("expected Brackets, got {:?}", other),
        };
        let at = |amount: &str| {
            checked_add(
                apply_brackets(&core, dec(amount)).unwrap(),
                apply_brackets(&town(), dec(amount)).unwrap(),
            )
            .unwrap()
        };
        assert_eq!(at("5000"), dec("1231.0"));
        assert_eq!(at("90000"), dec("34922.54"));
    }

    #[test]
    fn multiply_delegates_to_bracket_application() {
        assert_eq!(
            multiply(&Value::Int(0), &Value::Brackets(national())).unwrap(),
            Value::Decimal(dec("0"))
        );
        assert_eq!(
            multiply(&Value::Brackets(national()), &Value::Decimal(dec("5000"))).unwrap(),
            Value::Decimal(dec("1150"))
        );
    }
}
