//! Evaluation context: the program under evaluation, externally
//! supplied parameters, and the per-run slot store.
//!
//! Every (scope, field, period) triple gets a slot. A slot is marked
//! `InProgress` before its defining expression runs and `Done` after,
//! so re-entering an in-progress slot is reported as a cycle instead
//! of recursing without bound. Slots double as a memo table: a field
//! is evaluated at most once per period per run.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use fiscal_core::{EntityDecl, Program};

use crate::fields;
use crate::period::Period;
use crate::types::{EvalError, Value};

/// Externally supplied parameter values, keyed by (entity, field).
pub type Parameters = BTreeMap<(String, String), Value>;

/// Where a slot lives: an entity's own fields, or a tax's fields as
/// computed for one particular target entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Entity(String),
    Tax { tax: String, entity: String },
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Entity(name) => write!(f, "{}", name),
            Scope::Tax { tax, entity } => write!(f, "{} on {}", tax, entity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SlotKey {
    scope: Scope,
    field: String,
    period: Period,
}

#[derive(Debug, Clone)]
enum SlotState {
    InProgress,
    Done(Value),
}

pub struct EvaluationContext<'p> {
    program: &'p Program,
    parameters: &'p Parameters,
    slots: Rc<RefCell<BTreeMap<SlotKey, SlotState>>>,
    current_entity: Option<&'p EntityDecl>,
}

impl<'p> EvaluationContext<'p> {
    pub fn new(program: &'p Program, parameters: &'p Parameters) -> EvaluationContext<'p> {
        EvaluationContext {
            program,
            parameters,
            slots: Rc::new(RefCell::new(BTreeMap::new())),
            current_entity: None,
        }
    }

    /// A context focused on `entity`, sharing this context's slot
    /// store. Tax references resolve against the focused entity.
    pub fn in_entity(&self, entity: &'p EntityDecl) -> EvaluationContext<'p> {
        EvaluationContext {
            program: self.program,
            parameters: self.parameters,
            slots: Rc::clone(&self.slots),
            current_entity: Some(entity),
        }
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn current_entity(&self) -> Option<&'p EntityDecl> {
        self.current_entity
    }

    /// The value of an entity field for a period, memoized.
    pub fn field_value(
        &self,
        entity: &str,
        field: &str,
        period: &Period,
    ) -> Result<Value, EvalError> {
        let decl = self
            .program
            .entity(entity)
            .ok_or_else(|| EvalError::UnknownEntity {
                name: entity.to_string(),
            })?;
        let field_decl = decl.field(field).ok_or_else(|| EvalError::UnknownField {
            entity: entity.to_string(),
            field: field.to_string(),
        })?;
        let key = SlotKey {
            scope: Scope::Entity(entity.to_string()),
            field: field.to_string(),
            period: *period,
        };
        self.memoized(key, || {
            fields::entity_field(&self.in_entity(decl), decl, field_decl, period)
        })
    }

    /// The value of a tax field as seen by one target entity,
    /// memoized. Falls back to the entity's own field of the same
    /// name when the tax does not declare it.
    pub fn tax_field_value(
        &self,
        tax: &str,
        entity: &str,
        field: &str,
        period: &Period,
    ) -> Result<Value, EvalError> {
        let tax_decl = self.program.tax(tax).ok_or_else(|| EvalError::UnknownTax {
            name: tax.to_string(),
        })?;
        if !tax_decl.has_field(field) {
            return self.field_value(entity, field, period);
        }
        let decl = self
            .program
            .entity(entity)
            .ok_or_else(|| EvalError::UnknownEntity {
                name: entity.to_string(),
            })?;
        let key = SlotKey {
            scope: Scope::Tax {
                tax: tax.to_string(),
                entity: entity.to_string(),
            },
            field: field.to_string(),
            period: *period,
        };
        self.memoized(key, || {
            fields::tax_field(&self.in_entity(decl), tax_decl, field, period)
        })
    }

    /// An externally supplied parameter value.
    pub fn parameter_value(&self, entity: &str, field: &str) -> Result<Value, EvalError> {
        self.parameters
            .get(&(entity.to_string(), field.to_string()))
            .cloned()
            .ok_or_else(|| EvalError::MissingParameter {
                entity: entity.to_string(),
                field: field.to_string(),
            })
    }

    fn memoized<F>(&self, key: SlotKey, compute: F) -> Result<Value, EvalError>
    where
        F: FnOnce() -> Result<Value, EvalError>,
    {
        match self.slots.borrow().get(&key) {
            Some(SlotState::Done(value)) => return Ok(value.clone()),
            Some(SlotState::InProgress) => {
                return Err(EvalError::CyclicDependency {
                    scope: key.scope.to_string(),
                    field: key.field.clone(),
                });
            }
            None => {}
        }
        self.slots
            .borrow_mut()
            .insert(key.clone(), SlotState::InProgress);
        let result = compute();
        let mut slots = self.slots.borrow_mut();
        match &result {
            Ok(value) => {
                slots.insert(key, SlotState::Done(value.clone()));
            }
            // Leave no poisoned slot behind; the error propagates.
            Err(_) => {
                slots.remove(&key);
            }
        }
        result
    }
}
