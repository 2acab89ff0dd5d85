//! Program AST for the financial modeling DSL.
//!
//! These types are produced by the external parsing/resolution stage
//! and consumed by the evaluator. Every reference inside an expression
//! arrives already bound to a concrete declaration name; `Program::new`
//! rejects anything that does not resolve.

use rust_decimal::Decimal;
use time::Month;

// ──────────────────────────────────────────────
// Time model
// ──────────────────────────────────────────────

/// Periodicity tag for recurring values ("2K monthly").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Periodicity {
    Monthly,
    Yearly,
}

/// A month-granularity date. Year-only source dates ("before 2017")
/// are represented as January of that year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthDate {
    pub year: i32,
    pub month: Month,
}

impl MonthDate {
    pub fn new(year: i32, month: Month) -> MonthDate {
        MonthDate { year, month }
    }

    /// The date of the first day of the month, as a (year, month)
    /// ordering key. Day-level granularity never appears in source.
    pub fn first_day(&self) -> (i32, u8) {
        (self.year, u8::from(self.month))
    }
}

/// A period window constraint attached to a time-alternative clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Strictly before the date's first day.
    Before(MonthDate),
    /// On or after the date's first day.
    Since(MonthDate),
    /// Strictly after the date's first day.
    After(MonthDate),
}

// ──────────────────────────────────────────────
// Declarations
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Declaration {
    Countries(Vec<CountryDecl>),
    /// Regions owned by (and referencing by name) a country.
    Regions { country: String, names: Vec<String> },
    /// Cities owned by a region.
    Cities { region: String, names: Vec<String> },
    CompanyType(CompanyTypeDecl),
    Entity(EntityDecl),
    Tax(TaxDecl),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryDecl {
    pub name: String,
    pub eu: bool,
}

#[derive(Debug, Clone)]
pub struct CompanyTypeDecl {
    pub name: String,
}

/// The declared type of an entity or the target type of a tax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Person,
    /// A named company type ("SRL", "SPA", ...).
    Company(String),
}

impl EntityKind {
    pub fn is_person(&self) -> bool {
        matches!(self, EntityKind::Person)
    }

    pub fn is_company(&self) -> bool {
        matches!(self, EntityKind::Company(_))
    }
}

#[derive(Debug, Clone)]
pub struct EntityDecl {
    pub name: String,
    pub kind: EntityKind,
    pub fields: Vec<FieldDecl>,
}

impl EntityDecl {
    pub fn is_person(&self) -> bool {
        self.kind.is_person()
    }

    pub fn is_company(&self) -> bool {
        self.kind.is_company()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A named slot on an entity or tax. Exactly one of `expr`, `is_sum`
/// or `is_parameter` is expected to drive its value; the evaluator
/// checks them in that priority order.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub expr: Option<Expr>,
    /// Declared `<- sum`: aggregates matching contributions.
    pub is_sum: bool,
    /// Declared `<- parameter`: supplied externally per run.
    pub is_parameter: bool,
    pub contribution: Option<Contribution>,
}

/// A declared edge from this field into another field's `sum`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contribution {
    /// `-> contributes to income`
    SameEntity { field: String },
    /// `-> contributes to income of Federico`
    OtherEntity { entity: String, field: String },
    /// `-> contributes to income of owners`, pro-rated by share.
    Owners { field: String },
}

impl Contribution {
    pub fn field(&self) -> &str {
        match self {
            Contribution::SameEntity { field } => field,
            Contribution::OtherEntity { field, .. } => field,
            Contribution::Owners { field } => field,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaxDecl {
    pub name: String,
    pub target: EntityKind,
    pub fields: Vec<FieldDecl>,
}

impl TaxDecl {
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Whether this tax is assessed on the given entity: a person
    /// target matches persons, a company target matches entities of
    /// that exact company type.
    pub fn applies_to(&self, entity: &EntityDecl) -> bool {
        match (&self.target, &entity.kind) {
            (EntityKind::Person, EntityKind::Person) => true,
            (EntityKind::Company(t), EntityKind::Company(e)) => t == e,
            _ => false,
        }
    }
}

// ──────────────────────────────────────────────
// Expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Expr {
    Int(i64),
    Decimal(Decimal),
    /// Stored out of 100: 23% is `Percentage(23)`.
    Percentage(Decimal),
    Reference(Reference),
    /// Ownership map literal: `{ Federico: 66%, Marco: 34% }`.
    Shares(Vec<ShareEntry>),
    Sum(Box<Expr>, Box<Expr>),
    /// `x% of y`
    PercentOf { percent: Box<Expr>, base: Box<Expr> },
    /// `field of <entity-valued scope>`
    FieldAccess { scope: Box<Expr>, field: String },
    Equality(Box<Expr>, Box<Expr>),
    /// First clause whose condition holds wins; no default.
    When(Vec<WhenClause>),
    /// Time-windowed alternatives: `@{before july 2018} a @{since july 2018} b`.
    Windowed(Vec<TimeClause>),
    Periodic {
        value: Box<Expr>,
        periodicity: Periodicity,
    },
    /// Progressive rate table literal, entries in ascending order.
    Brackets(Vec<BracketEntry>),
    /// `brackets for amount` -- marginal application.
    ApplyBrackets {
        brackets: Box<Expr>,
        amount: Box<Expr>,
    },
}

/// A reference already resolved by the external resolution stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Entity(String),
    EntityField { entity: String, field: String },
    /// A field named inside a tax body. Resolution binds bare names in
    /// tax expressions here; at evaluation time the name is looked up
    /// on the tax first, then on the entity under assessment.
    TaxField { tax: String, field: String },
    Country(String),
    Region(String),
    City(String),
}

#[derive(Debug, Clone)]
pub struct ShareEntry {
    pub owner: String,
    pub share: Expr,
}

#[derive(Debug, Clone)]
pub struct WhenClause {
    pub condition: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct TimeClause {
    pub window: Window,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct BracketEntry {
    pub limit: BracketLimit,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum BracketLimit {
    /// `[to 15K]` -- inclusive upper limit.
    To(Expr),
    /// `[above]` -- open-ended, must be last.
    Above,
}
