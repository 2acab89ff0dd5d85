//! Program model for the financial modeling DSL.
//!
//! This crate owns everything that exists before evaluation: the
//! resolved AST (entities, taxes, geography, expressions), load-time
//! validation, and the interchange JSON loader. Lexing, parsing and
//! name resolution happen upstream; this crate consumes their output
//! and fails fast on anything they left dangling.

pub mod ast;
pub mod error;
pub mod interchange;
pub mod program;

pub use ast::{
    BracketEntry, BracketLimit, CompanyTypeDecl, Contribution, CountryDecl, Declaration,
    EntityDecl, EntityKind, Expr, FieldDecl, MonthDate, Periodicity, Reference, ShareEntry,
    TaxDecl, TimeClause, WhenClause, Window,
};
pub use error::ProgramError;
pub use program::{CityDecl, Program, RegionDecl};
