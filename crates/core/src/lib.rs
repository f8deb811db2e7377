//! elig-core: clinical-trial eligibility criteria parser.
//!
//! Converts free-text eligibility criteria into structured numeric/ordinal
//! relations `(variable, comparator, value, unit)` for downstream
//! patient-trial matching.
//!
//! The pipeline, bottom up:
//!
//! ```text
//! raw eligibility blob
//!   → criteria::split_criteria      (inclusion/exclusion sentences)
//!   → lexer::Lexer                  (typed tokens with byte positions)
//!   → parser::Parser                (items per segment)
//!   → grammar::Grammar              (candidate parse trees, deduped)
//!   → relation::Relations           (process / transform / negate)
//!   → study::parse_study            (branch selection, emitted records)
//! ```
//!
//! The variable and unit catalogs are built once from resource files and are
//! immutable afterwards; everything downstream is per-request state. The
//! grammar is intentionally small: criterion shapes it does not know yield
//! no relations rather than guesses.

pub mod catalog;
pub mod criteria;
pub mod error;
pub mod grammar;
pub mod interpret;
pub mod lexer;
pub mod parser;
pub mod relation;
pub mod study;
pub mod text;

pub use catalog::{Catalog, VariableType};
pub use criteria::{split_criteria, Criterion, ParsedCriterion};
pub use error::{EligError, Result};
pub use interpret::Interpreter;
pub use relation::{Bound, Comparator, Relation, Relations, UnitRef};
pub use study::{
    parse_studies, parse_study, ParsedStudy, PipelineOptions, SelectionPolicy, Study,
};
