//! Variable and unit dictionaries.
//!
//! A `Catalog` maps surface phrases (possibly multi-word, case-insensitive)
//! to canonical ids, and answers the prefix question the parser uses to
//! decide whether to keep extending a multi-word identifier. Catalogs are
//! built once from tab-delimited resource files and never mutated again, so
//! sharing them across threads is safe.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{EligError, Result};

/// Value domain of a variable, governing literal canonicalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableType {
    Numerical,
    Ordinal,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableType::Numerical => "numerical",
            VariableType::Ordinal => "ordinal",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "numerical" | "numeric" => Some(VariableType::Numerical),
            "ordinal" => Some(VariableType::Ordinal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct VariableMeta {
    question: String,
    variable_type: Option<VariableType>,
    literals: HashSet<String>,
}

/// Read-only longest-prefix dictionary from surface phrase to canonical id.
#[derive(Debug, Default)]
pub struct Catalog {
    by_alias: HashMap<String, String>,
    aliases: BTreeSet<String>,
    meta: HashMap<String, VariableMeta>,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog::default()
    }

    /// Exact lookup, case-insensitive. Returns the canonical id.
    pub fn get(&self, s: &str) -> Option<&str> {
        self.by_alias.get(&s.to_lowercase()).map(String::as_str)
    }

    /// True when `s` is a prefix of any key in the catalog.
    pub fn matches_prefix(&self, s: &str) -> bool {
        let s = s.to_lowercase();
        self.aliases
            .range(s.clone()..)
            .next()
            .is_some_and(|k| k.starts_with(&s))
    }

    /// Natural-language question bound to a variable id.
    pub fn question(&self, id: &str) -> Option<&str> {
        self.meta.get(id).map(|m| m.question.as_str())
    }

    pub fn variable_type(&self, id: &str) -> Option<VariableType> {
        self.meta.get(id).and_then(|m| m.variable_type)
    }

    /// Allowed literal set for an ordinal variable.
    pub fn ordinal_literals(&self, id: &str) -> Option<&HashSet<String>> {
        self.meta.get(id).map(|m| &m.literals)
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    fn insert_alias(&mut self, alias: &str, id: &str) {
        let alias = alias.trim().to_lowercase();
        if alias.is_empty() {
            return;
        }
        self.aliases.insert(alias.clone());
        self.by_alias.insert(alias, id.to_string());
    }

    /// Register a unit: the canonical id plus its surface aliases.
    pub fn insert_unit(&mut self, id: &str, aliases: &[&str]) {
        self.insert_alias(id, id);
        for alias in aliases {
            self.insert_alias(alias, id);
        }
        self.meta.entry(id.to_string()).or_default();
    }

    /// Register a variable with its question, value type, and (for ordinal
    /// variables) the set of literals its bounds may take.
    pub fn insert_variable(
        &mut self,
        id: &str,
        aliases: &[&str],
        question: &str,
        variable_type: VariableType,
        literals: &[&str],
    ) {
        self.insert_alias(id, id);
        for alias in aliases {
            self.insert_alias(alias, id);
        }
        self.meta.insert(
            id.to_string(),
            VariableMeta {
                question: question.to_string(),
                variable_type: Some(variable_type),
                literals: literals.iter().map(|l| l.trim().to_lowercase()).collect(),
            },
        );
    }

    /// Load the variable dictionary from a tab-delimited resource:
    /// `canonical_id \t alias1|alias2|... \t question \t value_type [\t lit1|lit2|...]`.
    /// Malformed rows are skipped with a warning; a file where most rows are
    /// malformed fails to load.
    pub fn load_variables(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| EligError::Resource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut catalog = Catalog::new();
        let mut rows = 0usize;
        let mut skipped = 0usize;
        for line in data.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            rows += 1;
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 2 || cols[0].trim().is_empty() {
                warn!(row = line, "skipping malformed variable row");
                skipped += 1;
                continue;
            }
            let variable_type = match cols.get(3) {
                Some(c) => match VariableType::parse(c) {
                    Some(t) => t,
                    None => {
                        warn!(row = line, "skipping variable row with unknown value type");
                        skipped += 1;
                        continue;
                    }
                },
                None => VariableType::Numerical,
            };
            let aliases: Vec<&str> = cols[1].split('|').collect();
            let question = cols.get(2).copied().unwrap_or("");
            let literals: Vec<&str> = cols
                .get(4)
                .map(|c| c.split('|').collect())
                .unwrap_or_default();
            catalog.insert_variable(cols[0].trim(), &aliases, question.trim(), variable_type, &literals);
        }

        check_skip_threshold(path, rows, skipped)?;
        Ok(catalog)
    }

    /// Load the unit dictionary. Only the first two columns are used.
    pub fn load_units(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| EligError::Resource {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut catalog = Catalog::new();
        let mut rows = 0usize;
        let mut skipped = 0usize;
        for line in data.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            rows += 1;
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 2 || cols[0].trim().is_empty() {
                warn!(row = line, "skipping malformed unit row");
                skipped += 1;
                continue;
            }
            let aliases: Vec<&str> = cols[1].split('|').collect();
            catalog.insert_unit(cols[0].trim(), &aliases);
        }

        check_skip_threshold(path, rows, skipped)?;
        Ok(catalog)
    }
}

fn check_skip_threshold(path: &Path, rows: usize, skipped: usize) -> Result<()> {
    if rows == 0 || skipped * 2 > rows {
        return Err(EligError::Resource {
            path: path.to_path_buf(),
            reason: format!("{skipped} of {rows} rows malformed"),
        });
    }
    Ok(())
}
