//! Structured relations and their post-processing.
//!
//! A `Relation` is the `(variable, comparator, value, unit)` tuple extracted
//! from one criterion. Relations travel in two parallel families while a
//! criterion is being interpreted: the disjunctive (`or`) group and the
//! conjunctive (`and`) group; the orchestrator picks between them.

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, VariableType};
use crate::parser::IGNORE_VARIABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "≤")]
    LessEq,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "≠")]
    Neq,
    #[serde(rename = "≥")]
    GreaterEq,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "outside")]
    Outside,
    #[serde(rename = "in")]
    In,
}

impl Comparator {
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "<" => Some(Comparator::Less),
            "≤" | "<=" => Some(Comparator::LessEq),
            "=" => Some(Comparator::Eq),
            "≠" => Some(Comparator::Neq),
            "≥" | ">=" => Some(Comparator::GreaterEq),
            ">" => Some(Comparator::Greater),
            "between" => Some(Comparator::Between),
            "outside" => Some(Comparator::Outside),
            "in" => Some(Comparator::In),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Less => "<",
            Comparator::LessEq => "≤",
            Comparator::Eq => "=",
            Comparator::Neq => "≠",
            Comparator::GreaterEq => "≥",
            Comparator::Greater => ">",
            Comparator::Between => "between",
            Comparator::Outside => "outside",
            Comparator::In => "in",
        }
    }

    /// Mirror for reversed operand order: `9% ≤ hba1c` states `hba1c ≥ 9%`.
    pub fn mirror(&self) -> Self {
        match self {
            Comparator::Less => Comparator::Greater,
            Comparator::LessEq => Comparator::GreaterEq,
            Comparator::GreaterEq => Comparator::LessEq,
            Comparator::Greater => Comparator::Less,
            other => *other,
        }
    }

    /// Complement under exclusion: the criterion excludes what it states.
    pub fn negate(&self) -> Self {
        match self {
            Comparator::Less => Comparator::GreaterEq,
            Comparator::LessEq => Comparator::Greater,
            Comparator::Eq => Comparator::Neq,
            Comparator::Neq => Comparator::Eq,
            Comparator::GreaterEq => Comparator::Less,
            Comparator::Greater => Comparator::LessEq,
            Comparator::Between => Comparator::Outside,
            Comparator::Outside => Comparator::Between,
            Comparator::In => Comparator::In,
        }
    }
}

/// A bound value with its byte span in the source criterion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Bound {
    pub value: String,
    pub start: usize,
    pub end: usize,
}

impl Bound {
    pub fn new(value: impl Into<String>) -> Self {
        Bound { value: value.into(), start: 0, end: 0 }
    }
}

/// A unit with the byte spans of every occurrence in the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UnitRef {
    pub value: String,
    pub start: Vec<usize>,
    pub end: Vec<usize>,
}

impl UnitRef {
    pub fn new(value: impl Into<String>) -> Self {
        UnitRef { value: value.into(), start: Vec::new(), end: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Relation {
    pub name: String,
    pub comparator: Comparator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitRef>,
    pub score: f64,
    pub negated: bool,
    pub start: usize,
    pub end: usize,
}

impl Relation {
    pub fn new(name: impl Into<String>, comparator: Comparator) -> Self {
        Relation {
            name: name.into(),
            comparator,
            lower: None,
            upper: None,
            unit: None,
            score: 0.0,
            negated: false,
            start: 0,
            end: 0,
        }
    }

    /// A relation is valid when it names a real catalog variable and kept a
    /// positive confidence score through post-processing.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && self.name != IGNORE_VARIABLE && self.score > 0.0
    }

    fn has_required_bounds(&self) -> bool {
        match self.comparator {
            Comparator::Less | Comparator::LessEq => self.upper.is_some(),
            Comparator::Greater | Comparator::GreaterEq | Comparator::Eq | Comparator::Neq => {
                self.lower.is_some()
            }
            Comparator::Between | Comparator::Outside => {
                self.lower.is_some() && self.upper.is_some()
            }
            Comparator::In => self.lower.is_some(),
        }
    }

    fn bounds_contradict(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lo), Some(hi)) => match (parse_numeric(&lo.value), parse_numeric(&hi.value)) {
                (Some(lo), Some(hi)) => lo > hi,
                _ => false,
            },
            _ => false,
        }
    }
}

/// Parse a bound literal as a number; fractions like `3/4` are accepted.
pub fn parse_numeric(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return Some(v);
    }
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// An ordered collection of relations from one criterion family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relations(Vec<Relation>);

impl Relations {
    pub fn new() -> Self {
        Relations(Vec::new())
    }

    pub fn push(&mut self, r: Relation) {
        self.0.push(r);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Relation> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Relation> {
        self.0.iter_mut()
    }

    /// Prune relations the grammar bound incompletely: a relation must name
    /// a variable and carry every bound its comparator needs, and a range
    /// must not run backwards. Idempotent.
    pub fn process(&mut self) {
        self.0.retain(|r| {
            !r.name.is_empty() && r.has_required_bounds() && !r.bounds_contradict()
        });
    }

    /// Canonicalise bound literals against the variable's value domain.
    /// Numerical bounds must parse as decimals (or simple fractions);
    /// ordinal bounds must belong to the variable's allowed literal set.
    /// Failure zeroes the relation's confidence score.
    pub fn transform(&mut self, variables: &Catalog) {
        for r in &mut self.0 {
            if r.score <= 0.0 {
                continue;
            }
            if r.name == IGNORE_VARIABLE {
                r.score = 0.0;
                continue;
            }
            let Some(variable_type) = variables.variable_type(&r.name) else {
                r.score = 0.0;
                continue;
            };
            let bounds_ok = match variable_type {
                VariableType::Numerical => [&r.lower, &r.upper]
                    .into_iter()
                    .flatten()
                    .all(|b| parse_numeric(&b.value).is_some()),
                VariableType::Ordinal => {
                    let literals = variables.ordinal_literals(&r.name);
                    [&r.lower, &r.upper].into_iter().flatten().all(|b| {
                        literals.is_some_and(|set| set.contains(&b.value.to_lowercase()))
                    })
                }
            };
            if !bounds_ok {
                r.score = 0.0;
            }
        }
    }

    /// Flip every comparator for an exclusion criterion and mark the
    /// relations negated.
    pub fn negate(&mut self) {
        for r in &mut self.0 {
            r.comparator = r.comparator.negate();
            r.negated = true;
        }
    }

    /// Minimum confidence across the group, or 0 when empty.
    pub fn min_score(&self) -> f64 {
        self.0.iter().map(|r| r.score).reduce(f64::min).unwrap_or(0.0)
    }
}

impl IntoIterator for Relations {
    type Item = Relation;
    type IntoIter = std::vec::IntoIter<Relation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn relation(name: &str, cmp: Comparator, lower: Option<&str>, upper: Option<&str>) -> Relation {
        let mut r = Relation::new(name, cmp);
        r.lower = lower.map(Bound::new);
        r.upper = upper.map(Bound::new);
        r.score = 0.8;
        r
    }

    #[test]
    fn comparator_serde_uses_symbols() {
        let json = serde_json::to_string(&Comparator::GreaterEq).unwrap();
        assert_eq!(json, "\"≥\"");
        let back: Comparator = serde_json::from_str("\"between\"").unwrap();
        assert_eq!(back, Comparator::Between);
    }

    #[test]
    fn negation_table() {
        assert_eq!(Comparator::Less.negate(), Comparator::GreaterEq);
        assert_eq!(Comparator::LessEq.negate(), Comparator::Greater);
        assert_eq!(Comparator::GreaterEq.negate(), Comparator::Less);
        assert_eq!(Comparator::Greater.negate(), Comparator::LessEq);
        assert_eq!(Comparator::Eq.negate(), Comparator::Neq);
        assert_eq!(Comparator::Between.negate(), Comparator::Outside);
    }

    #[test]
    fn process_drops_incomplete_relations() {
        let mut rs = Relations::new();
        rs.push(relation("age", Comparator::GreaterEq, Some("18"), None));
        rs.push(relation("age", Comparator::GreaterEq, None, None)); // missing bound
        rs.push(relation("", Comparator::GreaterEq, Some("18"), None)); // missing variable
        rs.push(relation("bmi", Comparator::Between, Some("30"), Some("18"))); // backwards
        rs.process();
        assert_eq!(rs.len(), 1);
    }

    #[test]
    fn process_is_idempotent() {
        let mut rs = Relations::new();
        rs.push(relation("age", Comparator::Between, Some("18"), Some("75")));
        rs.push(relation("age", Comparator::Less, None, None));
        rs.process();
        let once = rs.clone();
        rs.process();
        assert_eq!(rs, once);
    }

    #[test]
    fn negate_flips_and_marks() {
        let mut rs = Relations::new();
        rs.push(relation("hba1c", Comparator::GreaterEq, Some("9.0"), None));
        rs.negate();
        let r = rs.iter().next().unwrap();
        assert_eq!(r.comparator, Comparator::Less);
        assert!(r.negated);
    }

    #[test]
    fn transform_zeroes_bad_literals() {
        let mut variables = Catalog::new();
        variables.insert_variable("age", &[], "", VariableType::Numerical, &[]);
        variables.insert_variable("nyha", &[], "", VariableType::Ordinal, &["i", "ii", "iii", "iv"]);

        let mut rs = Relations::new();
        rs.push(relation("age", Comparator::GreaterEq, Some("18"), None));
        rs.push(relation("age", Comparator::GreaterEq, Some("eighteen"), None));
        rs.push(relation("nyha", Comparator::Eq, Some("ii"), None));
        rs.push(relation("nyha", Comparator::Eq, Some("vii"), None));
        rs.push(relation("unknown_var", Comparator::Eq, Some("1"), None));
        rs.transform(&variables);

        let scores: Vec<f64> = rs.iter().map(|r| r.score).collect();
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
        assert!(scores[2] > 0.0);
        assert_eq!(scores[3], 0.0);
        assert_eq!(scores[4], 0.0);
    }

    #[test]
    fn fractions_parse_as_numeric() {
        assert_eq!(parse_numeric("3/4"), Some(0.75));
        assert_eq!(parse_numeric("9.0"), Some(9.0));
        assert_eq!(parse_numeric("x"), None);
    }

    #[test]
    fn min_score_over_group() {
        let mut rs = Relations::new();
        assert_eq!(rs.min_score(), 0.0);
        let mut a = relation("age", Comparator::GreaterEq, Some("18"), None);
        a.score = 0.9;
        let mut b = relation("bmi", Comparator::Less, None, Some("30"));
        b.score = 0.6;
        rs.push(a);
        rs.push(b);
        assert!((rs.min_score() - 0.6).abs() < 1e-9);
    }
}
