//! Criterion grammar and tree builder.
//!
//! A fixed set of production rules over item kinds describes the criterion
//! shapes the system understands. A chart scan tries every production at
//! every start index of a segment; complete matches become candidate parse
//! trees carrying their variable/comparator/bound/unit bindings and a score.
//! Adjacent trees joined by a single `or`/`and` item form disjunctive or
//! conjunctive groups; the two families stay separate until the orchestrator
//! picks one. The grammar is deliberately narrow: shapes it does not know
//! yield no trees rather than guesses. Extend it by adding productions.

use std::collections::HashMap;

use crate::parser::{Item, ItemKind, Items};
use crate::relation::{Bound, Comparator, Relation, Relations, UnitRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sym {
    Var,
    Cmp,
    Num,
    Unit,
    Range,
    And,
}

/// How a matched symbol run maps onto relation bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `VAR CMP NUM [UNIT]`
    Compare,
    /// `NUM [UNIT] CMP VAR` — comparator is mirrored.
    CompareReversed,
    /// `VAR RANGE NUM AND NUM [UNIT]` — "between 18 and 75".
    Between,
    /// `VAR NUM RANGE NUM [UNIT]` — "18.5-30".
    DashRange,
    /// `VAR CMP NUM RANGE NUM [UNIT]` — comparator discarded for the range.
    CompareDash,
}

struct Production {
    shape: Shape,
    syms: &'static [Sym],
}

use Sym::{And, Cmp, Num, Range, Unit, Var};

/// Ordered longest-first so the first match at a start index is the most
/// specific one.
const PRODUCTIONS: &[Production] = &[
    Production { shape: Shape::Between, syms: &[Var, Range, Num, And, Num, Unit] },
    Production { shape: Shape::CompareDash, syms: &[Var, Cmp, Num, Range, Num, Unit] },
    Production { shape: Shape::Between, syms: &[Var, Range, Num, And, Num] },
    Production { shape: Shape::CompareDash, syms: &[Var, Cmp, Num, Range, Num] },
    Production { shape: Shape::DashRange, syms: &[Var, Num, Range, Num, Unit] },
    Production { shape: Shape::DashRange, syms: &[Var, Num, Range, Num] },
    Production { shape: Shape::Compare, syms: &[Var, Cmp, Num, Unit] },
    Production { shape: Shape::CompareReversed, syms: &[Num, Unit, Cmp, Var] },
    Production { shape: Shape::Compare, syms: &[Var, Cmp, Num] },
    Production { shape: Shape::CompareReversed, syms: &[Num, Cmp, Var] },
];

/// Which combinator family a tree belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Or,
    And,
}

/// A complete parse of (part of) one segment.
#[derive(Debug, Clone)]
pub struct Tree {
    pub variable: String,
    pub comparator: Comparator,
    pub lower: Option<String>,
    pub upper: Option<String>,
    pub unit: Option<String>,
    pub family: Family,
    pub score: f64,
    start: usize,
    len: usize,
}

#[derive(Debug, Default)]
pub struct Grammar;

impl Grammar {
    pub fn new() -> Self {
        Grammar
    }

    /// Yield all production matches over the segment, with combinator
    /// families assigned from the `or`/`and` items linking adjacent matches.
    pub fn build_trees(&self, items: &Items) -> Vec<Tree> {
        let slice = items.as_slice();
        let total = slice.len();
        let mut trees: Vec<Tree> = Vec::new();

        for start in 0..total {
            for production in PRODUCTIONS {
                if let Some(tree) = try_match(slice, start, production, total) {
                    trees.push(tree);
                    break;
                }
            }
        }

        // Link adjacent matches separated by exactly one conjunction item.
        for i in 0..trees.len().saturating_sub(1) {
            let gap = trees[i].start + trees[i].len;
            if trees[i + 1].start != gap + 1 {
                continue;
            }
            match slice.get(gap).map(|item| item.kind) {
                Some(ItemKind::And) => {
                    trees[i].family = Family::And;
                    trees[i + 1].family = Family::And;
                }
                Some(ItemKind::Or) => {
                    trees[i].family = Family::Or;
                    trees[i + 1].family = Family::Or;
                }
                _ => {}
            }
        }

        trees
    }
}

fn sym_matches(sym: Sym, item: &Item) -> bool {
    match sym {
        Sym::Var => item.kind == ItemKind::Variable,
        Sym::Cmp => item.kind == ItemKind::Comparison,
        Sym::Num => item.kind == ItemKind::Number,
        Sym::Unit => item.kind == ItemKind::Unit,
        Sym::Range => item.kind == ItemKind::Range,
        Sym::And => item.kind == ItemKind::And,
    }
}

fn try_match(slice: &[Item], start: usize, production: &Production, total: usize) -> Option<Tree> {
    let len = production.syms.len();
    if start + len > total {
        return None;
    }

    let window = &slice[start..start + len];
    for (sym, item) in production.syms.iter().zip(window) {
        if !sym_matches(*sym, item) {
            return None;
        }
    }

    let variable = window.iter().find(|i| i.kind == ItemKind::Variable)?;
    let numbers: Vec<&Item> = window.iter().filter(|i| i.kind == ItemKind::Number).collect();
    let unit = window.iter().find(|i| i.kind == ItemKind::Unit).map(|i| i.value.clone());
    let comparison = window.iter().find(|i| i.kind == ItemKind::Comparison);

    let (comparator, lower, upper) = match production.shape {
        Shape::Compare | Shape::CompareReversed => {
            let mut comparator = Comparator::from_symbol(&comparison?.value)?;
            if production.shape == Shape::CompareReversed {
                comparator = comparator.mirror();
            }
            let value = numbers.first()?.value.clone();
            match comparator {
                Comparator::Less | Comparator::LessEq => (comparator, None, Some(value)),
                _ => (comparator, Some(value), None),
            }
        }
        Shape::Between | Shape::DashRange | Shape::CompareDash => {
            let lower = numbers.first()?.value.clone();
            let upper = numbers.get(1)?.value.clone();
            (Comparator::Between, Some(lower), Some(upper))
        }
    };

    let both_bounds = lower.is_some() && upper.is_some();
    let structural = 0.5
        + if both_bounds { 0.25 } else { 0.0 }
        + if unit.is_some() { 0.25 } else { 0.0 };
    let coverage = len as f64 / total as f64;
    let score = (structural + coverage) / 2.0;

    Some(Tree {
        variable: variable.value.clone(),
        comparator,
        lower,
        upper,
        unit,
        family: Family::Or,
        score,
        start,
        len,
    })
}

/// All candidate trees for one criterion, across its segments.
#[derive(Debug, Default)]
pub struct Trees(Vec<Tree>);

impl Trees {
    pub fn new() -> Self {
        Trees(Vec::new())
    }

    pub fn extend(&mut self, trees: Vec<Tree>) {
        self.0.extend(trees);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tree> {
        self.0.iter()
    }

    /// Drop trees whose relation key is already present, keeping the
    /// highest-scored instance of each.
    pub fn dedupe(&mut self) {
        type Key = (String, Comparator, Option<String>, Option<String>, Option<String>);
        let mut best: HashMap<Key, f64> = HashMap::new();
        for tree in &self.0 {
            let key = tree_key(tree);
            let entry = best.entry(key).or_insert(f64::NEG_INFINITY);
            if tree.score > *entry {
                *entry = tree.score;
            }
        }
        let mut seen: HashMap<Key, bool> = HashMap::new();
        self.0.retain(|tree| {
            let key = tree_key(tree);
            let is_best = best.get(&key).is_some_and(|&s| tree.score >= s);
            let taken = seen.entry(key).or_insert(false);
            if is_best && !*taken {
                *taken = true;
                true
            } else {
                false
            }
        });
    }

    /// Lower trees into relations, split by combinator family.
    pub fn relations(&self) -> (Relations, Relations) {
        let mut or_relations = Relations::new();
        let mut and_relations = Relations::new();
        for tree in &self.0 {
            let mut r = Relation::new(tree.variable.clone(), tree.comparator);
            r.lower = tree.lower.as_deref().map(Bound::new);
            r.upper = tree.upper.as_deref().map(Bound::new);
            r.unit = tree.unit.as_deref().map(UnitRef::new);
            r.score = tree.score;
            match tree.family {
                Family::Or => or_relations.push(r),
                Family::And => and_relations.push(r),
            }
        }
        (or_relations, and_relations)
    }
}

fn tree_key(tree: &Tree) -> (String, Comparator, Option<String>, Option<String>, Option<String>) {
    (
        tree.variable.clone(),
        tree.comparator,
        tree.lower.clone(),
        tree.upper.clone(),
        tree.unit.clone(),
    )
}
