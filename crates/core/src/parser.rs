//! Token-to-item parser.
//!
//! Consumes lexer tokens with k-token lookahead and collapses runs of them
//! into typed `Item`s: variables and units resolved against the catalogs by
//! longest-prefix matching, comparator phrasings normalised to `< ≤ ≥ >`,
//! conjunctions and ranges classified. Items accumulate into segments; a
//! `List` holds one segment per clause region (split on parentheses).
//!
//! Parsing is total: malformed input degrades to `Unknown` items, which are
//! trimmed away afterwards.

use std::collections::VecDeque;

use crate::catalog::Catalog;
use crate::lexer::{Lexer, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Variable,
    Number,
    Unit,
    Comparison,
    Range,
    And,
    Or,
    Slash,
    Punctuation,
    Unknown,
}

/// A semantically classified token or compound of tokens.
///
/// `value` is the canonical form (catalog id, normalised comparator);
/// `name` is the surface span from the input; `pos` its byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub value: String,
    pub name: String,
    pub pos: usize,
}

/// Placeholder variable id inserted by `fix_missing_variable`. Relations
/// headed by it never survive validity filtering.
pub const IGNORE_VARIABLE: &str = "IGNORE";

impl Item {
    fn unknown() -> Self {
        Item { kind: ItemKind::Unknown, value: String::new(), name: String::new(), pos: 0 }
    }

    fn set(&mut self, kind: ItemKind, value: impl Into<String>) {
        self.kind = kind;
        self.value = value.into();
    }

    pub fn valid(&self) -> bool {
        self.kind != ItemKind::Unknown
    }

    /// Flip a comparison item under negation: `not ≥` means `<`.
    fn negate(&mut self) {
        if self.kind != ItemKind::Comparison {
            return;
        }
        let flipped = match self.value.as_str() {
            "≤" => ">",
            "<" => "≥",
            "≥" => "<",
            ">" => "≤",
            other => other,
        };
        self.value = flipped.to_string();
    }
}

/// One segment: an ordered run of items belonging to a single clause region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Items(Vec<Item>);

impl Items {
    pub fn new() -> Self {
        Items(Vec::new())
    }

    /// Append an item, collapsing adjacent `Unknown`s into one.
    pub fn push(&mut self, item: Item) {
        if item.kind == ItemKind::Unknown
            && self.0.last().is_some_and(|last| last.kind == ItemKind::Unknown)
        {
            return;
        }
        self.0.push(item);
    }

    pub fn last_kind(&self) -> Option<ItemKind> {
        self.0.last().map(|i| i.kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Item] {
        &self.0
    }

    fn trim(&mut self) {
        let drop = |i: &Item| {
            matches!(i.kind, ItemKind::Punctuation | ItemKind::Unknown | ItemKind::Slash)
        };
        while self.0.first().is_some_and(drop) {
            self.0.remove(0);
        }
        while self.0.last().is_some_and(drop) {
            self.0.pop();
        }
    }
}

/// The parsed form of one criterion: an ordered sequence of segments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct List(Vec<Items>);

impl List {
    pub fn new() -> Self {
        List(Vec::new())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Items> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove leading/trailing punctuation, unknown, and slash items from
    /// each segment, dropping segments that end up empty.
    pub fn trim_items(&mut self) {
        for items in &mut self.0 {
            items.trim();
        }
        self.0.retain(|items| !items.is_empty());
    }

    /// Insert placeholder variable heads into numerically-led segments so
    /// the grammar can still match fragments like `≥ 9.0 %`. A `Range` item
    /// forces one insert and ends the walk; otherwise an insert happens
    /// wherever one of the number/comparison/unit counts pulls ahead of the
    /// other two. Relations headed by the placeholder are filtered out later.
    pub fn fix_missing_variable(&mut self) {
        for items in &mut self.0 {
            let mut numbers = 0usize;
            let mut comparisons = 0usize;
            let mut units = 0usize;
            let mut inserts: Vec<usize> = Vec::new();
            for (i, item) in items.0.iter().enumerate() {
                match item.kind {
                    ItemKind::Variable => break,
                    ItemKind::Range => {
                        inserts.push(i);
                        break;
                    }
                    ItemKind::Number => {
                        numbers += 1;
                        if numbers > comparisons && numbers > units {
                            inserts.push(i);
                        }
                    }
                    ItemKind::Comparison => {
                        comparisons += 1;
                        if comparisons > numbers && comparisons > units {
                            inserts.push(i);
                        }
                    }
                    ItemKind::Unit => {
                        units += 1;
                        if units > numbers && units > comparisons {
                            inserts.push(i);
                        }
                    }
                    _ => {}
                }
            }
            for i in inserts.into_iter().rev() {
                let pos = items.0[i].pos;
                let mut placeholder = Item::unknown();
                placeholder.pos = pos;
                placeholder.set(ItemKind::Variable, IGNORE_VARIABLE);
                items.0.insert(i, placeholder);
            }
        }
    }
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

pub struct Parser<'a> {
    lexer: Lexer,
    lookahead: VecDeque<Token>,
    variables: &'a Catalog,
    units: &'a Catalog,
}

impl<'a> Parser<'a> {
    pub fn new(input: &str, variables: &'a Catalog, units: &'a Catalog) -> Self {
        Parser { lexer: Lexer::new(input), lookahead: VecDeque::new(), variables, units }
    }

    /// Parse the input into a list of item segments.
    pub fn parse(mut self) -> List {
        let mut list = List(self.parse_segment(TokenKind::Eof, false));
        list.trim_items();
        list
    }

    fn next(&mut self) -> Token {
        if let Some(t) = self.lookahead.pop_front() {
            return t;
        }
        self.lexer.next_token()
    }

    /// Look `k` tokens ahead (1-based), materialising the buffer on demand.
    fn peek(&mut self, k: usize) -> &Token {
        while self.lookahead.len() < k {
            let t = self.lexer.next_token();
            self.lookahead.push_back(t);
        }
        &self.lookahead[k - 1]
    }

    fn parse_segment(&mut self, end: TokenKind, nested: bool) -> Vec<Items> {
        let mut list: Vec<Items> = Vec::new();
        let mut nodes = Items::new();

        loop {
            let kind = self.peek(1).kind;
            if kind == TokenKind::Eof {
                break;
            }
            if kind == end {
                self.next();
                break;
            }
            match kind {
                TokenKind::LeftParen => {
                    self.next();
                    if nested {
                        break;
                    }
                    let sub = self.parse_segment(TokenKind::RightParen, true);
                    for seg in sub {
                        // A one-item bracketed span is most likely an abbreviation.
                        if seg.len() > 1 {
                            list.push(seg);
                        }
                    }
                }
                TokenKind::RightParen => {
                    // Stray closer at the outer level acts as a separator.
                    self.next();
                    if !nodes.is_empty() {
                        list.push(std::mem::take(&mut nodes));
                    }
                }
                TokenKind::Identifier => {
                    let n = self.parse_identifier();
                    nodes.push(n);
                }
                TokenKind::Number => {
                    let n = self.parse_number();
                    if n.valid() {
                        nodes.push(n);
                    }
                }
                TokenKind::Unit => {
                    let n = self.parse_unit();
                    if n.valid() {
                        nodes.push(n);
                    }
                }
                TokenKind::Negation
                | TokenKind::Comparison
                | TokenKind::LessComparison
                | TokenKind::GreaterComparison => {
                    let n = self.parse_comparison();
                    if n.valid() {
                        nodes.push(n);
                    }
                }
                TokenKind::Conjunction => {
                    let n = self.parse_conjunction();
                    if n.valid() {
                        nodes.push(n);
                    }
                }
                TokenKind::Slash => {
                    if nodes.last_kind() == Some(ItemKind::Number) {
                        // A number before the slash may compose to a unit, e.g. `30 /ul`.
                        let n = self.parse_identifier();
                        nodes.push(n);
                    } else {
                        let n = self.parse_slash();
                        if n.valid() {
                            nodes.push(n);
                        }
                    }
                }
                TokenKind::Dash => {
                    let n = self.parse_dash();
                    if n.valid() {
                        nodes.push(n);
                    }
                }
                TokenKind::Punctuation => {
                    let n = self.parse_punctuation();
                    if n.valid() {
                        nodes.push(n);
                    }
                }
                TokenKind::Eof => break,
            }
        }

        if !nodes.is_empty() {
            list.push(nodes);
        }
        list
    }

    /// Longest-prefix match of a multi-word phrase over both catalogs.
    ///
    /// The candidate extends word by word while either catalog still
    /// prefix-matches it; a parenthesised span encountered mid-phrase is
    /// skipped. The longer of the two exact matches wins (ties go to the
    /// variable catalog); the cursor advances past exactly the tokens the
    /// winning phrase consumed.
    fn parse_identifier(&mut self) -> Item {
        let t = self.next();
        let mut item = Item::unknown();
        item.pos = t.pos;
        item.name = t.value.clone();

        if t.value == "to" {
            item.set(ItemKind::Range, "to");
            return item;
        }

        let mut candidate = t.value.clone();
        let mut surface = t.value.clone();
        // (canonical id, lookahead tokens to consume, surface phrase)
        let mut variable_match: Option<(String, usize, String)> = None;
        let mut unit_match: Option<(String, usize, String)> = None;
        let mut variable_cnt = 0usize;
        let mut unit_cnt = 0usize;
        let mut step = 1usize;
        let mut consumed = 0usize;

        loop {
            let variable_prefix = self.variables.matches_prefix(&candidate);
            let unit_prefix = self.units.matches_prefix(&candidate);
            if !variable_prefix && !unit_prefix {
                break;
            }
            if let Some(id) = self.variables.get(&candidate) {
                variable_match = Some((id.to_string(), consumed, surface.clone()));
                variable_cnt = step;
            }
            if let Some(id) = self.units.get(&candidate) {
                unit_match = Some((id.to_string(), consumed, surface.clone()));
                unit_cnt = step;
            }

            // Next extension token, skipping one parenthesised span.
            let mut j = consumed + 1;
            if self.peek(j).kind == TokenKind::LeftParen {
                j += 1;
                while !matches!(self.peek(j).kind, TokenKind::RightParen | TokenKind::Eof) {
                    j += 1;
                }
                if self.peek(j).kind == TokenKind::RightParen {
                    j += 1;
                }
            }
            let next_tok = self.peek(j).clone();
            if !matches!(
                next_tok.kind,
                TokenKind::Identifier | TokenKind::Conjunction | TokenKind::Slash
            ) {
                break;
            }
            candidate.push(' ');
            candidate.push_str(&next_tok.value);
            surface.push(' ');
            surface.push_str(&next_tok.value);
            consumed = j;
            step += 1;
        }

        if variable_cnt == 0 && unit_cnt == 0 {
            return item;
        }
        let (kind, matched) = if variable_cnt < unit_cnt {
            (ItemKind::Unit, unit_match)
        } else {
            (ItemKind::Variable, variable_match)
        };
        if let Some((id, eat, name)) = matched {
            item.set(kind, id);
            item.name = name;
            for _ in 0..eat {
                self.next();
            }
        }
        item
    }

    fn parse_number(&mut self) -> Item {
        let t = self.next();
        let mut item = Item::unknown();
        item.pos = t.pos;
        item.name = t.value.clone();
        if t.kind != TokenKind::Number {
            return item;
        }
        if self.peek(1).kind == TokenKind::Slash && self.peek(2).kind == TokenKind::Number {
            let fraction = format!("{}/{}", t.value, self.peek(2).value);
            item.set(ItemKind::Number, fraction.clone());
            item.name = fraction;
            self.next();
            self.next();
        } else {
            item.set(ItemKind::Number, &t.value);
        }
        item
    }

    fn parse_unit(&mut self) -> Item {
        let t = self.next();
        let mut item = Item::unknown();
        item.pos = t.pos;
        item.name = t.value.clone();
        if t.kind == TokenKind::Unit {
            item.set(ItemKind::Unit, &t.value);
        }
        item
    }

    fn parse_comparison(&mut self) -> Item {
        let mut t = self.next();
        let mut item = Item::unknown();
        item.pos = t.pos;
        item.name = t.value.clone();

        let mut negated = false;
        if t.kind == TokenKind::Negation && self.peek(1).kind != TokenKind::Eof {
            negated = true;
            t = self.next();
        }

        let v = t.value.clone();
        if (v.contains('<') && v.contains('=')) || v.contains('≤') {
            item.set(ItemKind::Comparison, "≤");
        } else if v.contains('<') {
            if self.peek(1).value == "or" {
                self.next();
                if self.peek(1).value == "=" {
                    self.next();
                    item.set(ItemKind::Comparison, "≤");
                }
            } else {
                item.set(ItemKind::Comparison, "<");
            }
        } else if (v.contains('>') && v.contains('=')) || v.contains('≥') {
            item.set(ItemKind::Comparison, "≥");
        } else if v.contains('>') {
            if self.peek(1).value == "or" {
                self.next();
                if self.peek(1).value == "=" {
                    self.next();
                    item.set(ItemKind::Comparison, "≥");
                }
            } else {
                item.set(ItemKind::Comparison, ">");
            }
        } else if t.kind == TokenKind::LessComparison {
            if self.has_equal() {
                item.set(ItemKind::Comparison, "≤");
            } else if self.peek(1).value == "the" {
                // "before the last ...", "under the first ..."
                self.next();
                if matches!(self.peek(1).value.as_str(), "last" | "next" | "past" | "first") {
                    self.next();
                }
                item.set(ItemKind::Comparison, "≤");
            } else {
                item.set(ItemKind::Comparison, "<");
            }
        } else if t.kind == TokenKind::GreaterComparison {
            if self.has_equal() {
                item.set(ItemKind::Comparison, "≥");
            } else {
                item.set(ItemKind::Comparison, ">");
            }
        } else if t.kind == TokenKind::Comparison {
            match v.as_str() {
                "between" => item.set(ItemKind::Range, "between"),
                "at" => {
                    if self.peek(1).value == "least" {
                        self.next();
                        item.set(ItemKind::Comparison, "≥");
                    }
                }
                "within" => {
                    if self.peek(1).value == "the" {
                        self.next();
                        if self.peek(1).value == "last" {
                            self.next();
                        }
                        item.set(ItemKind::Comparison, "≤");
                    }
                }
                _ => {}
            }
        }

        if negated {
            item.negate();
        }
        item
    }

    fn parse_conjunction(&mut self) -> Item {
        let t = self.next();
        let mut item = Item::unknown();
        item.pos = t.pos;
        item.name = t.value.clone();
        if t.kind != TokenKind::Conjunction {
            return item;
        }
        match t.value.as_str() {
            "or" | "and/or" => match self.peek(1).kind {
                // "or less", "or greater [than or equal to]"
                TokenKind::LessComparison => {
                    self.next();
                    self.has_equal();
                    item.set(ItemKind::Comparison, "≤");
                }
                TokenKind::GreaterComparison => {
                    self.next();
                    self.has_equal();
                    item.set(ItemKind::Comparison, "≥");
                }
                _ => item.set(ItemKind::Or, "or"),
            },
            _ => item.set(ItemKind::And, "and"),
        }
        item
    }

    fn parse_slash(&mut self) -> Item {
        let t = self.next();
        let mut item = Item::unknown();
        item.pos = t.pos;
        item.name = t.value.clone();
        if t.kind == TokenKind::Slash {
            item.set(ItemKind::Slash, "/");
        }
        item
    }

    fn parse_dash(&mut self) -> Item {
        let t = self.next();
        let mut item = Item::unknown();
        item.pos = t.pos;
        item.name = t.value.clone();
        if t.kind == TokenKind::Dash {
            item.set(ItemKind::Range, "-");
        }
        item
    }

    fn parse_punctuation(&mut self) -> Item {
        let t = self.next();
        let mut item = Item::unknown();
        item.pos = t.pos;
        item.name = t.value.clone();
        if t.kind == TokenKind::Punctuation {
            item.set(ItemKind::Punctuation, &t.value);
        }
        item
    }

    /// Consume a trailing "than / or / equal [to]" run; true when "equal"
    /// was present (so `less than or equal to` means `≤`).
    fn has_equal(&mut self) -> bool {
        if self.peek(1).value == "than" {
            self.next();
        }
        if self.peek(1).value == "or" {
            self.next();
        }
        let mut equal = false;
        if self.peek(1).value == "equal" {
            self.next();
            equal = true;
            if self.peek(1).value == "to" {
                self.next();
            }
        }
        equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, VariableType};

    fn catalogs() -> (Catalog, Catalog) {
        let mut variables = Catalog::new();
        variables.insert_variable(
            "hba1c",
            &["glycated hemoglobin", "hemoglobin a1c"],
            "What is your HbA1c?",
            VariableType::Numerical,
            &[],
        );
        variables.insert_variable("age", &[], "What is your age?", VariableType::Numerical, &[]);
        variables.insert_variable("bmi", &["body mass index"], "What is your BMI?", VariableType::Numerical, &[]);
        let mut units = Catalog::new();
        units.insert_unit("%", &["％", "percent"]);
        units.insert_unit("years", &["year", "yrs"]);
        units.insert_unit("kg/m2", &[]);
        (variables, units)
    }

    fn parse(input: &str) -> List {
        let (variables, units) = catalogs();
        Parser::new(input, &variables, &units).parse()
    }

    fn segment_kinds(list: &List, idx: usize) -> Vec<ItemKind> {
        list.iter().nth(idx).unwrap().iter().map(|i| i.kind).collect()
    }

    #[test]
    fn comparison_criterion_items() {
        use ItemKind::*;
        let list = parse("hba1c ≥ 9.0% at screening");
        assert_eq!(list.len(), 1);
        // "at screening" yields no comparison and a trailing unknown, both trimmed
        assert_eq!(segment_kinds(&list, 0), vec![Variable, Comparison, Number, Unit]);
        let items: Vec<_> = list.iter().next().unwrap().iter().cloned().collect();
        assert_eq!(items[0].value, "hba1c");
        assert_eq!(items[1].value, "≥");
        assert_eq!(items[2].value, "9.0");
        assert_eq!(items[3].value, "%");
    }

    #[test]
    fn multiword_variable_longest_prefix() {
        let list = parse("glycated hemoglobin ≥ 9.0%");
        let first = list.iter().next().unwrap().iter().next().unwrap().clone();
        assert_eq!(first.kind, ItemKind::Variable);
        assert_eq!(first.value, "hba1c");
        assert_eq!(first.name, "glycated hemoglobin");
        assert_eq!(first.pos, 0);
    }

    #[test]
    fn between_range_items() {
        use ItemKind::*;
        let list = parse("age between 18 and 75 years");
        assert_eq!(segment_kinds(&list, 0), vec![Variable, Range, Number, And, Number, Unit]);
    }

    #[test]
    fn dash_range_items() {
        use ItemKind::*;
        let list = parse("bmi 18.5-30 kg/m2");
        assert_eq!(segment_kinds(&list, 0), vec![Variable, Number, Range, Number, Unit]);
    }

    #[test]
    fn or_less_collapses_to_comparison() {
        use ItemKind::*;
        let list = parse("age 75 years or less");
        let kinds = segment_kinds(&list, 0);
        assert_eq!(kinds, vec![Variable, Number, Unit, Comparison]);
        let items: Vec<_> = list.iter().next().unwrap().iter().cloned().collect();
        assert_eq!(items[3].value, "≤");
    }

    #[test]
    fn negated_comparison_flips() {
        let list = parse("age not greater than 75");
        let items: Vec<_> = list.iter().next().unwrap().iter().cloned().collect();
        assert_eq!(items[1].kind, ItemKind::Comparison);
        assert_eq!(items[1].value, "≤");
    }

    #[test]
    fn less_than_or_equal_phrase() {
        let list = parse("age less than or equal to 75");
        let items: Vec<_> = list.iter().next().unwrap().iter().cloned().collect();
        assert_eq!(items[1].value, "≤");
        assert_eq!(items[2].value, "75");
    }

    #[test]
    fn at_least_phrase() {
        let list = parse("age at least 18");
        let items: Vec<_> = list.iter().next().unwrap().iter().cloned().collect();
        assert_eq!(items[1].value, "≥");
    }

    #[test]
    fn fraction_numbers_merge() {
        let list = parse("age ≥ 3/4");
        let items: Vec<_> = list.iter().next().unwrap().iter().cloned().collect();
        assert_eq!(items[2].kind, ItemKind::Number);
        assert_eq!(items[2].value, "3/4");
    }

    #[test]
    fn single_item_parenthesised_span_is_dropped() {
        let list = parse("hba1c (abbrev) ≥ 9.0%");
        assert_eq!(list.len(), 1);
        use ItemKind::*;
        assert_eq!(segment_kinds(&list, 0), vec![Variable, Comparison, Number, Unit]);
    }

    #[test]
    fn longer_parenthesised_span_becomes_own_segment() {
        let list = parse("hba1c (age under 10) ≥ 9.0%");
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn bare_to_is_a_range() {
        use ItemKind::*;
        let list = parse("age 18 to 75");
        assert_eq!(segment_kinds(&list, 0), vec![Variable, Number, Range, Number]);
    }

    #[test]
    fn fix_missing_variable_inserts_placeholder() {
        let mut list = parse("≥ 9.0%");
        list.fix_missing_variable();
        let items: Vec<_> = list.iter().next().unwrap().iter().cloned().collect();
        assert_eq!(items[0].kind, ItemKind::Variable);
        assert_eq!(items[0].value, IGNORE_VARIABLE);
        assert_eq!(items[1].value, "≥");
    }

    #[test]
    fn fix_missing_variable_leaves_headed_segments_alone() {
        let mut list = parse("age ≥ 18");
        let before = list.clone();
        list.fix_missing_variable();
        assert_eq!(list, before);
    }

    #[test]
    fn trim_drops_edge_punctuation() {
        let list = parse(", age ≥ 18;");
        use ItemKind::*;
        assert_eq!(segment_kinds(&list, 0), vec![Variable, Comparison, Number]);
    }
}
