//! Interpreter: one criterion sentence in, relation families out.
//!
//! Drives the parser and the grammar, then walks the item list to stamp
//! byte spans onto the produced relations. Span offsets come straight from
//! lexer token positions; a span's end is its start plus the surface length.

use crate::catalog::Catalog;
use crate::grammar::{Grammar, Trees};
use crate::parser::{List, Parser};
use crate::relation::Relations;

pub struct Interpreter<'a> {
    variables: &'a Catalog,
    units: &'a Catalog,
    grammar: Grammar,
}

impl<'a> Interpreter<'a> {
    pub fn new(variables: &'a Catalog, units: &'a Catalog) -> Self {
        Interpreter { variables, units, grammar: Grammar::new() }
    }

    pub fn variables(&self) -> &Catalog {
        self.variables
    }

    /// Interpret one lowercased criterion sentence into its disjunctive and
    /// conjunctive relation families.
    pub fn interpret(&self, input: &str) -> (Relations, Relations) {
        let mut list = Parser::new(input, self.variables, self.units).parse();
        list.fix_missing_variable();

        let mut trees = Trees::new();
        for items in list.iter() {
            trees.extend(self.grammar.build_trees(items));
        }
        trees.dedupe();

        let (mut or_relations, mut and_relations) = trees.relations();
        self.strip_unknown_units(&mut or_relations);
        self.strip_unknown_units(&mut and_relations);
        fill_spans(&list, &mut or_relations);
        fill_spans(&list, &mut and_relations);
        (or_relations, and_relations)
    }

    /// A unit binding that is not a key of the unit catalog is dropped from
    /// the relation (the relation itself survives).
    fn strip_unknown_units(&self, relations: &mut Relations) {
        for r in relations.iter_mut() {
            let known = r.unit.as_ref().is_some_and(|u| self.units.get(&u.value).is_some());
            if r.unit.is_some() && !known {
                r.unit = None;
            }
        }
    }
}

/// Stamp byte spans by matching relation values back to items. The first
/// occurrence wins for the variable and the bounds; every occurrence is
/// recorded for the unit.
fn fill_spans(list: &List, relations: &mut Relations) {
    for items in list.iter() {
        for item in items.iter() {
            let end = item.pos + item.name.len();
            for r in relations.iter_mut() {
                if r.name == item.value && r.end == 0 {
                    r.start = item.pos;
                    r.end = end;
                }
                if let Some(lower) = &mut r.lower {
                    if lower.value == item.value && lower.end == 0 {
                        lower.start = item.pos;
                        lower.end = end;
                    }
                }
                if let Some(upper) = &mut r.upper {
                    if upper.value == item.value && upper.end == 0 {
                        upper.start = item.pos;
                        upper.end = end;
                    }
                }
                if let Some(unit) = &mut r.unit {
                    if unit.value == item.value {
                        unit.start.push(item.pos);
                        unit.end.push(end);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, VariableType};
    use crate::relation::Comparator;

    fn catalogs() -> (Catalog, Catalog) {
        let mut variables = Catalog::new();
        variables.insert_variable("hba1c", &["glycated hemoglobin"], "", VariableType::Numerical, &[]);
        variables.insert_variable("age", &[], "", VariableType::Numerical, &[]);
        let mut units = Catalog::new();
        units.insert_unit("%", &["％"]);
        units.insert_unit("years", &["year"]);
        (variables, units)
    }

    #[test]
    fn spans_point_at_the_surface() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let input = "hba1c ≥ 9.0% at screening";
        let (or_rs, and_rs) = interpreter.interpret(input);
        assert!(and_rs.is_empty());
        assert_eq!(or_rs.len(), 1);
        let r = or_rs.iter().next().unwrap();
        assert_eq!(r.name, "hba1c");
        assert_eq!(&input[r.start..r.end], "hba1c");
        let lower = r.lower.as_ref().unwrap();
        assert_eq!(&input[lower.start..lower.end], "9.0");
        let unit = r.unit.as_ref().unwrap();
        assert_eq!(unit.start.len(), 1);
        assert_eq!(&input[unit.start[0]..unit.end[0]], "%");
    }

    #[test]
    fn disjunction_lands_in_or_family() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let (or_rs, and_rs) = interpreter.interpret("age < 18 or age > 65");
        assert_eq!(or_rs.len(), 2);
        assert!(and_rs.is_empty());
    }

    #[test]
    fn conjunction_lands_in_and_family() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let (or_rs, and_rs) = interpreter.interpret("age > 18 and hba1c < 7");
        assert!(or_rs.is_empty());
        assert_eq!(and_rs.len(), 2);
    }

    #[test]
    fn numerically_led_fragment_is_headed_by_placeholder() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let (or_rs, _) = interpreter.interpret("≥ 9.0%");
        assert_eq!(or_rs.len(), 1);
        let r = or_rs.iter().next().unwrap();
        assert!(!r.is_valid());
    }

    #[test]
    fn bound_spans_prefer_first_occurrence() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let input = "age between 18 and 18 years";
        let (or_rs, _) = interpreter.interpret(input);
        let r = or_rs.iter().next().unwrap();
        let lower = r.lower.as_ref().unwrap();
        let upper = r.upper.as_ref().unwrap();
        assert_eq!(lower.start, 12);
        // both bounds carry the same literal; both resolve to its first span
        assert_eq!(upper.start, lower.start);
    }

    #[test]
    fn comparator_for_simple_numeric() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let (or_rs, _) = interpreter.interpret("hba1c ≥ 9.0%");
        assert_eq!(or_rs.iter().next().unwrap().comparator, Comparator::GreaterEq);
    }
}
