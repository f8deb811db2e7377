//! Per-study orchestration.
//!
//! Drives splitting, interpretation, post-processing, and branch selection
//! for every criterion of a study, then lowers the surviving relations into
//! the emitted `ParsedCriterion` records.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::criteria::{split_criteria, Criterion, ParsedCriterion};
use crate::interpret::Interpreter;
use crate::relation::Relations;

/// Raw ingested study record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Study {
    #[serde(default)]
    pub study_id: String,
    #[serde(default)]
    pub study_name: String,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub eligibility_criteria: String,
}

/// Parsed output for one study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedStudy {
    pub study_id: String,
    pub criteria_count: usize,
    pub parsed_criteria: Vec<ParsedCriterion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityKind {
    Inclusion,
    Exclusion,
}

impl EligibilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EligibilityKind::Inclusion => "inclusion",
            EligibilityKind::Exclusion => "exclusion",
        }
    }
}

/// Which relation family to prefer when both parsed non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SelectionPolicy {
    #[serde(rename = "and")]
    AndPreferred,
    #[serde(rename = "or")]
    OrPreferred,
}

impl SelectionPolicy {
    fn select(&self, or_relations: Relations, and_relations: Relations) -> Relations {
        match self {
            SelectionPolicy::AndPreferred => {
                if !and_relations.is_empty() {
                    and_relations
                } else {
                    or_relations
                }
            }
            SelectionPolicy::OrPreferred => {
                if !or_relations.is_empty() {
                    or_relations
                } else {
                    and_relations
                }
            }
        }
    }
}

/// Branch-selection configuration. Inclusion criteria prefer the tighter
/// conjunctive group; exclusion criteria prefer the disjunctive group,
/// which composes correctly under negation.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub inclusion_policy: SelectionPolicy,
    pub exclusion_policy: SelectionPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            inclusion_policy: SelectionPolicy::AndPreferred,
            exclusion_policy: SelectionPolicy::OrPreferred,
        }
    }
}

/// Parse one study's eligibility text into emitted records.
pub fn parse_study(
    study: &Study,
    interpreter: &Interpreter<'_>,
    options: &PipelineOptions,
) -> ParsedStudy {
    let (inclusions, exclusions) = split_criteria(&study.eligibility_criteria);
    let criteria_count = inclusions.len() + exclusions.len();

    let inclusion_criteria =
        interpret_criteria(&inclusions, EligibilityKind::Inclusion, interpreter, options);
    let exclusion_criteria =
        interpret_criteria(&exclusions, EligibilityKind::Exclusion, interpreter, options);

    let mut parsed_criteria = Vec::new();
    for criterion in &inclusion_criteria {
        emit_records(EligibilityKind::Inclusion, criterion, interpreter, &mut parsed_criteria);
    }
    for criterion in &exclusion_criteria {
        emit_records(EligibilityKind::Exclusion, criterion, interpreter, &mut parsed_criteria);
    }

    ParsedStudy { study_id: study.study_id.clone(), criteria_count, parsed_criteria }
}

fn interpret_criteria(
    sentences: &[String],
    kind: EligibilityKind,
    interpreter: &Interpreter<'_>,
    options: &PipelineOptions,
) -> Vec<Criterion> {
    let mut out = Vec::new();
    for (index, sentence) in sentences.iter().enumerate() {
        let lowercase = sentence.to_lowercase();
        let (mut or_relations, mut and_relations) = interpreter.interpret(&lowercase);
        or_relations.process();
        and_relations.process();

        let policy = match kind {
            EligibilityKind::Inclusion => options.inclusion_policy,
            EligibilityKind::Exclusion => {
                or_relations.negate();
                and_relations.negate();
                options.exclusion_policy
            }
        };
        let mut relations = policy.select(or_relations, and_relations);
        relations.transform(interpreter.variables());

        out.push(Criterion {
            source_text: sentence.clone(),
            cluster_id: index,
            score: relations.min_score(),
            relations,
        });
    }
    out
}

/// Lower one criterion into emitted records: one per valid relation, or a
/// single relation-less record so the source sentence is not lost.
fn emit_records(
    kind: EligibilityKind,
    criterion: &Criterion,
    interpreter: &Interpreter<'_>,
    out: &mut Vec<ParsedCriterion>,
) {
    let variables = interpreter.variables();
    let valid: Vec<_> = criterion.relations.iter().filter(|r| r.is_valid()).collect();
    if valid.is_empty() {
        out.push(ParsedCriterion {
            eligibility_type: kind.as_str().to_string(),
            variable_type: String::new(),
            criterion_index: criterion.cluster_id,
            criterion: criterion.source_text.clone(),
            question: String::new(),
            relation: None,
        });
        return;
    }
    for relation in valid {
        let variable_type = variables
            .variable_type(&relation.name)
            .map(|t| t.as_str().to_string())
            .unwrap_or_default();
        let question = variables.question(&relation.name).unwrap_or_default().to_string();
        out.push(ParsedCriterion {
            eligibility_type: kind.as_str().to_string(),
            variable_type,
            criterion_index: criterion.cluster_id,
            criterion: criterion.source_text.clone(),
            question,
            relation: Some(relation.clone()),
        });
    }
}

/// Parse a whole batch, logging run statistics at the end.
pub fn parse_studies(
    studies: &[Study],
    interpreter: &Interpreter<'_>,
    options: &PipelineOptions,
) -> Vec<ParsedStudy> {
    let mut parsed = Vec::with_capacity(studies.len());
    let mut criteria_count = 0usize;
    let mut relation_count = 0usize;
    let mut parsed_criteria_count = 0usize;

    for study in studies {
        let result = parse_study(study, interpreter, options);
        criteria_count += result.criteria_count;
        relation_count += result.parsed_criteria.iter().filter(|c| c.relation.is_some()).count();
        let mut seen: Vec<(&str, usize)> = Vec::new();
        for record in result.parsed_criteria.iter().filter(|c| c.relation.is_some()) {
            let key = (record.eligibility_type.as_str(), record.criterion_index);
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        parsed_criteria_count += seen.len();
        parsed.push(result);
    }

    let ratio = if criteria_count > 0 {
        100.0 * relation_count as f64 / criteria_count as f64
    } else {
        0.0
    };
    info!(
        studies = studies.len(),
        criteria = criteria_count,
        parsed_criteria = parsed_criteria_count,
        relations = relation_count,
        relations_per_criteria_pct = ratio,
        "batch complete"
    );

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, VariableType};
    use crate::relation::Comparator;

    fn catalogs() -> (Catalog, Catalog) {
        let mut variables = Catalog::new();
        variables.insert_variable("hba1c", &[], "What is your HbA1c?", VariableType::Numerical, &[]);
        variables.insert_variable("age", &[], "What is your age?", VariableType::Numerical, &[]);
        let mut units = Catalog::new();
        units.insert_unit("%", &["％"]);
        units.insert_unit("years", &["year"]);
        (variables, units)
    }

    fn study(blob: &str) -> Study {
        Study {
            study_id: "NCT000".into(),
            study_name: "test".into(),
            conditions: vec![],
            eligibility_criteria: blob.into(),
        }
    }

    #[test]
    fn criteria_count_covers_both_sides() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let parsed = parse_study(
            &study("Inclusion Criteria:\n\n- age over 18\n\nExclusion Criteria:\n\n- hba1c ≥ 9.0%"),
            &interpreter,
            &PipelineOptions::default(),
        );
        assert_eq!(parsed.criteria_count, 2);
    }

    #[test]
    fn exclusion_relations_are_negated() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let parsed = parse_study(
            &study("Exclusion Criteria:\n\n- hba1c ≥ 9.0%"),
            &interpreter,
            &PipelineOptions::default(),
        );
        let record = parsed
            .parsed_criteria
            .iter()
            .find(|c| c.relation.is_some())
            .expect("one parsed record");
        let relation = record.relation.as_ref().unwrap();
        assert_eq!(relation.comparator, Comparator::Less);
        assert!(relation.negated);
        assert_eq!(record.eligibility_type, "exclusion");
        assert_eq!(record.variable_type, "numerical");
        assert_eq!(record.question, "What is your HbA1c?");
    }

    #[test]
    fn unparsed_criterion_still_emits_a_record() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let parsed = parse_study(
            &study("Inclusion Criteria:\n\n- history of pancreatitis"),
            &interpreter,
            &PipelineOptions::default(),
        );
        assert_eq!(parsed.parsed_criteria.len(), 1);
        let record = &parsed.parsed_criteria[0];
        assert!(record.relation.is_none());
        assert_eq!(record.criterion, "history of pancreatitis");
    }

    #[test]
    fn indices_restart_per_eligibility_side() {
        let (variables, units) = catalogs();
        let interpreter = Interpreter::new(&variables, &units);
        let parsed = parse_study(
            &study(
                "Inclusion Criteria:\n\n- age over 18\n\n- age under 80\n\nExclusion Criteria:\n\n- hba1c ≥ 9.0%",
            ),
            &interpreter,
            &PipelineOptions::default(),
        );
        let exclusion = parsed
            .parsed_criteria
            .iter()
            .find(|c| c.eligibility_type == "exclusion")
            .unwrap();
        assert_eq!(exclusion.criterion_index, 0);
    }
}
