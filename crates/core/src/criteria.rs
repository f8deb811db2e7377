//! Criterion extraction and segmentation.
//!
//! Takes a raw eligibility blob and produces two ordered lists of trimmed
//! criterion sentences: inclusions and exclusions. Blocks are located by
//! anchored header patterns, split on blank lines, and bullet runs under a
//! "the following:" style header are rewritten by prepending the header
//! prose to each bullet.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::relation::{Relation, Relations};
use crate::text::{strip_boilerplate, trim_criterion};

static RE_MATCH_INCLUSIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)inclusions?(?: *:| criteria(?:[^:\n]*?:| *\n))(.*?)(?:[^\n]*\bexclusions?(?: *:| criteria(?:[^:\n]*?:| *\n))|$)",
    )
    .unwrap()
});

static RE_MATCH_EXCLUSIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)exclusions?(?: *:| criteria(?:[^:\n]*?:| *\n))(.*?)(?:[^\n]*\binclusions?(?: *:| criteria(?:[^:\n]*?:| *\n))|$)",
    )
    .unwrap()
});

static RE_MATCH_TABS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"the following(\s+criteria)?(\s*:)?\s*\n\s*(-|\d+\.|[a-z]\s)\s*").unwrap());
static RE_MATCH_TAB_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"the following").unwrap());
static RE_MATCH_BULLET_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(-|\d+\.|[a-z]\s)\s*").unwrap());

/// Extract the inclusion criteria blocks from an eligibility blob.
pub fn extract_inclusion_criteria(s: &str) -> Vec<String> {
    extract_criteria(s, &RE_MATCH_INCLUSIONS)
}

/// Extract the exclusion criteria blocks from an eligibility blob.
pub fn extract_exclusion_criteria(s: &str) -> Vec<String> {
    extract_criteria(s, &RE_MATCH_EXCLUSIONS)
}

fn extract_criteria(s: &str, re: &Regex) -> Vec<String> {
    re.captures_iter(s)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Split one criteria block into individual criterion paragraphs.
pub fn split_block(s: &str) -> Vec<String> {
    let rules: Vec<&str> = s.split("\n\n").collect();
    if RE_MATCH_TABS.find_iter(s).count() == 0 {
        return rules.into_iter().map(str::to_string).collect();
    }

    // Bulleted continuations under a "the following:" header get the header
    // prose prepended; non-bullet paragraphs break the run.
    let mut out = Vec::new();
    let mut header = String::new();
    let mut found_tab = false;
    for rule in rules {
        let rewritten = if found_tab && RE_MATCH_BULLET_LINE.is_match(rule) {
            format!("{} {}", header, trim_criterion(rule))
        } else if RE_MATCH_TAB_LINE.is_match(rule) {
            found_tab = true;
            header = rule.to_string();
            String::new()
        } else {
            found_tab = false;
            header.clear();
            rule.to_string()
        };
        if !rewritten.is_empty() {
            out.push(rewritten);
        }
    }
    out
}

/// Produce the ordered `(inclusions, exclusions)` sentence lists for an
/// eligibility blob. Boilerplate lines are removed first; every sentence is
/// bullet-trimmed and empties are dropped.
pub fn split_criteria(blob: &str) -> (Vec<String>, Vec<String>) {
    let normalized = strip_boilerplate(blob);

    let collect = |blocks: Vec<String>| -> Vec<String> {
        blocks
            .iter()
            .flat_map(|block| split_block(block))
            .map(|c| trim_criterion(&c))
            .filter(|c| !c.is_empty())
            .collect()
    };

    let inclusions = collect(extract_inclusion_criteria(&normalized));
    let exclusions = collect(extract_exclusion_criteria(&normalized));
    (inclusions, exclusions)
}

/// The relations extracted from one criterion sentence. Relations sharing a
/// `cluster_id` came from the same sentence.
#[derive(Debug, Clone)]
pub struct Criterion {
    pub source_text: String,
    pub cluster_id: usize,
    pub score: f64,
    pub relations: Relations,
}

/// One emitted record: a criterion sentence with (at most) one of its
/// relations. Relations from the same sentence share `criterion_index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCriterion {
    pub eligibility_type: String,
    pub variable_type: String,
    pub criterion_index: usize,
    pub criterion: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<Relation>,
}
