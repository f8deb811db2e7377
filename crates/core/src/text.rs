//! Text normalisation helpers shared by the criterion splitter.

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading bullets and numberings, e.g. `- `, `3. `, `- 2 `.
static RE_TRIMMER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*-\s*)?(\s*\d+\.?\s*)?").unwrap());

/// Non-informative boilerplate lines removed before block extraction.
static RE_DELETE_CRITERION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([^\n]+meet inclusion criteria|[^\n]*inclusion/exclusion criteria)\W? *(\n|$)")
        .unwrap()
});

/// Collapse any run of whitespace to a single space and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a criterion by removing leading bullets and numberings,
/// collapsing whitespace, and trimming stray punctuation.
pub fn trim_criterion(s: &str) -> String {
    let s = RE_TRIMMER.replace(s, "");
    let s = normalize_whitespace(&s);
    s.trim_matches(|c| matches!(c, ' ' | ',' | '.' | ';' | ':' | '/' | '"')).to_string()
}

/// Delete "does not meet inclusion criteria" style lines from an
/// eligibility blob. These carry no parseable condition.
pub fn strip_boilerplate(s: &str) -> String {
    RE_DELETE_CRITERION.replace_all(s, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_runs_collapse() {
        assert_eq!(normalize_whitespace("  a \t b\n\nc "), "a b c");
    }

    #[test]
    fn bullets_and_numberings_are_trimmed() {
        assert_eq!(trim_criterion("- 1. age over 18"), "age over 18");
        assert_eq!(trim_criterion("  - hba1c >= 9%;"), "hba1c >= 9%");
        assert_eq!(trim_criterion("3. bmi 18.5-30 kg/m2."), "bmi 18.5-30 kg/m2");
    }

    #[test]
    fn boilerplate_lines_are_deleted() {
        let blob = "Does not meet inclusion criteria.\nAge over 18\n";
        let out = strip_boilerplate(blob);
        assert!(!out.to_lowercase().contains("meet inclusion"));
        assert!(out.contains("Age over 18"));
    }

    #[test]
    fn inclusion_exclusion_boilerplate_is_deleted() {
        let blob = "See inclusion/exclusion criteria.\nHbA1c >= 9%";
        let out = strip_boilerplate(blob);
        assert!(out.contains("HbA1c"));
        assert!(!out.contains("inclusion/exclusion"));
    }
}
