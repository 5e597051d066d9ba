//! Match-condition validation results and fuzzy suggestions

use fa_core::path::type_name;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum number of similar values offered with an error
pub const MAX_SIMILAR: usize = 5;

/// Largest edit distance still considered "similar"
const MAX_DISTANCE: usize = 3;

/// One offending field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub value: Value,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub similar_values: Vec<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, value: Value, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value,
            error: error.into(),
            suggestion: None,
            similar_values: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach similar values, suggesting the closest one
    pub fn with_similar(mut self, similar: Vec<String>) -> Self {
        if self.suggestion.is_none() {
            self.suggestion = similar.first().map(|s| format!("Did you mean '{s}'?"));
        }
        self.similar_values = similar;
        self
    }
}

/// Outcome of validating a set of match conditions
///
/// Errors make the result invalid; warnings never do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ValidationError>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Fold in another result; entries already present are not repeated
    pub fn merge(&mut self, other: ValidationResult) {
        self.valid &= other.valid;
        for error in other.errors {
            if !self.errors.contains(&error) {
                self.add_error(error);
            }
        }
        for warning in other.warnings {
            if !self.warnings.contains(&warning) {
                self.warnings.push(warning);
            }
        }
    }
}

/// Source-independent type checks on match conditions
pub fn check_structure(conditions: &Map<String, Value>) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if let Some(value) = conditions.get("entity_id") {
        if !value.is_string() {
            let mut error = ValidationError::new(
                "entity_id",
                value.clone(),
                format!("entity_id must be a string, got {}", type_name(value)),
            );
            if value.is_number() {
                error = error
                    .with_suggestion("Entity ids look like 'domain.object_id', e.g. 'person.alex'");
            }
            result.add_error(error);
        }
    }

    for (field, value) in conditions {
        if field.is_empty() {
            result.add_error(ValidationError::new(
                field.clone(),
                value.clone(),
                "condition keys cannot be empty",
            ));
        }
    }

    result
}

/// Levenshtein edit distance over chars
pub fn levenshtein(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut prev: Vec<usize> = (0..=len2).collect();
    let mut curr = vec![0; len2 + 1];

    for (i, c1) in s1.chars().enumerate() {
        curr[0] = i + 1;
        for (j, c2) in s2.chars().enumerate() {
            let cost = usize::from(c1 != c2);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[len2]
}

fn domain_of(id: &str) -> Option<&str> {
    id.split_once('.').map(|(domain, _)| domain)
}

/// Candidates similar to `target`, best first
///
/// Substring matches come first, then candidates within a small edit
/// distance. Within each group candidates sharing the target's domain
/// rank ahead of the rest.
pub fn find_similar<'a, I>(target: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = target.to_lowercase();
    let domain = domain_of(&needle).map(str::to_string);

    let mut substring: Vec<(bool, usize, &str)> = Vec::new();
    let mut close: Vec<(bool, usize, &str)> = Vec::new();

    for candidate in candidates {
        let lowered = candidate.to_lowercase();
        if lowered == needle {
            continue;
        }
        let other_domain = domain.as_deref() != domain_of(&lowered);

        if lowered.contains(&needle) || needle.contains(&lowered) {
            substring.push((other_domain, lowered.len().abs_diff(needle.len()), candidate));
            continue;
        }

        let distance = levenshtein(&needle, &lowered);
        if distance <= MAX_DISTANCE {
            close.push((other_domain, distance, candidate));
        }
    }

    substring.sort();
    close.sort();
    substring
        .into_iter()
        .chain(close)
        .map(|(_, _, candidate)| candidate.to_string())
        .take(MAX_SIMILAR)
        .collect()
}
