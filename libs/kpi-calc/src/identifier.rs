//! Metric identifier extraction
//!
//! Scans a formula with the same word rules as the tokenizer but never fails:
//! characters that are not part of a word are skipped, so identifiers can be
//! listed even for formulas that do not parse.

use std::collections::BTreeSet;

use kpi_model::MetricId;

use crate::lexer::{classify_word, is_word_char, Word};

/// Referenced metric identifiers, deduplicated and sorted
///
/// ```
/// use kpi_calc::extract_identifiers;
///
/// let ids = extract_identifiers(
///     "(1 - 中压拓扑.拓扑不一致.数量 / 中压拓扑.配变统计.配变总数) * 100",
/// );
/// assert_eq!(ids.len(), 2);
/// ```
pub fn extract_identifiers(formula: &str) -> BTreeSet<MetricId> {
    let mut ids = BTreeSet::new();
    let mut word = String::new();

    for c in formula.chars().chain(std::iter::once(' ')) {
        if is_word_char(c) {
            word.push(c);
            continue;
        }
        if !word.is_empty() {
            if let Some(Word::Identifier(id)) = classify_word(&word) {
                ids.insert(id);
            }
            word.clear();
        }
    }

    ids
}
