//! Read allowlist consulted by the LMS-side `LMSGetValue` proxy.
//!
//! Element names are matched by their wildcard pattern form: every numeric
//! index segment collapses to `*` before lookup, so one
//! `cmi.objectives.*.id` entry covers every objective index. Names outside
//! the set are refused locally with an empty string and never reach the LMS.

use std::collections::HashSet;

use crate::cmi::path;

/// SCORM 1.2 element patterns readable through the relay.
///
/// This is the fixed production table. Two long-standing transcription
/// defects are repaired here: `cmi.core.score._children` had lost the dot
/// before `_children`, and `cmi.objectives.*.score._children` carried a
/// trailing space, so both were unmatchable and harvested as empty scalars.
pub const DEFAULT_READ_PATTERNS: &[&str] = &[
    "cmi.core._children",
    "cmi.core.student_id",
    "cmi.core.student_name",
    "cmi.core.lesson_location",
    "cmi.core.credit",
    "cmi.core.lesson_status",
    "cmi.core.entry",
    "cmi.core.score._children",
    "cmi.core.score.raw",
    "cmi.core.score.max",
    "cmi.core.score.min",
    "cmi.core.total_time",
    "cmi.core.lesson_mode",
    "cmi.suspend_data",
    "cmi.launch_data",
    "cmi.comments",
    "cmi.comments_from_lms",
    "cmi.objectives._children",
    "cmi.objectives._count",
    "cmi.objectives.*.id",
    "cmi.objectives.*.score._children",
    "cmi.objectives.*.score.raw",
    "cmi.objectives.*.score.max",
    "cmi.objectives.*.score.min",
    "cmi.objectives.*.status",
    "cmi.student_data._children",
    "cmi.student_data.mastery_score",
    "cmi.student_data.max_time_allowed",
    "cmi.student_data.time_limit_action",
    "cmi.student_preference._children",
    "cmi.student_preference.audio",
    "cmi.student_preference.language",
    "cmi.student_preference.speed",
    "cmi.student_preference.text",
    "cmi.interactions._children",
    "cmi.interactions._count",
    "cmi.interactions.*.objectives._count",
    "cmi.interactions.*.time",
    "cmi.interactions.*.correct_responses._count",
];

/// Set of readable element patterns, wildcard form.
#[derive(Debug, Clone)]
pub struct ReadAllowlist {
    patterns: HashSet<String>,
}

impl ReadAllowlist {
    /// The production SCORM 1.2 table.
    pub fn scorm12() -> Self {
        Self::from_patterns(DEFAULT_READ_PATTERNS.iter().copied())
    }

    /// Build from arbitrary patterns. Entries are trimmed and empties are
    /// skipped, so a table loaded from config cannot reintroduce the
    /// unmatchable-entry class of defect.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .filter_map(|p| {
                let trimmed = p.as_ref().trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_owned())
                }
            })
            .collect();
        Self { patterns }
    }

    /// Whether `element` (a concrete name, indices included) is readable.
    pub fn allows(&self, element: &str) -> bool {
        self.patterns.contains(&path::wildcard_pattern(element))
    }

    /// Number of patterns in the table.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no pattern is present (nothing is readable).
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for ReadAllowlist {
    fn default() -> Self {
        Self::scorm12()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_match_exactly() {
        let list = ReadAllowlist::scorm12();
        assert!(list.allows("cmi.core.student_id"));
        assert!(list.allows("cmi.suspend_data"));
        assert!(!list.allows("cmi.core.exit"));
        assert!(!list.allows("cmi.core.session_time"));
    }

    #[test]
    fn test_indexed_names_match_via_wildcard() {
        let list = ReadAllowlist::scorm12();
        assert!(list.allows("cmi.objectives.0.id"));
        assert!(list.allows("cmi.objectives.17.score.raw"));
        assert!(list.allows("cmi.interactions.3.correct_responses._count"));
        // Pattern exists for time but not for result
        assert!(list.allows("cmi.interactions.3.time"));
        assert!(!list.allows("cmi.interactions.3.result"));
    }

    #[test]
    fn test_repaired_entries_are_reachable() {
        let list = ReadAllowlist::scorm12();
        assert!(list.allows("cmi.core.score._children"));
        assert!(list.allows("cmi.objectives.5.score._children"));
    }

    #[test]
    fn test_from_patterns_trims_and_drops_empties() {
        let list = ReadAllowlist::from_patterns(["  cmi.core.entry ", "", "   "]);
        assert_eq!(list.len(), 1);
        assert!(list.allows("cmi.core.entry"));
    }

    #[test]
    fn test_default_table_size() {
        assert_eq!(ReadAllowlist::scorm12().len(), 39);
    }
}
