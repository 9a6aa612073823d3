use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::normalize::normalize;

/// A checklist session: the codes a guide document says should exist, and
/// the subset confirmed present by live scanning.
///
/// `expected_codes` is unique by canonical key and keeps first-discovery
/// order for display; `found_codes` keeps the order codes were confirmed.
/// Every operation preserves found ⊆ expected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub expected_codes: Vec<String>,
    pub found_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session from freshly extracted codes. The expected list is
    /// normalized and deduplicated (first occurrence wins); an empty list is
    /// a valid, zero-progress session.
    pub fn new(name: impl Into<String>, expected_codes: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            expected_codes: dedup_normalized(expected_codes),
            found_codes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the expected set wholesale, pruning the found set to the
    /// intersection. Returns the new value plus how many previously found
    /// codes were dropped, so the caller can confirm before committing.
    /// No side effects; persisting the result is the caller's job.
    pub fn replace_expected(&self, new_expected: Vec<String>) -> (Session, usize) {
        let expected = dedup_normalized(new_expected);
        let found: Vec<String> = self
            .found_codes
            .iter()
            .filter(|code| expected.contains(code))
            .cloned()
            .collect();
        let dropped = self.found_codes.len() - found.len();

        let session = Session {
            id: self.id.clone(),
            name: self.name.clone(),
            expected_codes: expected,
            found_codes: found,
            created_at: self.created_at,
            updated_at: Utc::now(),
        };
        (session, dropped)
    }

    /// Fraction of expected codes confirmed found; an empty expected set
    /// reads as 0, not an error.
    pub fn progress(&self) -> f64 {
        if self.expected_codes.is_empty() {
            0.0
        } else {
            self.found_codes.len() as f64 / self.expected_codes.len() as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.expected_codes.is_empty() && self.found_codes.len() == self.expected_codes.len()
    }

    /// Appends a code to the found list and refreshes `updated_at`.
    /// Callers must have checked membership; the reconciler is the only
    /// mutation path during a scan.
    pub(crate) fn push_found(&mut self, code: String) {
        self.found_codes.push(code);
        self.updated_at = Utc::now();
    }
}

fn dedup_normalized(codes: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(codes.len());
    for raw in codes {
        let code = normalize(&raw);
        if !code.is_empty() && !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_session_dedups_and_normalizes_expected() {
        let session = Session::new("boxes", strings(&["A\n", "B", "A", "", "C\r"]));
        assert_eq!(session.expected_codes, strings(&["A", "B", "C"]));
        assert!(session.found_codes.is_empty());
    }

    #[test]
    fn empty_expected_set_is_valid() {
        let session = Session::new("empty", Vec::new());
        assert!(session.expected_codes.is_empty());
        assert_eq!(session.progress(), 0.0);
        assert!(!session.is_complete());
    }

    #[test]
    fn replace_expected_prunes_found_and_reports_dropped() {
        let mut session = Session::new("shelf", strings(&["A", "B", "C"]));
        session.push_found("A".to_string());
        session.push_found("B".to_string());

        let (updated, dropped) = session.replace_expected(strings(&["B", "C"]));
        assert_eq!(updated.expected_codes, strings(&["B", "C"]));
        assert_eq!(updated.found_codes, strings(&["B"]));
        assert_eq!(dropped, 1);
        assert_eq!(updated.id, session.id);
    }

    #[test]
    fn replace_expected_keeps_all_found_when_still_expected() {
        let mut session = Session::new("shelf", strings(&["A", "B"]));
        session.push_found("A".to_string());

        let (updated, dropped) = session.replace_expected(strings(&["A", "B", "C"]));
        assert_eq!(updated.found_codes, strings(&["A"]));
        assert_eq!(dropped, 0);
    }

    #[test]
    fn progress_tracks_found_over_expected() {
        let mut session = Session::new("shelf", strings(&["A", "B", "C", "D"]));
        assert_eq!(session.progress(), 0.0);
        session.push_found("A".to_string());
        assert_eq!(session.progress(), 0.25);
        session.push_found("B".to_string());
        session.push_found("C".to_string());
        session.push_found("D".to_string());
        assert_eq!(session.progress(), 1.0);
        assert!(session.is_complete());
    }

    #[test]
    fn found_stays_subset_of_expected_through_replace() {
        let mut session = Session::new("shelf", strings(&["A", "B", "C"]));
        session.push_found("C".to_string());
        session.push_found("A".to_string());

        let (updated, _) = session.replace_expected(strings(&["X", "Y"]));
        for code in &updated.found_codes {
            assert!(updated.expected_codes.contains(code));
        }
        assert!(updated.found_codes.is_empty());
    }
}
