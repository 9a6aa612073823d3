//! Classification of live scan observations against session state.
//!
//! The camera pipeline may observe the same physical code dozens of times a
//! second. The reconciler holds the authoritative working copy of the
//! session for the duration of a scan and guarantees that a code transitions
//! not-found → found exactly once, no matter how often it is re-observed.

use std::collections::HashSet;
use std::time::Instant;

use crate::models::Session;
use crate::normalize::normalize;

/// A single decoded frame from the camera pipeline. Never persisted.
#[derive(Debug, Clone)]
pub struct Observation {
    pub raw_text: String,
    pub observed_at: Instant,
}

impl Observation {
    pub fn new(raw_text: impl Into<String>, observed_at: Instant) -> Self {
        Self {
            raw_text: raw_text.into(),
            observed_at,
        }
    }
}

/// Outcome of reconciling one observation, carrying the canonical code and
/// the originating frame timestamp. Consumed by UI feedback only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    AlreadyFound { code: String, observed_at: Instant },
    NewlyFound { code: String, observed_at: Instant },
    NotExpected { code: String, observed_at: Instant },
}

impl Classification {
    pub fn code(&self) -> &str {
        match self {
            Classification::AlreadyFound { code, .. }
            | Classification::NewlyFound { code, .. }
            | Classification::NotExpected { code, .. } => code,
        }
    }

    pub fn observed_at(&self) -> Instant {
        match self {
            Classification::AlreadyFound { observed_at, .. }
            | Classification::NewlyFound { observed_at, .. }
            | Classification::NotExpected { observed_at, .. } => *observed_at,
        }
    }
}

/// Working copy of a session for one active scan, with hash-set indices so
/// the per-frame membership checks stay O(1). The scan loop owns exactly one
/// reconciler; no other writer touches the session while it is active.
pub struct Reconciler {
    session: Session,
    expected: HashSet<String>,
    found: HashSet<String>,
}

impl Reconciler {
    pub fn new(session: Session) -> Self {
        let expected = session.expected_codes.iter().cloned().collect();
        let found = session.found_codes.iter().cloned().collect();
        Self {
            session,
            expected,
            found,
        }
    }

    /// Classifies one observation. Pure in-memory computation: never
    /// suspends, so it keeps pace with camera frame rate. On `NewlyFound`
    /// the working copy advances synchronously, before the next observation
    /// can be classified; repeats of a found code are a membership check
    /// and nothing else.
    pub fn classify(&mut self, observation: &Observation) -> Classification {
        let code = normalize(&observation.raw_text);
        let observed_at = observation.observed_at;

        if !self.expected.contains(&code) {
            return Classification::NotExpected { code, observed_at };
        }
        if self.found.contains(&code) {
            return Classification::AlreadyFound { code, observed_at };
        }

        self.found.insert(code.clone());
        self.session.push_found(code.clone());
        Classification::NewlyFound { code, observed_at }
    }

    /// Latest session value, reflecting every classification so far.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expected: &[&str]) -> Session {
        Session::new("test", expected.iter().map(|s| s.to_string()).collect())
    }

    fn observe(reconciler: &mut Reconciler, raw: &str) -> Classification {
        reconciler.classify(&Observation::new(raw, Instant::now()))
    }

    #[test]
    fn noisy_repeat_then_new_code_classifies_in_order() {
        let mut reconciler = Reconciler::new(session(&["A", "B", "C"]));

        assert!(matches!(
            observe(&mut reconciler, "A\n"),
            Classification::NewlyFound { ref code, .. } if code == "A"
        ));
        assert!(matches!(
            observe(&mut reconciler, "A"),
            Classification::AlreadyFound { ref code, .. } if code == "A"
        ));
        assert!(matches!(
            observe(&mut reconciler, "B"),
            Classification::NewlyFound { ref code, .. } if code == "B"
        ));

        assert_eq!(reconciler.session().found_codes, vec!["A", "B"]);
    }

    #[test]
    fn unexpected_codes_never_mutate_the_session() {
        let mut reconciler = Reconciler::new(session(&["A"]));
        let before = reconciler.session().clone();

        assert!(matches!(
            observe(&mut reconciler, "Z"),
            Classification::NotExpected { ref code, .. } if code == "Z"
        ));
        assert_eq!(reconciler.session().found_codes, before.found_codes);
        assert_eq!(reconciler.session().updated_at, before.updated_at);
    }

    #[test]
    fn repeats_of_a_found_code_are_idempotent() {
        let mut reconciler = Reconciler::new(session(&["A", "B"]));
        observe(&mut reconciler, "A");
        let after_first = reconciler.session().clone();

        for _ in 0..50 {
            assert!(matches!(
                observe(&mut reconciler, "A"),
                Classification::AlreadyFound { .. }
            ));
        }
        assert_eq!(reconciler.session().found_codes, after_first.found_codes);
        assert_eq!(reconciler.session().updated_at, after_first.updated_at);
    }

    #[test]
    fn no_code_un_finds_itself() {
        let mut reconciler = Reconciler::new(session(&["A", "B"]));
        observe(&mut reconciler, "A");
        observe(&mut reconciler, "B");
        observe(&mut reconciler, "A");
        observe(&mut reconciler, "Z");
        assert_eq!(reconciler.session().found_codes, vec!["A", "B"]);
    }

    #[test]
    fn found_stays_subset_of_expected() {
        let mut reconciler = Reconciler::new(session(&["A", "B"]));
        for raw in ["A", "X", "B", "Y", "A\r\n", "B "] {
            observe(&mut reconciler, raw);
        }
        let state = reconciler.into_session();
        for code in &state.found_codes {
            assert!(state.expected_codes.contains(code));
        }
    }

    #[test]
    fn resumes_from_persisted_found_codes() {
        let mut persisted = session(&["A", "B"]);
        persisted.found_codes.push("A".to_string());

        let mut reconciler = Reconciler::new(persisted);
        assert!(matches!(
            observe(&mut reconciler, "A"),
            Classification::AlreadyFound { .. }
        ));
        assert!(matches!(
            observe(&mut reconciler, "B"),
            Classification::NewlyFound { .. }
        ));
    }

    #[test]
    fn empty_expected_set_classifies_everything_not_expected() {
        let mut reconciler = Reconciler::new(session(&[]));
        assert!(matches!(
            observe(&mut reconciler, "A"),
            Classification::NotExpected { .. }
        ));
    }
}
