//! Attendance decision policy.
//!
//! Takes a classifier verdict, consults the persistence collaborator,
//! and produces exactly one [`Decision`] per scan. The cooldown gate
//! sits between the decision and the feedback sink: a gated decision is
//! still returned to the caller, it just doesn't re-fire the hardware.

use crate::cooldown::{CooldownGate, UNKNOWN_KEY};
use crate::store::{AttendanceStore, RecordOutcome};
use chrono::{DateTime, Local};
use rollcall_hw::FeedbackSink;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one recognition attempt, as exposed to the request layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Decision {
    Success {
        name: String,
        confidence: f32,
    },
    Duplicate {
        name: String,
    },
    Unknown {
        #[serde(skip_serializing_if = "Option::is_none")]
        confidence: Option<f32>,
    },
    Error {
        reason: String,
    },
}

/// Tunables for the decision policy.
pub struct DeciderPolicy {
    /// Accept when `confidence >= threshold` (boundary accepted).
    pub confidence_threshold: f32,
    pub cooldown_success: Duration,
    pub cooldown_duplicate: Duration,
    pub cooldown_unknown: Duration,
}

pub struct AttendanceDecider {
    store: Arc<dyn AttendanceStore>,
    feedback: Arc<dyn FeedbackSink>,
    gate: CooldownGate,
    policy: DeciderPolicy,
}

impl AttendanceDecider {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        feedback: Arc<dyn FeedbackSink>,
        policy: DeciderPolicy,
    ) -> Self {
        Self {
            store,
            feedback,
            gate: CooldownGate::new(),
            policy,
        }
    }

    /// Decide for an identified face.
    ///
    /// Persistence failures surface as [`Decision::Error`] and are not
    /// retried here; the next scan starts fresh.
    pub fn decide(&self, identity: &str, confidence: f32, now: DateTime<Local>) -> Decision {
        if confidence < self.policy.confidence_threshold {
            tracing::debug!(identity, confidence, threshold = self.policy.confidence_threshold, "below confidence threshold");
            return self.unknown(Some(confidence));
        }

        let name = match self.store.lookup_name(identity) {
            Ok(Some(name)) => name,
            // Corpus folder without a user row; show the raw id.
            Ok(None) => identity.to_string(),
            Err(e) => return self.store_error(identity, &e.to_string()),
        };

        match self.store.has_attendance_on(identity, now.date_naive()) {
            Ok(true) => self.duplicate(identity, name),
            Ok(false) => match self.store.record_attendance(identity, now) {
                Ok(RecordOutcome::Recorded) => self.success(identity, name, confidence),
                // Lost a check-then-act race with a concurrent decision.
                Ok(RecordOutcome::AlreadyMarked) => self.duplicate(identity, name),
                Err(e) => self.store_error(identity, &e.to_string()),
            },
            Err(e) => self.store_error(identity, &e.to_string()),
        }
    }

    /// Decide for a frame with no detectable face.
    pub fn no_face(&self) -> Decision {
        self.unknown(None)
    }

    fn success(&self, identity: &str, name: String, confidence: f32) -> Decision {
        tracing::info!(identity, name = %name, confidence, "attendance recorded");
        if self.gate.allow(identity, Instant::now(), self.policy.cooldown_success) {
            self.feedback.success(&name, confidence);
        }
        Decision::Success { name, confidence }
    }

    fn duplicate(&self, identity: &str, name: String) -> Decision {
        tracing::info!(identity, name = %name, "already marked today");
        if self.gate.allow(identity, Instant::now(), self.policy.cooldown_duplicate) {
            self.feedback.duplicate(&name);
        }
        Decision::Duplicate { name }
    }

    fn unknown(&self, confidence: Option<f32>) -> Decision {
        if self.gate.allow(UNKNOWN_KEY, Instant::now(), self.policy.cooldown_unknown) {
            self.feedback.unknown();
        }
        Decision::Unknown { confidence }
    }

    fn store_error(&self, identity: &str, reason: &str) -> Decision {
        tracing::error!(identity, reason, "attendance store failure");
        Decision::Error {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AttendanceRecord, SqliteStore, StoreError};
    use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone};
    use std::sync::Mutex;

    struct RecordingFeedback {
        events: Mutex<Vec<String>>,
    }

    impl RecordingFeedback {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl FeedbackSink for RecordingFeedback {
        fn success(&self, name: &str, _confidence: f32) {
            self.events.lock().unwrap().push(format!("success:{name}"));
        }
        fn duplicate(&self, name: &str) {
            self.events.lock().unwrap().push(format!("duplicate:{name}"));
        }
        fn unknown(&self) {
            self.events.lock().unwrap().push("unknown".to_string());
        }
        fn system_message(&self, _l1: &str, _l2: &str) {}
    }

    /// Store whose reads always fail, for the error path.
    struct BrokenStore;

    impl AttendanceStore for BrokenStore {
        fn register_user(&self, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))
        }
        fn lookup_name(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))
        }
        fn has_attendance_on(&self, _: &str, _: NaiveDate) -> Result<bool, StoreError> {
            Err(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))
        }
        fn record_attendance(
            &self,
            _: &str,
            _: DateTime<Local>,
        ) -> Result<crate::store::RecordOutcome, StoreError> {
            Err(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))
        }
        fn recent_attendance(&self, _: usize) -> Result<Vec<AttendanceRecord>, StoreError> {
            Err(StoreError::Database(rusqlite::Error::QueryReturnedNoRows))
        }
    }

    fn policy() -> DeciderPolicy {
        DeciderPolicy {
            confidence_threshold: 0.5,
            cooldown_success: Duration::from_secs(5),
            cooldown_duplicate: Duration::from_secs(5),
            cooldown_unknown: Duration::from_secs(3),
        }
    }

    fn rig() -> (Arc<dyn AttendanceStore>, Arc<RecordingFeedback>, AttendanceDecider) {
        let store: Arc<dyn AttendanceStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.register_user("S1", "Asha Rao").unwrap();
        let feedback = RecordingFeedback::new();
        let decider = AttendanceDecider::new(store.clone(), feedback.clone(), policy());
        (store, feedback, decider)
    }

    fn at_nine() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_below_threshold_is_unknown_regardless_of_identity() {
        let (store, feedback, decider) = rig();
        let d = decider.decide("S1", 0.49, at_nine());
        assert!(matches!(d, Decision::Unknown { confidence: Some(c) } if (c - 0.49).abs() < 1e-6));
        assert_eq!(feedback.events(), vec!["unknown"]);
        // Nothing persisted for a rejected identification.
        assert!(store.recent_attendance(10).unwrap().is_empty());
    }

    #[test]
    fn test_threshold_boundary_is_accepted() {
        let (_, _, decider) = rig();
        let d = decider.decide("S1", 0.5, at_nine());
        assert!(matches!(d, Decision::Success { .. }));
    }

    #[test]
    fn test_same_day_repeat_is_duplicate_with_one_record() {
        let (store, feedback, decider) = rig();
        let now = at_nine();

        let first = decider.decide("S1", 0.9, now);
        let second = decider.decide("S1", 0.9, now + ChronoDuration::minutes(1));

        assert!(matches!(first, Decision::Success { ref name, .. } if name == "Asha Rao"));
        assert!(matches!(second, Decision::Duplicate { ref name } if name == "Asha Rao"));
        assert_eq!(store.recent_attendance(10).unwrap().len(), 1);
        // Duplicate feedback within the success cooldown is suppressed.
        assert_eq!(feedback.events(), vec!["success:Asha Rao"]);
    }

    #[test]
    fn test_next_day_is_success_again() {
        let (store, _, decider) = rig();
        let now = at_nine();
        decider.decide("S1", 0.9, now);
        let d = decider.decide("S1", 0.9, now + ChronoDuration::days(1));
        assert!(matches!(d, Decision::Success { .. }));
        assert_eq!(store.recent_attendance(10).unwrap().len(), 2);
    }

    #[test]
    fn test_no_face_suppresses_feedback_within_window_but_still_returns_unknown() {
        let (_, feedback, decider) = rig();
        assert!(matches!(decider.no_face(), Decision::Unknown { confidence: None }));
        assert!(matches!(decider.no_face(), Decision::Unknown { confidence: None }));
        assert_eq!(feedback.events(), vec!["unknown"]);
    }

    #[test]
    fn test_unregistered_identity_uses_raw_id_as_name() {
        let (_, _, decider) = rig();
        let d = decider.decide("S-folder-only", 0.8, at_nine());
        assert!(matches!(d, Decision::Success { ref name, .. } if name == "S-folder-only"));
    }

    #[test]
    fn test_store_failure_is_error_without_feedback() {
        let feedback = RecordingFeedback::new();
        let decider = AttendanceDecider::new(Arc::new(BrokenStore), feedback.clone(), policy());
        let d = decider.decide("S1", 0.9, at_nine());
        assert!(matches!(d, Decision::Error { .. }));
        assert!(feedback.events().is_empty());
    }

    #[test]
    fn test_decision_serializes_with_status_tag() {
        let json = serde_json::to_value(Decision::Success {
            name: "Asha Rao".into(),
            confidence: 0.9,
        })
        .unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["name"], "Asha Rao");

        let json = serde_json::to_value(Decision::Unknown { confidence: None }).unwrap();
        assert_eq!(json["status"], "unknown");
        assert!(json.get("confidence").is_none());
    }
}
