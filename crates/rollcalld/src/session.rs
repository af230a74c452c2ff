use chrono::{DateTime, Local};
use rollcall_core::{AttendanceEntry, AttendanceLedger, GalleryStore};
use serde::Serialize;
use std::sync::Arc;

/// What status readers see.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub period_label: String,
    pub current_time: String,
    pub started_at: DateTime<Local>,
    pub entries: Vec<AttendanceEntry>,
}

/// Reset/report surface over the ledger.
pub struct SessionController {
    gallery: Arc<GalleryStore>,
    ledger: Arc<AttendanceLedger>,
}

impl SessionController {
    pub fn new(gallery: Arc<GalleryStore>, ledger: Arc<AttendanceLedger>) -> Self {
        Self { gallery, ledger }
    }

    pub fn get_status(&self) -> SessionStatus {
        self.status_at(Local::now())
    }

    fn status_at(&self, now: DateTime<Local>) -> SessionStatus {
        let session = self.ledger.session();
        SessionStatus {
            period_label: period_label(session.period, &session.started_at),
            current_time: now.format("%H:%M").to_string(),
            started_at: session.started_at,
            entries: session.entries,
        }
    }

    /// Start a new session seeded from the current gallery. Returns the
    /// number of learners on the new roster.
    pub fn reset(&self) -> usize {
        self.ledger.reset(self.gallery.known_names());
        self.ledger.len()
    }
}

fn period_label(period: u32, started_at: &DateTime<Local>) -> String {
    format!("PERIOD: {period}  DATE: {}", started_at.format("%d %b"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rollcall_core::testing::{marker_analyzer, portrait_png, GREEN, RED};
    use rollcall_core::{EnrollMode, MatchPolicy, Presence};

    fn controller() -> (tempfile::TempDir, Arc<GalleryStore>, SessionController) {
        let dir = tempfile::tempdir().unwrap();
        let gallery = Arc::new(GalleryStore::open(dir.path(), MatchPolicy::default()).unwrap());
        let mut analyzer = marker_analyzer();
        gallery
            .enroll(&mut analyzer, "alice", &portrait_png(RED), EnrollMode::Append)
            .unwrap();
        gallery
            .enroll(&mut analyzer, "bob", &portrait_png(GREEN), EnrollMode::Append)
            .unwrap();
        let session = SessionController::new(Arc::clone(&gallery), Arc::new(AttendanceLedger::new()));
        (dir, gallery, session)
    }

    #[test]
    fn test_period_label_format() {
        let started = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(period_label(2, &started), "PERIOD: 2  DATE: 07 Mar");
    }

    #[test]
    fn test_reset_seeds_from_gallery() {
        let (_dir, _gallery, session) = controller();
        assert_eq!(session.reset(), 2);

        let status = session.get_status();
        assert!(status.period_label.starts_with("PERIOD: 1  DATE: "));
        let entries: Vec<(&str, Presence)> =
            status.entries.iter().map(|e| (e.name.as_str(), e.state)).collect();
        assert_eq!(entries, vec![("alice", Presence::Absent), ("bob", Presence::Absent)]);
    }

    #[test]
    fn test_reset_picks_up_new_learners_and_bumps_period() {
        let (_dir, gallery, session) = controller();
        session.reset();
        gallery
            .enroll(&mut marker_analyzer(), "carol", &portrait_png([0, 0, 255]), EnrollMode::Append)
            .unwrap();
        // Not on the roster until the next reset.
        assert_eq!(session.get_status().entries.len(), 2);

        assert_eq!(session.reset(), 3);
        assert!(session.get_status().period_label.starts_with("PERIOD: 2 "));
    }

    #[test]
    fn test_current_time_format() {
        let (_dir, _gallery, session) = controller();
        let now = Local.with_ymd_and_hms(2024, 3, 7, 14, 3, 0).unwrap();
        assert_eq!(session.status_at(now).current_time, "14:03");
    }

    #[test]
    fn test_status_serializes_entries() {
        let (_dir, _gallery, session) = controller();
        session.reset();
        let json = serde_json::to_value(session.get_status()).unwrap();
        assert_eq!(json["entries"][0]["name"], "alice");
        assert_eq!(json["entries"][0]["state"], "absent");
        assert!(json["entries"][0]["marked_at"].is_null());
    }
}
