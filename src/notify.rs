//! Homeroom notification seam
//!
//! Delivery transport (SMTP, webhook, ...) lives outside the crate.
//! Notifications are strictly fire-and-forget: the engine logs a failed
//! send and carries on, and the ingestion result never reflects it.

use chrono::NaiveDate;

use crate::model::Semester;

/// Snapshot of a freshly ingested record, addressed by class.
///
/// Resolving the class to its homeroom contact is the sender's job;
/// the engine has no directory access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordNotice {
    pub record_type: String,
    pub student: String,
    pub class: String,
    pub semester: Semester,
    pub recorded_by: String,
    pub date: NaiveDate,
    pub reason: Option<String>,
}

/// Why a notification could not be sent
#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Outbound notification channel
pub trait NotificationSender: Send + Sync {
    fn send(&self, notice: &RecordNotice) -> Result<(), NotifyError>;
}

/// Sender that drops every notice; for tests and notification-less deployments
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl NotificationSender for NullNotifier {
    fn send(&self, _notice: &RecordNotice) -> Result<(), NotifyError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_notifier_accepts_everything() {
        let notice = RecordNotice {
            record_type: "tardy".into(),
            student: "Li".into(),
            class: "10A".into(),
            semester: Semester::new("2025 Fall"),
            recorded_by: "Ms Wong".into(),
            date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            reason: None,
        };
        assert!(NullNotifier.send(&notice).is_ok());
    }
}
