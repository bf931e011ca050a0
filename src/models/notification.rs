use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification as served by the remote store. The client mirrors it read-only
/// apart from the `is_read` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub r#type: NotificationKind, // 'type' is a reserved keyword
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Route of the referenced document, if any. Drives the "view" action.
    pub fn view_target(&self) -> Option<String> {
        self.document_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| format!("/documents/{}", urlencoding::encode(id)))
    }

    /// Short relative label for display, e.g. "5m ago".
    pub fn relative_time(&self, now: DateTime<Utc>) -> String {
        let elapsed = now.signed_duration_since(self.created_at);
        let secs = elapsed.num_seconds();
        if secs < 60 {
            // future timestamps from clock skew also land here
            "just now".to_string()
        } else if secs < 3_600 {
            format!("{}m ago", elapsed.num_minutes())
        } else if secs < 86_400 {
            format!("{}h ago", elapsed.num_hours())
        } else if elapsed.num_days() < 7 {
            format!("{}d ago", elapsed.num_days())
        } else {
            self.created_at.format("%Y-%m-%d").to_string()
        }
    }
}

/// Notification category. The set is owned by the server; unknown values are
/// kept verbatim rather than rejected.
///
/// Known categories match case-insensitively and serialize in lower case, so
/// `"SHARE"` reads back as `"share"`. Only `Other` round-trips its raw text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    Comment,
    Share,
    Mention,
    System,
    Other(String),
}

impl NotificationKind {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::Comment => "comment",
            NotificationKind::Share => "share",
            NotificationKind::Mention => "mention",
            NotificationKind::System => "system",
            NotificationKind::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for NotificationKind {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "comment" => NotificationKind::Comment,
            "share" => NotificationKind::Share,
            "mention" => NotificationKind::Mention,
            "system" => NotificationKind::System,
            _ => NotificationKind::Other(raw),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        match kind {
            NotificationKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Acknowledgement returned by `PUT /notifications/read-all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadAllAck {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample() -> Notification {
        Notification {
            id: "n1".into(),
            user_id: "u1".into(),
            r#type: NotificationKind::Comment,
            title: "New comment".into(),
            message: "Ada commented on Roadmap".into(),
            document_id: Some("doc-42".into()),
            is_read: false,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_deserializes_server_shape() {
        let json = r#"{
            "id": "n9",
            "userId": "u1",
            "type": "SHARE",
            "title": "Shared with you",
            "message": "Bob shared Specs",
            "documentId": "doc-1",
            "isRead": true,
            "createdAt": "2026-03-01T12:00:00Z"
        }"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.r#type, NotificationKind::Share);
        assert!(n.is_read);
        assert_eq!(n.document_id.as_deref(), Some("doc-1"));
    }

    #[test]
    fn test_unknown_kind_is_preserved() {
        let kind: NotificationKind = serde_json::from_str(r#""reminder""#).unwrap();
        assert_eq!(kind, NotificationKind::Other("reminder".into()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), r#""reminder""#);
    }

    #[test]
    fn test_known_kind_is_normalized_to_lower_case() {
        let kind: NotificationKind = serde_json::from_str(r#""SHARE""#).unwrap();
        assert_eq!(kind, NotificationKind::Share);
        assert_eq!(serde_json::to_string(&kind).unwrap(), r#""share""#);
        assert_eq!(format!("{:<7}|", kind), "share  |");
    }

    #[test]
    fn test_missing_document_id_is_none() {
        let json = r#"{"id":"n1","userId":"u1","type":"system","title":"t","message":"m",
            "isRead":false,"createdAt":"2026-03-01T12:00:00Z"}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert!(n.document_id.is_none());
        assert!(n.view_target().is_none());
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let json = r#"{"id":"n1","type":"system","title":"t","message":"m"}"#;
        assert!(serde_json::from_str::<Notification>(json).is_err());
    }

    #[test]
    fn test_view_target_encodes_document_id() {
        let mut n = sample();
        assert_eq!(n.view_target().as_deref(), Some("/documents/doc-42"));
        n.document_id = Some("a b".into());
        assert_eq!(n.view_target().as_deref(), Some("/documents/a%20b"));
    }

    #[test]
    fn test_relative_time_buckets() {
        let n = sample();
        let at = |d: Duration| n.created_at + d;
        assert_eq!(n.relative_time(at(Duration::seconds(10))), "just now");
        assert_eq!(n.relative_time(at(Duration::minutes(5))), "5m ago");
        assert_eq!(n.relative_time(at(Duration::hours(3))), "3h ago");
        assert_eq!(n.relative_time(at(Duration::days(2))), "2d ago");
        assert_eq!(n.relative_time(at(Duration::days(30))), "2026-03-01");
    }
}
