use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

pub const MENTORSHIP_REQUESTS_COLLECTION: &str = "mentorship_requests";
pub const MENTORSHIP_CONNECTIONS_COLLECTION: &str = "mentorship_connections";

/// Request status. Transitions are owned by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Canceled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::Accepted,
        RequestStatus::Rejected,
        RequestStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Paused,
    Completed,
    Ended,
}

impl ConnectionStatus {
    pub const ALL: [ConnectionStatus; 4] = [
        ConnectionStatus::Active,
        ConnectionStatus::Paused,
        ConnectionStatus::Completed,
        ConnectionStatus::Ended,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Paused => "paused",
            ConnectionStatus::Completed => "completed",
            ConnectionStatus::Ended => "ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Completed | ConnectionStatus::Ended)
    }
}

/// Request from a mentee to a mentor (collection: mentorship_requests)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorshipRequest {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub mentee_id: ObjectId,
    pub mentor_id: ObjectId,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
    pub topics: Vec<String>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
    /// Set when the mentor accepts or rejects
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub responsed_at: Option<BsonDateTime>,
}

impl MentorshipRequest {
    pub fn new(mentee_id: ObjectId, mentor_id: ObjectId, topics: Vec<String>) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: None,
            mentee_id,
            mentor_id,
            status: RequestStatus::Pending,
            message: None,
            topics,
            created_at: now,
            updated_at: now,
            responsed_at: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Mentorship relationship born from an accepted request
/// (collection: mentorship_connections)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorshipConnection {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub mentee_id: ObjectId,
    pub mentor_id: ObjectId,
    pub request_id: ObjectId,
    pub status: ConnectionStatus,
    pub topics: Vec<String>,
    pub started_at: BsonDateTime,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_interaction: Option<BsonDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ended_at: Option<BsonDateTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_reason: Option<String>,
    /// 1-5
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mentee_rating: Option<i32>,
    /// 1-5
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mentor_rating: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mentee_feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mentor_feedback: Option<String>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

impl MentorshipConnection {
    /// Opens an active connection for a stored request.
    ///
    /// Returns `None` when the request has not been persisted yet, since the
    /// connection must reference it by id.
    pub fn from_request(request: &MentorshipRequest) -> Option<Self> {
        let request_id = request.id?;
        let now = BsonDateTime::now();
        Some(Self {
            id: None,
            mentee_id: request.mentee_id,
            mentor_id: request.mentor_id,
            request_id,
            status: ConnectionStatus::Active,
            topics: request.topics.clone(),
            started_at: now,
            last_interaction: None,
            ended_at: None,
            end_reason: None,
            mentee_rating: None,
            mentor_rating: None,
            mentee_feedback: None,
            mentor_feedback: None,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{self, Bson};

    #[test]
    fn test_new_request_is_pending() {
        let request = MentorshipRequest::new(
            ObjectId::new(),
            ObjectId::new(),
            vec!["go".to_string()],
        )
        .with_message("Hi!");
        let doc = bson::to_document(&request).unwrap();

        assert_eq!(doc.get_str("status").unwrap(), "pending");
        assert!(matches!(doc.get("menteeId"), Some(Bson::ObjectId(_))));
        assert!(matches!(doc.get("createdAt"), Some(Bson::DateTime(_))));
        assert_eq!(doc.get_str("message").unwrap(), "Hi!");
        assert!(!doc.contains_key("responsedAt"));
    }

    #[test]
    fn test_connection_requires_stored_request() {
        let mut request = MentorshipRequest::new(
            ObjectId::new(),
            ObjectId::new(),
            vec!["rust".to_string()],
        );
        assert!(MentorshipConnection::from_request(&request).is_none());

        let request_id = ObjectId::new();
        request.id = Some(request_id);
        let connection = MentorshipConnection::from_request(&request).unwrap();

        assert_eq!(connection.request_id, request_id);
        assert_eq!(connection.status, ConnectionStatus::Active);
        assert_eq!(connection.topics, vec!["rust".to_string()]);
    }

    #[test]
    fn test_ratings_serialize_as_int32() {
        let mut request = MentorshipRequest::new(ObjectId::new(), ObjectId::new(), vec![]);
        request.id = Some(ObjectId::new());
        let mut connection = MentorshipConnection::from_request(&request).unwrap();
        connection.mentee_rating = Some(5);

        let doc = bson::to_document(&connection).unwrap();
        assert_eq!(doc.get("menteeRating"), Some(&Bson::Int32(5)));
        assert!(!doc.contains_key("mentorRating"));
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<_> = ConnectionStatus::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.as_str())
            .collect();
        assert_eq!(terminal, vec!["completed", "ended"]);
    }
}
