use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

/// Collection holding `User` documents
pub const USERS_COLLECTION: &str = "users";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Admin, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// Registered account (collection: users)
///
/// `password` is stored already hashed by the owning application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub email: String,
    pub password: String,
    pub fullname: String,
    pub role: Role,
    pub is_verified: bool,

    /// Anonymous identity shown to other users, unique when set
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_anonymous: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_mentor: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_mentee: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mentorship_topics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub available_for_mentoring: Option<bool>,

    // Profile fields written by the application; not covered by the validator
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mentorship_bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub updated_at: Option<BsonDateTime>,
}

impl User {
    /// A freshly registered, unverified account with no mentorship profile.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        fullname: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: None,
            username: username.into(),
            email: email.into(),
            password: password_hash.into(),
            fullname: fullname.into(),
            role,
            is_verified: false,
            display_name: None,
            is_anonymous: None,
            is_mentor: None,
            is_mentee: None,
            mentorship_topics: None,
            available_for_mentoring: None,
            bio: None,
            mentorship_bio: None,
            updated_at: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Marks the account as a mentor open to requests on the given topics.
    pub fn as_mentor(mut self, topics: Vec<String>) -> Self {
        self.is_mentor = Some(true);
        self.available_for_mentoring = Some(true);
        self.mentorship_topics = Some(topics);
        self
    }

    pub fn as_mentee(mut self) -> Self {
        self.is_mentee = Some(true);
        self
    }
}
