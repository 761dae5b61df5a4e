use super::{BsonType, CollectionSchema, FieldRule};
use crate::models::{
    ConnectionStatus, RequestStatus, Role, MENTORSHIP_CONNECTIONS_COLLECTION,
    MENTORSHIP_REQUESTS_COLLECTION, USERS_COLLECTION,
};

pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

/// All managed collections, in the order they are provisioned.
pub fn all_collections() -> Vec<CollectionSchema> {
    vec![
        users_schema(),
        mentorship_requests_schema(),
        mentorship_connections_schema(),
    ]
}

pub fn users_schema() -> CollectionSchema {
    CollectionSchema::new(USERS_COLLECTION)
        .required(
            "username",
            FieldRule::string("Username must be a string between 3-30 characters")
                .min_length(3)
                .max_length(30),
        )
        .required(
            "email",
            FieldRule::string("Email must be a valid email address").pattern(EMAIL_PATTERN),
        )
        .required(
            "password",
            FieldRule::string("Password must be at least 8 characters").min_length(8),
        )
        .required(
            "fullname",
            FieldRule::string("Full name must be between 2-100 characters")
                .min_length(2)
                .max_length(100),
        )
        .required(
            "role",
            FieldRule::string("Role must be either admin or user")
                .one_of(Role::ALL.iter().map(|r| r.as_str())),
        )
        .required(
            "isVerified",
            FieldRule::boolean("isVerified must be a boolean"),
        )
        .optional(
            "displayName",
            FieldRule::string("Display name must be max 50 characters").max_length(50),
        )
        .optional(
            "isAnonymous",
            FieldRule::boolean("isAnonymous must be a boolean"),
        )
        .optional("isMentor", FieldRule::boolean("isMentor must be a boolean"))
        .optional("isMentee", FieldRule::boolean("isMentee must be a boolean"))
        .optional(
            "mentorshipTopics",
            FieldRule::array_of(
                BsonType::String,
                "mentorshipTopics must be an array of strings",
            ),
        )
        .optional(
            "availableForMentoring",
            FieldRule::boolean("availableForMentoring must be a boolean"),
        )
}

pub fn mentorship_requests_schema() -> CollectionSchema {
    CollectionSchema::new(MENTORSHIP_REQUESTS_COLLECTION)
        .required(
            "menteeId",
            FieldRule::object_id("menteeId must be a valid ObjectId"),
        )
        .required(
            "mentorId",
            FieldRule::object_id("mentorId must be a valid ObjectId"),
        )
        .required(
            "status",
            FieldRule::string("status must be one of: pending, accepted, rejected, canceled")
                .one_of(RequestStatus::ALL.iter().map(|s| s.as_str())),
        )
        .required("topics", topics_rule())
        // Deliberately stricter than presence: string timestamps are rejected
        .required("createdAt", FieldRule::date("createdAt must be a date"))
        .required("updatedAt", FieldRule::date("updatedAt must be a date"))
        .optional(
            "message",
            FieldRule::string("message must be max 500 characters").max_length(500),
        )
}

pub fn mentorship_connections_schema() -> CollectionSchema {
    CollectionSchema::new(MENTORSHIP_CONNECTIONS_COLLECTION)
        .required(
            "menteeId",
            FieldRule::object_id("menteeId must be a valid ObjectId"),
        )
        .required(
            "mentorId",
            FieldRule::object_id("mentorId must be a valid ObjectId"),
        )
        .required(
            "requestId",
            FieldRule::object_id("requestId must be a valid ObjectId"),
        )
        .required(
            "status",
            FieldRule::string("status must be one of: active, paused, completed, ended")
                .one_of(ConnectionStatus::ALL.iter().map(|s| s.as_str())),
        )
        .required("topics", topics_rule())
        // Deliberately stricter than presence: string timestamps are rejected
        .required("startedAt", FieldRule::date("startedAt must be a date"))
        .required("createdAt", FieldRule::date("createdAt must be a date"))
        .required("updatedAt", FieldRule::date("updatedAt must be a date"))
        .optional(
            "menteeRating",
            FieldRule::int("menteeRating must be between 1-5").range(1, 5),
        )
        .optional(
            "mentorRating",
            FieldRule::int("mentorRating must be between 1-5").range(1, 5),
        )
}

fn topics_rule() -> FieldRule {
    FieldRule::array_of(BsonType::String, "topics must be a non-empty array of strings")
        .min_items(1)
}
