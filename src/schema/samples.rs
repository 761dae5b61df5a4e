//! Documents built from the models, checked against the validators before a
//! run so the Rust types and the stored rules cannot drift apart.

use mongodb::bson::{self, oid::ObjectId, DateTime as BsonDateTime, Document};
use serde::Serialize;

use super::{evaluate, CollectionSchema};
use crate::models::{
    ConnectionStatus, MentorshipConnection, MentorshipRequest, RequestStatus, Role, User,
    MENTORSHIP_CONNECTIONS_COLLECTION, MENTORSHIP_REQUESTS_COLLECTION, USERS_COLLECTION,
};
use crate::utils::ProvisionError;

fn to_document<T: Serialize>(collection: &str, value: &T) -> Result<Document, ProvisionError> {
    bson::to_document(value).map_err(|e| {
        ProvisionError::schema(collection, format!("sample document does not serialize: {e}"))
    })
}

/// One document per role and status value, with every optional field the
/// application writes.
pub fn sample_documents() -> Result<Vec<(&'static str, Document)>, ProvisionError> {
    let mut samples = Vec::new();
    let topics = vec!["Career Guidance".to_string()];

    for role in Role::ALL {
        let user = User::new(
            format!("sample_{}", role.as_str()),
            format!("{}@sharespace.example", role.as_str()),
            "$2a$10$sampleSampleSampleSampleSa",
            "Sample Person",
            role,
        )
        .with_display_name(format!("anon_{}", role.as_str()))
        .as_mentor(topics.clone())
        .as_mentee();
        samples.push((USERS_COLLECTION, to_document(USERS_COLLECTION, &user)?));
    }

    let mentee = ObjectId::new();
    let mentor = ObjectId::new();
    for status in RequestStatus::ALL {
        let mut request = MentorshipRequest::new(mentee, mentor, topics.clone())
            .with_message("I would like some guidance on my next role.");
        request.status = status;
        if status != RequestStatus::Pending {
            request.responsed_at = Some(BsonDateTime::now());
        }
        samples.push((
            MENTORSHIP_REQUESTS_COLLECTION,
            to_document(MENTORSHIP_REQUESTS_COLLECTION, &request)?,
        ));
    }

    let mut request = MentorshipRequest::new(mentee, mentor, topics);
    request.id = Some(ObjectId::new());
    for status in ConnectionStatus::ALL {
        let Some(mut connection) = MentorshipConnection::from_request(&request) else {
            continue;
        };
        connection.status = status;
        connection.last_interaction = Some(BsonDateTime::now());
        if status.is_terminal() {
            connection.ended_at = Some(BsonDateTime::now());
            connection.end_reason = Some("Goals reached".to_string());
            connection.mentee_rating = Some(5);
            connection.mentor_rating = Some(1);
            connection.mentee_feedback = Some("Very helpful".to_string());
            connection.mentor_feedback = Some("Well prepared".to_string());
        }
        samples.push((
            MENTORSHIP_CONNECTIONS_COLLECTION,
            to_document(MENTORSHIP_CONNECTIONS_COLLECTION, &connection)?,
        ));
    }

    Ok(samples)
}

/// Fails with a `Schema` error when a model document would be rejected by
/// its collection's validator. Collections without samples are skipped.
pub fn check_samples(schemas: &[CollectionSchema]) -> Result<(), ProvisionError> {
    for (collection, document) in sample_documents()? {
        let Some(schema) = schemas.iter().find(|s| s.name == collection) else {
            continue;
        };
        let violations = evaluate(&schema.to_validator(), &document);
        if !violations.is_empty() {
            let reasons = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ProvisionError::schema(
                collection,
                format!("model document rejected by the validator: {reasons}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{all_collections, users_schema, FieldRule};

    #[test]
    fn test_model_documents_pass_validators() {
        check_samples(&all_collections()).unwrap();
    }

    #[test]
    fn test_samples_cover_every_status_and_role() {
        let samples = sample_documents().unwrap();
        let count = |c: &str| samples.iter().filter(|(name, _)| *name == c).count();
        assert_eq!(count("users"), Role::ALL.len());
        assert_eq!(count("mentorship_requests"), RequestStatus::ALL.len());
        assert_eq!(count("mentorship_connections"), ConnectionStatus::ALL.len());
    }

    #[test]
    fn test_drifted_validator_is_reported() {
        let drifted = users_schema().required("nickname", FieldRule::string("nickname"));
        let err = check_samples(&[drifted]).unwrap_err();
        assert!(matches!(err, ProvisionError::Schema { .. }));
        assert!(err.to_string().contains("nickname: required field is missing"));
    }
}
