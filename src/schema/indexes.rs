use mongodb::bson::Document;
use mongodb::options::IndexOptions;
use mongodb::IndexModel;

use super::{BsonType, CollectionSchema};
use crate::models::{
    MENTORSHIP_CONNECTIONS_COLLECTION, MENTORSHIP_REQUESTS_COLLECTION, USERS_COLLECTION,
};
use crate::utils::ProvisionError;

/// One secondary index on a managed collection
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub collection: &'static str,
    /// All keys ascending
    pub keys: Vec<&'static str>,
    pub unique: bool,
    /// Documents missing every key are left out of the index
    pub sparse: bool,
    /// One key is an array field; the server indexes each element
    pub multikey: bool,
}

impl IndexSpec {
    pub fn on(collection: &'static str, fields: &[&'static str]) -> Self {
        Self {
            collection,
            keys: fields.to_vec(),
            unique: false,
            sparse: false,
            multikey: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn multikey(mut self) -> Self {
        self.multikey = true;
        self
    }

    pub fn is_compound(&self) -> bool {
        self.keys.len() > 1
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.keys.iter().copied()
    }

    /// Server default name, e.g. `menteeId_1_status_1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|field| format!("{}_1", field))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn keys_document(&self) -> Document {
        let mut keys = Document::new();
        for field in &self.keys {
            keys.insert(*field, 1);
        }
        keys
    }

    pub fn to_model(&self) -> IndexModel {
        let mut options = IndexOptions::default();
        options.name = Some(self.name());
        if self.unique {
            options.unique = Some(true);
        }
        if self.sparse {
            options.sparse = Some(true);
        }

        IndexModel::builder()
            .keys(self.keys_document())
            .options(Some(options))
            .build()
    }

    /// Short human form for logs: `users(isMentor, availableForMentoring) [unique]`
    pub fn describe(&self) -> String {
        let fields = self.fields().collect::<Vec<_>>().join(", ");
        let mut flags = Vec::new();
        if self.unique {
            flags.push("unique");
        }
        if self.sparse {
            flags.push("sparse");
        }
        if self.multikey {
            flags.push("multikey");
        }
        if flags.is_empty() {
            format!("{}({})", self.collection, fields)
        } else {
            format!("{}({}) [{}]", self.collection, fields, flags.join(", "))
        }
    }

    fn check(&self, schema: &CollectionSchema) -> Result<(), ProvisionError> {
        if self.keys.is_empty() {
            return Err(ProvisionError::schema(self.collection, "index without keys"));
        }

        let mut array_keys = 0;
        for field in self.fields() {
            if field == "_id" {
                continue;
            }
            match schema.property(field) {
                Some(rule) if rule.bson_type == BsonType::Array => array_keys += 1,
                Some(_) => {}
                None => {
                    return Err(ProvisionError::schema(
                        self.collection,
                        format!("index {} references undeclared field '{}'", self.name(), field),
                    ))
                }
            }
        }

        if self.is_compound() && array_keys > 1 {
            return Err(ProvisionError::schema(
                self.collection,
                format!("index {} covers parallel arrays", self.name()),
            ));
        }
        if self.multikey != (array_keys == 1) {
            return Err(ProvisionError::schema(
                self.collection,
                format!(
                    "index {} multikey flag does not match its array keys",
                    self.name()
                ),
            ));
        }

        Ok(())
    }
}

/// The full index plan, in creation order.
pub fn index_plan() -> Vec<IndexSpec> {
    const USERS: &str = USERS_COLLECTION;
    const REQUESTS: &str = MENTORSHIP_REQUESTS_COLLECTION;
    const CONNECTIONS: &str = MENTORSHIP_CONNECTIONS_COLLECTION;

    vec![
        IndexSpec::on(USERS, &["username"]).unique(),
        IndexSpec::on(USERS, &["email"]).unique(),
        IndexSpec::on(USERS, &["displayName"]).unique().sparse(),
        IndexSpec::on(USERS, &["isMentor", "availableForMentoring"]),
        IndexSpec::on(USERS, &["isMentee"]),
        IndexSpec::on(USERS, &["mentorshipTopics"]).multikey(),
        IndexSpec::on(REQUESTS, &["menteeId"]),
        IndexSpec::on(REQUESTS, &["mentorId"]),
        IndexSpec::on(REQUESTS, &["status"]),
        IndexSpec::on(REQUESTS, &["menteeId", "mentorId", "status"]),
        IndexSpec::on(REQUESTS, &["createdAt"]),
        IndexSpec::on(REQUESTS, &["topics"]).multikey(),
        IndexSpec::on(CONNECTIONS, &["menteeId"]),
        IndexSpec::on(CONNECTIONS, &["mentorId"]),
        IndexSpec::on(CONNECTIONS, &["requestId"]).unique(),
        IndexSpec::on(CONNECTIONS, &["status"]),
        IndexSpec::on(CONNECTIONS, &["startedAt"]),
        IndexSpec::on(CONNECTIONS, &["topics"]).multikey(),
        IndexSpec::on(CONNECTIONS, &["menteeId", "status"]),
        IndexSpec::on(CONNECTIONS, &["mentorId", "status"]),
    ]
}

/// Checks every collection definition and every index against its collection.
pub fn check_definitions(
    schemas: &[CollectionSchema],
    plan: &[IndexSpec],
) -> Result<(), ProvisionError> {
    for schema in schemas {
        schema.check()?;
    }

    let mut names: Vec<(&str, String)> = Vec::with_capacity(plan.len());
    for index in plan {
        let schema = schemas
            .iter()
            .find(|s| s.name == index.collection)
            .ok_or_else(|| {
                ProvisionError::schema(index.collection, "index on an unmanaged collection")
            })?;
        index.check(schema)?;

        let key = (index.collection, index.name());
        if names.contains(&key) {
            return Err(ProvisionError::schema(
                index.collection,
                format!("index {} declared twice", key.1),
            ));
        }
        names.push(key);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::all_collections;
    use mongodb::bson::doc;

    #[test]
    fn test_plan_passes_checks() {
        check_definitions(&all_collections(), &index_plan()).unwrap();
    }

    #[test]
    fn test_plan_size_per_collection() {
        let plan = index_plan();
        let count = |c: &str| plan.iter().filter(|i| i.collection == c).count();
        assert_eq!(plan.len(), 20);
        assert_eq!(count("users"), 6);
        assert_eq!(count("mentorship_requests"), 6);
        assert_eq!(count("mentorship_connections"), 8);
    }

    #[test]
    fn test_unique_indexes() {
        let unique: Vec<_> = index_plan()
            .into_iter()
            .filter(|i| i.unique)
            .map(|i| (i.collection, i.name(), i.sparse))
            .collect();
        assert_eq!(
            unique,
            vec![
                ("users", "username_1".to_string(), false),
                ("users", "email_1".to_string(), false),
                ("users", "displayName_1".to_string(), true),
                ("mentorship_connections", "requestId_1".to_string(), false),
            ]
        );
    }

    #[test]
    fn test_compound_index_name_and_keys() {
        let spec = IndexSpec::on("mentorship_requests", &["menteeId", "mentorId", "status"]);
        assert!(spec.is_compound());
        assert!(!IndexSpec::on("users", &["email"]).is_compound());
        assert_eq!(spec.name(), "menteeId_1_mentorId_1_status_1");
        assert_eq!(
            spec.keys_document(),
            doc! { "menteeId": 1, "mentorId": 1, "status": 1 }
        );
    }

    #[test]
    fn test_model_carries_options() {
        let model = IndexSpec::on("users", &["displayName"]).unique().sparse().to_model();
        let options = model.options.unwrap();
        assert_eq!(options.name.as_deref(), Some("displayName_1"));
        assert_eq!(options.unique, Some(true));
        assert_eq!(options.sparse, Some(true));

        let plain = IndexSpec::on("users", &["isMentee"]).to_model();
        let options = plain.options.unwrap();
        assert_eq!(options.unique, None);
        assert_eq!(options.sparse, None);
    }

    #[test]
    fn test_describe() {
        let spec = IndexSpec::on("users", &["displayName"]).unique().sparse();
        assert_eq!(spec.describe(), "users(displayName) [unique, sparse]");
        let spec = IndexSpec::on("users", &["isMentor", "availableForMentoring"]);
        assert_eq!(spec.describe(), "users(isMentor, availableForMentoring)");
    }

    #[test]
    fn test_check_rejects_undeclared_field() {
        let plan = vec![IndexSpec::on("users", &["nickname"])];
        let err = check_definitions(&all_collections(), &plan).unwrap_err();
        assert!(err.to_string().contains("undeclared field 'nickname'"));
    }

    #[test]
    fn test_check_rejects_wrong_multikey_flag() {
        let plan = vec![IndexSpec::on("users", &["mentorshipTopics"])];
        assert!(check_definitions(&all_collections(), &plan).is_err());

        let plan = vec![IndexSpec::on("users", &["username"]).multikey()];
        assert!(check_definitions(&all_collections(), &plan).is_err());
    }

    #[test]
    fn test_check_rejects_duplicates_and_unknown_collections() {
        let plan = vec![
            IndexSpec::on("users", &["email"]).unique(),
            IndexSpec::on("users", &["email"]),
        ];
        assert!(check_definitions(&all_collections(), &plan).is_err());

        let plan = vec![IndexSpec::on("posts", &["title"])];
        assert!(check_definitions(&all_collections(), &plan).is_err());
    }
}
