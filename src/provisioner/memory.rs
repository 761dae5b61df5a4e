//! In-memory stand-in for a MongoDB deployment.
//!
//! Stores principals, validators and index definitions, and enforces
//! validators plus unique/sparse indexes on insert, so the data model can be
//! exercised without a running server.

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::{ProvisionTarget, StepOutcome};
use crate::config::AppCredential;
use crate::schema::{evaluate, IndexSpec, Violation};
use crate::utils::{ProvisionError, ResourceKind};

#[derive(Debug, Clone, PartialEq)]
pub enum InsertRejection {
    Validation(Vec<Violation>),
    /// Name of the unique index that was violated
    DuplicateKey(String),
    UnknownCollection(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct MemoryCollection {
    validator: Document,
    indexes: Vec<(String, IndexSpec)>,
    documents: Vec<Document>,
}

#[derive(Debug, Default)]
struct State {
    principals: BTreeMap<String, Vec<Document>>,
    collections: BTreeMap<String, MemoryCollection>,
    views: BTreeSet<String>,
    hide_principals: bool,
    hide_collections: bool,
    operations: Vec<String>,
}

/// Principals and collection definitions, without stored documents
pub type Snapshot = (
    BTreeMap<String, Vec<Document>>,
    BTreeMap<String, (Document, Vec<String>)>,
);

pub struct InMemoryTarget {
    database: String,
    state: Mutex<State>,
}

impl InMemoryTarget {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn log(&self, operation: String) {
        self.state().operations.push(operation);
    }

    pub fn operations(&self) -> Vec<String> {
        self.state().operations.clone()
    }

    pub fn principal_roles(&self, username: &str) -> Option<Vec<Document>> {
        self.state().principals.get(username).cloned()
    }

    pub fn add_principal(&self, username: &str, roles: Vec<Document>) {
        self.state().principals.insert(username.to_string(), roles);
    }

    /// Simulates a principal created by another run after our lookup.
    pub fn hide_principals_from_lookup(&self) {
        self.state().hide_principals = true;
    }

    /// Simulates collections created by another run after our lookup.
    pub fn hide_collections_from_lookup(&self) {
        self.state().hide_collections = true;
    }

    pub fn add_view(&self, name: &str) {
        self.state().views.insert(name.to_string());
    }

    pub fn validator(&self, collection: &str) -> Option<Document> {
        self.state()
            .collections
            .get(collection)
            .map(|c| c.validator.clone())
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.state().collections.keys().cloned().collect()
    }

    pub fn index_count(&self, collection: &str) -> usize {
        self.state()
            .collections
            .get(collection)
            .map(|c| c.indexes.len())
            .unwrap_or(0)
    }

    pub fn add_index(&self, spec: IndexSpec, name: &str) {
        self.state()
            .collections
            .entry(spec.collection.to_string())
            .or_default()
            .indexes
            .push((name.to_string(), spec));
    }

    pub fn drop_index(&self, collection: &str, name: &str) {
        if let Some(c) = self.state().collections.get_mut(collection) {
            c.indexes.retain(|(n, _)| n != name);
        }
    }

    pub fn set_validator(&self, collection: &str, validator: Document) {
        if let Some(c) = self.state().collections.get_mut(collection) {
            c.validator = validator;
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state();
        let collections = state
            .collections
            .iter()
            .map(|(name, c)| {
                let names = c.indexes.iter().map(|(n, _)| n.clone()).collect();
                (name.clone(), (c.validator.clone(), names))
            })
            .collect();
        (state.principals.clone(), collections)
    }

    /// Inserts like the server would: validator first, then unique indexes.
    pub fn insert(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<ObjectId, InsertRejection> {
        let mut state = self.state();
        let coll = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| InsertRejection::UnknownCollection(collection.to_string()))?;

        let violations = evaluate(&coll.validator, &document);
        if !violations.is_empty() {
            return Err(InsertRejection::Validation(violations));
        }

        let id = match document.get("_id") {
            Some(Bson::ObjectId(id)) => *id,
            _ => {
                let id = ObjectId::new();
                document.insert("_id", id);
                id
            }
        };

        for (name, spec) in coll.indexes.iter().filter(|(_, spec)| spec.unique) {
            let Some(key) = index_key(spec, &document) else {
                continue;
            };
            let taken = coll
                .documents
                .iter()
                .any(|existing| index_key(spec, existing).as_ref() == Some(&key));
            if taken {
                return Err(InsertRejection::DuplicateKey(name.clone()));
            }
        }

        coll.documents.push(document);
        Ok(id)
    }

    /// Equality query. Also returns the index the server would pick: the one
    /// covering the most filter fields with all its keys bound.
    pub fn find(&self, collection: &str, filter: &Document) -> (Vec<Document>, Option<String>) {
        let state = self.state();
        let Some(coll) = state.collections.get(collection) else {
            return (Vec::new(), None);
        };

        let mut chosen: Option<&(String, IndexSpec)> = None;
        for candidate in &coll.indexes {
            let usable = candidate.1.fields().all(|f| filter.contains_key(f));
            let better = chosen
                .map(|(_, best)| candidate.1.keys.len() > best.keys.len())
                .unwrap_or(true);
            if usable && better {
                chosen = Some(candidate);
            }
        }

        let found = coll
            .documents
            .iter()
            .filter(|doc| {
                filter.iter().all(|(field, expected)| match doc.get(field) {
                    Some(Bson::Array(items)) => items.contains(expected),
                    Some(value) => value == expected,
                    None => matches!(expected, Bson::Null),
                })
            })
            .cloned()
            .collect();

        (found, chosen.map(|(name, _)| name.clone()))
    }
}

/// Key tuple for a unique index; `None` when a sparse index skips the document.
fn index_key(spec: &IndexSpec, document: &Document) -> Option<Vec<Bson>> {
    let values: Vec<Option<&Bson>> = spec.fields().map(|f| document.get(f)).collect();
    if spec.sparse && values.iter().all(Option::is_none) {
        return None;
    }
    Some(
        values
            .into_iter()
            .map(|v| v.cloned().unwrap_or(Bson::Null))
            .collect(),
    )
}

#[async_trait]
impl ProvisionTarget for InMemoryTarget {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn ping(&self) -> Result<(), ProvisionError> {
        self.log("ping".to_string());
        Ok(())
    }

    async fn principal_exists(&self, username: &str) -> Result<bool, ProvisionError> {
        self.log(format!("usersInfo {}", username));
        let state = self.state();
        Ok(!state.hide_principals && state.principals.contains_key(username))
    }

    async fn create_principal(
        &self,
        credential: &AppCredential,
    ) -> Result<StepOutcome, ProvisionError> {
        self.log(format!("createUser {}", credential.username));
        let mut state = self.state();
        if state.principals.contains_key(&credential.username) {
            return Ok(StepOutcome::AlreadyPresent);
        }
        state
            .principals
            .insert(credential.username.clone(), credential.roles_documents());
        Ok(StepOutcome::Created)
    }

    async fn set_roles(&self, credential: &AppCredential) -> Result<(), ProvisionError> {
        self.log(format!("updateUser {}", credential.username));
        self.state()
            .principals
            .insert(credential.username.clone(), credential.roles_documents());
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        self.log(format!("listCollections {}", name));
        let state = self.state();
        if state.views.contains(name) {
            return Err(ProvisionError::Duplicate {
                kind: ResourceKind::Collection,
                name: name.to_string(),
            });
        }
        Ok(!state.hide_collections && state.collections.contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        validator: Document,
    ) -> Result<StepOutcome, ProvisionError> {
        self.log(format!("create {}", name));
        let mut state = self.state();
        if state.collections.contains_key(name) {
            return Ok(StepOutcome::AlreadyPresent);
        }
        state.collections.insert(
            name.to_string(),
            MemoryCollection {
                validator,
                ..Default::default()
            },
        );
        Ok(StepOutcome::Created)
    }

    async fn update_validator(
        &self,
        name: &str,
        validator: Document,
    ) -> Result<(), ProvisionError> {
        self.log(format!("collMod {}", name));
        self.state()
            .collections
            .entry(name.to_string())
            .or_default()
            .validator = validator;
        Ok(())
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>, ProvisionError> {
        self.log(format!("listIndexes {}", collection));
        Ok(self
            .state()
            .collections
            .get(collection)
            .map(|c| c.indexes.iter().map(|(n, _)| n.clone()).collect())
            .unwrap_or_default())
    }

    async fn create_index(&self, index: &IndexSpec) -> Result<(), ProvisionError> {
        let name = index.name();
        self.log(format!("createIndexes {} {}", index.collection, name));
        let mut state = self.state();
        let coll = state
            .collections
            .entry(index.collection.to_string())
            .or_default();

        for (existing_name, existing) in &coll.indexes {
            let same_keys = existing.keys == index.keys;
            let same_options = existing.unique == index.unique && existing.sparse == index.sparse;
            if same_keys && same_options && existing_name == &name {
                return Ok(());
            }
            if same_keys || existing_name == &name {
                return Err(ProvisionError::Duplicate {
                    kind: ResourceKind::Index,
                    name: existing_name.clone(),
                });
            }
        }

        coll.indexes.push((name, index.clone()));
        Ok(())
    }
}
