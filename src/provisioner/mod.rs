//! Sequential, create-if-absent provisioning of the ShareSpace database.

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::Document;
use serde::Serialize;
use std::collections::HashMap;

use crate::config::{AppCredential, ProvisionConfig};
use crate::schema::{
    all_collections, check_definitions, check_samples, index_plan, CollectionSchema, IndexSpec,
};
use crate::utils::ProvisionError;

/// What a `create*` call on the target actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Created,
    /// Existing resource brought in line with the declared definition
    Updated,
    AlreadyPresent,
}

/// The database operations the provisioner needs.
///
/// `create_principal` and `create_collection` report `AlreadyPresent` when
/// they lose a race against a concurrent run instead of failing.
/// `create_index` succeeds without change when the same definition already
/// exists and fails with `Duplicate` when the name or keys are taken by a
/// different one.
#[async_trait]
pub trait ProvisionTarget: Send + Sync {
    fn database_name(&self) -> &str;

    async fn ping(&self) -> Result<(), ProvisionError>;

    async fn principal_exists(&self, username: &str) -> Result<bool, ProvisionError>;
    async fn create_principal(
        &self,
        credential: &AppCredential,
    ) -> Result<StepOutcome, ProvisionError>;
    /// Replaces the principal's roles with exactly `credential.roles`.
    async fn set_roles(&self, credential: &AppCredential) -> Result<(), ProvisionError>;

    /// `Duplicate` when the name is taken by a view.
    async fn collection_exists(&self, name: &str) -> Result<bool, ProvisionError>;
    async fn create_collection(
        &self,
        name: &str,
        validator: Document,
    ) -> Result<StepOutcome, ProvisionError>;
    async fn update_validator(&self, name: &str, validator: Document)
        -> Result<(), ProvisionError>;

    async fn index_names(&self, collection: &str) -> Result<Vec<String>, ProvisionError>;
    async fn create_index(&self, index: &IndexSpec) -> Result<(), ProvisionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Step {
    Principal(String),
    Collection(String),
    Index(String),
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Principal(name) => write!(f, "principal {}", name),
            Step::Collection(name) => write!(f, "collection {}", name),
            Step::Index(name) => write!(f, "index {}", name),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: Step,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub database: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
}

impl ProvisionReport {
    fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: Step, outcome: StepOutcome) {
        self.steps.push(StepReport { step, outcome });
    }

    pub fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }

    #[cfg(test)]
    pub fn outcome_of(&self, step: &Step) -> Option<StepOutcome> {
        self.steps
            .iter()
            .find(|s| &s.step == step)
            .map(|s| s.outcome)
    }

    /// True when the run found everything in place (nothing was created).
    pub fn is_noop(&self) -> bool {
        self.count(StepOutcome::Created) == 0
    }

    pub fn log_summary(&self) {
        let collections: Vec<String> = self
            .steps
            .iter()
            .filter_map(|s| match &s.step {
                Step::Collection(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        let principal = self.steps.iter().find_map(|s| match &s.step {
            Step::Principal(name) => Some(name.clone()),
            _ => None,
        });
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
            .unwrap_or_default();

        log::info!(
            "✅ Database '{}' provisioned in {} ms: {} created, {} updated, {} already present",
            self.database,
            elapsed,
            self.count(StepOutcome::Created),
            self.count(StepOutcome::Updated),
            self.count(StepOutcome::AlreadyPresent)
        );
        if self.is_noop() {
            log::info!("   Nothing to create: the database was already provisioned");
        }
        log::info!("   Collections: {}", collections.join(", "));
        if let Some(principal) = principal {
            log::info!("   Application user: {}", principal);
        }
    }
}

/// Validated definitions plus the principal to provision.
///
/// Construction checks every definition, so malformed rules fail before any
/// connection is made.
#[derive(Debug, Clone)]
pub struct Provisioner {
    credential: AppCredential,
    collections: Vec<CollectionSchema>,
    indexes: Vec<IndexSpec>,
}

impl Provisioner {
    pub fn new(config: &ProvisionConfig) -> Result<Self, ProvisionError> {
        Self::with_definitions(config.credential.clone(), all_collections(), index_plan())
    }

    pub fn with_definitions(
        credential: AppCredential,
        collections: Vec<CollectionSchema>,
        indexes: Vec<IndexSpec>,
    ) -> Result<Self, ProvisionError> {
        check_definitions(&collections, &indexes)?;
        check_samples(&collections)?;
        Ok(Self {
            credential,
            collections,
            indexes,
        })
    }

    /// Principal, then collections, then indexes. Stops at the first error.
    pub async fn run<T>(&self, target: &T) -> Result<ProvisionReport, ProvisionError>
    where
        T: ProvisionTarget + ?Sized,
    {
        let mut report = ProvisionReport::new(target.database_name());
        log::info!(
            "🚀 Starting ShareSpace database initialization on '{}'...",
            target.database_name()
        );

        target.ping().await?;

        let outcome = self.ensure_principal(target).await?;
        report.record(Step::Principal(self.credential.username.clone()), outcome);

        for schema in &self.collections {
            let outcome = self.define_collection(target, schema).await?;
            report.record(Step::Collection(schema.name.to_string()), outcome);
        }

        log::info!("🔧 Creating indexes...");
        let mut existing: HashMap<&str, Vec<String>> = HashMap::new();
        for index in &self.indexes {
            if !existing.contains_key(index.collection) {
                let names = target.index_names(index.collection).await?;
                existing.insert(index.collection, names);
            }
            let known = existing.entry(index.collection).or_default();
            let outcome = Self::create_index(target, index, known).await?;
            report.record(Step::Index(index.describe()), outcome);
        }

        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    async fn ensure_principal<T>(&self, target: &T) -> Result<StepOutcome, ProvisionError>
    where
        T: ProvisionTarget + ?Sized,
    {
        let username = &self.credential.username;
        if self.credential.uses_placeholder_password() {
            log::warn!(
                "⚠️  Using the placeholder password for '{}'; set SHARESPACE_APP_PASSWORD in production",
                username
            );
        }

        if target.principal_exists(username).await? {
            target.set_roles(&self.credential).await?;
            log::warn!(
                "   ℹ️  Application user '{}' already exists: roles reset, password left untouched",
                username
            );
            return Ok(StepOutcome::Updated);
        }

        match target.create_principal(&self.credential).await? {
            StepOutcome::Created => {
                log::info!("   ✅ Application user created: {}", username);
                Ok(StepOutcome::Created)
            }
            _ => {
                // Created concurrently between the lookup and the create
                target.set_roles(&self.credential).await?;
                log::warn!(
                    "   ℹ️  Application user '{}' appeared concurrently: roles reset",
                    username
                );
                Ok(StepOutcome::Updated)
            }
        }
    }

    async fn define_collection<T>(
        &self,
        target: &T,
        schema: &CollectionSchema,
    ) -> Result<StepOutcome, ProvisionError>
    where
        T: ProvisionTarget + ?Sized,
    {
        log::info!("Creating {} collection...", schema.name);
        let validator = schema.to_validator();

        if !target.collection_exists(schema.name).await? {
            match target.create_collection(schema.name, validator.clone()).await? {
                StepOutcome::Created => {
                    log::info!("   ✅ Collection created: {}", schema.name);
                    return Ok(StepOutcome::Created);
                }
                _ => log::debug!("Collection {} appeared concurrently", schema.name),
            }
        }

        target.update_validator(schema.name, validator).await?;
        log::info!(
            "   ℹ️  Collection {} already exists: validator re-applied",
            schema.name
        );
        Ok(StepOutcome::Updated)
    }

    async fn create_index<T>(
        target: &T,
        index: &IndexSpec,
        known: &mut Vec<String>,
    ) -> Result<StepOutcome, ProvisionError>
    where
        T: ProvisionTarget + ?Sized,
    {
        // Submitted even when the name is known: an identical definition is a
        // no-op, a different one under the same name is rejected
        target.create_index(index).await?;

        let name = index.name();
        if known.contains(&name) {
            log::debug!("   ℹ️  Index already exists: {}", index.describe());
            return Ok(StepOutcome::AlreadyPresent);
        }
        known.push(name);
        log::info!("   ✅ Index created: {}", index.describe());
        Ok(StepOutcome::Created)
    }

    /// Logs the plan without touching the database.
    pub fn log_plan(&self, config: &ProvisionConfig) -> Result<(), serde_json::Error> {
        log::info!("📋 Provisioning plan for database '{}'", config.database);
        log::info!(
            "   Application user: {} with {:?}",
            self.credential.username,
            self.credential
                .roles
                .iter()
                .map(|r| format!("{}@{}", r.role, r.db))
                .collect::<Vec<_>>()
        );
        for schema in &self.collections {
            let validator = serde_json::to_string_pretty(&schema.to_validator())?;
            log::info!("   Collection {} validator:\n{}", schema.name, validator);
        }
        for index in &self.indexes {
            log::info!("   Index {} on {}", index.name(), index.describe());
        }
        Ok(())
    }
}
