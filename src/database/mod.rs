use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, CreateCollectionOptions, ValidationAction, ValidationLevel};
use mongodb::{Client, Collection, Database};

use crate::config::{AppCredential, ProvisionConfig};
use crate::provisioner::{ProvisionTarget, StepOutcome};
use crate::schema::IndexSpec;
use crate::utils::{codes, server_code, ProvisionError, ResourceKind};

/// Administrative connection to the database being provisioned
#[derive(Clone)]
pub struct MongoDB {
    db: Database,
}

impl MongoDB {
    pub async fn connect(config: &ProvisionConfig) -> Result<Self, ProvisionError> {
        let mut client_options = ClientOptions::parse(&config.mongodb_uri)
            .await
            .map_err(|e| ProvisionError::from_mongo("parse connection string", e))?;

        // One sequential pass: a tiny pool is enough
        client_options.app_name = Some("sharespace-provisioner".to_string());
        client_options.max_pool_size = Some(2);
        client_options.min_pool_size = Some(0);
        client_options.connect_timeout = Some(config.connect_timeout);
        client_options.server_selection_timeout = Some(config.connect_timeout);

        let client = Client::with_options(client_options)
            .map_err(|e| ProvisionError::from_mongo("create client", e))?;
        let db = client.database(&config.database);

        let mongodb = Self { db };
        mongodb.ping().await?;
        log::info!("✅ MongoDB connected, target database: {}", config.database);

        Ok(mongodb)
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    #[cfg(test)]
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn command(
        &self,
        operation: &str,
        command: Document,
    ) -> Result<Document, ProvisionError> {
        self.db
            .run_command(command)
            .await
            .map_err(|e| ProvisionError::from_mongo(operation, e))
    }
}

#[async_trait]
impl ProvisionTarget for MongoDB {
    fn database_name(&self) -> &str {
        self.db.name()
    }

    async fn ping(&self) -> Result<(), ProvisionError> {
        self.command("ping", doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn principal_exists(&self, username: &str) -> Result<bool, ProvisionError> {
        let reply = self.command("usersInfo", doc! { "usersInfo": username }).await?;
        Ok(reply
            .get_array("users")
            .map(|users| !users.is_empty())
            .unwrap_or(false))
    }

    async fn create_principal(
        &self,
        credential: &AppCredential,
    ) -> Result<StepOutcome, ProvisionError> {
        let command = doc! {
            "createUser": credential.username.as_str(),
            "pwd": credential.password.as_str(),
            "roles": credential.roles_documents(),
        };

        match self.db.run_command(command).await {
            Ok(_) => Ok(StepOutcome::Created),
            Err(e) if server_code(&e) == Some(codes::USER_ALREADY_EXISTS) => {
                Ok(StepOutcome::AlreadyPresent)
            }
            Err(e) => Err(ProvisionError::from_mongo("createUser", e)),
        }
    }

    async fn set_roles(&self, credential: &AppCredential) -> Result<(), ProvisionError> {
        // Replaces the whole role set
        self.command(
            "updateUser",
            doc! {
                "updateUser": credential.username.as_str(),
                "roles": credential.roles_documents(),
            },
        )
        .await?;
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, ProvisionError> {
        let names = self
            .db
            .list_collection_names()
            .filter(doc! { "name": name })
            .await
            .map_err(|e| ProvisionError::from_mongo("listCollections", e))?;
        if !names.iter().any(|n| n == name) {
            return Ok(false);
        }

        let views = self
            .db
            .list_collection_names()
            .filter(doc! { "name": name, "type": "view" })
            .await
            .map_err(|e| ProvisionError::from_mongo("listCollections", e))?;
        if !views.is_empty() {
            return Err(ProvisionError::Duplicate {
                kind: ResourceKind::Collection,
                name: name.to_string(),
            });
        }
        Ok(true)
    }

    async fn create_collection(
        &self,
        name: &str,
        validator: Document,
    ) -> Result<StepOutcome, ProvisionError> {
        let mut options = CreateCollectionOptions::default();
        options.validator = Some(validator);
        options.validation_level = Some(ValidationLevel::Strict);
        options.validation_action = Some(ValidationAction::Error);

        match self.db.create_collection(name).with_options(options).await {
            Ok(()) => Ok(StepOutcome::Created),
            Err(e) if server_code(&e) == Some(codes::NAMESPACE_EXISTS) => {
                Ok(StepOutcome::AlreadyPresent)
            }
            Err(e) => Err(ProvisionError::from_mongo("create", e)),
        }
    }

    async fn update_validator(
        &self,
        name: &str,
        validator: Document,
    ) -> Result<(), ProvisionError> {
        self.command(
            "collMod",
            doc! {
                "collMod": name,
                "validator": validator,
                "validationLevel": "strict",
                "validationAction": "error",
            },
        )
        .await?;
        Ok(())
    }

    async fn index_names(&self, collection: &str) -> Result<Vec<String>, ProvisionError> {
        match self
            .collection::<Document>(collection)
            .list_index_names()
            .await
        {
            Ok(names) => Ok(names),
            Err(e) if server_code(&e) == Some(codes::NAMESPACE_NOT_FOUND) => Ok(Vec::new()),
            Err(e) => Err(ProvisionError::from_mongo("listIndexes", e)),
        }
    }

    async fn create_index(&self, index: &IndexSpec) -> Result<(), ProvisionError> {
        let collection = self.collection::<Document>(index.collection);
        match collection.create_index(index.to_model()).await {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    server_code(&e),
                    Some(codes::INDEX_OPTIONS_CONFLICT) | Some(codes::INDEX_KEY_SPECS_CONFLICT)
                ) =>
            {
                log::error!("   ❌ Index conflict on {}: {}", index.describe(), e);
                Err(ProvisionError::Duplicate {
                    kind: ResourceKind::Index,
                    name: index.name(),
                })
            }
            Err(e) => Err(ProvisionError::from_mongo("createIndexes", e)),
        }
    }
}
