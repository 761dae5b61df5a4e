use mongodb::bson::{doc, Document};
use std::env;
use std::time::Duration;

use crate::utils::ProvisionError;

pub const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE: &str = "sharespace";
pub const DEFAULT_APP_USER: &str = "sharespace_app";
/// Placeholder secret; production deployments must set SHARESPACE_APP_PASSWORD
pub const PLACEHOLDER_APP_PASSWORD: &str = "sharespace_password";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Built-in role granted on a single database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn read_write(db: &str) -> Self {
        Self {
            role: "readWrite".to_string(),
            db: db.to_string(),
        }
    }

    pub fn to_document(&self) -> Document {
        doc! { "role": self.role.as_str(), "db": self.db.as_str() }
    }
}

/// Database principal used by the application
#[derive(Clone, PartialEq, Eq)]
pub struct AppCredential {
    pub username: String,
    pub password: String,
    pub roles: Vec<RoleGrant>,
}

impl AppCredential {
    /// `readWrite` on `database` and nothing else.
    pub fn scoped_to(username: &str, password: &str, database: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            roles: vec![RoleGrant::read_write(database)],
        }
    }

    pub fn roles_documents(&self) -> Vec<Document> {
        self.roles.iter().map(RoleGrant::to_document).collect()
    }

    pub fn uses_placeholder_password(&self) -> bool {
        self.password == PLACEHOLDER_APP_PASSWORD
    }
}

// Never print the secret
impl std::fmt::Debug for AppCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

/// Everything a provisioning run needs; no ambient state.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    pub mongodb_uri: String,
    pub database: String,
    pub credential: AppCredential,
    pub connect_timeout: Duration,
    /// Check and print the plan without connecting
    pub dry_run: bool,
}

impl ProvisionConfig {
    pub fn new(mongodb_uri: &str, database: &str) -> Self {
        Self {
            mongodb_uri: mongodb_uri.to_string(),
            database: database.to_string(),
            credential: AppCredential::scoped_to(
                DEFAULT_APP_USER,
                PLACEHOLDER_APP_PASSWORD,
                database,
            ),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            dry_run: false,
        }
    }

    /// Reads the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ProvisionError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProvisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mongodb_uri = get("MONGODB_URI")
            .or_else(|| get("DATABASE_URL"))
            .unwrap_or_else(|| DEFAULT_MONGODB_URI.to_string());
        let database = get("MONGODB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        if database.contains(['/', '\\', '.', ' ', '"', '$']) {
            return Err(ProvisionError::config(format!(
                "MONGODB_DATABASE '{}' is not a valid database name",
                database
            )));
        }

        let username = get("SHARESPACE_APP_USER").unwrap_or_else(|| DEFAULT_APP_USER.to_string());
        let password =
            get("SHARESPACE_APP_PASSWORD").unwrap_or_else(|| PLACEHOLDER_APP_PASSWORD.to_string());

        let connect_timeout = match get("MONGODB_CONNECT_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ProvisionError::config(format!(
                    "MONGODB_CONNECT_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        let dry_run = match get("PROVISION_DRY_RUN").as_deref().map(str::trim) {
            None => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            Some(other) => {
                return Err(ProvisionError::config(format!(
                    "PROVISION_DRY_RUN must be true or false, got '{}'",
                    other
                )))
            }
        };

        let mut config = Self::new(&mongodb_uri, &database);
        config.credential = AppCredential::scoped_to(&username, &password, &database);
        config.connect_timeout = Duration::from_secs(connect_timeout);
        config.dry_run = dry_run;
        Ok(config)
    }
}
