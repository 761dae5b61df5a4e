use mongodb::error::{Error as MongoError, ErrorKind};
use thiserror::Error;

/// Server error codes the provisioner reacts to.
pub mod codes {
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    pub const NAMESPACE_EXISTS: i32 = 48;
    pub const INDEX_OPTIONS_CONFLICT: i32 = 85;
    pub const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
    pub const USER_ALREADY_EXISTS: i32 = 51003;
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("{kind} '{name}' already exists")]
    Duplicate { kind: ResourceKind, name: String },

    #[error("Invalid definition for '{collection}': {message}")]
    Schema { collection: String, message: String },

    #[error("Cannot reach MongoDB: {source}")]
    Connectivity { source: MongoError },

    #[error("Database error during {operation}: {source}")]
    Database {
        source: MongoError,
        operation: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A view or other non-collection namespace under a managed name
    Collection,
    Index,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Collection => write!(f, "Collection"),
            ResourceKind::Index => write!(f, "Index"),
        }
    }
}

impl ProvisionError {
    pub fn schema(collection: &str, message: impl Into<String>) -> Self {
        ProvisionError::Schema {
            collection: collection.to_string(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ProvisionError::Config {
            message: message.into(),
        }
    }

    /// Classifies a driver error: unreachable servers become `Connectivity`,
    /// everything else is a `Database` error tagged with the failing step.
    pub fn from_mongo(operation: &str, error: MongoError) -> Self {
        let unreachable = matches!(
            *error.kind,
            ErrorKind::ServerSelection { .. }
                | ErrorKind::Io(_)
                | ErrorKind::ConnectionPoolCleared { .. }
                | ErrorKind::DnsResolve { .. }
        );
        if unreachable {
            return ProvisionError::Connectivity { source: error };
        }

        log::error!("MongoDB {} operation failed: {}", operation, error);
        ProvisionError::Database {
            source: error,
            operation: operation.to_string(),
        }
    }
}

/// Returns the server error code carried by a command or write failure.
pub fn server_code(error: &MongoError) -> Option<i32> {
    match *error.kind {
        ErrorKind::Command(ref command_error) => Some(command_error.code),
        ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref write_error)) => {
            Some(write_error.code)
        }
        _ => None,
    }
}
