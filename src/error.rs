use thiserror::Error;

use crate::reference::ObjectType;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Malformed {object_type} reference '{text}': {reason}")]
    MalformedReference { object_type: ObjectType, text: String, reason: String },
    #[error("No value for {object_type} {text} found in Tryton")]
    ReferenceNotFound { object_type: ObjectType, text: String },
    #[error("{object_type} {identifier} not found in Tryton")]
    DefinitionNotFound { object_type: ObjectType, identifier: String },
    #[error("Unknown object type '{0}'")]
    UnknownObjectType(String),
    #[error("Backend unavailable: {cause}")]
    BackendUnavailable { cause: String },
    #[error("Invalid identifier '{identifier}'")]
    InvalidIdentifier { identifier: String },
    #[error("Model '{model}' not found")]
    ModelNotFound { model: String },
    #[error("Field '{model}.{field}' not found")]
    FieldNotFound { model: String, field: String },
    #[error("Objects of type {0} have no resolvable properties")]
    UnsupportedType(ObjectType),
    #[error("Module graph error: {0}")]
    ModuleGraph(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("Build worker failed: {0}")]
    Worker(String),
    #[error("Build failed with {0} broken definition(s)")]
    BrokenDefinitions(usize),
}

impl DomainError {
    /// Errors that a reference occurrence degrades to "not found" instead of failing the build.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ReferenceNotFound { .. }
                | Self::DefinitionNotFound { .. }
                | Self::BackendUnavailable { .. }
                | Self::InvalidIdentifier { .. }
                | Self::ModelNotFound { .. }
                | Self::FieldNotFound { .. }
                | Self::UnsupportedType(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;

// Helper conversions
impl From<rusqlite::Error> for DomainError {
    fn from(e: rusqlite::Error) -> Self { Self::BackendUnavailable { cause: e.to_string() } }
}
impl From<config::ConfigError> for DomainError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
