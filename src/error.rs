use std::path::PathBuf;

use thiserror::Error;

/// Field-level problems found while creating or editing a host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("host name cannot be empty")]
    EmptyName,

    #[error("host address cannot be empty")]
    EmptyAddress,

    #[error("a host named '{0}' already exists")]
    DuplicateName(String),

    #[error("port {0} is out of range (1-65535)")]
    PortOutOfRange(i64),

    #[error("host '{0}' cannot use itself as bastion")]
    SelfBastion(String),

    #[error("circular bastion reference involving '{0}'")]
    BastionCycle(String),
}

/// Quick-connect input that could not be turned into a host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("nothing to connect to")]
    Empty,

    #[error("could not split input: {0}")]
    Tokenize(String),

    #[error("ssh target missing (expected user@host or host)")]
    MissingHost,

    #[error("flag {0} expects a value")]
    MissingValue(String),

    #[error("invalid port value '{0}'")]
    InvalidPort(String),
}

/// Reasons a command could not be described for a host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("bastion host '{0}' not found")]
    UnresolvedBastion(String),

    #[error("circular bastion chain through '{0}'")]
    BastionCycle(String),

    #[error("host '{0}' has invalid port {1}")]
    InvalidPort(String, i64),
}

/// The persisted file exists but cannot be used. The file is left untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid registry in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },

    #[error("failed to create {}: {source}", path.display())]
    Init {
        path: PathBuf,
        #[source]
        source: PersistenceError,
    },
}

/// A write, sync or rename of the persisted file failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to serialize registry: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PersistenceError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        PersistenceError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Errors surfaced by registry intents.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no host named '{0}'")]
    NotFound(String),

    #[error("nothing to undo")]
    EmptyUndoStack,

    /// The in-memory registry already holds the change; disk is behind.
    #[error("registry changed in memory but saving failed: {0}")]
    Persistence(#[from] PersistenceError),
}
