use catalog::StoreError;
use foundation::RecordId;
use layers::ReconcileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "config read failed: {msg}"),
            ConfigError::Parse(msg) => write!(f, "config parse failed: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    Store(StoreError),
    /// The records document is not a JSON array of memories.
    Decode(String),
    Encode(String),
    Map(ReconcileError),
    NoRelocationPending,
    /// No record matches the identity (or timestamp) being relocated.
    RelocationTargetMissing(RecordId),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Store(e) => write!(f, "session store: {e}"),
            SessionError::Decode(msg) => write!(f, "invalid memories document: {msg}"),
            SessionError::Encode(msg) => write!(f, "failed to serialize memories: {msg}"),
            SessionError::Map(e) => write!(f, "{e}"),
            SessionError::NoRelocationPending => write!(f, "no relocation in progress"),
            SessionError::RelocationTargetMissing(id) => {
                write!(f, "no memory matches '{}'", id.as_str())
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Store(e) => Some(e),
            SessionError::Map(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        SessionError::Store(e)
    }
}

impl From<ReconcileError> for SessionError {
    fn from(e: ReconcileError) -> Self {
        SessionError::Map(e)
    }
}
