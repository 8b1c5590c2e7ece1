use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store rejected operation: {0}")]
    StoreOperation(String),

    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;

impl ReportError {
    /// True for transport-level failures, where the request may never have
    /// reached the store.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ReportError::StoreUnavailable(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ReportError::InvalidSpec(msg.into())
    }
}

impl serde::Serialize for ReportError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<mongodb::error::Error> for ReportError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        match err.kind.as_ref() {
            ErrorKind::Io(_)
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::ConnectionPoolCleared { .. }
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::Shutdown => ReportError::StoreUnavailable(err.to_string()),
            ErrorKind::BsonSerialization(_) | ErrorKind::BsonDeserialization(_) => {
                ReportError::Decode(err.to_string())
            }
            _ => ReportError::StoreOperation(err.to_string()),
        }
    }
}

impl From<mongodb::bson::ser::Error> for ReportError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        ReportError::InvalidSpec(format!("value cannot be encoded: {}", err))
    }
}
