use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RatatoskError>;

/// Unified error type for the whole proxy.
#[derive(Debug, Clone, Error)]
pub enum RatatoskError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("invalid proxy URL: {0}")]
    InvalidProxyUrl(String),
    #[error("failed to build HTTPS client: {0}")]
    ClientBuild(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("upstream returned HTTP status {0}")]
    UpstreamStatus(u16),

    #[error("record translation failed: {0}")]
    RecordTranslation(String),
    #[error("DNS codec error: {0}")]
    Codec(String),

    #[error("dispatch queue closed")]
    QueueClosed,
    #[error("listener task failed: {0}")]
    ListenerFailed(String),
}

impl From<std::io::Error> for RatatoskError {
    fn from(err: std::io::Error) -> Self {
        RatatoskError::Io(Arc::new(err))
    }
}

impl From<hickory_proto::ProtoError> for RatatoskError {
    fn from(err: hickory_proto::ProtoError) -> Self {
        RatatoskError::Codec(err.to_string())
    }
}

impl From<reqwest::Error> for RatatoskError {
    fn from(err: reqwest::Error) -> Self {
        RatatoskError::Upstream(err.to_string())
    }
}
