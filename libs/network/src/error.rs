//! Broker Error Types
//!
//! Failures raised by broker connections, channels and topology declaration.

use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not reach or authenticate with the broker
    #[error("Connection error: {message} (url: {url:?})")]
    Connection {
        message: String,
        url: Option<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Channel level failure (declare, bind, publish, consume)
    #[error("Channel error: {operation}: {message}")]
    Channel {
        operation: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid broker url or options
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Exclusive queue owned by another connection, or already being consumed
    #[error("Resource locked: {resource}: {message}")]
    ResourceLocked { resource: String, message: String },

    /// Exchange or queue does not exist
    #[error("Not found: {kind} '{name}'")]
    NotFound { kind: &'static str, name: String },

    /// Channel or connection already closed
    #[error("Channel closed: {message}")]
    Closed { message: String },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>, url: Option<&str>) -> Self {
        Self::Connection {
            message: message.into(),
            url: url.map(|u| u.to_string()),
            source: None,
        }
    }

    /// Create a connection error with source
    #[cfg(feature = "amqp")]
    pub fn connection_with_source(
        message: impl Into<String>,
        url: Option<&str>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            url: url.map(|u| u.to_string()),
            source: Some(Box::new(source)),
        }
    }

    /// Create a channel error
    pub fn channel(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a channel error with source
    #[cfg(feature = "amqp")]
    pub fn channel_with_source(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Channel {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    pub fn resource_locked(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceLocked {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    /// Check if this is a transient error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connection { .. } | TransportError::Io { .. } | TransportError::ResourceLocked { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Connection { .. } => "connection",
            TransportError::Channel { .. } => "channel",
            TransportError::Configuration { .. } => "configuration",
            TransportError::ResourceLocked { .. } => "resource_locked",
            TransportError::NotFound { .. } => "not_found",
            TransportError::Closed { .. } => "closed",
            TransportError::Io { .. } => "io",
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
            source: error,
        }
    }
}
