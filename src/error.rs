//! Error handling for the sample bridge
//!
//! This module defines the crate error type and a Result alias used by the
//! host-facing operations and the engine backends.

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// An operation that needs a pipeline was called before `build` succeeded
    #[error("No pipeline installed")]
    NoPipeline,

    /// An element, pad or sink name was empty
    #[error("Empty {0} name")]
    EmptyName(&'static str),

    /// The host passed an empty callback
    #[error("Callback is empty")]
    EmptyCallback,

    /// The pipeline description could not be turned into a graph
    #[error("Pipeline parse error: {0}")]
    Parse(String),

    /// No element with this name exists in the graph
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The element exists but does not surface samples to the application
    #[error("Element '{0}' is not an app sink")]
    NotAnAppSink(String),

    /// The element exists but has no pad with this name
    #[error("Pad '{pad}' not found on element '{element}'")]
    PadNotFound { element: String, pad: String },

    /// A caps probe is already installed on this pad
    #[error("A caps probe is already registered on {element}:{pad}")]
    ProbeAlreadyRegistered { element: String, pad: String },

    /// The lifecycle code does not name a known state
    #[error("Unknown lifecycle state code: {0}")]
    UnknownState(u32),

    /// The engine refused a state change
    #[error("State change error: {0}")]
    StateChange(String),

    /// Any other failure reported by the media engine
    #[error("Engine error: {0}")]
    Engine(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BridgeError>,
    },
}

impl BridgeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BridgeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error came from resolving a name inside the graph
    pub fn is_resolution_failure(&self) -> bool {
        match self {
            BridgeError::ElementNotFound(_)
            | BridgeError::NotAnAppSink(_)
            | BridgeError::PadNotFound { .. } => true,
            BridgeError::WithContext { source, .. } => source.is_resolution_failure(),
            _ => false,
        }
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BridgeError {
    fn from(err: toml::ser::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::ElementNotFound("videoSink".to_string());
        assert_eq!(err.to_string(), "Element not found: videoSink");
    }

    #[test]
    fn test_error_with_context() {
        let err = BridgeError::NotAnAppSink("decoder".to_string());
        let with_ctx = err.with_context("Failed to register sink");
        assert!(with_ctx.to_string().contains("Failed to register sink"));
        assert!(with_ctx.is_resolution_failure());
    }

    #[test]
    fn test_pad_not_found_message() {
        let err = BridgeError::PadNotFound {
            element: "decoder".to_string(),
            pad: "src_1".to_string(),
        };
        assert!(err.to_string().contains("src_1"));
        assert!(err.to_string().contains("decoder"));
        assert!(!BridgeError::EmptyCallback.is_resolution_failure());
    }

    #[test]
    fn test_result_ext_context() {
        let result: Result<()> = Err(BridgeError::NoPipeline);
        let err = result.with_context(|| "build".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "build: No pipeline installed");
    }
}
