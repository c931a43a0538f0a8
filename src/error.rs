//! Error types for dictionary loading and packet synchronisation.
//!
//! Only the loading and transport layers return errors. Decoding a field that
//! falls outside the packet buffer, or evaluating a derived value that fails,
//! yields `None` instead (see [`crate::dictionary::FieldDefinition::decode`]
//! and [`crate::scope::PacketScope::evaluate`]).
//!
//! ## Error Categories
//!
//! - **Dictionary Errors**: malformed telemetry, command, event or limits documents
//! - **Type Errors**: a dictionary names a type the registry cannot resolve
//! - **Expression Errors**: a constant or derived function does not parse
//! - **Connection Errors**: the realtime transport failed or closed unexpectedly
//! - **Protocol Errors**: a wire message could not be understood
//! - **Snapshot Errors**: fetching a full snapshot failed
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use downlink::DownlinkError;
//!
//! let error = DownlinkError::connection_failed("socket reset by peer");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for downlink operations.
pub type Result<T, E = DownlinkError> = std::result::Result<T, E>;

/// Main error type for downlink operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DownlinkError {
    #[error("Dictionary error in {context}: {details}")]
    Dictionary { context: String, details: String },

    #[error("Unknown type '{type_name}'")]
    UnknownType { type_name: String },

    #[error("Invalid expression '{expression}': {details}")]
    Expression { expression: String, details: String },

    #[error("Realtime connection failed: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Protocol error: {details}")]
    Protocol { details: String },

    #[error("Packet '{packet}' not found in telemetry dictionary")]
    PacketNotFound { packet: String },

    #[error("Field '{field}' not found in packet '{packet}'")]
    FieldNotFound { packet: String, field: String },

    #[error("Snapshot request failed: {reason}")]
    Snapshot {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl DownlinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownlinkError::Connection { .. } => true,
            DownlinkError::Timeout { .. } => true,
            DownlinkError::Snapshot { .. } => true,
            DownlinkError::Protocol { .. } => true,
            DownlinkError::Dictionary { .. } => false,
            DownlinkError::UnknownType { .. } => false,
            DownlinkError::Expression { .. } => false,
            DownlinkError::PacketNotFound { .. } => false,
            DownlinkError::FieldNotFound { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            DownlinkError::Dictionary { .. } => vec![
                "Validate the dictionary document against the expected layout",
                "Check that every packet uid is unique",
                "Reload dictionaries from the ground server",
            ],
            DownlinkError::UnknownType { .. } => vec![
                "Check the type name spelling (e.g. MSB_U16, LSB_F32, S8, U8[4])",
                "Use CMD16, EVR16, TIME8, TIME32 or TIME64 for reference and time types",
            ],
            DownlinkError::Expression { .. } => vec![
                "Check parentheses and operators in the dictionary expression",
                "Verify referenced constants and functions are declared",
            ],
            DownlinkError::Connection { .. } => vec![
                "Verify the ground server is running",
                "Check network connectivity to the realtime endpoint",
                "Reconnect to receive a fresh snapshot",
            ],
            DownlinkError::Timeout { .. } => vec![
                "Increase timeout duration",
                "Check ground server load",
                "Verify the instrument is producing telemetry",
            ],
            DownlinkError::Protocol { .. } => vec![
                "Request a full snapshot to resynchronise",
                "Check client and server protocol versions",
            ],
            DownlinkError::PacketNotFound { .. } => vec![
                "Check packet name spelling",
                "Verify the telemetry dictionary matches the server",
            ],
            DownlinkError::FieldNotFound { .. } => vec![
                "Check field name spelling",
                "Verify the field exists in the packet definition",
            ],
            DownlinkError::Snapshot { .. } => vec![
                "Retry the snapshot request",
                "Verify the latest-state endpoint is reachable",
            ],
        }
    }

    /// Helper constructor for dictionary errors.
    pub fn dictionary_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        DownlinkError::Dictionary { context: context.into(), details: details.into() }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        DownlinkError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        DownlinkError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for snapshot failures.
    pub fn snapshot_failed(reason: impl Into<String>) -> Self {
        DownlinkError::Snapshot { reason: reason.into(), source: None }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol_error(details: impl Into<String>) -> Self {
        DownlinkError::Protocol { details: details.into() }
    }

    /// Helper constructor for expression errors.
    pub fn expression_error(expression: impl Into<String>, details: impl Into<String>) -> Self {
        DownlinkError::Expression { expression: expression.into(), details: details.into() }
    }
}

impl From<serde_json::Error> for DownlinkError {
    fn from(err: serde_json::Error) -> Self {
        DownlinkError::Dictionary { context: "JSON document".to_string(), details: err.to_string() }
    }
}

impl From<serde_yaml_ng::Error> for DownlinkError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        DownlinkError::Dictionary { context: "YAML document".to_string(), details: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            reason in ".*",
            packet in "\\w+",
            field in "\\w+",
            duration_ms in 1u64..60000u64
        ) {
            let connection = DownlinkError::connection_failed(reason.clone());
            prop_assert!(connection.to_string().contains(&reason));

            let missing = DownlinkError::FieldNotFound { packet: packet.clone(), field: field.clone() };
            let msg = missing.to_string();
            prop_assert!(msg.contains(&packet));
            prop_assert!(msg.contains(&field));

            let timeout = DownlinkError::Timeout { duration: Duration::from_millis(duration_ms) };
            prop_assert!(!timeout.to_string().is_empty());
        }

        #[test]
        fn source_chain_is_preserved(base_message in ".*") {
            let source: Box<dyn std::error::Error + Send + Sync> =
                Box::new(std::io::Error::other(base_message.clone()));
            let error = DownlinkError::connection_failed_with_source("socket", source);

            let inner = std::error::Error::source(&error);
            prop_assert!(inner.is_some());
            prop_assert_eq!(inner.map(|e| e.to_string()), Some(base_message));
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<DownlinkError>();

        let error = DownlinkError::connection_failed("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retry_classification() {
        assert!(DownlinkError::connection_failed("x").is_retryable());
        assert!(DownlinkError::snapshot_failed("x").is_retryable());
        assert!(!DownlinkError::dictionary_error("tlm", "bad").is_retryable());
        assert!(!DownlinkError::UnknownType { type_name: "Q9".into() }.is_retryable());

        for suggestion in DownlinkError::connection_failed("x").recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
    }

    #[test]
    fn serde_errors_map_to_dictionary_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(DownlinkError::from(json_err), DownlinkError::Dictionary { .. }));

        let yaml_err = serde_yaml_ng::from_str::<Vec<u32>>("[1, two").unwrap_err();
        assert!(matches!(DownlinkError::from(yaml_err), DownlinkError::Dictionary { .. }));
    }
}
