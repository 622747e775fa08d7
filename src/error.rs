//! Error types for netlabel
//!
//! This module defines the error hierarchy for the labeling policy engine.
//! Table and dispatch operations return [`NetlabelError`]; the daemon's
//! configuration and control-plane subsystems have their own enums which all
//! fold into [`NetlabeldError`].

use std::io;

use thiserror::Error;

/// Top-level error type for the netlabeld daemon
#[derive(Debug, Error)]
pub enum NetlabeldError {
    /// Labeling table or dispatch errors
    #[error("Labeling error: {0}")]
    Netlabel(#[from] NetlabelError),

    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IPC communication errors
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NetlabeldError {
    /// Check if this error is recoverable (can retry operation)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Netlabel(e) => e.is_recoverable(),
            Self::Config(_) => false,
            Self::Ipc(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Errors returned by the policy tables and the dispatch layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetlabelError {
    /// No labeling policy resolves for the traffic
    #[error("No matching labeling policy")]
    NoEntry,

    /// An identical mapping is already present
    #[error("Mapping already exists")]
    AlreadyExists,

    /// The mapping to remove does not exist
    #[error("Mapping not found")]
    NotFound,

    /// Malformed input or incompatible policy kinds
    #[error("Invalid mapping: {0}")]
    Invalid(String),

    /// An address-selective domain was used before the peer address is known
    #[error("Destination address required for address-selective domain")]
    DestinationAddressRequired,

    /// Inbound traffic carries no label and unlabeled traffic is refused
    #[error("Unlabeled traffic is not accepted")]
    NoLabel,

    /// Address length or family other than IPv4/IPv6
    #[error("Address family not supported")]
    AddressFamilyUnsupported,

    /// The named network interface does not exist
    #[error("Network device not found: {0}")]
    NoDevice(String),

    /// Error reported by the CIPSO codec, propagated unchanged
    #[error("CIPSO codec error: {0}")]
    Codec(#[from] CodecError),
}

impl NetlabelError {
    /// Check if this error is recoverable
    ///
    /// Only a missing destination address can succeed on retry, once the
    /// caller knows the peer.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::DestinationAddressRequired)
    }

    /// Create an invalid mapping error
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// Errors reported by the CIPSO codec collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The DOI is not registered
    #[error("Unknown DOI {0}")]
    UnknownDoi(u32),

    /// A DOI with this value is already registered
    #[error("DOI {0} already registered")]
    DoiExists(u32),

    /// The DOI is still referenced by a labeling policy
    #[error("DOI {0} is in use")]
    DoiInUse(u32),

    /// The security attributes cannot be expressed in this DOI
    #[error("Cannot encode security attributes: {0}")]
    InvalidAttributes(String),

    /// A wire label could not be parsed
    #[error("Malformed CIPSO option: {0}")]
    Malformed(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

/// IPC communication errors
#[derive(Debug, Error)]
pub enum IpcError {
    /// Failed to create Unix socket
    #[error("Failed to create IPC socket at {path}: {reason}")]
    SocketCreation { path: String, reason: String },

    /// Failed to bind Unix socket
    #[error("Failed to bind IPC socket to {path}: {reason}")]
    BindError { path: String, reason: String },

    /// Connection error
    #[error("IPC connection error: {0}")]
    ConnectionError(String),

    /// Protocol error (invalid message format)
    #[error("IPC protocol error: {0}")]
    ProtocolError(String),

    /// Serialization error
    #[error("IPC serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("IPC I/O error: {0}")]
    IoError(#[from] io::Error),
}

impl IpcError {
    /// Check if this error is recoverable
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::SocketCreation { .. } | Self::BindError { .. } => false,
            Self::ConnectionError(_) | Self::ProtocolError(_) => true,
            Self::SerializationError(_) => false,
            Self::IoError(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
        }
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolError(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }
}

/// Type alias for Result with `NetlabeldError`
pub type Result<T> = std::result::Result<T, NetlabeldError>;
