//! IPC Protocol definitions
//!
//! This module defines the command and response types used for
//! inter-process communication via Unix socket.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::addr::AddrMask;
use crate::cipso::DoiDefinition;
use crate::config::{DomainMapping, LeafConfig, StaticMapping};
use crate::engine::NetlabelStatus;
use crate::error::{CodecError, NetlabelError};
use crate::label::{LabelType, SecAttr};

/// IPC command types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    /// Ping to check if the server is alive
    Ping,

    /// Get the daemon version
    Version,

    /// Get daemon and table status
    Status,

    /// List the supported labeling protocols
    Protocols,

    /// Add a domain mapping
    AddDomain {
        /// Mapping to add
        mapping: DomainMapping,
    },

    /// Add one address range to an address-selective domain mapping
    AddDomainAddress {
        /// Domain name (`None` for the default mapping)
        #[serde(default)]
        domain: Option<String>,
        /// Peer address range
        address: AddrMask,
        /// Policy for peers in the range
        leaf: LeafConfig,
    },

    /// Remove a domain mapping
    RemoveDomain {
        /// Domain name (`None` for the default mapping)
        #[serde(default)]
        domain: Option<String>,
    },

    /// Remove one address range from an address-selective domain mapping
    RemoveDomainAddress {
        /// Domain name (`None` for the default mapping)
        #[serde(default)]
        domain: Option<String>,
        /// Peer address range
        address: AddrMask,
    },

    /// List all domain mappings
    ListDomains,

    /// Add a static unlabeled mapping
    AddStatic {
        /// Mapping to add
        mapping: StaticMapping,
    },

    /// Remove a static unlabeled mapping
    RemoveStatic {
        /// Interface name (`None` for the default interface)
        #[serde(default)]
        interface: Option<String>,
        /// Source address range
        address: AddrMask,
    },

    /// Remove every static mapping of the default interface
    RemoveStaticDefault,

    /// List all static unlabeled mappings
    ListStatic,

    /// Get the accept-unlabeled flag
    GetAcceptUnlabeled,

    /// Set the accept-unlabeled flag
    SetAcceptUnlabeled {
        /// New value
        accept: bool,
    },

    /// An interface was removed from the system
    NotifyInterfaceDown {
        /// Index of the removed interface
        ifindex: u32,
    },

    /// Register a CIPSO DOI definition
    AddDoi {
        /// DOI definition
        definition: DoiDefinition,
    },

    /// Unregister a CIPSO DOI definition
    RemoveDoi {
        /// DOI value
        doi: u32,
    },

    /// Resolve the outbound policy for a domain and peer
    TestOutbound {
        /// Domain name (`None` selects the default mapping)
        #[serde(default)]
        domain: Option<String>,
        /// Peer address
        #[serde(default)]
        peer: Option<IpAddr>,
    },

    /// Resolve the attributes of unlabeled inbound traffic
    TestInbound {
        /// Receiving interface index
        ifindex: u32,
        /// Source address
        source: IpAddr,
    },

    /// Initiate graceful shutdown
    Shutdown,
}

/// IPC response types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Ping response
    Pong,

    /// Version response
    Version {
        /// Daemon version
        version: String,
    },

    /// Status response
    Status(ServerStatus),

    /// Supported labeling protocols
    Protocols {
        /// Protocol list
        protocols: Vec<LabelType>,
    },

    /// Domain mapping list
    DomainList {
        /// Mappings, default last
        domains: Vec<DomainMapping>,
    },

    /// Static mapping list
    StaticList {
        /// Mappings, default interface last
        mappings: Vec<StaticMapping>,
    },

    /// Accept-unlabeled flag
    AcceptUnlabeled {
        /// Current value
        accept: bool,
    },

    /// Outbound resolution result
    OutboundResult(OutboundResult),

    /// Inbound resolution result
    InboundResult(InboundResult),

    /// Success response (for commands that don't return data)
    Success {
        /// Optional message
        message: Option<String>,
    },

    /// Error response
    Error(ErrorResponse),
}

impl IpcResponse {
    /// Create a success response with no message
    pub fn success() -> Self {
        Self::Success { message: None }
    }

    /// Create a success response with a message
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success {
            message: Some(msg.into()),
        }
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorResponse {
            code,
            message: message.into(),
        })
    }

    /// Check if this is an error response
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl From<NetlabelError> for IpcResponse {
    fn from(err: NetlabelError) -> Self {
        Self::error(ErrorCode::from(&err), err.to_string())
    }
}

/// Server status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Server version
    pub version: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Labeling context state
    pub netlabel: NetlabelStatus,
}

/// Outcome of an outbound policy resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundResult {
    /// Protocol that would be applied
    pub label_type: LabelType,
    /// DOI for CIPSO leaves
    pub doi: Option<u32>,
}

/// Outcome of an inbound resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundResult {
    /// Resolved attributes
    pub secattr: SecAttr,
    /// Security context of the resolved identifier
    pub secctx: Option<String>,
}

/// IPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: ErrorCode,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

/// Error codes for IPC responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Unknown error
    Unknown,
    /// Invalid command
    InvalidCommand,
    /// Invalid parameters
    InvalidParameters,
    /// Resource not found
    NotFound,
    /// Resource already exists
    AlreadyExists,
    /// No policy resolves
    NoEntry,
    /// Unlabeled traffic refused
    NoLabel,
    /// Peer address needed to resolve the policy
    DestinationAddressRequired,
    /// Address family not supported
    AddressFamilyUnsupported,
    /// Network device not found
    NoDevice,
    /// Operation failed
    OperationFailed,
    /// Server is shutting down
    ShuttingDown,
    /// Permission denied
    PermissionDenied,
    /// Internal error
    InternalError,
}

impl From<&NetlabelError> for ErrorCode {
    fn from(err: &NetlabelError) -> Self {
        match err {
            NetlabelError::NoEntry => Self::NoEntry,
            NetlabelError::AlreadyExists => Self::AlreadyExists,
            NetlabelError::NotFound => Self::NotFound,
            NetlabelError::Invalid(_) => Self::InvalidParameters,
            NetlabelError::DestinationAddressRequired => Self::DestinationAddressRequired,
            NetlabelError::NoLabel => Self::NoLabel,
            NetlabelError::AddressFamilyUnsupported => Self::AddressFamilyUnsupported,
            NetlabelError::NoDevice(_) => Self::NoDevice,
            NetlabelError::Codec(CodecError::DoiExists(_)) => Self::AlreadyExists,
            NetlabelError::Codec(CodecError::UnknownDoi(_)) => Self::NotFound,
            NetlabelError::Codec(_) => Self::OperationFailed,
        }
    }
}

/// Message framing for IPC
///
/// Messages are length-prefixed:
/// - 4 bytes: message length (big-endian u32)
/// - N bytes: JSON message
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1 MB
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode a message with length prefix
///
/// # Errors
///
/// Returns the serializer's error, or a custom error if the encoded message
/// does not fit the length prefix.
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = u32::try_from(json.len())
        .map_err(|_| serde::ser::Error::custom("message exceeds u32 length prefix"))?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);

    Ok(buf)
}

/// Decode a length-prefixed message
///
/// # Errors
///
/// Returns the deserializer's error for malformed JSON.
pub fn decode_message<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}
