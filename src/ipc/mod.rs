//! IPC (Inter-Process Communication) module
//!
//! This module provides a Unix socket-based IPC server for administering
//! the labeling tables at runtime.
//!
//! # Protocol
//!
//! Messages are length-prefixed JSON:
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: JSON-encoded command or response
//!
//! Mutating commands are audited with the uid and pid of the connected
//! peer, taken from the socket's credentials.
//!
//! # Example
//!
//! ```no_run
//! use netlabel::ipc::{IpcClient, IpcCommand, IpcResponse};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = IpcClient::new("/var/run/netlabeld.sock");
//!
//! if client.ping().await? {
//!     println!("Server is alive!");
//! }
//!
//! let response = client.send(IpcCommand::ListDomains).await?;
//! if let IpcResponse::DomainList { domains } = response {
//!     println!("{} domain mappings", domains.len());
//! }
//! # Ok(())
//! # }
//! ```

mod handler;
mod protocol;
mod server;

pub use handler::IpcHandler;
pub use protocol::{
    decode_message, encode_message, ErrorCode, ErrorResponse, InboundResult, IpcCommand,
    IpcResponse, OutboundResult, ServerStatus, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE,
};
pub use server::{IpcClient, IpcServer};
