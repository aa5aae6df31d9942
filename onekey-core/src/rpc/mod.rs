//! Line-delimited JSON protocol between the host and the sidecar process.
//!
//! One JSON object per line. The sidecar announces itself with a ready
//! line, then answers each request line with exactly one response line.

pub mod client;
pub mod framing;
pub mod protocol;
pub mod server;

pub use client::{RpcClientError, RpcTransport, SidecarClient, SidecarProcessConfig};
pub use framing::LineBuffer;
pub use protocol::{EntryRecord, RpcError, RpcRequest, RpcResponse};
pub use server::{Method, SidecarServer, SidecarSession};
