//! # Messaging Module
//!
//! Node-to-node remote procedure surface: handover packets, the transport
//! seams, and a timeout-bounded RPC client.

pub mod errors;
pub mod message;
pub mod rpc_client;
pub mod transport;

pub use errors::{RpcError, RpcResult};
pub use message::{HandoverStatus, MessageAccounting, TaskHandoverPacket, TaskHandoverResponse};
pub use rpc_client::RpcClient;
pub use transport::{ClusterTransport, MembershipListener, RemoteProcedureHandler};
