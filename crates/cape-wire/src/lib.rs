//! CAPE wire protocol: agent sessions and remote invocation.
//!
//! Provides the collaborators the agent core talks to: a transport that opens
//! sessions for agents and delivers calls to them, and an invoker that calls
//! named methods on peers by address.
//!
//! ## Architecture
//!
//! - **PeerNode**: TCP endpoint hosting agents and always-on services
//! - **TcpInvoker**: one-shot request/response client over the same framing
//! - **LocalNetwork**: in-process transport and invoker
//! - **DirectoryRegistry**: reference directory mapping users' capabilities to providers
//! - **WireMessage**: JSON-framed protocol messages

pub mod address;
pub mod local;
pub mod message;
pub mod peer;
pub mod registry;
pub mod transport;

pub use address::AgentAddress;
pub use local::LocalNetwork;
pub use message::{RpcFault, WireMessage, WireRequest, WireResponse};
pub use peer::{PeerConfig, PeerNode, RpcHandler, TcpInvoker, WireError};
pub use registry::{DirectoryHandler, DirectoryRegistry};
pub use transport::{RemoteInvoker, Session, SessionTransport};
