//! Agent core for CAPE.
//!
//! An agent holds transport credentials, opens a session with them,
//! advertises the capabilities it serves to the directory, and routes
//! notifications and contact lookups to whichever peer the directory names.

pub mod account;
pub mod agent;
pub mod client;
pub mod config;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod node;
pub mod routing;
pub mod session;

pub use agent::{
    AgentContext, CapeAgent, ContactsProvider, LogNotifications, NotificationHandler, StaticContacts,
};
pub use client::CapeClient;
pub use error::{KernelError, KernelResult};
pub use node::CapeNode;
pub use session::SessionState;
