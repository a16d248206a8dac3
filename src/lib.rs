//! Account-abstraction agent for portal contracts.
//!
//! An [`OperationAgent`] binds a private key to a Safe smart account, wraps
//! contract calls into ERC-4337 user operations, gets them sponsored and
//! submitted through a relay and waits for their receipts. The [`portal`]
//! module builds the portal-specific calls on top of it.
pub mod agent;
pub mod bindings;
pub mod config;
pub mod error;
pub mod portal;
pub mod relay;
pub mod server;

pub use agent::{AgentSettings, CallRequest, Confirmed, OperationAgent};
pub use config::Config;
pub use error::{AgentError, AgentResult};
pub use relay::UserOperationReceipt;
