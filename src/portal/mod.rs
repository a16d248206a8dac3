//! Portal contract helpers: reads through the chain client, writes through
//! the agent, assets through a content gateway.
pub mod gateway;
pub mod operations;
pub mod reader;

pub use gateway::{asset_url, normalize_gateway_url, with_retry, GatewayClient, DEFAULT_GATEWAY};
pub use operations::{
    add_file_call, delete_file_call, edit_file_call, mint_call, update_metadata_call,
    MintRequest, PortalOperations, FILE_TRX_TIMEOUT, PORTAL_MINT_TIMEOUT,
};
pub use reader::{KeyVerifiers, PortalFileRecord, PortalReader};

/// Metadata and content hash written over a deleted file.
pub const DELETED_FILE_HASH: &str = "deleted";
