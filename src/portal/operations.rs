use super::DELETED_FILE_HASH;
use crate::{
    agent::{CallRequest, Confirmed, OperationAgent},
    bindings::{
        AddFileCall, AddedFileFilter, EditFileCall, EditedFileFilter, MintCall, MintFilter,
        UpdateMetadataCall, UpdatedPortalMetadataFilter,
    },
    error::AgentResult,
};
use ethers::{
    abi::AbiEncode,
    providers::Middleware,
    types::{Address, U256},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Budget for file level operations.
pub const FILE_TRX_TIMEOUT: Duration = Duration::from_secs(30);
/// Minting deploys a portal and takes longer to land.
pub const PORTAL_MINT_TIMEOUT: Duration = Duration::from_secs(90);

/// Everything the registry needs to mint a portal. Key material and its
/// verifier digests are produced by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub metadata_hash: String,
    pub owner_view_did: String,
    pub owner_edit_did: String,
    pub portal_encryption_key_verifier: [u8; 32],
    pub portal_decryption_key_verifier: [u8; 32],
    pub member_encryption_key_verifier: [u8; 32],
    pub member_decryption_key_verifier: [u8; 32],
}

pub fn add_file_call(portal: Address, metadata_hash: &str, content_hash: &str) -> CallRequest {
    let call = AddFileCall {
        metadata_hash: metadata_hash.to_string(),
        content_hash: content_hash.to_string(),
        gate_hash: String::new(),
        file_type: 0,
        version: U256::zero(),
    };
    CallRequest::new(portal, call.encode())
}

pub fn edit_file_call(
    portal: Address,
    file_id: U256,
    metadata_hash: &str,
    content_hash: &str,
) -> CallRequest {
    let call = EditFileCall {
        file_id,
        metadata_hash: metadata_hash.to_string(),
        content_hash: content_hash.to_string(),
        gate_hash: String::new(),
        file_type: 0,
        version: U256::zero(),
    };
    CallRequest::new(portal, call.encode())
}

pub fn delete_file_call(portal: Address, file_id: U256) -> CallRequest {
    edit_file_call(portal, file_id, DELETED_FILE_HASH, DELETED_FILE_HASH)
}

pub fn update_metadata_call(portal: Address, metadata_hash: &str) -> CallRequest {
    let call = UpdateMetadataCall {
        metadata_hash: metadata_hash.to_string(),
    };
    CallRequest::new(portal, call.encode())
}

pub fn mint_call(registry: Address, request: &MintRequest) -> CallRequest {
    let call = MintCall {
        metadata_hash: request.metadata_hash.clone(),
        owner_view_did: request.owner_view_did.clone(),
        owner_edit_did: request.owner_edit_did.clone(),
        portal_encryption_key_verifier: request.portal_encryption_key_verifier,
        portal_decryption_key_verifier: request.portal_decryption_key_verifier,
        member_encryption_key_verifier: request.member_encryption_key_verifier,
        member_decryption_key_verifier: request.member_decryption_key_verifier,
    };
    CallRequest::new(registry, call.encode())
}

/// Portal writes performed through an [`OperationAgent`].
pub struct PortalOperations<'a, M> {
    agent: &'a OperationAgent<M>,
}

impl<'a, M: Middleware + 'static> PortalOperations<'a, M> {
    pub fn new(agent: &'a OperationAgent<M>) -> Self {
        Self { agent }
    }

    /// Mints a portal owned by the agent's smart account and returns its
    /// address.
    pub async fn mint_portal(&self, registry: Address, request: &MintRequest) -> AgentResult<Address> {
        let confirmed: Confirmed<MintFilter> = self
            .agent
            .execute_expecting(mint_call(registry, request), PORTAL_MINT_TIMEOUT)
            .await?;
        let portal = confirmed.event().portal;
        info!("minted portal {:?}", portal);
        Ok(portal)
    }

    /// Adds a file and returns the id the portal assigned to it.
    pub async fn add_file(
        &self,
        portal: Address,
        metadata_hash: &str,
        content_hash: &str,
    ) -> AgentResult<U256> {
        let confirmed: Confirmed<AddedFileFilter> = self
            .agent
            .execute_expecting(add_file_call(portal, metadata_hash, content_hash), FILE_TRX_TIMEOUT)
            .await?;
        let file_id = confirmed.event().file_id;
        info!("added file {} to portal {:?}", file_id, portal);
        Ok(file_id)
    }

    pub async fn edit_file(
        &self,
        portal: Address,
        file_id: U256,
        metadata_hash: &str,
        content_hash: &str,
    ) -> AgentResult<EditedFileFilter> {
        let confirmed: Confirmed<EditedFileFilter> = self
            .agent
            .execute_expecting(
                edit_file_call(portal, file_id, metadata_hash, content_hash),
                FILE_TRX_TIMEOUT,
            )
            .await?;
        Ok(confirmed.event().clone())
    }

    /// Points the file at new metadata (which carries the name) and keeps
    /// its content.
    pub async fn rename_file(
        &self,
        portal: Address,
        file_id: U256,
        new_metadata_hash: &str,
        current_content_hash: &str,
    ) -> AgentResult<EditedFileFilter> {
        self.edit_file(portal, file_id, new_metadata_hash, current_content_hash)
            .await
    }

    pub async fn delete_file(&self, portal: Address, file_id: U256) -> AgentResult<EditedFileFilter> {
        let confirmed: Confirmed<EditedFileFilter> = self
            .agent
            .execute_expecting(delete_file_call(portal, file_id), FILE_TRX_TIMEOUT)
            .await?;
        info!("deleted file {} from portal {:?}", file_id, portal);
        Ok(confirmed.event().clone())
    }

    pub async fn update_metadata(
        &self,
        portal: Address,
        metadata_hash: &str,
    ) -> AgentResult<UpdatedPortalMetadataFilter> {
        let confirmed: Confirmed<UpdatedPortalMetadataFilter> = self
            .agent
            .execute_expecting(update_metadata_call(portal, metadata_hash), FILE_TRX_TIMEOUT)
            .await?;
        Ok(confirmed.event().clone())
    }
}
