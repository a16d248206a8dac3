use super::{gateway::GatewayClient, DELETED_FILE_HASH};
use crate::{
    bindings::Portal,
    error::{AgentError, AgentResult},
};
use ethers::{
    contract::ContractError,
    providers::Middleware,
    types::{Address, U256},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One entry of a portal's `files` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalFileRecord {
    pub file_id: U256,
    pub metadata_hash: String,
    pub content_hash: String,
    pub gate_hash: String,
    pub file_type: u8,
    pub version: U256,
}

impl PortalFileRecord {
    pub fn is_deleted(&self) -> bool {
        self.metadata_hash == DELETED_FILE_HASH
    }
}

/// The four key verifiers a portal was minted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVerifiers {
    pub portal_encryption: [u8; 32],
    pub portal_decryption: [u8; 32],
    pub member_encryption: [u8; 32],
    pub member_decryption: [u8; 32],
}

/// Read-only view of one portal contract.
pub struct PortalReader<M> {
    contract: Portal<M>,
}

impl<M: Middleware + 'static> PortalReader<M> {
    pub fn new(portal: Address, chain: Arc<M>) -> Self {
        Self {
            contract: Portal::new(portal, chain),
        }
    }

    pub fn address(&self) -> Address {
        self.contract.address()
    }

    pub async fn file_count(&self) -> AgentResult<U256> {
        self.contract
            .get_file_count()
            .call()
            .await
            .map_err(chain_read)
    }

    pub async fn file(&self, file_id: U256) -> AgentResult<PortalFileRecord> {
        let (metadata_hash, content_hash, gate_hash, file_type, version) =
            self.contract.files(file_id).call().await.map_err(chain_read)?;
        Ok(PortalFileRecord {
            file_id,
            metadata_hash,
            content_hash,
            gate_hash,
            file_type,
            version,
        })
    }

    /// Live files in id order; deleted entries are skipped.
    pub async fn list_files(&self) -> AgentResult<Vec<PortalFileRecord>> {
        let count = self.file_count().await?;
        let count = u64::try_from(count)
            .map_err(|_| AgentError::ChainRead(format!("file count {count} out of range")))?;
        let mut files = Vec::new();
        for id in 0..count {
            let record = self.file(U256::from(id)).await?;
            if !record.is_deleted() {
                files.push(record);
            }
        }
        Ok(files)
    }

    pub async fn owner(&self) -> AgentResult<Address> {
        self.contract.owner().call().await.map_err(chain_read)
    }

    /// Whether `account` (usually the agent's smart account) owns the portal.
    pub async fn is_owner(&self, account: Address) -> AgentResult<bool> {
        Ok(self.owner().await? == account)
    }

    pub async fn metadata_hash(&self) -> AgentResult<String> {
        self.contract
            .metadata_ipfs_hash()
            .call()
            .await
            .map_err(chain_read)
    }

    pub async fn key_verifiers(&self) -> AgentResult<KeyVerifiers> {
        let (portal_encryption, portal_decryption, member_encryption, member_decryption) = self
            .contract
            .key_verifiers(U256::zero())
            .call()
            .await
            .map_err(chain_read)?;
        Ok(KeyVerifiers {
            portal_encryption,
            portal_decryption,
            member_encryption,
            member_decryption,
        })
    }

    /// Portal metadata document, fetched through `gateway`.
    pub async fn metadata(&self, gateway: &GatewayClient) -> AgentResult<serde_json::Value> {
        let hash = self.metadata_hash().await?;
        gateway.fetch_json(&hash).await
    }
}

fn chain_read<M: Middleware>(err: ContractError<M>) -> AgentError {
    AgentError::ChainRead(err.to_string())
}
