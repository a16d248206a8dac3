use ethers::types::H256;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the agent and the portal helpers built on it.
///
/// Every kind is distinct so that callers can tell "please re-check your
/// input" from "still pending" from "failed".
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid private key material: {0}")]
    InvalidKeyMaterial(String),
    #[error("agent not initialized")]
    NotInitialized,
    #[error("batch must hold between 1 and {max} requests, got {len}")]
    BatchSizeExceeded { len: usize, max: usize },
    #[error("relay unavailable: {0}")]
    RelayUnavailable(String),
    #[error("relay rejected user operation ({code}): {message}")]
    SubmissionRejected {
        code: i32,
        message: String,
        data: Option<String>,
    },
    #[error("no receipt for user operation {hash:?} within {timeout:?}")]
    OperationTimeout { hash: Option<H256>, timeout: Duration },
    #[error("user operation failed on chain: {0}")]
    OnChainFailure(String),
    #[error("chain read failed: {0}")]
    ChainRead(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("gateway fetch failed: {0}")]
    Gateway(String),
}

impl AgentError {
    /// Whether resubmitting from scratch (new nonce) is a sensible reaction.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::SubmissionRejected { .. } | AgentError::RelayUnavailable(_)
        )
    }

    /// The operation may still land; callers must not treat this as failure.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, AgentError::OperationTimeout { .. })
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
