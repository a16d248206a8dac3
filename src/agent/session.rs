use super::account::{AccountImplementation, SmartAccount};
use crate::{
    bindings::{ExecuteUserOpWithErrorStringCall, MultiSendCall},
    error::{AgentError, AgentResult},
    relay::{FeeEstimate, RelaySession, UserOperation},
};
use ethers::{
    abi::AbiEncode,
    providers::Middleware,
    types::{Address, Bytes, H256, U256},
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Most calls one user operation may carry.
pub const MAX_BATCH_SIZE: usize = 10;
/// Call gas requested for every operation. No per-call estimation is done.
pub const MAX_CALL_GAS_LIMIT: u64 = 5_000_000;
/// Verification gas used when the paymaster does not provide limits.
pub const DEFAULT_VERIFICATION_GAS_LIMIT: u64 = 1_000_000;
pub const DEFAULT_PRE_VERIFICATION_GAS: u64 = 100_000;

pub(crate) const CALL: u8 = 0;
pub(crate) const DELEGATE_CALL: u8 = 1;

/// One contract invocation. Calls never carry native value, so a `value`
/// field on the wire is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CallRequest {
    pub contract_address: Address,
    pub data: Bytes,
}

impl CallRequest {
    pub fn new(contract_address: Address, data: impl Into<Bytes>) -> Self {
        Self {
            contract_address,
            data: data.into(),
        }
    }
}

impl From<CallRequest> for Vec<CallRequest> {
    fn from(request: CallRequest) -> Self {
        vec![request]
    }
}

/// Encodes `requests` into the account's execution call data, first request
/// first. A single call goes straight through the 4337 module; batches are
/// delegated to MultiSend.
pub fn encode_calls(
    implementation: &AccountImplementation,
    requests: &[CallRequest],
) -> AgentResult<Bytes> {
    if requests.is_empty() || requests.len() > MAX_BATCH_SIZE {
        return Err(AgentError::BatchSizeExceeded {
            len: requests.len(),
            max: MAX_BATCH_SIZE,
        });
    }

    let call = match requests {
        [single] => ExecuteUserOpWithErrorStringCall {
            to: single.contract_address,
            value: U256::zero(),
            data: single.data.clone(),
            operation: CALL,
        },
        many => {
            let transactions: Vec<_> = many
                .iter()
                .map(|request| (CALL, request.contract_address, &request.data[..]))
                .collect();
            ExecuteUserOpWithErrorStringCall {
                to: implementation.multi_send,
                value: U256::zero(),
                data: multi_send(&transactions),
                operation: DELEGATE_CALL,
            }
        }
    };
    Ok(call.encode().into())
}

/// `multiSend` call data over `(operation, to, data)` entries, each packed as
/// `operation(1) ++ to(20) ++ value(32) ++ dataLength(32) ++ data` with a
/// zero value.
pub(crate) fn multi_send(transactions: &[(u8, Address, &[u8])]) -> Bytes {
    let mut packed = Vec::new();
    for (operation, to, data) in transactions {
        let mut word = [0u8; 32];
        packed.push(*operation);
        packed.extend_from_slice(to.as_bytes());
        packed.extend_from_slice(&word);
        U256::from(data.len()).to_big_endian(&mut word);
        packed.extend_from_slice(&word);
        packed.extend_from_slice(data);
    }
    MultiSendCall {
        transactions: packed.into(),
    }
    .encode()
    .into()
}

/// A smart account wired to a relay and a chain client, ready to send.
pub struct SmartAccountSession<M> {
    account: SmartAccount,
    relay: RelaySession,
    chain: Arc<M>,
    deployed: AtomicBool,
}

impl<M: Middleware + 'static> SmartAccountSession<M> {
    pub fn new(account: SmartAccount, relay: RelaySession, chain: Arc<M>) -> Self {
        Self {
            account,
            relay,
            chain,
            deployed: AtomicBool::new(false),
        }
    }

    pub fn account(&self) -> &SmartAccount {
        &self.account
    }

    pub fn relay(&self) -> &RelaySession {
        &self.relay
    }

    pub fn address(&self) -> Address {
        self.account.address()
    }

    pub fn encode(&self, requests: &[CallRequest]) -> AgentResult<Bytes> {
        encode_calls(self.account.implementation(), requests)
    }

    /// Checks for account code until it is seen once.
    async fn is_deployed(&self) -> AgentResult<bool> {
        if self.deployed.load(Ordering::Acquire) {
            return Ok(true);
        }
        let code = self
            .chain
            .get_code(self.address(), None)
            .await
            .map_err(|err| AgentError::ChainRead(err.to_string()))?;
        let deployed = !code.is_empty();
        if deployed {
            self.deployed.store(true, Ordering::Release);
        }
        Ok(deployed)
    }

    /// Builds, sponsors, signs and submits one user operation.
    pub async fn send(
        &self,
        call_data: Bytes,
        nonce: U256,
        fees: &FeeEstimate,
    ) -> AgentResult<H256> {
        let mut user_operation = UserOperation::default()
            .sender(self.address())
            .nonce(nonce)
            .call_data(call_data)
            .call_gas_limit(U256::from(MAX_CALL_GAS_LIMIT))
            .verification_gas_limit(U256::from(DEFAULT_VERIFICATION_GAS_LIMIT))
            .pre_verification_gas(U256::from(DEFAULT_PRE_VERIFICATION_GAS))
            .fees(fees)
            .signature(SmartAccount::dummy_signature());

        if !self.is_deployed().await? {
            let (factory, factory_data) = self.account.deployment();
            debug!("account {:?} not deployed, attaching factory data", self.address());
            user_operation = user_operation.factory(factory, factory_data);
        }

        if self.relay.sponsorship_enabled() {
            let sponsorship = self.relay.sponsor(&user_operation).await?;
            user_operation.apply_sponsorship(&sponsorship);
        }

        user_operation.signature = self.account.sign_operation(&user_operation)?;

        let expected = user_operation.hash(self.relay.entry_point(), self.account.chain_id());
        let hash = self.relay.submit(&user_operation).await?;
        if hash != expected {
            warn!(
                "relay returned hash {:?}, locally computed {:?}",
                hash, expected
            );
        }
        Ok(hash)
    }
}
