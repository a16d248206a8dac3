use super::{
    account::{AccountBinder, AccountImplementation, SmartAccount},
    nonce::random_nonce,
    session::{CallRequest, SmartAccountSession},
};
use crate::{
    error::{AgentError, AgentResult},
    relay::{RelayConnector, RelaySettings, UserOperationReceipt},
};
use ethers::{
    contract::{parse_log, EthEvent},
    providers::Middleware,
    types::{Address, H256},
};
use log::{debug, info};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;

/// Everything an agent needs besides the key and the relay credential.
#[derive(Debug, Clone, Default)]
pub struct AgentSettings {
    pub implementation: AccountImplementation,
    pub relay: RelaySettings,
}

/// A receipt whose logs carried the event the caller asked for. Only
/// [`expect_event`] builds one, so at least one event is always present.
#[derive(Debug, Clone)]
pub struct Confirmed<E> {
    receipt: UserOperationReceipt,
    events: Vec<E>,
}

impl<E> Confirmed<E> {
    pub fn receipt(&self) -> &UserOperationReceipt {
        &self.receipt
    }

    /// Every matching event, in emission order.
    pub fn events(&self) -> &[E] {
        &self.events
    }

    /// The first matching event.
    pub fn event(&self) -> &E {
        &self.events[0]
    }
}

/// Decodes every log of `receipt` that is an `E`, in emission order.
pub fn decode_events<E: EthEvent>(receipt: &UserOperationReceipt) -> Vec<E> {
    receipt
        .logs
        .iter()
        .filter_map(|log| parse_log::<E>(log.clone()).ok())
        .collect()
}

/// Classifies a receipt against the event the caller expects.
pub fn expect_event<E: EthEvent>(receipt: UserOperationReceipt) -> AgentResult<Confirmed<E>> {
    if !receipt.success {
        return Err(AgentError::OnChainFailure(
            receipt
                .reason
                .clone()
                .filter(|reason| !reason.is_empty() && reason != "0x")
                .unwrap_or_else(|| format!("user operation {:?} reverted", receipt.user_op_hash)),
        ));
    }
    let events = decode_events::<E>(&receipt);
    if events.is_empty() {
        return Err(AgentError::OnChainFailure(format!(
            "no {} event in receipt of {:?}",
            E::name(),
            receipt.user_op_hash
        )));
    }
    Ok(Confirmed { receipt, events })
}

/// Signs and submits contract calls on behalf of one smart account.
///
/// Holds no session until [`OperationAgent::initialize`] succeeds.
pub struct OperationAgent<M> {
    settings: AgentSettings,
    session: Option<SmartAccountSession<M>>,
}

impl<M: Middleware + 'static> OperationAgent<M> {
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            settings,
            session: None,
        }
    }

    /// Binds the key, derives the smart account and connects to the relay.
    /// Replaces any previous session; on failure the agent is left empty.
    pub async fn initialize(
        &mut self,
        private_key: &[u8],
        chain: Arc<M>,
        relay_credential: &str,
    ) -> AgentResult<()> {
        self.session = None;

        let owner = AccountBinder::bind(private_key)?;
        let account =
            SmartAccount::resolve(owner, self.settings.implementation.clone(), chain.clone())
                .await?;
        let relay = RelayConnector::connect(&account, &self.settings.relay, relay_credential)?;

        info!(
            "agent initialized: owner {:?}, smart account {:?}, chain {}",
            account.owner().address(),
            account.address(),
            account.chain_id()
        );
        self.session = Some(SmartAccountSession::new(account, relay, chain));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    fn session(&self) -> AgentResult<&SmartAccountSession<M>> {
        self.session.as_ref().ok_or(AgentError::NotInitialized)
    }

    /// Smart account address of the agent.
    pub fn address(&self) -> AgentResult<Address> {
        Ok(self.session()?.address())
    }

    /// Address of the key that owns the smart account.
    pub fn owner(&self) -> AgentResult<Address> {
        Ok(self.session()?.account().owner().address())
    }

    /// Sends `requests` as one user operation and waits for its receipt.
    ///
    /// `timeout` bounds everything after local validation: fee estimation,
    /// submission and receipt polling. Elapsing it yields `OperationTimeout`,
    /// which does not mean the operation failed. The receipt is returned as
    /// is, reverted or not.
    pub async fn execute(
        &self,
        requests: impl Into<Vec<CallRequest>>,
        timeout: Duration,
    ) -> AgentResult<UserOperationReceipt> {
        let session = self.session()?;
        let requests = requests.into();
        let call_data = session.encode(&requests)?;
        let nonce = random_nonce();

        if timeout.is_zero() {
            return Err(AgentError::OperationTimeout {
                hash: None,
                timeout,
            });
        }

        let deadline = Instant::now() + timeout;
        let mut submitted: Option<H256> = None;
        let outcome = tokio::time::timeout_at(deadline, async {
            let fees = session.relay().estimate_fees().await?;
            let hash = session.send(call_data, nonce, &fees).await?;
            submitted = Some(hash);
            debug!("waiting for receipt of {:?}", hash);
            session
                .relay()
                .wait_for_receipt(hash, deadline.saturating_duration_since(Instant::now()))
                .await
        })
        .await;

        match outcome {
            Ok(Ok(receipt)) => {
                info!(
                    "user operation {:?} included, success: {}",
                    receipt.user_op_hash, receipt.success
                );
                Ok(receipt)
            }
            Ok(Err(AgentError::OperationTimeout { hash, .. })) => Err(AgentError::OperationTimeout {
                hash: hash.or(submitted),
                timeout,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(AgentError::OperationTimeout {
                hash: submitted,
                timeout,
            }),
        }
    }

    /// [`OperationAgent::execute`], then requires `success` and at least one
    /// decoded `E` in the logs; both failures are `OnChainFailure`.
    pub async fn execute_expecting<E: EthEvent>(
        &self,
        requests: impl Into<Vec<CallRequest>>,
        timeout: Duration,
    ) -> AgentResult<Confirmed<E>> {
        let receipt = self.execute(requests, timeout).await?;
        expect_event::<E>(receipt)
    }

    /// Drops the session. Safe to call at any time.
    pub fn reset(&mut self) {
        if self.session.take().is_some() {
            info!("agent session cleared");
        }
    }
}
