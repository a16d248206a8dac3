use super::{
    api::{BundlerApiClient, GasPriceApiClient, PaymasterApiClient},
    types::{FeeEstimate, Sponsorship, UserOperation, UserOperationReceipt},
};
use crate::{
    agent::SmartAccount,
    error::{AgentError, AgentResult},
};
use ethers::types::{Address, H256};
use jsonrpsee::{
    core::Error as JsonRpcError,
    http_client::{HttpClient, HttpClientBuilder},
};
use log::{debug, info};
use std::time::Duration;
use url::Url;

pub const DEFAULT_RELAY_URL: &str = "https://api.pimlico.io/v2/gnosis/rpc";

/// How to reach the relay and how patiently to poll it.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Relay endpoint without credentials
    pub url: Url,
    /// Interval between `eth_getUserOperationReceipt` polls
    pub poll_interval: Duration,
    /// Upper bound for a single relay request
    pub request_timeout: Duration,
    /// Ask the paymaster to sponsor every operation
    pub sponsorship: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_RELAY_URL).expect("default relay url is valid"),
            poll_interval: Duration::from_millis(1_000),
            request_timeout: Duration::from_secs(30),
            sponsorship: true,
        }
    }
}

impl RelaySettings {
    /// The relay URL with the API credential attached.
    pub fn endpoint(&self, api_credential: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("apikey", api_credential);
        url
    }
}

pub struct RelayConnector;

impl RelayConnector {
    /// Opens a relay session for `account`. The underlying HTTP client is
    /// reused for every call made through the session.
    pub fn connect(
        account: &SmartAccount,
        settings: &RelaySettings,
        api_credential: &str,
    ) -> AgentResult<RelaySession> {
        if api_credential.trim().is_empty() {
            return Err(AgentError::RelayUnavailable(
                "missing relay API credential".to_string(),
            ));
        }

        let client = HttpClientBuilder::default()
            .request_timeout(settings.request_timeout)
            .build(settings.endpoint(api_credential).as_str())
            .map_err(|err| AgentError::RelayUnavailable(err.to_string()))?;

        info!(
            "connected to relay {} for account {:?}",
            settings.url,
            account.address()
        );

        Ok(RelaySession {
            client,
            entry_point: account.implementation().entry_point,
            poll_interval: settings.poll_interval,
            sponsorship: settings.sponsorship,
        })
    }
}

/// A live connection to the relay, bound to one entry point.
pub struct RelaySession {
    client: HttpClient,
    entry_point: Address,
    poll_interval: Duration,
    sponsorship: bool,
}

impl RelaySession {
    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    pub fn sponsorship_enabled(&self) -> bool {
        self.sponsorship
    }

    /// Fast tier of the relay's gas price oracle.
    pub async fn estimate_fees(&self) -> AgentResult<FeeEstimate> {
        let tiers = self
            .client
            .get_user_operation_gas_price()
            .await
            .map_err(|err| AgentError::RelayUnavailable(err.to_string()))?;
        debug!("relay gas price (fast): {:?}", tiers.fast);
        Ok(tiers.fast)
    }

    pub async fn sponsor(&self, user_operation: &UserOperation) -> AgentResult<Sponsorship> {
        self.client
            .sponsor_user_operation(user_operation.clone(), self.entry_point)
            .await
            .map_err(rejection)
    }

    pub async fn submit(&self, user_operation: &UserOperation) -> AgentResult<H256> {
        let hash = self
            .client
            .send_user_operation(user_operation.clone(), self.entry_point)
            .await
            .map_err(rejection)?;
        info!("user operation {:?} accepted by relay", hash);
        Ok(hash)
    }

    /// Polls until the relay reports a receipt. Elapsing `timeout` yields
    /// `OperationTimeout`: the operation may still be mined afterwards.
    pub async fn wait_for_receipt(
        &self,
        hash: H256,
        timeout: Duration,
    ) -> AgentResult<UserOperationReceipt> {
        let elapsed = || AgentError::OperationTimeout {
            hash: Some(hash),
            timeout,
        };
        if timeout.is_zero() {
            return Err(elapsed());
        }

        let poll = async {
            let mut interval = tokio::time::interval(self.poll_interval);
            loop {
                interval.tick().await;
                match self.client.get_user_operation_receipt(hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => debug!("no receipt yet for {:?}", hash),
                    Err(err) => return Err(AgentError::RelayUnavailable(err.to_string())),
                }
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| elapsed())?
    }
}

/// Error objects returned by the relay are rejections; anything else means
/// the relay could not be reached.
fn rejection(err: JsonRpcError) -> AgentError {
    match err {
        JsonRpcError::Call(object) => AgentError::SubmissionRejected {
            code: object.code(),
            message: object.message().to_string(),
            data: object.data().map(|data| data.get().to_string()),
        },
        other => AgentError::RelayUnavailable(other.to_string()),
    }
}
