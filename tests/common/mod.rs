#![allow(dead_code)]

use async_trait::async_trait;
use ethers::{
    abi::{encode, Token},
    providers::{MockProvider, Provider},
    types::{Address, Bytes, Log, H256, U256, U64},
};
use jsonrpsee::{
    core::RpcResult,
    server::{ServerBuilder, ServerHandle},
    types::ErrorObject,
    RpcModule,
};
use portal_agent::{
    agent::{AccountBinder, AgentSettings, OperationAgent},
    relay::{
        api::{BundlerApiServer, GasPriceApiServer, PaymasterApiServer},
        FeeEstimate, GasPriceTiers, RelaySettings, Sponsorship, UserOperation,
        UserOperationReceipt,
    },
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use url::Url;

pub const CHAIN_ID: u64 = 100;
pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn test_key() -> Vec<u8> {
    ethers::utils::hex::decode(TEST_KEY).unwrap()
}

pub fn owner_address() -> Address {
    AccountBinder::bind(&test_key()).unwrap().address()
}

/// Creation code served by the mocked proxy factory.
pub fn proxy_creation_code() -> Vec<u8> {
    vec![0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15]
}

pub fn fast_fees() -> FeeEstimate {
    FeeEstimate {
        max_fee_per_gas: U256::from(3_000_000_000u64),
        max_priority_fee_per_gas: U256::from(1_500_000_000u64),
    }
}

pub fn paymaster() -> Address {
    Address::repeat_byte(0x77)
}

#[derive(Debug, Clone, Default)]
pub struct StubState {
    /// Applied before answering any request
    pub delay: Duration,
    pub success: bool,
    pub reason: Option<String>,
    pub logs: Vec<Log>,
    /// Rejects `eth_sendUserOperation` with this code and message
    pub submit_error: Option<(i32, String)>,
    /// Receipt polls answered with `null` before the receipt shows up
    pub pending_polls: usize,
    pub submitted: Vec<UserOperation>,
    pub sponsored: usize,
}

/// Relay answering the bundler, gas price and paymaster namespaces from
/// in-memory state.
#[derive(Clone, Default)]
pub struct StubRelay {
    pub state: Arc<Mutex<StubState>>,
}

impl StubRelay {
    pub fn new() -> Self {
        let relay = Self::default();
        relay.state.lock().unwrap().success = true;
        relay
    }

    pub fn with(self, f: impl FnOnce(&mut StubState)) -> Self {
        f(&mut *self.state.lock().unwrap());
        self
    }

    pub fn submitted(&self) -> Vec<UserOperation> {
        self.state.lock().unwrap().submitted.clone()
    }

    async fn pause(&self) {
        let delay = self.state.lock().unwrap().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub async fn serve(self) -> RunningRelay {
        let mut module = RpcModule::new(());
        module
            .merge(BundlerApiServer::into_rpc(self.clone()))
            .unwrap();
        module
            .merge(GasPriceApiServer::into_rpc(self.clone()))
            .unwrap();
        module
            .merge(PaymasterApiServer::into_rpc(self.clone()))
            .unwrap();

        let server = ServerBuilder::default().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.start(module).unwrap();
        RunningRelay {
            url: Url::parse(&format!("http://{addr}")).unwrap(),
            relay: self,
            _handle: handle,
        }
    }
}

pub struct RunningRelay {
    pub url: Url,
    pub relay: StubRelay,
    _handle: ServerHandle,
}

impl RunningRelay {
    pub fn settings(&self) -> AgentSettings {
        AgentSettings {
            relay: RelaySettings {
                url: self.url.clone(),
                poll_interval: Duration::from_millis(10),
                request_timeout: Duration::from_secs(30),
                sponsorship: true,
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl BundlerApiServer for StubRelay {
    async fn chain_id(&self) -> RpcResult<U64> {
        Ok(U64::from(CHAIN_ID))
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<Address>> {
        Ok(vec![AgentSettings::default().implementation.entry_point])
    }

    async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: Address,
    ) -> RpcResult<H256> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        if let Some((code, message)) = state.submit_error.clone() {
            return Err(ErrorObject::owned(code, message, None::<()>));
        }
        let hash = user_operation.hash(entry_point, CHAIN_ID);
        state.submitted.push(user_operation);
        Ok(hash)
    }

    async fn get_user_operation_receipt(
        &self,
        user_operation_hash: H256,
    ) -> RpcResult<Option<UserOperationReceipt>> {
        self.pause().await;
        let mut state = self.state.lock().unwrap();
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Ok(None);
        }
        let entry_point = AgentSettings::default().implementation.entry_point;
        let Some(op) = state
            .submitted
            .iter()
            .find(|op| op.hash(entry_point, CHAIN_ID) == user_operation_hash)
        else {
            return Ok(None);
        };
        Ok(Some(UserOperationReceipt {
            user_op_hash: user_operation_hash,
            entry_point,
            sender: op.sender,
            nonce: op.nonce,
            paymaster: op.paymaster,
            actual_gas_cost: U256::from(21_000u64) * op.max_fee_per_gas,
            actual_gas_used: U256::from(21_000u64),
            success: state.success,
            reason: state.reason.clone(),
            logs: state.logs.clone(),
            receipt: None,
        }))
    }
}

#[async_trait]
impl GasPriceApiServer for StubRelay {
    async fn get_user_operation_gas_price(&self) -> RpcResult<GasPriceTiers> {
        self.pause().await;
        let slow = FeeEstimate {
            max_fee_per_gas: U256::from(1_000_000_000u64),
            max_priority_fee_per_gas: U256::from(500_000_000u64),
        };
        Ok(GasPriceTiers {
            slow,
            standard: slow,
            fast: fast_fees(),
        })
    }
}

#[async_trait]
impl PaymasterApiServer for StubRelay {
    async fn sponsor_user_operation(
        &self,
        user_operation: UserOperation,
        _entry_point: Address,
    ) -> RpcResult<Sponsorship> {
        self.pause().await;
        self.state.lock().unwrap().sponsored += 1;
        Ok(Sponsorship {
            paymaster: paymaster(),
            paymaster_data: Bytes::from(vec![0xaa; 8]),
            paymaster_verification_gas_limit: U256::from(60_000u64),
            paymaster_post_op_gas_limit: U256::from(1u64),
            pre_verification_gas: U256::from(55_000u64),
            verification_gas_limit: U256::from(500_000u64),
            call_gas_limit: user_operation.call_gas_limit / 2,
        })
    }
}

/// Queues the two reads `initialize` performs. The mock answers the last
/// pushed response first.
pub fn expect_initialize(mock: &MockProvider) {
    mock.push::<Bytes, _>(Bytes::from(encode(&[Token::Bytes(proxy_creation_code())])))
        .unwrap();
    mock.push::<U256, _>(U256::from(CHAIN_ID)).unwrap();
}

/// Queues the deployment check of the next execution.
pub fn expect_code(mock: &MockProvider, code: &[u8]) {
    mock.push::<Bytes, _>(Bytes::from(code.to_vec())).unwrap();
}

pub async fn initialized_agent(
    relay: &RunningRelay,
) -> (OperationAgent<Provider<MockProvider>>, MockProvider) {
    let (provider, mock) = Provider::mocked();
    expect_initialize(&mock);
    let mut agent = OperationAgent::new(relay.settings());
    agent
        .initialize(&test_key(), Arc::new(provider), "test-key")
        .await
        .unwrap();
    (agent, mock)
}

/// A log as emitted by a portal contract.
pub fn portal_log(portal: Address, topics: Vec<H256>, data: Vec<Token>) -> Log {
    Log {
        address: portal,
        topics,
        data: Bytes::from(encode(&data)),
        ..Default::default()
    }
}
