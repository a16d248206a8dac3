mod common;

use common::*;
use async_trait::async_trait;
use ethers::{
    abi::{encode, Token},
    providers::Provider,
    types::{Address, Bytes, U256, U64},
};
use jsonrpsee::{
    core::{client::ClientT, Error as JsonRpcError, RpcResult},
    http_client::HttpClientBuilder,
    proc_macros::rpc,
    rpc_params,
    server::ServerBuilder,
};
use portal_agent::{
    agent::OperationAgent,
    server::{AgentService, JsonRpcServer},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Chain node answering one chain method, plus an `agent_address` that must
/// never be reached through the agent endpoint.
#[rpc(server)]
trait NodeApi {
    #[method(name = "eth_blockNumber")]
    async fn block_number(&self) -> RpcResult<U64>;
    #[method(name = "agent_address")]
    async fn agent_address(&self) -> RpcResult<Address>;
}

#[derive(Clone, Default)]
struct StubNode {
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl NodeApiServer for StubNode {
    async fn block_number(&self) -> RpcResult<U64> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(U64::from(0x1234))
    }

    async fn agent_address(&self) -> RpcResult<Address> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(Address::repeat_byte(0xee))
    }
}

fn error_code(err: JsonRpcError) -> i32 {
    match err {
        JsonRpcError::Call(object) => object.code(),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn agent_lifecycle_over_json_rpc() -> anyhow::Result<()> {
    init_logging();
    let relay = StubRelay::new().serve().await;
    let (provider, mock) = Provider::mocked();
    let service = AgentService::new(OperationAgent::new(relay.settings()), Arc::new(provider));

    let server = JsonRpcServer::new("127.0.0.1:0".to_string()).with_cors(vec!["*".to_string()]);
    let (addr, _handle) = server.start(service.into_methods()?).await?;
    let client = HttpClientBuilder::default().build(format!("http://{addr}"))?;

    // agent_address before initialize
    let response: Result<Address, _> = client.request("agent_address", rpc_params![]).await;
    assert_eq!(error_code(response.unwrap_err()), -32002);

    // malformed key
    let response: Result<Address, _> = client
        .request("agent_initialize", rpc_params!["0x1234", "relay-key"])
        .await;
    assert_eq!(error_code(response.unwrap_err()), -32001);

    expect_initialize(&mock);
    let address: Address = client
        .request("agent_initialize", rpc_params![format!("0x{TEST_KEY}"), "relay-key"])
        .await?;
    let current: Address = client.request("agent_address", rpc_params![]).await?;
    assert_eq!(address, current);

    // portal_isOwner compares the portal owner with the smart account
    mock.push::<Bytes, _>(Bytes::from(encode(&[Token::Address(address)])))
        .unwrap();
    let is_owner: bool = client
        .request("portal_isOwner", rpc_params![Address::repeat_byte(0xcd)])
        .await?;
    assert!(is_owner);

    mock.push::<Bytes, _>(Bytes::from(encode(&[Token::Uint(U256::from(4))])))
        .unwrap();
    let count: U256 = client
        .request("portal_fileCount", rpc_params![Address::repeat_byte(0xcd)])
        .await?;
    assert_eq!(count, U256::from(4));

    let was_initialized: bool = client.request("agent_reset", rpc_params![]).await?;
    assert!(was_initialized);
    let response: Result<Address, _> = client.request("agent_address", rpc_params![]).await;
    assert_eq!(error_code(response.unwrap_err()), -32002);

    Ok(())
}

#[tokio::test]
async fn oversized_batch_over_json_rpc() -> anyhow::Result<()> {
    init_logging();
    let relay = StubRelay::new().serve().await;
    let (provider, mock) = Provider::mocked();
    expect_initialize(&mock);
    let mut agent = OperationAgent::new(relay.settings());
    let chain = Arc::new(provider);
    agent.initialize(&test_key(), chain.clone(), "relay-key").await?;

    let server = JsonRpcServer::new("127.0.0.1:0".to_string());
    let (addr, _handle) = server
        .start(AgentService::new(agent, chain).into_methods()?)
        .await?;
    let client = HttpClientBuilder::default().build(format!("http://{addr}"))?;

    let requests: Vec<serde_json::Value> = (0..11)
        .map(|_| {
            serde_json::json!({
                "contractAddress": Address::repeat_byte(0xcd),
                "data": "0x01",
            })
        })
        .collect();
    let response: Result<serde_json::Value, _> = client
        .request("agent_execute", rpc_params![requests, 1_000u64])
        .await;
    assert_eq!(error_code(response.unwrap_err()), -32003);
    assert!(relay.relay.submitted().is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_methods_are_forwarded_to_the_chain_node() -> anyhow::Result<()> {
    init_logging();
    let node = StubNode::default();
    let node_server = ServerBuilder::default().build("127.0.0.1:0").await?;
    let node_addr = node_server.local_addr()?;
    let _node_handle = node_server.start(node.clone().into_rpc())?;

    let relay = StubRelay::new().serve().await;
    let (provider, _mock) = Provider::mocked();
    let service = AgentService::new(OperationAgent::new(relay.settings()), Arc::new(provider));
    let server = JsonRpcServer::new("127.0.0.1:0".to_string())
        .with_proxy(format!("http://{node_addr}"));
    let (addr, _handle) = server.start(service.into_methods()?).await?;
    let client = HttpClientBuilder::default().build(format!("http://{addr}"))?;

    let block: U64 = client.request("eth_blockNumber", rpc_params![]).await?;
    assert_eq!(block, U64::from(0x1234));
    assert_eq!(node.hits.load(Ordering::SeqCst), 1);

    // answered locally, even though the node knows the method too
    let response: Result<Address, _> = client.request("agent_address", rpc_params![]).await;
    assert_eq!(error_code(response.unwrap_err()), -32002);
    assert_eq!(node.hits.load(Ordering::SeqCst), 1);

    Ok(())
}
