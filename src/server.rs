//! Local JSON-RPC endpoint exposing the agent and portal reads.
//!
//! With a proxy configured, any method outside the `agent_*` and `portal_*`
//! namespaces is forwarded to the chain node, so a single endpoint can stand
//! in for the node in front of the app.
use crate::{
    agent::{decode_key_hex, CallRequest, OperationAgent},
    error::AgentError,
    portal::{PortalFileRecord, PortalReader},
    relay::UserOperationReceipt,
};
use async_trait::async_trait;
use ethers::{
    providers::Middleware,
    types::{Address, U256},
};
use hyper::{http::HeaderValue, Body, Method, Request, Response};
use jsonrpsee::{
    core::RpcResult,
    proc_macros::rpc,
    server::{ServerBuilder, ServerHandle},
    types::{
        error::{ErrorCode, METHOD_NOT_FOUND_MSG},
        ErrorObject, ErrorObjectOwned,
    },
    Methods, RpcModule,
};
use log::{info, warn};
use serde_json::json;
use std::{
    error::Error,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::RwLock;
use tower::{Layer, Service, ServiceBuilder};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub struct JsonRpcServer {
    listen_address: String,
    cors_layer: Option<CorsLayer>,
    proxy_layer: Option<ProxyJsonRpcLayer>,
}

impl JsonRpcServer {
    pub fn new(listen_address: String) -> Self {
        Self {
            listen_address,
            cors_layer: None,
            proxy_layer: None,
        }
    }

    pub fn with_cors(mut self, cors_domain: Vec<String>) -> Self {
        let cors_layer = if cors_domain.iter().any(|d| d == "*") {
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::POST])
                .allow_origin(Any)
        } else {
            let mut origins: Vec<HeaderValue> = vec![];

            for domain in cors_domain.iter() {
                if let Ok(origin) = domain.parse::<HeaderValue>() {
                    origins.push(origin);
                }
            }

            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods([Method::POST])
                .allow_origin(AllowOrigin::list(origins))
        };

        self.cors_layer = Some(cors_layer);
        self
    }

    /// Forwards methods this server does not know to the chain node.
    pub fn with_proxy(mut self, node_url: String) -> Self {
        self.proxy_layer = Some(ProxyJsonRpcLayer::new(node_url));
        self
    }

    pub async fn start(
        &self,
        methods: impl Into<Methods>,
    ) -> anyhow::Result<(SocketAddr, ServerHandle)> {
        let service = ServiceBuilder::new()
            .option_layer(self.cors_layer.clone())
            .option_layer(self.proxy_layer.clone());

        let server = ServerBuilder::new()
            .set_middleware(service)
            .build(&self.listen_address)
            .await?;
        let local_addr = server.local_addr()?;
        info!("agent endpoint listening on {}", local_addr);

        Ok((local_addr, server.start(methods)?))
    }
}

/// Sends requests answered with "method not found" on to the chain node.
#[derive(Clone, Debug)]
pub struct ProxyJsonRpcLayer {
    node_url: Arc<str>,
    client: reqwest::Client,
}

impl ProxyJsonRpcLayer {
    pub fn new(node_url: impl AsRef<str>) -> Self {
        Self {
            node_url: Arc::from(node_url.as_ref()),
            client: reqwest::Client::new(),
        }
    }
}

impl<S> Layer<S> for ProxyJsonRpcLayer {
    type Service = ProxyJsonRpcRequest<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ProxyJsonRpcRequest {
            inner,
            node_url: self.node_url.clone(),
            client: self.client.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyJsonRpcRequest<S> {
    inner: S,
    node_url: Arc<str>,
    client: reqwest::Client,
}

impl<S> Service<Request<Body>> for ProxyJsonRpcRequest<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Response: 'static,
    S::Error: Into<Box<dyn Error + Send + Sync>> + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = Box<dyn Error + Send + Sync + 'static>;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let node_url = String::from(self.node_url.as_ref());
        let client = self.client.clone();
        let mut inner = self.inner.clone();

        let res_fut = async move {
            let (req_h, req_b) = req.into_parts();
            let req_bb = hyper::body::to_bytes(req_b).await?;
            let fut = inner.call(Request::from_parts(req_h, Body::from(req_bb.clone())));

            let res = fut.await.map_err(|err| err.into())?;

            let (res_h, res_b) = res.into_parts();
            let res_bb = hyper::body::to_bytes(res_b).await?;

            #[derive(serde::Deserialize, Debug)]
            struct JsonRpcErrorResponse {
                error: ErrorObjectOwned,
            }

            if let Ok(err) = serde_json::from_slice::<JsonRpcErrorResponse>(&res_bb) {
                if err.error.code() == ErrorCode::MethodNotFound.code()
                    && err.error.message() == METHOD_NOT_FOUND_MSG
                {
                    let forwarded = client
                        .post(node_url)
                        .header(hyper::header::CONTENT_TYPE, "application/json")
                        .body(req_bb.to_vec())
                        .send()
                        .await?;
                    let status = forwarded.status().as_u16();
                    let body = forwarded.bytes().await?;
                    let res = Response::builder()
                        .status(status)
                        .header(hyper::header::CONTENT_TYPE, "application/json")
                        .body(Body::from(body.to_vec()))?;
                    return Ok(res);
                }
            }

            Ok(Response::from_parts(res_h, Body::from(res_bb)))
        };

        Box::pin(res_fut)
    }
}

/// Agent lifecycle and execution.
#[rpc(server, namespace = "agent")]
pub trait AgentApi {
    #[method(name = "initialize")]
    async fn initialize(&self, private_key: String, relay_credential: String)
        -> RpcResult<Address>;
    #[method(name = "reset")]
    async fn reset(&self) -> RpcResult<bool>;
    #[method(name = "address")]
    async fn address(&self) -> RpcResult<Address>;
    #[method(name = "execute")]
    async fn execute(
        &self,
        requests: Vec<CallRequest>,
        timeout_ms: u64,
    ) -> RpcResult<UserOperationReceipt>;
}

/// Portal reads through the chain client.
#[rpc(server, namespace = "portal")]
pub trait PortalApi {
    #[method(name = "fileCount")]
    async fn file_count(&self, portal: Address) -> RpcResult<U256>;
    #[method(name = "file")]
    async fn file(&self, portal: Address, file_id: U256) -> RpcResult<PortalFileRecord>;
    #[method(name = "owner")]
    async fn owner(&self, portal: Address) -> RpcResult<Address>;
    /// Whether the agent's smart account owns `portal`.
    #[method(name = "isOwner")]
    async fn is_owner(&self, portal: Address) -> RpcResult<bool>;
}

/// Shares one agent between RPC calls. Executions hold the read side of the
/// lock; `initialize` and `reset` wait for them and take the write side.
pub struct AgentService<M> {
    agent: Arc<RwLock<OperationAgent<M>>>,
    chain: Arc<M>,
}

impl<M> Clone for AgentService<M> {
    fn clone(&self) -> Self {
        Self {
            agent: self.agent.clone(),
            chain: self.chain.clone(),
        }
    }
}

impl<M: Middleware + 'static> AgentService<M> {
    pub fn new(agent: OperationAgent<M>, chain: Arc<M>) -> Self {
        Self {
            agent: Arc::new(RwLock::new(agent)),
            chain,
        }
    }

    pub fn agent(&self) -> &Arc<RwLock<OperationAgent<M>>> {
        &self.agent
    }

    /// Both namespaces in one module.
    pub fn into_methods(self) -> anyhow::Result<RpcModule<()>> {
        let mut module = RpcModule::new(());
        module.merge(AgentApiServer::into_rpc(self.clone()))?;
        module.merge(PortalApiServer::into_rpc(self))?;
        Ok(module)
    }

    fn reader(&self, portal: Address) -> PortalReader<M> {
        PortalReader::new(portal, self.chain.clone())
    }
}

#[async_trait]
impl<M> AgentApiServer for AgentService<M>
where
    M: Middleware + 'static,
{
    async fn initialize(
        &self,
        private_key: String,
        relay_credential: String,
    ) -> RpcResult<Address> {
        let key = decode_key_hex(&private_key).map_err(rpc_error)?;
        let mut agent = self.agent.write().await;
        agent
            .initialize(&key, self.chain.clone(), &relay_credential)
            .await
            .map_err(rpc_error)?;
        agent.address().map_err(rpc_error)
    }

    async fn reset(&self) -> RpcResult<bool> {
        let mut agent = self.agent.write().await;
        let was_initialized = agent.is_initialized();
        agent.reset();
        Ok(was_initialized)
    }

    async fn address(&self) -> RpcResult<Address> {
        self.agent.read().await.address().map_err(rpc_error)
    }

    async fn execute(
        &self,
        requests: Vec<CallRequest>,
        timeout_ms: u64,
    ) -> RpcResult<UserOperationReceipt> {
        let agent = self.agent.read().await;
        agent
            .execute(requests, Duration::from_millis(timeout_ms))
            .await
            .map_err(rpc_error)
    }
}

#[async_trait]
impl<M> PortalApiServer for AgentService<M>
where
    M: Middleware + 'static,
{
    async fn file_count(&self, portal: Address) -> RpcResult<U256> {
        self.reader(portal).file_count().await.map_err(rpc_error)
    }

    async fn file(&self, portal: Address, file_id: U256) -> RpcResult<PortalFileRecord> {
        self.reader(portal).file(file_id).await.map_err(rpc_error)
    }

    async fn owner(&self, portal: Address) -> RpcResult<Address> {
        self.reader(portal).owner().await.map_err(rpc_error)
    }

    async fn is_owner(&self, portal: Address) -> RpcResult<bool> {
        let account = self.agent.read().await.address().map_err(rpc_error)?;
        self.reader(portal).is_owner(account).await.map_err(rpc_error)
    }
}

/// JSON-RPC error code for each agent failure kind.
pub fn error_code(err: &AgentError) -> i32 {
    match err {
        AgentError::InvalidKeyMaterial(_) => -32001,
        AgentError::NotInitialized => -32002,
        AgentError::BatchSizeExceeded { .. } => -32003,
        AgentError::RelayUnavailable(_) => -32004,
        AgentError::SubmissionRejected { .. } => -32005,
        AgentError::OperationTimeout { .. } => -32006,
        AgentError::OnChainFailure(_) => -32007,
        AgentError::ChainRead(_) => -32008,
        AgentError::Signing(_) => -32009,
        AgentError::Gateway(_) => -32010,
    }
}

pub fn rpc_error(err: AgentError) -> ErrorObjectOwned {
    let data = match &err {
        AgentError::SubmissionRejected { code, data, .. } => {
            Some(json!({ "relayCode": code, "relayData": data }))
        }
        AgentError::OperationTimeout { hash, timeout } => Some(json!({
            "userOpHash": hash,
            "timeoutMs": timeout.as_millis() as u64,
        })),
        _ => None,
    };
    if matches!(err, AgentError::Signing(_) | AgentError::ChainRead(_)) {
        warn!("agent request failed: {}", err);
    }
    ErrorObject::owned(error_code(&err), err.to_string(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::H256;

    #[test]
    fn error_kinds_have_distinct_codes() {
        let errors = vec![
            AgentError::InvalidKeyMaterial(String::new()),
            AgentError::NotInitialized,
            AgentError::BatchSizeExceeded { len: 11, max: 10 },
            AgentError::RelayUnavailable(String::new()),
            AgentError::SubmissionRejected {
                code: -32500,
                message: String::new(),
                data: None,
            },
            AgentError::OperationTimeout {
                hash: None,
                timeout: Duration::ZERO,
            },
            AgentError::OnChainFailure(String::new()),
            AgentError::ChainRead(String::new()),
            AgentError::Signing(String::new()),
            AgentError::Gateway(String::new()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(error_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn timeout_error_carries_hash() {
        let hash = H256::repeat_byte(0x0f);
        let err = rpc_error(AgentError::OperationTimeout {
            hash: Some(hash),
            timeout: Duration::from_millis(100),
        });
        assert_eq!(err.code(), -32006);
        let data: serde_json::Value = serde_json::from_str(err.data().unwrap().get()).unwrap();
        assert_eq!(data["timeoutMs"], 100);
        assert_eq!(data["userOpHash"], json!(hash));
    }
}
