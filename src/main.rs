use anyhow::{Context, Result};
use dotenv::dotenv;
use env_logger::Env;
use ethers::providers::{Http, Middleware, Provider, Ws};
use portal_agent::{
    agent::{decode_key_hex, OperationAgent},
    server::{AgentService, JsonRpcServer},
    Config,
};
use std::{future::pending, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    dotenv().ok();
    let config = Config::from_env()?;

    if config.uses_websocket() {
        let provider = Provider::<Ws>::connect(config.rpc_url.clone())
            .await
            .with_context(|| format!("Error connecting to {}", config.rpc_url))?;
        run(config, Arc::new(provider)).await
    } else {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .with_context(|| format!("Invalid RPC_URL {}", config.rpc_url))?;
        run(config, Arc::new(provider)).await
    }
}

async fn run<M: Middleware + 'static>(config: Config, chain: Arc<M>) -> Result<()> {
    let mut agent = OperationAgent::new(config.agent.clone());

    match (&config.private_key, &config.relay_api_key) {
        (Some(private_key), Some(relay_api_key)) => {
            let key = decode_key_hex(private_key)?;
            agent.initialize(&key, chain.clone(), relay_api_key).await?;
            log::info!("agent address {:?}", agent.address()?);
        }
        (Some(_), None) => {
            log::warn!("AGENT_PRIVATE_KEY set without RELAY_API_KEY, waiting for agent_initialize")
        }
        _ => log::info!("no agent key configured, waiting for agent_initialize"),
    }

    let mut server =
        JsonRpcServer::new(config.listen_address.clone()).with_cors(config.cors_domains.clone());
    if config.proxy_unknown_methods && !config.uses_websocket() {
        server = server.with_proxy(config.rpc_url.clone());
    }

    let methods = AgentService::new(agent, chain).into_methods()?;
    let (_addr, _handle) = server.start(methods).await?;
    let _ = pending::<Result<()>>().await;
    Ok(())
}
