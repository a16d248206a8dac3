//! JSON-RPC surface of the paymaster/bundler relay.
//!
//! The traits generate both the client used by [`RelaySession`](super::RelaySession)
//! and the server side used by stub relays in tests.
use super::types::{GasPriceTiers, Sponsorship, UserOperation, UserOperationReceipt};
use ethers::types::{Address, H256, U64};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

/// ERC-4337 bundler methods.
#[rpc(client, server, namespace = "eth")]
pub trait BundlerApi {
    #[method(name = "chainId")]
    async fn chain_id(&self) -> RpcResult<U64>;
    #[method(name = "supportedEntryPoints")]
    async fn supported_entry_points(&self) -> RpcResult<Vec<Address>>;
    #[method(name = "sendUserOperation")]
    async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: Address,
    ) -> RpcResult<H256>;
    #[method(name = "getUserOperationReceipt")]
    async fn get_user_operation_receipt(
        &self,
        user_operation_hash: H256,
    ) -> RpcResult<Option<UserOperationReceipt>>;
}

/// Gas price oracle.
#[rpc(client, server, namespace = "pimlico")]
pub trait GasPriceApi {
    #[method(name = "getUserOperationGasPrice")]
    async fn get_user_operation_gas_price(&self) -> RpcResult<GasPriceTiers>;
}

/// Paymaster sponsorship.
#[rpc(client, server, namespace = "pm")]
pub trait PaymasterApi {
    #[method(name = "sponsorUserOperation")]
    async fn sponsor_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: Address,
    ) -> RpcResult<Sponsorship>;
}
