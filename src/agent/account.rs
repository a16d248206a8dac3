use super::session::{multi_send, DELEGATE_CALL};
use crate::{
    bindings::{CreateProxyWithNonceCall, EnableModulesCall, SafeProxyFactory, SetupCall},
    error::{AgentError, AgentResult},
    relay::UserOperation,
};
use ethers::{
    abi::{encode, AbiEncode, Token},
    providers::Middleware,
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, H256, U256},
    utils::{get_create2_address_from_hash, hex, keccak256},
};
use std::sync::Arc;

/// Entry point v0.7, identical on every chain.
pub const ENTRY_POINT_V07: &str = "0x0000000071727De22E5E9d8BAf0edAc6f37da032";

const SAFE_OP_TYPE: &str = "SafeOp(address safe,uint256 nonce,bytes initCode,bytes callData,uint128 verificationGasLimit,uint128 callGasLimit,uint256 preVerificationGas,uint128 maxPriorityFeePerGas,uint128 maxFeePerGas,bytes paymasterAndData,uint48 validAfter,uint48 validUntil,address entryPoint)";
const DOMAIN_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";

/// Externally owned signing identity held in memory only.
#[derive(Debug, Clone)]
pub struct Account {
    wallet: LocalWallet,
}

impl Account {
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

pub struct AccountBinder;

impl AccountBinder {
    /// Wraps raw secp256k1 key bytes into an [`Account`].
    pub fn bind(private_key: &[u8]) -> AgentResult<Account> {
        if private_key.len() != 32 {
            return Err(AgentError::InvalidKeyMaterial(format!(
                "expected 32 bytes, got {}",
                private_key.len()
            )));
        }
        let wallet = LocalWallet::from_bytes(private_key)
            .map_err(|err| AgentError::InvalidKeyMaterial(err.to_string()))?;
        Ok(Account { wallet })
    }

    /// Same as [`AccountBinder::bind`] for hex input, with or without `0x`.
    pub fn bind_hex(private_key: &str) -> AgentResult<Account> {
        Self::bind(&decode_key_hex(private_key)?)
    }
}

pub fn decode_key_hex(private_key: &str) -> AgentResult<Vec<u8>> {
    let trimmed = private_key.trim();
    let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(stripped).map_err(|err| AgentError::InvalidKeyMaterial(err.to_string()))
}

/// Safe deployment the agent's smart account is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountImplementation {
    /// Safe contracts version, informational
    pub version: String,
    pub entry_point: Address,
    pub proxy_factory: Address,
    pub singleton: Address,
    /// Safe 4337 module: validates user operations and is the fallback handler
    pub module: Address,
    pub module_setup: Address,
    pub multi_send: Address,
    pub salt_nonce: U256,
}

impl Default for AccountImplementation {
    fn default() -> Self {
        let parse = |value: &str| value.parse::<Address>().unwrap_or_default();
        Self {
            version: "1.4.1".to_string(),
            entry_point: parse(ENTRY_POINT_V07),
            proxy_factory: parse("0x4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67"),
            singleton: parse("0x29fcB43b46531BcA003ddC8FCB67FFE91900C762"),
            module: parse("0x75cf11467937ce3F2f357CE24ffc3DBF8fD5c226"),
            module_setup: parse("0x2dd68b007B46fBe91B9A7c3EDa5A7a1063cB5b47"),
            multi_send: parse("0x38869bf66a61cF6bDB996A6aE40D5853Fd43B526"),
            salt_nonce: U256::zero(),
        }
    }
}

/// Counterfactual Safe owned by a single [`Account`].
#[derive(Debug, Clone)]
pub struct SmartAccount {
    owner: Account,
    implementation: AccountImplementation,
    chain_id: u64,
    address: Address,
}

impl SmartAccount {
    /// Computes the CREATE2 address the proxy factory would deploy to.
    /// Pure: same owner, implementation and chain always give the same address.
    pub fn derive(
        owner: Account,
        implementation: AccountImplementation,
        chain_id: u64,
        proxy_creation_code: &[u8],
    ) -> Self {
        let initializer = initializer(owner.address(), &implementation);

        let mut salt_input = keccak256(&initializer).to_vec();
        salt_input.extend_from_slice(&encode(&[Token::Uint(implementation.salt_nonce)]));
        let salt = keccak256(salt_input);

        let mut deployment_code = proxy_creation_code.to_vec();
        deployment_code.extend_from_slice(&encode(&[Token::Address(implementation.singleton)]));
        let init_code_hash = keccak256(deployment_code);

        let address =
            get_create2_address_from_hash(implementation.proxy_factory, salt, init_code_hash);

        Self {
            owner,
            implementation,
            chain_id,
            address,
        }
    }

    /// Reads the chain id and the factory's proxy creation code, then derives.
    pub async fn resolve<M: Middleware + 'static>(
        owner: Account,
        implementation: AccountImplementation,
        chain: Arc<M>,
    ) -> AgentResult<Self> {
        let chain_id = chain
            .get_chainid()
            .await
            .map_err(|err| AgentError::ChainRead(err.to_string()))?;
        let factory = SafeProxyFactory::new(implementation.proxy_factory, chain);
        let proxy_creation_code = factory
            .proxy_creation_code()
            .call()
            .await
            .map_err(|err| AgentError::ChainRead(err.to_string()))?;

        Ok(Self::derive(
            owner,
            implementation,
            chain_id.as_u64(),
            &proxy_creation_code,
        ))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> &Account {
        &self.owner
    }

    pub fn implementation(&self) -> &AccountImplementation {
        &self.implementation
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// `(factory, factoryData)` deploying this account on first use.
    pub fn deployment(&self) -> (Address, Bytes) {
        let call = CreateProxyWithNonceCall {
            singleton: self.implementation.singleton,
            initializer: initializer(self.owner.address(), &self.implementation),
            salt_nonce: self.implementation.salt_nonce,
        };
        (self.implementation.proxy_factory, call.encode().into())
    }

    /// Placeholder with the shape of a real signature, used while the relay
    /// sponsors an unsigned operation.
    pub fn dummy_signature() -> Bytes {
        let mut signature = vec![0u8; 12];
        signature.extend_from_slice(&[0xff; 32]);
        signature.extend_from_slice(&[0x7a; 32]);
        signature.push(0x1c);
        signature.into()
    }

    /// EIP-712 `SafeOp` digest checked by the 4337 module.
    pub fn operation_digest(&self, op: &UserOperation, valid_after: u64, valid_until: u64) -> H256 {
        let domain_separator = keccak256(encode(&[
            Token::FixedBytes(keccak256(DOMAIN_TYPE).to_vec()),
            Token::Uint(U256::from(self.chain_id)),
            Token::Address(self.implementation.module),
        ]));
        let struct_hash = keccak256(encode(&[
            Token::FixedBytes(keccak256(SAFE_OP_TYPE).to_vec()),
            Token::Address(op.sender),
            Token::Uint(op.nonce),
            Token::FixedBytes(keccak256(op.init_code()).to_vec()),
            Token::FixedBytes(keccak256(&op.call_data).to_vec()),
            Token::Uint(op.verification_gas_limit),
            Token::Uint(op.call_gas_limit),
            Token::Uint(op.pre_verification_gas),
            Token::Uint(op.max_priority_fee_per_gas),
            Token::Uint(op.max_fee_per_gas),
            Token::FixedBytes(keccak256(op.paymaster_and_data()).to_vec()),
            Token::Uint(U256::from(valid_after)),
            Token::Uint(U256::from(valid_until)),
            Token::Address(self.implementation.entry_point),
        ]));

        let mut payload = vec![0x19, 0x01];
        payload.extend_from_slice(&domain_separator);
        payload.extend_from_slice(&struct_hash);
        H256::from(keccak256(payload))
    }

    /// `validAfter(6) ++ validUntil(6) ++ r ++ s ++ v`, with no validity window.
    pub fn sign_operation(&self, op: &UserOperation) -> AgentResult<Bytes> {
        let digest = self.operation_digest(op, 0, 0);
        let signature = self
            .owner
            .wallet()
            .sign_hash(digest)
            .map_err(|err| AgentError::Signing(err.to_string()))?;

        let mut out = vec![0u8; 12];
        out.extend_from_slice(&signature.to_vec());
        Ok(out.into())
    }
}

/// Safe `setup` call: single owner, threshold one, 4337 module installed as
/// fallback handler. The module is enabled through a MultiSend delegatecall
/// wrapping `enableModules`, the same setup permissionless wallets deploy, so
/// the same key lands on the same account address.
fn initializer(owner: Address, implementation: &AccountImplementation) -> Bytes {
    let enable_modules = EnableModulesCall {
        modules: vec![implementation.module],
    }
    .encode();
    SetupCall {
        owners: vec![owner],
        threshold: U256::one(),
        to: implementation.multi_send,
        data: multi_send(&[(
            DELEGATE_CALL,
            implementation.module_setup,
            &enable_modules[..],
        )]),
        fallback_handler: implementation.module,
        payment_token: Address::zero(),
        payment: U256::zero(),
        payment_receiver: Address::zero(),
    }
    .encode()
    .into()
}
