use ethers::{
    abi::{encode, Token},
    types::{Address, Bytes, Log, TransactionReceipt, H256, U256},
    utils::keccak256,
};
use serde::{Deserialize, Serialize};

/// Entry point v0.7 user operation in the unpacked form relays accept over
/// JSON-RPC. Optional factory and paymaster fields are left out of the
/// payload when unset.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_verification_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_post_op_gas_limit: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster_data: Option<Bytes>,
    pub signature: Bytes,
}

impl UserOperation {
    /// set sender
    pub fn sender(mut self, sender: Address) -> Self {
        self.sender = sender;
        self
    }

    /// set nonce
    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    /// set factory and its deployment call data
    pub fn factory(mut self, factory: Address, factory_data: Bytes) -> Self {
        self.factory = Some(factory);
        self.factory_data = Some(factory_data);
        self
    }

    /// set call data
    pub fn call_data(mut self, call_data: Bytes) -> Self {
        self.call_data = call_data;
        self
    }

    /// set call_gas_limit
    pub fn call_gas_limit(mut self, call_gas_limit: U256) -> Self {
        self.call_gas_limit = call_gas_limit;
        self
    }

    /// set verification_gas_limit
    pub fn verification_gas_limit(mut self, verification_gas_limit: U256) -> Self {
        self.verification_gas_limit = verification_gas_limit;
        self
    }

    /// set pre_verification_gas
    pub fn pre_verification_gas(mut self, pre_verification_gas: U256) -> Self {
        self.pre_verification_gas = pre_verification_gas;
        self
    }

    /// set both EIP-1559 fee fields from a relay estimate
    pub fn fees(mut self, fees: &FeeEstimate) -> Self {
        self.max_fee_per_gas = fees.max_fee_per_gas;
        self.max_priority_fee_per_gas = fees.max_priority_fee_per_gas;
        self
    }

    /// set signature
    pub fn signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }

    /// Copies the paymaster fields and verification gas granted by the relay.
    /// The call gas limit stays untouched: it is a fixed ceiling chosen by the
    /// sender.
    pub fn apply_sponsorship(&mut self, sponsorship: &Sponsorship) {
        self.paymaster = Some(sponsorship.paymaster);
        self.paymaster_data = Some(sponsorship.paymaster_data.clone());
        self.paymaster_verification_gas_limit = Some(sponsorship.paymaster_verification_gas_limit);
        self.paymaster_post_op_gas_limit = Some(sponsorship.paymaster_post_op_gas_limit);
        self.verification_gas_limit = sponsorship.verification_gas_limit;
        self.pre_verification_gas = sponsorship.pre_verification_gas;
    }

    /// `factory ++ factoryData`, or empty when the account is already deployed.
    pub fn init_code(&self) -> Bytes {
        match (&self.factory, &self.factory_data) {
            (Some(factory), data) => {
                let mut out = factory.as_bytes().to_vec();
                if let Some(data) = data {
                    out.extend_from_slice(data);
                }
                out.into()
            }
            _ => Bytes::default(),
        }
    }

    /// `paymaster ++ uint128(verificationGas) ++ uint128(postOpGas) ++ paymasterData`
    pub fn paymaster_and_data(&self) -> Bytes {
        let Some(paymaster) = self.paymaster else {
            return Bytes::default();
        };
        let mut out = paymaster.as_bytes().to_vec();
        out.extend_from_slice(
            &self
                .paymaster_verification_gas_limit
                .unwrap_or_default()
                .low_u128()
                .to_be_bytes(),
        );
        out.extend_from_slice(
            &self
                .paymaster_post_op_gas_limit
                .unwrap_or_default()
                .low_u128()
                .to_be_bytes(),
        );
        if let Some(data) = &self.paymaster_data {
            out.extend_from_slice(data);
        }
        out.into()
    }

    /// `verificationGasLimit << 128 | callGasLimit`
    pub fn account_gas_limits(&self) -> [u8; 32] {
        pack_u128_pair(self.verification_gas_limit, self.call_gas_limit)
    }

    /// `maxPriorityFeePerGas << 128 | maxFeePerGas`
    pub fn gas_fees(&self) -> [u8; 32] {
        pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas)
    }

    /// Pack the user operation data into bytes, signature excluded
    pub fn pack_without_signature(&self) -> Bytes {
        let encoded = encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(self.init_code()).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::FixedBytes(self.account_gas_limits().to_vec()),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(self.gas_fees().to_vec()),
            Token::FixedBytes(keccak256(self.paymaster_and_data()).to_vec()),
        ]);

        Bytes::from(encoded)
    }

    /// calculate the hash the entry point assigns to this operation
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let op_hash = keccak256(self.pack_without_signature());
        H256::from(keccak256(encode(&[
            Token::FixedBytes(op_hash.to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ])))
    }
}

fn pack_u128_pair(high: U256, low: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(&high.low_u128().to_be_bytes());
    out[16..].copy_from_slice(&low.low_u128().to_be_bytes());
    out
}

/// One tier of the relay's gas price oracle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Response of `pimlico_getUserOperationGasPrice`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceTiers {
    pub slow: FeeEstimate,
    pub standard: FeeEstimate,
    pub fast: FeeEstimate,
}

/// Paymaster fields and gas limits returned by `pm_sponsorUserOperation`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsorship {
    pub paymaster: Address,
    pub paymaster_data: Bytes,
    pub paymaster_verification_gas_limit: U256,
    pub paymaster_post_op_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    #[serde(default)]
    pub call_gas_limit: U256,
}

/// Return a UserOperation receipt based on a hash returned by eth_sendUserOperation
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    #[serde(default)]
    pub entry_point: Address,
    pub sender: Address,
    pub nonce: U256,
    #[serde(default)]
    pub paymaster: Option<Address>,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    /// Did this execution complete without revert
    pub success: bool,
    /// In case of revert, this is the revert reason
    #[serde(default)]
    pub reason: Option<String>,
    /// The logs generated by this UserOperation only
    pub logs: Vec<Log>,
    /// Receipt of the whole bundle transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransactionReceipt>,
}
