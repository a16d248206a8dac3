pub mod account;
#[allow(clippy::module_inception)]
pub mod agent;
pub mod nonce;
pub mod session;

pub use account::{
    decode_key_hex, Account, AccountBinder, AccountImplementation, SmartAccount, ENTRY_POINT_V07,
};
pub use agent::{decode_events, expect_event, AgentSettings, Confirmed, OperationAgent};
pub use nonce::{nonce_key, nonce_sequence, random_nonce, NONCE_KEY_BYTES};
pub use session::{
    encode_calls, CallRequest, SmartAccountSession, DEFAULT_PRE_VERIFICATION_GAS,
    DEFAULT_VERIFICATION_GAS_LIMIT, MAX_BATCH_SIZE, MAX_CALL_GAS_LIMIT,
};
