pub mod api;
pub mod connector;
pub mod types;

pub use connector::{RelayConnector, RelaySession, RelaySettings, DEFAULT_RELAY_URL};
pub use types::{FeeEstimate, GasPriceTiers, Sponsorship, UserOperation, UserOperationReceipt};
