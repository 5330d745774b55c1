pub mod billing;
pub mod catalog;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod routes;
pub mod test_util;

pub use billing::{ChargeOutcome, CreditLedger, InMemoryLedger, NullLedger};
pub use catalog::{ModelCatalog, StaticCatalog};
pub use config::Config;
pub use gateway::{
    ExecutionConfig, Gateway, GatewayError, GatewayStatus, HealthConfig, QueueConfig, RouteOutcome,
};

use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// The inference gateway core.
    pub gateway: Arc<Gateway>,
    /// Credit ledger collaborator, charged after successful completions.
    pub ledger: Arc<dyn CreditLedger>,
}
