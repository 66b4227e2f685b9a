pub mod amount;
pub mod clock;
pub mod config;
pub mod csv;
pub mod engine;
pub mod gateway;
pub mod ledger;
pub mod model;
pub mod retry;
pub mod scenario;

pub use amount::{Amount, Rate};
pub use config::EngineConfig;
pub use engine::Engine;
pub use scenario::{Event, Scenario};
