//! Multi-chain coordination: fan-out queries, portfolio aggregation,
//! gas arbitration and arbitrage detection.

pub mod arbitrage;
pub mod fanout;
pub mod gas;
pub mod portfolio;

pub use arbitrage::ArbitrageScanner;
pub use fanout::{FanOut, TaskOutcome};
pub use gas::{GasArbiter, GasQuote};
pub use portfolio::{PortfolioSnapshot, PortfolioTracker};
