//! Custom alert evaluation engine

pub mod audit;
pub mod backend;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod housekeeping;
pub mod metrics;
pub mod processor;
pub mod recorder;
pub mod resolver;
pub mod storage;
pub mod task;
pub mod validator;

pub use config::MAX_RETRIES;
pub use error::{AlertError, RunError};
pub use processor::{AlertProcessor, RuleOutcome, RunSummary};
pub use task::RunContext;
