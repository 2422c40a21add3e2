//! Infrastructure layer: the access engine, its stores, audit and config.

pub mod audit;
pub mod config;
pub mod engine;
pub mod locks;
pub mod seed;
pub mod store;


pub use config::{ConfigError, EngineConfig};
pub use engine::{AccessEngine, OperationContext};
