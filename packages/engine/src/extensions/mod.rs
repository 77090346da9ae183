// packages/engine/src/extensions/mod.rs
//! Built-in execution extensions
//!
//! - **user_concurrency**: per-user permits
//! - **event_emission**: lifecycle events to the connected client
//! - **domain_optimization**: hints and result caching for selected agents
//! - **tool_integration**: tool server discovery metadata

pub mod domain_optimization;
pub mod event_emission;
pub mod tool_integration;
pub mod user_concurrency;

pub use domain_optimization::{DomainOptimizationConfig, DomainOptimizationExtension};
pub use event_emission::EventEmissionExtension;
pub use tool_integration::ToolIntegrationExtension;
pub use user_concurrency::{UserConcurrencyExtension, UserExecutionState};
