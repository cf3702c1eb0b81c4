//! Server module for regquery
//!
//! Contains the scheduler process initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures
//! - `loader`: Configuration loading from files and environment
//! - `validation`: Configuration validation
//! - `handlers`: Payload handlers the server registers
//! - `background_tasks`: Scheduler context construction and startup
//! - `init`: Main run loop

mod background_tasks;
pub mod config;
mod handlers;
mod init;
mod loader;
mod validation;

// Re-export public API
pub use background_tasks::build_context;
pub use init::run;
pub use loader::load_config;
