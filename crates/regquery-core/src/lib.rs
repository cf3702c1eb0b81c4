//! Regquery Core - background task scheduling
//!
//! This crate provides the scheduling and execution subsystem of the registry
//! query service:
//! - Triggers: interval, cron and one-shot date schedules
//! - Backends: named schedulers with durable job stores
//! - Runner: payload execution with a per-firing audit record
//! - Registry/Bootstrap: restart-safe registration of the static catalog

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scheduler;

pub use scheduler::{SchedulerContext, SchedulerError, SchedulerResult};
