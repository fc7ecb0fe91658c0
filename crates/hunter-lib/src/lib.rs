//! Core library for IdleHunter
//!
//! This crate provides the core functionality for:
//! - Discovering VMs from heterogeneous infrastructure sources
//! - Caching upstream responses within a scan window
//! - Keeping a durable inventory keyed by (source, identity)
//! - Rule-based idle/missing classification
//! - Scan orchestration and scheduling
//! - Health checks and observability

pub mod cache;
pub mod detection;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod registry;
pub mod runs;
pub mod savings;
pub mod scan;
pub mod schedule;
pub mod sources;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{HunterMetrics, StructuredLogger};
