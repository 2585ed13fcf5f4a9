//! Configuration module for the export worker
//!
//! This module provides the `ExporterConfig` struct and its type-safe builder
//! with validation and defaults tuned for dashboard/insight rendering.

pub mod builder;
pub mod getters;
pub mod types;

pub use builder::{ExporterConfigBuilder, WithSiteUrl};
pub use types::{
    DEFAULT_DASHBOARD_VIEWPORT_WIDTH, DEFAULT_INSIGHT_VIEWPORT_WIDTH, DEFAULT_JOB_TIMEOUT_SECS,
    DEFAULT_READINESS_POLL_INTERVAL_MS, DEFAULT_READINESS_SELECTOR,
    DEFAULT_READINESS_TIMEOUT_SECS, DEFAULT_TOKEN_TTL_SECS, ExporterConfig,
};
