//! MARTEN — Martingale Automated Re-entry Trading ENgine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod advisor;
pub mod broker;
pub mod config;
pub mod engine;
pub mod ladder;
pub mod reconcile;
pub mod registry;
pub mod surface;
pub mod types;
