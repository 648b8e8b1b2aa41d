//! # flowq
//!
//! Work item queue processing for the dependency-flow backend.
//!
//! Provides a pgmq-backed at-least-once work item queue, typed producers,
//! an immutable processor registry, a drainable scope manager that lets
//! deployments stop a replica between work items, the consumer loop that
//! ties them together, and the HTTP control surface to start/stop it.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod processor;
pub mod producer;
pub mod queue;
pub mod telemetry;
