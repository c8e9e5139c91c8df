//! Core types, agent catalogue, config, errors, and interaction recording for learnroute.

pub mod agent;
pub mod config;
pub mod error;
pub mod protocol;
pub mod record_store;
pub mod recorder;
pub mod schemas;
pub mod types;
