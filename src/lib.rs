//! testforge -- CLI companion for an automated API test generation and
//! execution backend.
//!
//! This crate provides the client library: typed access to the backend's
//! HTTP endpoints, the polling tracker that follows an execution to its
//! terminal state, and the local SQLite archive of results and generated
//! tests.

pub mod backend;
pub mod config;
pub mod history;
pub mod model;
pub mod store;
pub mod tracker;
