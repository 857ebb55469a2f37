//! Test helpers for reconciliation integration tests.
//!
//! This module provides:
//! - An in-memory mock connector with paging, write limits and failure hooks
//! - Record and table spec builders

#![allow(dead_code)]

pub mod mock_connector;
