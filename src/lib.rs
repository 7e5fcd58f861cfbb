//! Gorkwheel keeper library
//!
//! Exposes the keeper's modules for use by binaries and tests.

pub mod accrual;
pub mod advisor;
pub mod config;
pub mod guardrail;
pub mod health;
pub mod keeper;
pub mod ledger;
pub mod models;
