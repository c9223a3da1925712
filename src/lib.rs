//! VERDICTION — Pari-Mutuel Verdict Market Ledger
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod error;
pub mod pricing;
pub mod ledger;
pub mod gateway;
pub mod verdict;
pub mod api;
