//! Test utilities.
//!
//! This module provides:
//! - Factories for valid ledger and catalog fixtures
//! - An in-memory ledger with the same transactional behaviour as Postgres
//! - A recording gateway that signs with fixed test secrets
//! - `TestAppStateBuilder` for route tests

mod app_state_builder;
mod factories;
mod gateway_mocks;
mod ledger_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use gateway_mocks::*;
pub use ledger_mocks::*;
