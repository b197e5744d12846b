//! Helpers shared by unit and integration tests.
//!
//! Compiled for crate unit tests and, through the `test-util` feature, for
//! the integration tests under `tests/`.

pub mod flag_fixtures;
pub mod mock_server;
