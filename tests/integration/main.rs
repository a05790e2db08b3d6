//! Integration test binary -- all integration tests consolidated into a single
//! binary to keep link time down.

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

mod channel_contracts;
mod config_loading;
mod sqlite_store;
