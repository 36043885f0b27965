//! # gatedb-testing
//!
//! Test infrastructure for gatedb.
//!
//! ## Features
//!
//! - Scriptable in-memory pool provider (no database required)
//! - Failure injection for pool creation, acquisition and close
//! - Call recording for asserting what reached the driver
//! - Two-pool fixtures
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatedb::{Binds, ExecuteOptions};
//! use gatedb_testing::fixtures::{DUAL_QUERY, TestFixture};
//! use gatedb_testing::mock_provider::{MockProvider, MockResponse};
//!
//! #[tokio::test]
//! async fn test_with_mock_provider() {
//!     let provider = MockProvider::builder()
//!         .with_response(DUAL_QUERY, MockResponse::scalar("1", 1))
//!         .build();
//!     let fixture = TestFixture::two_pools(provider).unwrap();
//!
//!     let pending = fixture.db.execute_one("A", DUAL_QUERY, Binds::none(), ExecuteOptions::new());
//!     fixture.db.initialize().await.unwrap();
//!     let rows = pending.await.unwrap();
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_provider;

pub use fixtures::TestFixture;
pub use mock_provider::{ExecutedCall, MockProvider, MockResponse, MockStats};
