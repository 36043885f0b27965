//! # gatedb
//!
//! Readiness-gated execution facade over named database connection pools.
//!
//! Pools are created asynchronously during [`Database::initialize`]. Requests
//! issued before that finishes are not rejected and do not block the caller:
//! they are queued and replayed, in submission order, the moment every
//! configured pool exists.
//!
//! ## Features
//!
//! - Deferred execution queue drained strictly FIFO on readiness
//! - One-shot readiness notification ([`ReadySignal`]) with late-subscriber support
//! - Scoped connection borrowing: one connection per statement or batch,
//!   always returned, close failures logged and never surfaced
//! - Forced autocommit and object-shaped rows on every call
//! - Batch execution with per-row errors reported inline
//! - Best-effort, error-collecting shutdown
//!
//! ## State Machine
//!
//! ```text
//! NotStarted -> Initializing (via initialize())
//! Initializing -> Ready (all pools created, queue drained)
//! Initializing -> Stuck (a pool failed to create; queued work never runs)
//! any state -> Closed (via shutdown(); queued requests fail with Error::Closed)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatedb::{Binds, Database, ExecuteOptions, PoolConfig};
//!
//! let db = Database::builder()
//!     .provider(my_provider)
//!     .pool(PoolConfig::new("hr", "db-host/ORCLPDB1").user("hr").password("secret"))
//!     .build()?;
//!
//! // Safe to call before the pools exist: the request is queued.
//! let pending = db.execute_one("hr", "SELECT 1 FROM DUAL", Binds::none(), ExecuteOptions::new());
//!
//! db.initialize().await?;
//! let result = pending.await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod binds;
pub mod config;
mod connection;
pub mod database;
pub mod error;
pub mod gate;
pub mod instrumentation;
pub mod options;
pub mod provider;
pub mod registry;
pub mod result;

pub use binds::Binds;
pub use config::{DatabaseConfig, PoolConfig};
pub use database::{Database, DatabaseBuilder, ShutdownReport};
pub use error::{Error, Result};
pub use gate::{CommandKind, CommandSummary, Pending, ReadinessGate, ReadinessState, ReadySignal};
pub use options::{ExecuteOptions, OutputFormat};
pub use provider::{Connection, DriverError, PoolHandle, PoolProvider};
pub use registry::PoolRegistry;
pub use result::{BatchError, BatchResult, Column, ResultSet, Row};
