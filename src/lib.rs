// ============================================================================
// scratchdb Library
// ============================================================================

//! Disposable, self-cleaning scratch databases for integration tests.
//!
//! Each [`Session`] provisions a uniquely named database on the target
//! server, hands out connections scoped to it, and guarantees the
//! database is eventually dropped — even when a process crashes before
//! cleanup runs. Every live scratch database has a durable record file
//! in the registry directory; the next session construction sweeps up
//! records left behind by crashed runs.
//!
//! # Examples
//!
//! Against a real Postgres server:
//!
//! ```no_run
//! use scratchdb::{Connection, Postgres, Session};
//!
//! # async fn example() -> scratchdb::Result<()> {
//! let mut session = Session::<Postgres>::create_with(
//!     "host=localhost user=postgres",
//!     "unit",
//!     |mut conn| async move {
//!         conn.batch_execute("CREATE TABLE users (id INT, name TEXT)").await?;
//!         conn.close().await
//!     },
//! )
//! .await?;
//!
//! let conn = session.create_connection().await?;
//! // ... run the test against `conn` ...
//!
//! session.dispose(); // teardown runs detached
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod conninfo;
pub mod core;
pub mod ident;
pub mod registry;
pub mod session;
pub mod sweeper;

// Re-export main types for convenience
pub use backend::memory::Memory;
#[cfg(feature = "postgres")]
pub use backend::postgres::Postgres;
pub use backend::{Backend, Connection};
pub use core::{Result, ScratchError};
pub use registry::{Registry, RegistryRecord};
pub use session::{Session, SessionBuilder};
pub use sweeper::{SweepReport, sweep_orphans};
