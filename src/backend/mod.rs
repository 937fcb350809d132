//! Connection backend abstraction.
//!
//! A [`Backend`] supplies everything the session protocol needs from a
//! concrete database client: opening connections, the DDL text for
//! creating and dropping a database, and connection-string scoping.
//! Sessions are parameterized over a backend type, and the backend's
//! [`Backend::DISCRIMINATOR`] keys the on-disk registry so unrelated
//! backends never sweep each other's records.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::core::Result;

/// A client connection created by a backend.
#[async_trait]
pub trait Connection: Send + Sized + 'static {
    /// Execute a single statement, returning the affected row count.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Execute a batch of statements with no result.
    ///
    /// DDL goes through here: some servers refuse to prepare statements
    /// like `CREATE DATABASE`, so this path must not prepare.
    async fn batch_execute(&mut self, sql: &str) -> Result<()>;

    /// Close the connection.
    async fn close(self) -> Result<()>;
}

/// A database client capable of hosting scratch databases.
///
/// All operations are associated functions: a backend is a type-level
/// tag, not a value.
#[async_trait]
pub trait Backend: Send + Sync + Sized + 'static {
    /// Client connection handle given to callers.
    type Connection: Connection;

    /// Force-shutdown handle retained by the session for every
    /// connection it creates, so teardown can terminate connections
    /// regardless of their state.
    type Handle: Send + 'static;

    /// Registry discriminator. Must be stable across releases: records
    /// written by a crashed run are swept by a later one only if the
    /// discriminators match.
    const DISCRIMINATOR: &'static str;

    /// Open a connection.
    async fn connect(conn_string: &str) -> Result<(Self::Connection, Self::Handle)>;

    /// Force-close the connection behind `handle`, whatever its state.
    fn terminate(handle: Self::Handle);

    /// DDL that creates `database`. Creation of an existing database
    /// must fail.
    fn create_database_sql(database: &str) -> String;

    /// DDL that drops `database`, tolerating "does not exist" as
    /// success.
    fn drop_database_sql(database: &str) -> String;

    /// Substitute `database` as the target of `base`, yielding the
    /// scoped connection string.
    fn scoped_connection_string(base: &str, database: &str) -> Result<String>;

    /// Hook executed on a server-level connection right before the drop
    /// DDL. Backends whose servers refuse to drop a database with live
    /// sessions evict them here. The default does nothing.
    async fn prepare_drop(conn: &mut Self::Connection, database: &str) -> Result<()> {
        let _ = (conn, database);
        Ok(())
    }
}
