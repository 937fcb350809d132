//! Postgres backend over tokio-postgres.
//!
//! Server connection strings use the `key=value` form, e.g.
//! `host=localhost user=postgres password=secret`. Scoping substitutes
//! the generated database name as `dbname`.

use async_trait::async_trait;
use tokio_postgres::NoTls;
use tracing::debug;

use crate::backend::{Backend, Connection};
use crate::conninfo;
use crate::core::{Result, ScratchError};

/// The Postgres backend type tag.
pub struct Postgres;

/// A live tokio-postgres client. The connection driver task runs
/// detached; dropping the client ends it.
pub struct PostgresConnection {
    client: tokio_postgres::Client,
}

fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.client
            .execute(sql, &[])
            .await
            .map_err(|e| ScratchError::Execution(e.to_string()))
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        // Simple query protocol: CREATE/DROP DATABASE cannot be prepared.
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| ScratchError::Execution(e.to_string()))
    }

    async fn close(self) -> Result<()> {
        // Dropping the client closes the socket and ends the driver task.
        Ok(())
    }
}

#[async_trait]
impl Backend for Postgres {
    type Connection = PostgresConnection;
    type Handle = tokio::task::AbortHandle;

    const DISCRIMINATOR: &'static str = "postgres";

    async fn connect(conn_string: &str) -> Result<(Self::Connection, Self::Handle)> {
        let (client, connection) = tokio_postgres::connect(conn_string, NoTls)
            .await
            .map_err(|e| ScratchError::Connect(e.to_string()))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "postgres connection driver ended");
            }
        });

        Ok((PostgresConnection { client }, driver.abort_handle()))
    }

    fn terminate(handle: Self::Handle) {
        // Aborting the driver task drops the socket, which force-closes
        // the connection whatever state it is in.
        handle.abort();
    }

    fn create_database_sql(database: &str) -> String {
        format!("CREATE DATABASE {}", quote_identifier(database))
    }

    fn drop_database_sql(database: &str) -> String {
        format!("DROP DATABASE IF EXISTS {}", quote_identifier(database))
    }

    fn scoped_connection_string(base: &str, database: &str) -> Result<String> {
        conninfo::with_database(base, database)
    }

    async fn prepare_drop(conn: &mut Self::Connection, database: &str) -> Result<()> {
        // A drop fails while sessions are attached to the database;
        // evict lingering ones (pooled clients, leaked test connections)
        // first.
        conn.client
            .execute(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = $1 AND pid <> pg_backend_pid()",
                &[&database],
            )
            .await
            .map_err(|e| ScratchError::Execution(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_database_sql() {
        assert_eq!(
            Postgres::create_database_sql("DBunit_0abc"),
            "CREATE DATABASE \"DBunit_0abc\""
        );
    }

    #[test]
    fn test_drop_database_sql_tolerates_absent() {
        assert_eq!(
            Postgres::drop_database_sql("DBunit_0abc"),
            "DROP DATABASE IF EXISTS \"DBunit_0abc\""
        );
    }

    #[test]
    fn test_quote_identifier_escapes() {
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_scoped_connection_string() {
        let scoped =
            Postgres::scoped_connection_string("host=localhost user=postgres", "DBx_1").unwrap();
        assert_eq!(scoped, "host=localhost user=postgres dbname=DBx_1");

        let scoped = Postgres::scoped_connection_string(
            "host=localhost user=postgres dbname=postgres",
            "DBx_1",
        )
        .unwrap();
        assert_eq!(scoped, "host=localhost user=postgres dbname=DBx_1");
    }

    #[test]
    fn test_discriminator() {
        assert_eq!(Postgres::DISCRIMINATOR, "postgres");
    }
}
