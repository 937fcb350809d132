//! In-process backend backed by a global catalog of named servers.
//!
//! Connection strings are `mem://<server>` for server-level access and
//! `mem://<server>/<database>` for a scoped connection. Servers spring
//! into existence on first connect; databases must be created through
//! the usual DDL. The crate's own tests run against this backend, and
//! downstream tests can use it to exercise fixture lifecycles without a
//! live server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lazy_static::lazy_static;
use tracing::debug;

use crate::backend::{Backend, Connection};
use crate::core::{Result, ScratchError};

// Global catalog: server name -> set of databases on it.
lazy_static! {
    static ref SERVERS: Mutex<HashMap<String, HashSet<String>>> = Mutex::new(HashMap::new());
}

const SCHEME: &str = "mem://";

/// The in-memory backend type tag.
pub struct Memory;

/// A connection to an in-memory server.
#[derive(Debug)]
pub struct MemoryConnection {
    server: String,
    open: Arc<AtomicBool>,
}

fn parse_url(conn_string: &str) -> Result<(String, Option<String>)> {
    let rest = conn_string.strip_prefix(SCHEME).ok_or_else(|| {
        ScratchError::ConnectionString(format!("expected {SCHEME}<server>, got '{conn_string}'"))
    })?;

    let (server, database) = match rest.split_once('/') {
        Some((server, database)) => (server, Some(database.to_string())),
        None => (rest, None),
    };
    if server.is_empty() {
        return Err(ScratchError::ConnectionString(format!(
            "missing server name in '{conn_string}'"
        )));
    }
    if matches!(database.as_deref(), Some("")) {
        return Err(ScratchError::ConnectionString(format!(
            "empty database name in '{conn_string}'"
        )));
    }
    Ok((server.to_string(), database))
}

fn unquote(identifier: &str) -> &str {
    identifier.trim().trim_matches('"')
}

/// Whether `database` currently exists on the server addressed by
/// `conn_string`. Test observability helper.
pub fn database_exists(conn_string: &str, database: &str) -> bool {
    let Ok((server, _)) = parse_url(conn_string) else {
        return false;
    };
    SERVERS
        .lock()
        .map(|servers| {
            servers
                .get(&server)
                .is_some_and(|databases| databases.contains(database))
        })
        .unwrap_or(false)
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ScratchError::Execution("connection is closed".into()))
        }
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.ensure_open()?;

        let sql = sql.trim().trim_end_matches(';');
        if let Some(name) = sql.strip_prefix("CREATE DATABASE ") {
            let name = unquote(name);
            let mut servers = SERVERS.lock()?;
            let databases = servers.entry(self.server.clone()).or_default();
            if !databases.insert(name.to_string()) {
                return Err(ScratchError::DatabaseExists(name.to_string()));
            }
            debug!(server = %self.server, database = name, "created in-memory database");
        } else if let Some(name) = sql.strip_prefix("DROP DATABASE IF EXISTS ") {
            let name = unquote(name);
            let mut servers = SERVERS.lock()?;
            if let Some(databases) = servers.get_mut(&self.server) {
                databases.remove(name);
            }
            debug!(server = %self.server, database = name, "dropped in-memory database");
        }
        // Everything else (schema setup, seeds) is accepted and ignored.
        Ok(0)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.execute(sql).await.map(|_| ())
    }

    async fn close(self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Backend for Memory {
    type Connection = MemoryConnection;
    type Handle = Arc<AtomicBool>;

    const DISCRIMINATOR: &'static str = "memory";

    async fn connect(conn_string: &str) -> Result<(Self::Connection, Self::Handle)> {
        let (server, database) = parse_url(conn_string)?;

        let mut servers = SERVERS.lock()?;
        let databases = servers.entry(server.clone()).or_default();
        if let Some(database) = database {
            if !databases.contains(&database) {
                return Err(ScratchError::DatabaseNotFound(database));
            }
        }

        let open = Arc::new(AtomicBool::new(true));
        Ok((
            MemoryConnection {
                server,
                open: Arc::clone(&open),
            },
            open,
        ))
    }

    fn terminate(handle: Self::Handle) {
        handle.store(false, Ordering::SeqCst);
    }

    fn create_database_sql(database: &str) -> String {
        format!("CREATE DATABASE \"{database}\"")
    }

    fn drop_database_sql(database: &str) -> String {
        format!("DROP DATABASE IF EXISTS \"{database}\"")
    }

    fn scoped_connection_string(base: &str, database: &str) -> Result<String> {
        let (server, existing) = parse_url(base)?;
        if existing.is_some() {
            return Err(ScratchError::ConnectionString(format!(
                "'{base}' already targets a database; a server-level string is required"
            )));
        }
        Ok(format!("{SCHEME}{server}/{database}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url() {
        assert_eq!(
            parse_url("mem://srv").unwrap(),
            ("srv".to_string(), None)
        );
        assert_eq!(
            parse_url("mem://srv/db1").unwrap(),
            ("srv".to_string(), Some("db1".to_string()))
        );
        assert!(parse_url("mem://").is_err());
        assert!(parse_url("mem://srv/").is_err());
        assert!(parse_url("postgres://srv").is_err());
    }

    #[test]
    fn test_scoped_connection_string() {
        let scoped = Memory::scoped_connection_string("mem://srv", "DBx_1").unwrap();
        assert_eq!(scoped, "mem://srv/DBx_1");

        assert!(Memory::scoped_connection_string("mem://srv/other", "DBx_1").is_err());
    }

    #[tokio::test]
    async fn test_create_and_drop() {
        let server = "mem://memtest-create-drop";
        let (mut conn, _handle) = Memory::connect(server).await.unwrap();

        conn.batch_execute(&Memory::create_database_sql("DBa_1"))
            .await
            .unwrap();
        assert!(database_exists(server, "DBa_1"));

        // Duplicate creation fails.
        let err = conn
            .batch_execute(&Memory::create_database_sql("DBa_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ScratchError::DatabaseExists(_)));

        conn.batch_execute(&Memory::drop_database_sql("DBa_1"))
            .await
            .unwrap();
        assert!(!database_exists(server, "DBa_1"));

        // Dropping an absent database is success.
        conn.batch_execute(&Memory::drop_database_sql("DBa_1"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_connect_scoped_requires_database() {
        let server = "mem://memtest-scoped";
        let (mut conn, _handle) = Memory::connect(server).await.unwrap();
        conn.batch_execute(&Memory::create_database_sql("DBb_2"))
            .await
            .unwrap();

        assert!(Memory::connect("mem://memtest-scoped/DBb_2").await.is_ok());

        let err = Memory::connect("mem://memtest-scoped/DBmissing_0")
            .await
            .unwrap_err();
        assert!(matches!(err, ScratchError::DatabaseNotFound(_)));
    }

    #[tokio::test]
    async fn test_terminate_closes_connection() {
        let (mut conn, handle) = Memory::connect("mem://memtest-terminate").await.unwrap();
        Memory::terminate(handle);

        let err = conn.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, ScratchError::Execution(_)));
    }
}
