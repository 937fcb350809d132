//! Scratch database sessions.
//!
//! A [`Session`] owns exactly one freshly created database on the target
//! server. Construction creates the database, records it in the on-disk
//! registry, and sweeps up leftovers from earlier crashed runs.
//! Disposal (explicit or via `Drop`) hands teardown to a detached task
//! that force-closes tracked connections, drops the database, and
//! removes the registry record. The database exists if and only if its
//! record exists.

use std::future::Future;
use std::marker::PhantomData;
use std::mem;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::backend::{Backend, Connection};
use crate::core::{Result, ScratchError};
use crate::ident;
use crate::registry::Registry;
use crate::sweeper;

/// One provisioned scratch database.
///
/// # Examples
///
/// ```
/// use scratchdb::{Memory, Session};
///
/// tokio::runtime::Runtime::new().unwrap().block_on(async {
///     let dir = tempfile::tempdir().unwrap();
///     let mut session = Session::<Memory>::builder("mem://example-server")
///         .key("unit")
///         .registry_dir(dir.path())
///         .build()
///         .await
///         .unwrap();
///
///     assert!(session.database_name().starts_with("DBunit_"));
///     session.dispose();
/// });
/// ```
pub struct Session<B: Backend> {
    name: String,
    database_name: String,
    connection_string: String,
    server_connection_string: String,
    record_path: PathBuf,
    handles: Vec<B::Handle>,
    disposed: bool,
}

impl<B: Backend> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("database_name", &self.database_name)
            .field("connection_string", &self.connection_string)
            .field("server_connection_string", &self.server_connection_string)
            .field("record_path", &self.record_path)
            .field("handles", &self.handles.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder<B: Backend> {
    server: String,
    key: String,
    database_name: Option<String>,
    registry_dir: Option<PathBuf>,
    sweep: bool,
    _backend: PhantomData<B>,
}

impl<B: Backend> SessionBuilder<B> {
    fn new(server: &str) -> Self {
        Self {
            server: server.to_string(),
            key: String::new(),
            database_name: None,
            registry_dir: None,
            sweep: true,
            _backend: PhantomData,
        }
    }

    /// Logical name folded into the generated database name.
    pub fn key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    /// Use `name` verbatim instead of a generated database name.
    ///
    /// The caller takes over the uniqueness guarantee; a collision shows
    /// up as a provisioning failure.
    pub fn database_name(mut self, name: &str) -> Self {
        self.database_name = Some(name.to_string());
        self
    }

    /// Write registry records to `dir` instead of the platform temp
    /// directory.
    pub fn registry_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.registry_dir = Some(dir.into());
        self
    }

    /// Do not sweep orphaned records during construction.
    pub fn skip_sweep(mut self) -> Self {
        self.sweep = false;
        self
    }

    /// Provision the database and build the session.
    ///
    /// Fails atomically: on any error no registry record exists, no
    /// connection is tracked, and no teardown is scheduled.
    pub async fn build(self) -> Result<Session<B>> {
        let database_name = self
            .database_name
            .unwrap_or_else(|| ident::database_name(&self.key));

        // Scoping parses the base string, so a malformed one is rejected
        // before any I/O happens.
        let connection_string = B::scoped_connection_string(&self.server, &database_name)?;

        let registry = match &self.registry_dir {
            Some(dir) => Registry::with_dir(dir, B::DISCRIMINATOR),
            None => Registry::new(B::DISCRIMINATOR),
        };

        debug!(database = %database_name, "creating scratch database");
        create_database::<B>(&self.server, &database_name).await?;

        if self.sweep {
            // Reclaim leftovers from earlier crashed runs. Our own
            // database has no record yet and cannot be swept.
            let report = sweeper::sweep_orphans::<B>(&self.server, &registry).await;
            if report.swept > 0 || report.failed > 0 {
                debug!(swept = report.swept, failed = report.failed, "orphan sweep finished");
            }
        }

        let record = match registry.register(&database_name) {
            Ok(record) => record,
            Err(e) => {
                // The database exists but cannot be tracked; take it
                // back down right away rather than leaking it.
                warn!(database = %database_name, error = %e, "failed to register scratch database");
                if let Err(drop_err) =
                    sweeper::drop_database::<B>(&self.server, &database_name).await
                {
                    warn!(database = %database_name, error = %drop_err, "failed to drop untracked scratch database");
                }
                return Err(e);
            }
        };

        debug!(database = %database_name, "scratch database ready");
        Ok(Session {
            name: self.key,
            database_name,
            connection_string,
            server_connection_string: self.server,
            record_path: record.path().to_path_buf(),
            handles: Vec::new(),
            disposed: false,
        })
    }

    /// Build the session, then run `initializer` on a scoped connection
    /// before returning it.
    ///
    /// On initializer failure the database stays registered; the record
    /// is deliberately left for the next sweep instead of being torn
    /// down on the error path.
    pub async fn build_with<F, Fut>(self, initializer: F) -> Result<Session<B>>
    where
        F: FnOnce(B::Connection) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut session = self.build().await?;
        if let Err(e) = session.initialize(initializer).await {
            session.disposed = true;
            return Err(e);
        }
        Ok(session)
    }
}

impl<B: Backend> Session<B> {
    /// Start building a session against a server-level connection
    /// string.
    pub fn builder(server_conn_string: &str) -> SessionBuilder<B> {
        SessionBuilder::new(server_conn_string)
    }

    /// Provision a scratch database with an empty key.
    pub async fn create(server_conn_string: &str) -> Result<Self> {
        Self::builder(server_conn_string).build().await
    }

    /// Provision a scratch database named after `key`.
    pub async fn create_named(server_conn_string: &str, key: &str) -> Result<Self> {
        Self::builder(server_conn_string).key(key).build().await
    }

    /// Provision a scratch database and run `initializer` on a scoped
    /// connection before returning.
    ///
    /// An initializer failure propagates, but the database stays
    /// registered: the record is deliberately left for the next sweep
    /// instead of being torn down on the error path.
    pub async fn create_with<F, Fut>(
        server_conn_string: &str,
        key: &str,
        initializer: F,
    ) -> Result<Self>
    where
        F: FnOnce(B::Connection) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        Self::builder(server_conn_string)
            .key(key)
            .build_with(initializer)
            .await
    }

    /// The caller-supplied key (possibly empty).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The generated database name.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Connection string scoped to this session's database.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// The server-level connection string the session was built from.
    pub fn server_connection_string(&self) -> &str {
        &self.server_connection_string
    }

    /// Path of this session's registry record.
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Open a connection to the session's database.
    ///
    /// The caller owns the connection and closes it for normal use; the
    /// session keeps a shutdown handle and force-terminates it during
    /// teardown regardless of its state.
    pub async fn create_connection(&mut self) -> Result<B::Connection> {
        let (conn, handle) = B::connect(&self.connection_string).await?;
        self.handles.push(handle);
        Ok(conn)
    }

    /// Run `handler` with a fresh connection to the session's database.
    ///
    /// The handler owns the connection, so it is released on every exit
    /// path. A handler failure propagates; the session stays provisioned
    /// and registered.
    pub async fn initialize<F, Fut>(&mut self, handler: F) -> Result<()>
    where
        F: FnOnce(B::Connection) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let conn = self.create_connection().await?;
        handler(conn).await
    }

    /// Run a batch of SQL statements against the session's database.
    ///
    /// Convenience form of [`Session::initialize`] for script-style
    /// schema setup.
    pub async fn initialize_batch(&mut self, sql: &str) -> Result<()> {
        let mut conn = self.create_connection().await?;
        let result = conn.batch_execute(sql).await;
        let _ = conn.close().await;
        result
    }

    /// Tear the session down: force-close tracked connections, drop the
    /// database, remove the registry record.
    ///
    /// Cleanup runs detached and this method returns immediately, so the
    /// database is not necessarily gone when it does. Calling `dispose`
    /// again, or dropping the session afterwards, is a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        spawn_teardown(TeardownJob::<B> {
            server: self.server_connection_string.clone(),
            database: self.database_name.clone(),
            record_path: self.record_path.clone(),
            handles: mem::take(&mut self.handles),
        });
    }
}

impl<B: Backend> Drop for Session<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

struct TeardownJob<B: Backend> {
    server: String,
    database: String,
    record_path: PathBuf,
    handles: Vec<B::Handle>,
}

fn spawn_teardown<B: Backend>(job: TeardownJob<B>) {
    match tokio::runtime::Handle::try_current() {
        Ok(rt) => {
            rt.spawn(teardown::<B>(job));
        }
        Err(_) => {
            // No runtime on this thread (drop during unwind, sync test,
            // plain main). Host the teardown on its own thread.
            std::thread::spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt.block_on(teardown::<B>(job)),
                    Err(e) => warn!(error = %e, "cannot run scratch database teardown"),
                }
            });
        }
    }
}

async fn teardown<B: Backend>(job: TeardownJob<B>) {
    // dispose() and Drop both funnel here, and a sweep from another
    // process may be racing us. A missing record means the database is
    // already handled.
    if !job.record_path.exists() {
        debug!(database = %job.database, "teardown: record already gone");
        return;
    }

    for handle in job.handles {
        B::terminate(handle);
    }

    match sweeper::drop_database::<B>(&job.server, &job.database).await {
        Ok(()) => {
            if let Err(e) = Registry::remove(&job.record_path) {
                warn!(database = %job.database, error = %e, "dropped scratch database but could not remove its record");
            } else {
                debug!(database = %job.database, "scratch database torn down");
            }
        }
        Err(e) => {
            // Record stays in place; a future sweep retries the drop.
            warn!(database = %job.database, error = %e, "scratch database teardown failed");
        }
    }
}

async fn create_database<B: Backend>(server: &str, database: &str) -> Result<()> {
    let (mut conn, handle) = B::connect(server).await?;
    let result = conn.batch_execute(&B::create_database_sql(database)).await;
    let _ = conn.close().await;
    B::terminate(handle);
    result.map_err(|e| match e {
        ScratchError::DatabaseExists(_) => e,
        other => ScratchError::Provision(other.to_string()),
    })
}
