//! Best-effort reclamation of orphaned scratch databases.
//!
//! A crashed process leaves its registry records behind; the next
//! session construction with the same discriminator sweeps them up.
//! Sweeping is strictly best-effort: every per-record failure is logged
//! and swallowed, one bad record never prevents sweeping the rest, and
//! a sweep can never abort session construction.

use std::path::Path;

use tracing::{debug, warn};

use crate::backend::{Backend, Connection};
use crate::core::Result;
use crate::registry::Registry;

/// Outcome counters for one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records whose database was dropped and whose file was removed.
    pub swept: usize,
    /// Records that failed and were left in place for a later sweep.
    pub failed: usize,
}

/// Drop every orphaned database recorded in `registry`, removing each
/// record on success.
///
/// Records that vanish mid-sweep (a racing teardown got there first) are
/// skipped silently; they count as neither swept nor failed.
pub async fn sweep_orphans<B: Backend>(
    server_conn_string: &str,
    registry: &Registry,
) -> SweepReport {
    let mut report = SweepReport::default();
    for path in registry.scan() {
        match sweep_record::<B>(server_conn_string, &path).await {
            Ok(true) => report.swept += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to sweep orphaned scratch database");
                report.failed += 1;
            }
        }
    }
    report
}

async fn sweep_record<B: Backend>(server: &str, path: &Path) -> Result<bool> {
    let Some(record) = Registry::load(path) else {
        return Ok(false);
    };
    debug!(database = record.database(), "sweeping orphaned scratch database");
    drop_database::<B>(server, record.database()).await?;
    Registry::remove(record.path())?;
    Ok(true)
}

/// Drop `database` over a short-lived server-level connection.
///
/// The connection is released on every path. An absent database counts
/// as a successful drop.
pub(crate) async fn drop_database<B: Backend>(server: &str, database: &str) -> Result<()> {
    let (mut conn, handle) = B::connect(server).await?;
    let result = async {
        B::prepare_drop(&mut conn, database).await?;
        conn.batch_execute(&B::drop_database_sql(database)).await
    }
    .await;
    let _ = conn.close().await;
    B::terminate(handle);
    result
}
