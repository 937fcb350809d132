//! Connection-string parsing and database substitution.
//!
//! Server connection strings use the `key=value` form understood by the
//! Postgres family of clients, e.g. `host=localhost user=postgres`.
//! A scoped connection string is derived from a server-level one by
//! setting the `dbname` key to the target database.

use crate::core::{Result, ScratchError};

/// Parsed `key=value` connection string.
///
/// Preserves key order so the round-tripped string stays recognizable.
#[derive(Debug, Clone)]
pub struct ConnInfo {
    pairs: Vec<(String, String)>,
}

impl ConnInfo {
    /// Parse a whitespace-separated `key=value` connection string.
    ///
    /// Values with embedded whitespace are not supported; every token
    /// must contain an `=`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for token in s.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                return Err(ScratchError::ConnectionString(format!(
                    "expected key=value, got '{token}'"
                )));
            };
            if key.is_empty() {
                return Err(ScratchError::ConnectionString(format!(
                    "empty key in '{token}'"
                )));
            }
            pairs.push((key.to_string(), value.to_string()));
        }
        Ok(Self { pairs })
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, replacing an existing value or appending a new pair.
    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(pair) = self.pairs.iter_mut().find(|(k, _)| k == key) {
            pair.1 = value.to_string();
        } else {
            self.pairs.push((key.to_string(), value.to_string()));
        }
    }

    /// Serialize back to a `key=value` connection string.
    pub fn to_conn_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Derive a database-scoped connection string from a server-level one.
pub fn with_database(base: &str, database: &str) -> Result<String> {
    let mut info = ConnInfo::parse(base)?;
    info.set("dbname", database);
    Ok(info.to_conn_string())
}
