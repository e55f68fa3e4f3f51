//! DuckDB-backed quantum key store for QuMail.
//!
//! Persists single-use symmetric key material encrypted at rest. Rows are
//! keyed by the composite `(key_id, holder_id)` — the same `key_id` exists
//! once per party holding a copy, which is what makes sharing work: the
//! sender's row and each recipient's row carry the same raw material under
//! independent at-rest ciphertexts.
//!
//! Expiry is evaluated lazily at access time via conditional single-row
//! updates; `sweep_expired` exists as an explicit maintenance pass, not a
//! correctness requirement.

mod error;
mod store;
mod types;

pub use error::{StorageError, StoreResult};
pub use store::KeyStore;
pub use types::{FetchOutcome, KeyRecord, KeyStatus, KeyStoreConfig, StoreStatistics};

/// Open a DuckDB connection with stale WAL recovery and resource limits.
///
/// If the initial open fails and a `.wal` file exists alongside the
/// database, it is removed and the open retried once — an unclean shutdown
/// can leave a WAL that prevents reopening. Memory/thread pragmas cap the
/// per-connection footprint (DuckDB defaults to most of system RAM).
pub(crate) fn open_duckdb_with_wal_recovery(
    path: &std::path::Path,
    memory_limit: &str,
    threads: u32,
) -> StoreResult<duckdb::Connection> {
    let conn = match duckdb::Connection::open(path) {
        Ok(c) => c,
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() {
                tracing::warn!(
                    wal = %wal_path.display(),
                    "DuckDB open failed, removing stale WAL and retrying"
                );
                if std::fs::remove_file(&wal_path).is_ok() {
                    let c = duckdb::Connection::open(path)?;
                    apply_resource_limits(&c, memory_limit, threads)?;
                    return Ok(c);
                }
            }
            return Err(first_err.into());
        }
    };
    apply_resource_limits(&conn, memory_limit, threads)?;
    Ok(conn)
}

fn apply_resource_limits(
    conn: &duckdb::Connection,
    memory_limit: &str,
    threads: u32,
) -> StoreResult<()> {
    conn.execute_batch(&format!(
        "PRAGMA memory_limit='{}'; PRAGMA threads={};",
        memory_limit, threads
    ))?;
    Ok(())
}
