//! The key store: generation, fetch, sharing, retirement.

use crate::error::{StorageError, StoreResult};
use crate::types::{FetchOutcome, KeyRecord, KeyStatus, KeyStoreConfig, StoreStatistics};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use qumail_crypto::{decrypt, derive_key, encrypt, DerivedKey, EncryptedData, KdfParams, Salt};
use qumail_entropy::{EntropyGenerator, GenerationReport, KeyProtocol};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Known plaintext encrypted with the derived at-rest key at first open;
/// decrypting it on later opens proves the passphrase matches.
const VERIFICATION_PLAINTEXT: &[u8] = b"qumail-keystore-verification-token-v1";

/// Quantum key store over DuckDB with at-rest encryption of key material.
///
/// Cloneable; clones share one connection behind a mutex. Single-row
/// mutations are conditional updates whose rowcount decides the branch
/// taken, so concurrent callers cannot race a read-then-write into an
/// inconsistent state.
#[derive(Clone)]
pub struct KeyStore {
    conn: Arc<Mutex<Connection>>,
    at_rest_key: Arc<DerivedKey>,
    generator: EntropyGenerator,
    config: Arc<KeyStoreConfig>,
}

impl KeyStore {
    /// Opens (or creates) a key store at the given path.
    ///
    /// Fails when the configuration is invalid or when the passphrase does
    /// not match an existing store — a mis-keyed store is a startup error,
    /// never a silently-degraded one.
    pub fn open(path: &Path, config: KeyStoreConfig) -> StoreResult<Self> {
        let conn = crate::open_duckdb_with_wal_recovery(path, "128MB", 2)?;
        Self::with_connection(conn, config)
    }

    /// Opens an in-memory key store (for testing).
    pub fn open_in_memory(config: KeyStoreConfig) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: KeyStoreConfig) -> StoreResult<Self> {
        config.validate().map_err(StorageError::Validation)?;
        initialize_schema(&conn)?;
        let at_rest_key = unlock_at_rest_key(&conn, &config.at_rest_passphrase)?;

        let generator = EntropyGenerator::new(config.min_key_length, config.max_key_length);
        info!(
            min = config.min_key_length,
            max = config.max_key_length,
            ttl_secs = config.ttl.num_seconds(),
            "key store opened"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            at_rest_key: Arc::new(at_rest_key),
            generator,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &KeyStoreConfig {
        &self.config
    }

    // ── Generation ───────────────────────────────────────────────

    /// Generates a key for `holder_id`, persists it encrypted at rest, and
    /// returns the record *with decrypted material* — the caller needs the
    /// raw bytes to encrypt immediately.
    ///
    /// `length` defaults to the configured default; out-of-range lengths
    /// are rejected before any I/O. A key that fails quality verification
    /// is still stored (the report records the failure) — refusing to
    /// issue keys is a caller policy, not a store policy.
    pub fn generate(
        &self,
        holder_id: &str,
        counterpart_id: Option<&str>,
        purpose: &str,
        length: Option<usize>,
    ) -> StoreResult<KeyRecord> {
        if holder_id.is_empty() {
            return Err(StorageError::Validation("holder_id must not be empty".into()));
        }
        let length = length.unwrap_or(self.config.default_key_length);

        let (material, report) = self
            .generator
            .generate_with_verification(
                length,
                self.config.default_protocol,
                self.config.verification_attempts,
            )
            .map_err(|e| StorageError::Validation(e.to_string()))?;

        if !report.verification_passed {
            warn!(
                holder = holder_id,
                length,
                attempts = report.attempt,
                "key failed quality verification; issuing with warning report"
            );
        }

        let key_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let expires_at = now + self.config.ttl;
        let fingerprint = fingerprint_of(&material);
        let blob = self.encrypt_material(&material)?;
        let report_json = serde_json::to_string(&report)?;

        let conn = self.lock_conn();
        conn.execute(
            r#"
            INSERT INTO quantum_keys (
                key_id, holder_id, counterpart_id, purpose,
                key_material, key_length, key_fingerprint, protocol_tag,
                status, created_at, expires_at, active, usage_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'unused', ?, ?, TRUE, 0)
            "#,
            params![
                key_id,
                holder_id,
                counterpart_id,
                purpose,
                blob,
                length as i64,
                fingerprint,
                report.protocol.as_str(),
                now.timestamp_millis(),
                expires_at.timestamp_millis(),
            ],
        )?;
        conn.execute(
            "INSERT INTO key_metadata (key_id, metadata_json) VALUES (?, ?)",
            params![key_id, report_json],
        )?;
        drop(conn);

        info!(key_id, holder = holder_id, length, "generated quantum key");

        Ok(KeyRecord {
            key_id,
            holder_id: holder_id.to_string(),
            counterpart_id: counterpart_id.map(str::to_string),
            purpose: purpose.to_string(),
            key_material: material,
            key_length: length,
            fingerprint,
            protocol: report.protocol,
            status: KeyStatus::Unused,
            created_at: now,
            expires_at: Some(expires_at),
            active: true,
            usage_count: 0,
        })
    }

    // ── Fetch ────────────────────────────────────────────────────

    /// Fetches this holder's copy of a key for use.
    ///
    /// Returns `Found` (with material, `usage_count` already incremented)
    /// only when the row is active and unexpired. The usability gate and
    /// the counter increment are one conditional update, so concurrent
    /// fetches cannot lose counts or read past an expiry. A row caught
    /// expired is flipped inactive as a side effect (lazy expiry).
    ///
    /// `mark_used` status is deliberately *not* a fetch gate — a used key
    /// still decrypts old mail; retirement from new use is bookkeeping.
    pub fn fetch(&self, key_id: &str, holder_id: &str) -> StoreResult<FetchOutcome> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock_conn();

        let updated = conn.execute(
            r#"
            UPDATE quantum_keys
            SET usage_count = usage_count + 1
            WHERE key_id = ? AND holder_id = ?
              AND active
              AND (expires_at IS NULL OR expires_at > ?)
            "#,
            params![key_id, holder_id, now],
        )?;

        if updated == 0 {
            return self.classify_unusable(&conn, key_id, holder_id, now);
        }

        let raw = conn.query_row(
            &format!("SELECT {ROW_COLUMNS} FROM quantum_keys WHERE key_id = ? AND holder_id = ?"),
            params![key_id, holder_id],
            row_to_raw,
        )?;
        drop(conn);

        let record = self.decrypt_row(raw)?;
        debug!(key_id, holder = holder_id, usage = record.usage_count, "fetched key");
        Ok(FetchOutcome::Found(record))
    }

    /// The conditional update matched nothing: decide between `NotFound`
    /// and `Expired`, flipping a freshly-expired row inactive on the way.
    fn classify_unusable(
        &self,
        conn: &Connection,
        key_id: &str,
        holder_id: &str,
        now: i64,
    ) -> StoreResult<FetchOutcome> {
        let row = conn.query_row(
            "SELECT status, expires_at, active FROM quantum_keys WHERE key_id = ? AND holder_id = ?",
            params![key_id, holder_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, bool>(2)?,
                ))
            },
        );

        match row {
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(FetchOutcome::NotFound),
            Err(e) => Err(e.into()),
            Ok((status, expires_at, active)) => {
                let past_expiry = expires_at.is_some_and(|exp| exp <= now);
                if active && past_expiry {
                    // Lazy expiry: retire the row now that we've seen it
                    conn.execute(
                        r#"
                        UPDATE quantum_keys
                        SET active = FALSE,
                            status = CASE WHEN status = 'unused' THEN 'expired' ELSE status END
                        WHERE key_id = ? AND holder_id = ? AND active
                        "#,
                        params![key_id, holder_id],
                    )?;
                    info!(key_id, holder = holder_id, "key expired at access time");
                    return Ok(FetchOutcome::Expired);
                }
                if status == KeyStatus::Expired.as_str() || past_expiry {
                    Ok(FetchOutcome::Expired)
                } else {
                    // Inactive for another reason (soft-deleted): report the
                    // same as never-existed, to avoid leaking row existence
                    Ok(FetchOutcome::NotFound)
                }
            }
        }
    }

    // ── Sharing ──────────────────────────────────────────────────

    /// Copies the owner's key to `new_holder_id` under the same `key_id`.
    ///
    /// The material is decrypted and re-encrypted with a fresh nonce, so
    /// the two rows are independent at-rest ciphertexts of the same bytes.
    /// Idempotent: re-sharing to the same holder is a no-op success, and
    /// concurrent duplicate shares leave exactly one row. Returns
    /// `Ok(false)` when the owner's copy is missing or unusable.
    pub fn share(
        &self,
        key_id: &str,
        owner_holder_id: &str,
        new_holder_id: &str,
    ) -> StoreResult<bool> {
        if owner_holder_id == new_holder_id {
            return Ok(true); // sharing to self is trivially done
        }

        let now = Utc::now().timestamp_millis();
        let conn = self.lock_conn();

        let row = conn.query_row(
            &format!(
                "SELECT {ROW_COLUMNS} FROM quantum_keys \
                 WHERE key_id = ? AND holder_id = ? AND active \
                 AND (expires_at IS NULL OR expires_at > ?)"
            ),
            params![key_id, owner_holder_id, now],
            row_to_raw,
        );

        let raw = match row {
            Ok(raw) => raw,
            Err(duckdb::Error::QueryReturnedNoRows) => {
                warn!(key_id, owner = owner_holder_id, "share refused: owner copy unusable");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        drop(conn);

        let record = self.decrypt_row(raw)?;
        let reencrypted = self.encrypt_material(&record.key_material)?;

        let conn = self.lock_conn();
        conn.execute(
            r#"
            INSERT OR IGNORE INTO quantum_keys (
                key_id, holder_id, counterpart_id, purpose,
                key_material, key_length, key_fingerprint, protocol_tag,
                status, created_at, expires_at, active, usage_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'unused', ?, ?, TRUE, 0)
            "#,
            params![
                key_id,
                new_holder_id,
                owner_holder_id, // track who shared it
                record.purpose,
                reencrypted,
                record.key_length as i64,
                record.fingerprint,
                record.protocol.as_str(),
                now,
                record.expires_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        drop(conn);

        info!(key_id, owner = owner_holder_id, recipient = new_holder_id, "shared key");
        Ok(true)
    }

    // ── Retirement ───────────────────────────────────────────────

    /// Marks this holder's copy as used. Returns `false` when the row is
    /// missing or already left `unused` — the transition is terminal and
    /// only taken once, enforced by the conditional update.
    pub fn mark_used(&self, key_id: &str, holder_id: &str, used_by: &str) -> StoreResult<bool> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock_conn();
        let updated = conn.execute(
            r#"
            UPDATE quantum_keys
            SET status = 'used', used_by = ?, used_at = ?
            WHERE key_id = ? AND holder_id = ? AND status = 'unused'
            "#,
            params![used_by, now, key_id, holder_id],
        )?;
        if updated > 0 {
            info!(key_id, holder = holder_id, used_by, "marked key used");
        }
        Ok(updated > 0)
    }

    /// Soft-deletes this holder's copy only. Other holders' rows for the
    /// same `key_id` are untouched. Returns `false` if nothing changed.
    pub fn delete(&self, key_id: &str, holder_id: &str) -> StoreResult<bool> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE quantum_keys SET active = FALSE WHERE key_id = ? AND holder_id = ? AND active",
            params![key_id, holder_id],
        )?;
        Ok(updated > 0)
    }

    /// Bulk-retires every row past its expiry. Maintenance only — `fetch`
    /// re-checks lazily and does not depend on this running.
    pub fn sweep_expired(&self) -> StoreResult<usize> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock_conn();
        let flipped = conn.execute(
            r#"
            UPDATE quantum_keys
            SET active = FALSE,
                status = CASE WHEN status = 'unused' THEN 'expired' ELSE status END
            WHERE active AND expires_at IS NOT NULL AND expires_at <= ?
            "#,
            params![now],
        )?;
        if flipped > 0 {
            info!(count = flipped, "swept expired keys");
        }
        Ok(flipped)
    }

    // ── Listing and metadata ─────────────────────────────────────

    /// Lists this holder's keys, newest first. With `include_expired =
    /// false` only active, unexpired rows are returned. Rows whose at-rest
    /// blob fails to decrypt are skipped with a warning rather than
    /// failing the whole listing.
    pub fn list_keys(
        &self,
        holder_id: &str,
        include_expired: bool,
        limit: Option<usize>,
    ) -> StoreResult<Vec<KeyRecord>> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock_conn();

        let mut sql =
            format!("SELECT {ROW_COLUMNS} FROM quantum_keys WHERE holder_id = ?");
        if !include_expired {
            sql.push_str(" AND active AND (expires_at IS NULL OR expires_at > ?)");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(lim) = limit {
            sql.push_str(&format!(" LIMIT {lim}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<RawRow> = if include_expired {
            stmt.query_map(params![holder_id], row_to_raw)?
                .filter_map(|r| r.ok())
                .collect()
        } else {
            stmt.query_map(params![holder_id, now], row_to_raw)?
                .filter_map(|r| r.ok())
                .collect()
        };
        drop(stmt);
        drop(conn);

        let mut records = Vec::with_capacity(rows.len());
        for raw in rows {
            let key_id = raw.key_id.clone();
            match self.decrypt_row(raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(key_id, error = %e, "skipping undecryptable key row"),
            }
        }
        Ok(records)
    }

    /// SHA-256 hex fingerprint of a key's material, without returning the
    /// material itself. Usable for cross-party verification even on rows
    /// `fetch` would refuse.
    pub fn fingerprint(&self, key_id: &str, holder_id: &str) -> StoreResult<Option<String>> {
        let conn = self.lock_conn();
        let result = conn.query_row(
            "SELECT key_fingerprint FROM quantum_keys WHERE key_id = ? AND holder_id = ?",
            params![key_id, holder_id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(fp) => Ok(Some(fp)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The generation report persisted when the key was created.
    pub fn generation_report(&self, key_id: &str) -> StoreResult<Option<GenerationReport>> {
        let conn = self.lock_conn();
        let result = conn.query_row(
            "SELECT metadata_json FROM key_metadata WHERE key_id = ?",
            params![key_id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Records the content-store reference returned for ciphertext
    /// encrypted with this key. Idempotent per `(key_id, content_ref)`.
    /// An unknown `key_id` records nothing and returns `false`.
    pub fn record_content_ref(&self, key_id: &str, content_ref: &str) -> StoreResult<bool> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE key_metadata SET content_ref = ? WHERE key_id = ?",
            params![content_ref, key_id],
        )?;
        // Gate the link row on the metadata row: outbound_refs must never
        // hold key ids the store doesn't know
        if updated == 0 {
            return Ok(false);
        }
        conn.execute(
            "INSERT OR IGNORE INTO outbound_refs (key_id, content_ref, recorded_at) VALUES (?, ?, ?)",
            params![key_id, content_ref, now],
        )?;
        Ok(true)
    }

    /// Content references recorded against a key, oldest first.
    pub fn content_refs(&self, key_id: &str) -> StoreResult<Vec<String>> {
        let conn = self.lock_conn();
        let mut stmt = conn.prepare(
            "SELECT content_ref FROM outbound_refs WHERE key_id = ? ORDER BY recorded_at",
        )?;
        let refs = stmt
            .query_map(params![key_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(refs)
    }

    /// Records the integrity-stamping reference for this key and marks its
    /// metadata row verified.
    pub fn record_stamp_ref(&self, key_id: &str, stamp_ref: &str) -> StoreResult<bool> {
        let conn = self.lock_conn();
        let updated = conn.execute(
            "UPDATE key_metadata SET stamp_ref = ?, verification_status = 'stamped' WHERE key_id = ?",
            params![stamp_ref, key_id],
        )?;
        Ok(updated > 0)
    }

    /// Aggregate row counts across all holders.
    pub fn statistics(&self) -> StoreResult<StoreStatistics> {
        let conn = self.lock_conn();
        let stats = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COUNT(CASE WHEN status = 'unused' THEN 1 END),
                COUNT(CASE WHEN status = 'used' THEN 1 END),
                COUNT(CASE WHEN status = 'expired' THEN 1 END),
                COUNT(DISTINCT holder_id)
            FROM quantum_keys
            "#,
            [],
            |row| {
                Ok(StoreStatistics {
                    total_keys: row.get::<_, i64>(0)? as u64,
                    unused_keys: row.get::<_, i64>(1)? as u64,
                    used_keys: row.get::<_, i64>(2)? as u64,
                    expired_keys: row.get::<_, i64>(3)? as u64,
                    distinct_holders: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;
        Ok(stats)
    }

    // ── Internals ────────────────────────────────────────────────

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another thread panicked mid-statement;
        // the connection itself is still consistent for our single-row ops
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn encrypt_material(&self, material: &[u8]) -> StoreResult<Vec<u8>> {
        let encrypted = encrypt(&self.at_rest_key, material)?;
        Ok(serde_json::to_vec(&encrypted)?)
    }

    fn decrypt_row(&self, raw: RawRow) -> StoreResult<KeyRecord> {
        let encrypted: EncryptedData = serde_json::from_slice(&raw.key_material)?;
        let material = decrypt(&self.at_rest_key, &encrypted)?;

        if material.len() != raw.key_length {
            return Err(StorageError::Validation(format!(
                "key {} material length {} does not match declared {}",
                raw.key_id,
                material.len(),
                raw.key_length
            )));
        }

        let protocol: KeyProtocol = raw.protocol_tag.parse().unwrap_or_default();
        let status: KeyStatus = raw.status.parse().unwrap_or(KeyStatus::Unused);

        Ok(KeyRecord {
            key_id: raw.key_id,
            holder_id: raw.holder_id,
            counterpart_id: raw.counterpart_id,
            purpose: raw.purpose,
            key_material: material,
            key_length: raw.key_length,
            fingerprint: raw.key_fingerprint,
            protocol,
            status,
            created_at: DateTime::from_timestamp_millis(raw.created_at).unwrap_or_else(Utc::now),
            expires_at: raw.expires_at.and_then(DateTime::from_timestamp_millis),
            active: raw.active,
            usage_count: raw.usage_count as u64,
        })
    }
}

/// SHA-256 hex digest of raw key material.
fn fingerprint_of(material: &[u8]) -> String {
    hex::encode(Sha256::digest(material))
}

/// Column list shared by every row-shaped SELECT.
const ROW_COLUMNS: &str = "key_id, holder_id, counterpart_id, purpose, key_material, \
                           key_length, key_fingerprint, protocol_tag, status, \
                           created_at, expires_at, active, usage_count";

/// Row as stored, before at-rest decryption.
struct RawRow {
    key_id: String,
    holder_id: String,
    counterpart_id: Option<String>,
    purpose: String,
    key_material: Vec<u8>,
    key_length: usize,
    key_fingerprint: String,
    protocol_tag: String,
    status: String,
    created_at: i64,
    expires_at: Option<i64>,
    active: bool,
    usage_count: i64,
}

fn row_to_raw(row: &duckdb::Row<'_>) -> duckdb::Result<RawRow> {
    Ok(RawRow {
        key_id: row.get(0)?,
        holder_id: row.get(1)?,
        counterpart_id: row.get(2)?,
        purpose: row.get(3)?,
        key_material: row.get(4)?,
        key_length: row.get::<_, i64>(5)? as usize,
        key_fingerprint: row.get(6)?,
        protocol_tag: row.get(7)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
        expires_at: row.get(10)?,
        active: row.get(11)?,
        usage_count: row.get(12)?,
    })
}

fn initialize_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_meta (
            key VARCHAR PRIMARY KEY,
            value BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quantum_keys (
            key_id VARCHAR NOT NULL,
            holder_id VARCHAR NOT NULL,
            counterpart_id VARCHAR,
            purpose VARCHAR NOT NULL,
            key_material BLOB NOT NULL,
            key_length INTEGER NOT NULL,
            key_fingerprint VARCHAR NOT NULL,
            protocol_tag VARCHAR NOT NULL DEFAULT 'BB84',
            status VARCHAR NOT NULL DEFAULT 'unused',
            used_by VARCHAR,
            used_at BIGINT,
            created_at BIGINT NOT NULL,
            expires_at BIGINT,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            usage_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (key_id, holder_id)
        );
        CREATE INDEX IF NOT EXISTS idx_quantum_keys_holder ON quantum_keys(holder_id);
        CREATE INDEX IF NOT EXISTS idx_quantum_keys_expires ON quantum_keys(expires_at);

        CREATE TABLE IF NOT EXISTS key_metadata (
            key_id VARCHAR PRIMARY KEY,
            metadata_json TEXT NOT NULL,
            content_ref VARCHAR,
            stamp_ref VARCHAR,
            verification_status VARCHAR NOT NULL DEFAULT 'pending'
        );

        CREATE TABLE IF NOT EXISTS outbound_refs (
            key_id VARCHAR NOT NULL,
            content_ref VARCHAR NOT NULL,
            recorded_at BIGINT NOT NULL,
            PRIMARY KEY (key_id, content_ref)
        );
        "#,
    )?;
    Ok(())
}

/// Derive the store-wide at-rest key, creating the salt + verification
/// token on first open and checking the passphrase against them afterward.
fn unlock_at_rest_key(conn: &Connection, passphrase: &str) -> StoreResult<DerivedKey> {
    let existing_salt: Result<Vec<u8>, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'kdf_salt'",
        [],
        |row| row.get(0),
    );

    match existing_salt {
        Ok(salt_bytes) => {
            let salt_arr: [u8; 16] = salt_bytes
                .try_into()
                .map_err(|_| StorageError::Validation("stored KDF salt has wrong length".into()))?;
            let key = derive_key(passphrase, &Salt::from_bytes(salt_arr), &KdfParams::default())?;

            let token_bytes: Vec<u8> = conn.query_row(
                "SELECT value FROM store_meta WHERE key = 'verification'",
                [],
                |row| row.get(0),
            )?;
            let token: EncryptedData = serde_json::from_slice(&token_bytes)?;
            let plaintext = decrypt(&key, &token).map_err(|_| StorageError::InvalidPassphrase)?;
            if plaintext != VERIFICATION_PLAINTEXT {
                return Err(StorageError::InvalidPassphrase);
            }
            Ok(key)
        }
        Err(duckdb::Error::QueryReturnedNoRows) => {
            let salt = Salt::random();
            let key = derive_key(passphrase, &salt, &KdfParams::default())?;
            let token = encrypt(&key, VERIFICATION_PLAINTEXT)?;

            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('kdf_salt', ?)",
                params![salt.as_bytes().to_vec()],
            )?;
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES ('verification', ?)",
                params![serde_json::to_vec(&token)?],
            )?;
            Ok(key)
        }
        Err(e) => Err(e.into()),
    }
}
