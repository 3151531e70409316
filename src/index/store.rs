//! SQLite snapshot persistence for vector indices
//!
//! Lets a corpus grow across CLI runs: entries for each engine are
//! saved as little-endian f32 blobs and replayed into a fresh index in
//! insertion order. Inserts are visible to subsequent queries after a
//! reload; no durability guarantees beyond that.

use super::VectorIndex;
use crate::embeddings::Vector;
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

/// Database wrapper persisting index entries per engine
pub struct IndexStore {
    conn: Connection,
}

impl IndexStore {
    /// Open (creating if needed) a snapshot database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS index_entries (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                engine     TEXT NOT NULL,
                entry_id   TEXT NOT NULL,
                vector     BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_index_entries_engine
                ON index_entries(engine);",
        )?;
        Ok(Self { conn })
    }

    /// Replace the stored snapshot for an engine with the index contents
    pub fn save(&mut self, engine_name: &str, index: &VectorIndex) -> Result<usize> {
        let entries = index.entries();
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM index_entries WHERE engine = ?",
            [engine_name],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO index_entries (engine, entry_id, vector, created_at)
                 VALUES (?, ?, ?, ?)",
            )?;
            let created_at = chrono::Utc::now().to_rfc3339();
            for (id, vector) in &entries {
                stmt.execute(rusqlite::params![
                    engine_name,
                    id,
                    vec_f32_to_bytes(vector),
                    created_at
                ])?;
            }
        }
        tx.commit()?;
        info!(engine = engine_name, entries = entries.len(), "saved index snapshot");
        Ok(entries.len())
    }

    /// Replay the stored snapshot for an engine into an index
    ///
    /// Entries are inserted in their original insertion order so
    /// distance ties keep ranking deterministically after a reload.
    pub fn load_into(&self, engine_name: &str, index: &VectorIndex) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "SELECT entry_id, vector FROM index_entries
             WHERE engine = ? ORDER BY seq",
        )?;
        let rows = stmt.query_map([engine_name], |row| {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            Ok((id, blob))
        })?;

        let mut loaded = 0;
        for row in rows {
            let (id, blob) = row?;
            let vector = bytes_to_vec_f32(&blob)?;
            index.insert(id, vector)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Number of stored entries for an engine
    pub fn count(&self, engine_name: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM index_entries WHERE engine = ?",
            [engine_name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Convert an f32 vector to little-endian bytes for a SQLite blob
fn vec_f32_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|&f| f.to_le_bytes()).collect()
}

/// Convert a little-endian blob back to an f32 vector
fn bytes_to_vec_f32(bytes: &[u8]) -> Result<Vector> {
    if bytes.len() % 4 != 0 {
        return Err(Error::InputDecode {
            cause: format!("vector blob length {} is not a multiple of 4", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
