//! File-backed `Index`: one flat binary file per song (the bit-exact §6
//! on-disk format) plus a `rusqlite` table used purely as the inverted hash
//! lookup index.
//!
//! Grounded on `sndprintdb.go`'s `DB`, which combines a per-song flat file
//! (`AddSong`/`Hashes`) with a Postgres `hashes` table for `candidates`
//! lookups; the schema columns (`song, off, hash0..hash3`) mirror Sivana's
//! `database.rs` table layout, widened from one hash column to four.
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use rusqlite::{params, Connection};

use crate::error::IndexError;
use crate::index::{Index, Row};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS fingerprints (
    song TEXT NOT NULL,
    off INTEGER NOT NULL,
    hash0 INTEGER NOT NULL,
    hash1 INTEGER NOT NULL,
    hash2 INTEGER NOT NULL,
    hash3 INTEGER NOT NULL,
    UNIQUE(song, off)
);
CREATE INDEX IF NOT EXISTS idx_fingerprints_hash0 ON fingerprints(hash0);
CREATE INDEX IF NOT EXISTS idx_fingerprints_hash1 ON fingerprints(hash1);
CREATE INDEX IF NOT EXISTS idx_fingerprints_hash2 ON fingerprints(hash2);
CREATE INDEX IF NOT EXISTS idx_fingerprints_hash3 ON fingerprints(hash3);
";

const HASH_COLUMNS: [&str; 4] = ["hash0", "hash1", "hash2", "hash3"];

/// Encodes a song's four hash streams into the flat 16-bytes-per-frame
/// on-disk format: four little-endian u32 words per record, no header.
pub fn encode_fingerprint(hashes: &[Vec<u32>; 4]) -> Vec<u8> {
    let n = hashes[0].len();
    let mut buf = Vec::with_capacity(n * 16);
    for off in 0..n {
        for k in 0..4 {
            buf.extend_from_slice(&hashes[k][off].to_le_bytes());
        }
    }
    buf
}

/// Decodes the flat on-disk format. Errors with [`IndexError::Corrupt`] if
/// `bytes.len()` is not a multiple of 16.
pub fn decode_fingerprint(bytes: &[u8], path: &Path) -> Result<[Vec<u32>; 4], IndexError> {
    if bytes.len() % 16 != 0 {
        return Err(IndexError::Corrupt {
            path: path.to_path_buf(),
            len: bytes.len() as u64,
        });
    }
    let n = bytes.len() / 16;
    let mut out: [Vec<u32>; 4] = [
        Vec::with_capacity(n),
        Vec::with_capacity(n),
        Vec::with_capacity(n),
        Vec::with_capacity(n),
    ];
    for record in bytes.chunks_exact(16) {
        for (k, word) in out.iter_mut().enumerate() {
            let b = &record[k * 4..k * 4 + 4];
            word.push(u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        }
    }
    Ok(out)
}

/// A directory of per-song flat fingerprint files, indexed by a SQLite table
/// for hash lookups. The directory root is typically `SNDPRINT_DB`.
pub struct FileIndex {
    dir: PathBuf,
    conn: Connection,
}

impl FileIndex {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, IndexError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let conn = Connection::open(dir.join("index.sqlite3"))?;
        conn.execute_batch(SCHEMA)?;
        Ok(FileIndex { dir, conn })
    }

    fn song_path(&self, song: &str) -> PathBuf {
        self.dir.join(song)
    }
}

impl Index for FileIndex {
    fn add(&mut self, song: &str, hashes: &[Vec<u32>; 4]) -> Result<(), IndexError> {
        let n = hashes[0].len();
        debug_assert!(hashes.iter().all(|h| h.len() == n));

        fs::write(self.song_path(song), encode_fingerprint(hashes))?;

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM fingerprints WHERE song = ?1", params![song])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO fingerprints (song, off, hash0, hash1, hash2, hash3)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for off in 0..n {
                stmt.execute(params![
                    song,
                    off as i64,
                    hashes[0][off] as i64,
                    hashes[1][off] as i64,
                    hashes[2][off] as i64,
                    hashes[3][off] as i64,
                ])?;
            }
        }
        tx.commit()?;
        info!("indexed {song} ({n} frames)");
        Ok(())
    }

    fn lookup(&self, wanted: &[Vec<u32>; 4]) -> Result<Vec<Row>, IndexError> {
        if wanted.iter().all(|w| w.is_empty()) {
            return Ok(Vec::new());
        }

        let mut clauses = Vec::new();
        let mut values: Vec<i64> = Vec::new();
        for (k, col) in HASH_COLUMNS.iter().enumerate() {
            if wanted[k].is_empty() {
                continue;
            }
            let placeholders = vec!["?"; wanted[k].len()].join(",");
            clauses.push(format!("{col} IN ({placeholders})"));
            values.extend(wanted[k].iter().map(|&v| v as i64));
        }
        let sql = format!(
            "SELECT song, off, hash0, hash1, hash2, hash3 FROM fingerprints WHERE {}",
            clauses.join(" OR ")
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let sql_params: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(sql_params.as_slice(), |row| {
            Ok(Row {
                song: row.get::<_, String>(0)?,
                off: row.get::<_, i64>(1)? as usize,
                hashes: [
                    row.get::<_, i64>(2)? as u32,
                    row.get::<_, i64>(3)? as u32,
                    row.get::<_, i64>(4)? as u32,
                    row.get::<_, i64>(5)? as u32,
                ],
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn fetch(&self, song: &str) -> Result<[Vec<u32>; 4], IndexError> {
        let path = self.song_path(song);
        let bytes = fs::read(&path)?;
        decode_fingerprint(&bytes, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_format_round_trips() {
        let hashes: [Vec<u32>; 4] = [
            vec![1, 2, 3],
            vec![4, 5, 6],
            vec![7, 8, 9],
            vec![10, 11, 12],
        ];
        let bytes = encode_fingerprint(&hashes);
        assert_eq!(bytes.len(), 3 * 16);
        let decoded = decode_fingerprint(&bytes, Path::new("unused")).unwrap();
        assert_eq!(decoded, hashes);
    }

    #[test]
    fn rejects_length_not_multiple_of_16() {
        let bytes = vec![0u8; 17];
        let err = decode_fingerprint(&bytes, Path::new("bad")).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { len: 17, .. }));
    }

    #[test]
    fn index_round_trip_via_tempdir() {
        let dir = std::env::temp_dir().join(format!(
            "sndprint-test-{}-{}",
            std::process::id(),
            "file_index_round_trip"
        ));
        let mut idx = FileIndex::open(&dir).unwrap();
        let hashes: [Vec<u32>; 4] = [
            vec![10, 20, 30],
            vec![40, 50, 60],
            vec![70, 80, 90],
            vec![100, 110, 120],
        ];
        idx.add("song-x", &hashes).unwrap();
        let fetched = idx.fetch("song-x").unwrap();
        assert_eq!(fetched, hashes);

        let wanted: [Vec<u32>; 4] = [vec![20], vec![], vec![], vec![]];
        let rows = idx.lookup(&wanted).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].off, 1);

        fs::remove_dir_all(&dir).ok();
    }
}
