//! SQLite schema shared by the catalog and the sample store.
//!
//! Hits for every sample live in one `hits` relation partitioned by
//! `partition_id`; a sample points at exactly one active partition.

use rusqlite::Connection;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS lookup (
    mag_name TEXT NOT NULL,
    mag_id INTEGER NOT NULL,
    contig_name TEXT NOT NULL,
    contig_id INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS lookup_contig_name ON lookup (contig_name);
CREATE INDEX IF NOT EXISTS lookup_mag_name ON lookup (mag_name);

CREATE TABLE IF NOT EXISTS contig_lengths (
    mag_id INTEGER NOT NULL,
    contig_id INTEGER NOT NULL,
    length INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS contig_lengths_mag_id ON contig_lengths (mag_id);

CREATE TABLE IF NOT EXISTS samples (
    source_name TEXT NOT NULL,
    sample_id TEXT NOT NULL,
    sequence_number INTEGER NOT NULL,
    partition_id INTEGER
);
CREATE UNIQUE INDEX IF NOT EXISTS samples_source_name ON samples (source_name);
CREATE UNIQUE INDEX IF NOT EXISTS samples_sample_id ON samples (sample_id);

CREATE TABLE IF NOT EXISTS mag_membership (
    source_name TEXT NOT NULL,
    mag_name TEXT NOT NULL,
    PRIMARY KEY (source_name, mag_name)
);

CREATE TABLE IF NOT EXISTS partitions (
    partition_id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name TEXT NOT NULL,
    state TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hits (
    partition_id INTEGER NOT NULL,
    mag_id INTEGER NOT NULL,
    contig_id INTEGER NOT NULL,
    pct_identity REAL NOT NULL,
    start INTEGER NOT NULL,
    stop INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS hits_partition_mag ON hits (partition_id, mag_id);
";

const TABLES: [&str; 6] = [
    "hits",
    "partitions",
    "mag_membership",
    "samples",
    "contig_lengths",
    "lookup",
];

/// Open (or create) a recruitment database at `path`.
pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    // WAL lets matrix queries read while another connection ingests
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Open a private in-memory database with the full schema.
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

/// Drop every table and recreate an empty schema.
pub fn reset(conn: &Connection) -> rusqlite::Result<()> {
    let drops: String = TABLES
        .iter()
        .map(|table| format!("DROP TABLE IF EXISTS {};\n", table))
        .collect();
    conn.execute_batch(&drops)?;
    create_schema(conn)
}
