//! Sample store
//!
//! Persists the normalized hits of each alignment file ("sample") in the
//! shared `hits` relation. Every ingestion writes into a fresh partition in
//! batch transactions, then a single swap transaction makes that partition
//! the sample's active one, drops the previous partition and rewrites the
//! sample's MAG membership. Readers resolve sample → partition inside one
//! statement and so see either the old or the new hit set, never a mixture.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::db;
use crate::io::{open_alignment_file, AlignmentFormat, HitStream, ParseError, ParseSummary, RawRecord};
use crate::types::{MagId, NormalizedHit, Sample};

/// Hits per batch transaction
pub const DEFAULT_BATCH_SIZE: usize = 500_000;

const STATE_BUILDING: &str = "building";
const STATE_ACTIVE: &str = "active";

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Batch {batch} failed to commit: {source}")]
    Transaction {
        batch: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unknown sample: {0}")]
    UnknownSample(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Outcome of one ingestion or rebuild
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub sample: Sample,
    /// True when the sample already existed and its hits were replaced.
    pub replaced: bool,
    pub batches: usize,
    pub summary: ParseSummary,
    /// MAGs with at least one retained hit, in MAG id order.
    pub mags: Vec<String>,
}

pub struct SampleStore {
    conn: Connection,
    config: StoreConfig,
}

impl SampleStore {
    pub fn new(conn: Connection, config: StoreConfig) -> Self {
        Self { conn, config }
    }

    pub fn open<P: AsRef<Path>>(path: P, config: StoreConfig) -> StoreResult<Self> {
        Ok(Self::new(db::open(path)?, config))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Parse `path` and store its hits under `source_name`.
    ///
    /// A source name seen before keeps its sample id and has all of its hits
    /// and membership rows replaced.
    pub fn ingest<P: AsRef<Path>>(
        &mut self,
        catalog: &Catalog,
        source_name: &str,
        path: P,
        format: AlignmentFormat,
    ) -> StoreResult<IngestReport> {
        log::info!("Parsing {} ({} format)", path.as_ref().display(), format);
        let records = open_alignment_file(path, format)?;
        self.ingest_records(catalog, source_name, records)
    }

    /// Drop and recreate an existing sample from `path`.
    ///
    /// Same create-then-swap path as [`SampleStore::ingest`]; the sample id
    /// is preserved.
    pub fn rebuild<P: AsRef<Path>>(
        &mut self,
        catalog: &Catalog,
        source_name: &str,
        path: P,
        format: AlignmentFormat,
    ) -> StoreResult<IngestReport> {
        if let Some(sample) = self.sample_by_source(source_name)? {
            log::info!("Rebuilding {} ({})", source_name, sample.sample_id);
        }
        self.ingest(catalog, source_name, path, format)
    }

    /// Store the hits of an already opened record stream.
    pub fn ingest_records<I>(
        &mut self,
        catalog: &Catalog,
        source_name: &str,
        records: I,
    ) -> StoreResult<IngestReport>
    where
        I: Iterator<Item = Result<RawRecord, ParseError>>,
    {
        let partition = self.open_partition(source_name)?;
        let mut stream = HitStream::new(records, catalog);

        let batches = match self.write_batches(partition, &mut stream) {
            Ok(batches) => batches,
            Err(e) => {
                self.abandon_partition(partition);
                return Err(e);
            }
        };
        let summary = stream.into_summary();

        let mags = membership_of(catalog, &summary.contigs_seen);
        let (sample, replaced) = match self.swap_partition(source_name, partition, &mags) {
            Ok(swapped) => swapped,
            Err(e) => {
                self.abandon_partition(partition);
                return Err(e);
            }
        };

        if summary.malformed > 0 {
            log::warn!(
                "{}: skipped {} malformed records",
                source_name,
                summary.malformed
            );
        }
        log::info!(
            "{} stored as {}: {} hits in {} batches, {} MAGs ({} hits to contigs outside the catalog)",
            source_name,
            sample.sample_id,
            summary.retained,
            batches,
            mags.len(),
            summary.out_of_catalog
        );

        Ok(IngestReport {
            sample,
            replaced,
            batches,
            summary,
            mags,
        })
    }

    fn open_partition(&mut self, source_name: &str) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO partitions (source_name, state) VALUES (?1, ?2)",
            (source_name, STATE_BUILDING),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn write_batches<I>(&mut self, partition: i64, hits: &mut I) -> StoreResult<usize>
    where
        I: Iterator<Item = Result<NormalizedHit, ParseError>>,
    {
        let batch_size = self.config.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size.min(1 << 16));
        let mut batches = 0;

        for hit in hits {
            batch.push(hit?);
            if batch.len() == batch_size {
                batches += 1;
                self.commit_batch(partition, &batch, batches)?;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            batches += 1;
            self.commit_batch(partition, &batch, batches)?;
        }
        Ok(batches)
    }

    fn commit_batch(&mut self, partition: i64, batch: &[NormalizedHit], number: usize) -> StoreResult<()> {
        insert_hits(&mut self.conn, partition, batch)
            .map_err(|source| StoreError::Transaction { batch: number, source })?;
        log::debug!("Committed batch {} ({} hits)", number, batch.len());
        Ok(())
    }

    /// Make `partition` the active one for `source_name`, registering the
    /// sample if it is new.
    fn swap_partition(
        &mut self,
        source_name: &str,
        partition: i64,
        mags: &[String],
    ) -> StoreResult<(Sample, bool)> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                "SELECT sample_id, sequence_number, partition_id FROM samples WHERE source_name = ?1",
                [source_name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()?;

        let (sample, replaced) = match existing {
            Some((sample_id, sequence_number, previous)) => {
                tx.execute(
                    "UPDATE samples SET partition_id = ?1 WHERE source_name = ?2",
                    (partition, source_name),
                )?;
                if let Some(previous) = previous {
                    tx.execute("DELETE FROM hits WHERE partition_id = ?1", [previous])?;
                    tx.execute("DELETE FROM partitions WHERE partition_id = ?1", [previous])?;
                }
                let sample = Sample {
                    source_name: source_name.to_string(),
                    sample_id,
                    sequence_number,
                };
                (sample, true)
            }
            None => {
                let last: u32 = tx.query_row(
                    "SELECT COALESCE(MAX(sequence_number), 0) FROM samples",
                    [],
                    |row| row.get(0),
                )?;
                let sequence_number = last + 1;
                let sample = Sample {
                    source_name: source_name.to_string(),
                    sample_id: Sample::id_for(sequence_number),
                    sequence_number,
                };
                tx.execute(
                    "INSERT INTO samples (source_name, sample_id, sequence_number, partition_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    (source_name, &sample.sample_id, sequence_number, partition),
                )?;
                (sample, false)
            }
        };

        tx.execute("DELETE FROM mag_membership WHERE source_name = ?1", [source_name])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO mag_membership (source_name, mag_name) VALUES (?1, ?2)")?;
            for mag in mags {
                insert.execute((source_name, mag))?;
            }
        }
        tx.execute(
            "UPDATE partitions SET state = ?1 WHERE partition_id = ?2",
            (STATE_ACTIVE, partition),
        )?;
        tx.commit()?;

        Ok((sample, replaced))
    }

    /// Best-effort removal of a partition whose ingestion failed.
    fn abandon_partition(&mut self, partition: i64) {
        if let Err(e) = delete_partition(&mut self.conn, partition) {
            log::warn!(
                "Could not remove partial partition {}: {} (run prune to clean up)",
                partition,
                e
            );
        }
    }

    /// Remove partitions left behind by interrupted ingestions.
    ///
    /// Must not run while another connection is ingesting into the same
    /// database, since its in-progress partition looks stale too.
    pub fn prune_stale_partitions(&mut self) -> StoreResult<usize> {
        let stale: Vec<i64> = {
            let mut statement = self
                .conn
                .prepare("SELECT partition_id FROM partitions WHERE state = ?1")?;
            let rows = statement.query_map([STATE_BUILDING], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for &partition in &stale {
            delete_partition(&mut self.conn, partition)?;
        }
        if !stale.is_empty() {
            log::info!("Pruned {} stale partitions", stale.len());
        }
        Ok(stale.len())
    }

    pub fn samples(&self) -> StoreResult<Vec<Sample>> {
        let mut statement = self.conn.prepare(
            "SELECT source_name, sample_id, sequence_number FROM samples ORDER BY sequence_number",
        )?;
        let rows = statement.query_map([], sample_from_row)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn sample_by_source(&self, source_name: &str) -> StoreResult<Option<Sample>> {
        Ok(self
            .conn
            .query_row(
                "SELECT source_name, sample_id, sequence_number FROM samples WHERE source_name = ?1",
                [source_name],
                sample_from_row,
            )
            .optional()?)
    }

    pub fn sample_by_id(&self, sample_id: &str) -> StoreResult<Option<Sample>> {
        Ok(self
            .conn
            .query_row(
                "SELECT source_name, sample_id, sequence_number FROM samples WHERE sample_id = ?1",
                [sample_id],
                sample_from_row,
            )
            .optional()?)
    }

    /// Find a sample by source name, falling back to its opaque id.
    pub fn resolve_sample(&self, name: &str) -> StoreResult<Sample> {
        match self.sample_by_source(name)? {
            Some(sample) => Ok(sample),
            None => self
                .sample_by_id(name)?
                .ok_or_else(|| StoreError::UnknownSample(name.to_string())),
        }
    }

    /// Every (source name, MAG name) pair with data, ordered by sample then MAG.
    pub fn mag_pairs(&self) -> StoreResult<Vec<(String, String)>> {
        let mut statement = self.conn.prepare(
            "SELECT m.source_name, m.mag_name
             FROM mag_membership m
             JOIN samples s ON s.source_name = m.source_name
             LEFT JOIN (SELECT DISTINCT mag_name, mag_id FROM lookup) l ON l.mag_name = m.mag_name
             ORDER BY s.sequence_number, l.mag_id",
        )?;
        let rows = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn mags_in_sample(&self, source_name: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .mag_pairs()?
            .into_iter()
            .filter(|(source, _)| source == source_name)
            .map(|(_, mag)| mag)
            .collect())
    }

    /// Stream the active hits of one sample restricted to one MAG.
    ///
    /// Returns the number of hits visited.
    pub fn for_each_hit<F>(&self, sample_id: &str, mag_id: MagId, mut f: F) -> StoreResult<u64>
    where
        F: FnMut(NormalizedHit),
    {
        if self.sample_by_id(sample_id)?.is_none() {
            return Err(StoreError::UnknownSample(sample_id.to_string()));
        }
        let mut statement = self.conn.prepare_cached(
            "SELECT h.mag_id, h.contig_id, h.pct_identity, h.start, h.stop
             FROM samples s JOIN hits h ON h.partition_id = s.partition_id
             WHERE s.sample_id = ?1 AND h.mag_id = ?2",
        )?;
        let mut rows = statement.query((sample_id, mag_id))?;
        let mut visited = 0;
        while let Some(row) = rows.next()? {
            f(hit_from_row(row)?);
            visited += 1;
        }
        Ok(visited)
    }

    /// All active hits of a sample in insertion order.
    pub fn hits(&self, sample_id: &str) -> StoreResult<Vec<NormalizedHit>> {
        let mut statement = self.conn.prepare(
            "SELECT h.mag_id, h.contig_id, h.pct_identity, h.start, h.stop
             FROM samples s JOIN hits h ON h.partition_id = s.partition_id
             WHERE s.sample_id = ?1
             ORDER BY h.rowid",
        )?;
        let rows = statement.query_map([sample_id], |row| hit_from_row(row))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn hit_count(&self, sample_id: &str) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM samples s JOIN hits h ON h.partition_id = s.partition_id
             WHERE s.sample_id = ?1",
            [sample_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Distinct MAG names reached by `contigs`, in MAG id order.
fn membership_of(catalog: &Catalog, contigs: &BTreeSet<String>) -> Vec<String> {
    let mags: BTreeMap<MagId, &str> = contigs
        .iter()
        .filter_map(|name| catalog.contig(name))
        .filter_map(|contig| catalog.mag_by_id(contig.mag_id))
        .map(|mag| (mag.id, mag.name.as_str()))
        .collect();
    mags.into_values().map(str::to_string).collect()
}

fn insert_hits(conn: &mut Connection, partition: i64, batch: &[NormalizedHit]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare_cached(
            "INSERT INTO hits (partition_id, mag_id, contig_id, pct_identity, start, stop)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for hit in batch {
            insert.execute((
                partition,
                hit.mag_id,
                hit.contig_id,
                hit.pct_identity,
                hit.start as i64,
                hit.stop as i64,
            ))?;
        }
    }
    tx.commit()
}

fn delete_partition(conn: &mut Connection, partition: i64) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM hits WHERE partition_id = ?1", [partition])?;
    tx.execute("DELETE FROM partitions WHERE partition_id = ?1", [partition])?;
    tx.commit()
}

fn sample_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sample> {
    Ok(Sample {
        source_name: row.get(0)?,
        sample_id: row.get(1)?,
        sequence_number: row.get(2)?,
    })
}

fn hit_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NormalizedHit> {
    Ok(NormalizedHit {
        mag_id: row.get(0)?,
        contig_id: row.get(1)?,
        pct_identity: row.get(2)?,
        start: row.get::<_, i64>(3)? as u64,
        stop: row.get::<_, i64>(4)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ContigLengths, Membership};
    use crate::io::{RawHit, SkipReason};

    fn catalog() -> Catalog {
        let lengths: ContigLengths = [("ctgA", 2350), ("ctgB", 900), ("ctgC", 4000)]
            .into_iter()
            .map(|(name, len)| (name.to_string(), len))
            .collect();
        let membership: Membership = [("ctgA", "mag1"), ("ctgB", "mag1"), ("ctgC", "mag2")]
            .into_iter()
            .map(|(contig, mag)| (contig.to_string(), mag.to_string()))
            .collect();
        Catalog::build(&lengths, &membership).unwrap()
    }

    fn store(batch_size: usize, catalog: &Catalog) -> SampleStore {
        let mut conn = db::open_in_memory().unwrap();
        catalog.persist(&mut conn).unwrap();
        SampleStore::new(conn, StoreConfig { batch_size })
    }

    fn hit(target: &str, pct_identity: f64, start: u64, stop: u64) -> Result<RawRecord, ParseError> {
        Ok(RawRecord::Hit(RawHit {
            target: target.to_string(),
            pct_identity,
            start,
            stop,
        }))
    }

    fn records(n: u64, target: &str) -> Vec<Result<RawRecord, ParseError>> {
        (0..n).map(|i| hit(target, 95.0, 10 * i + 1, 10 * i + 50)).collect()
    }

    #[test]
    fn test_all_hits_present_regardless_of_batch_size() {
        let catalog = catalog();
        for batch_size in [1, 3, 7, 1000] {
            let mut store = store(batch_size, &catalog);
            let report = store
                .ingest_records(&catalog, "s1.blast", records(10, "ctgA").into_iter())
                .unwrap();
            assert_eq!(report.summary.retained, 10);
            assert_eq!(report.batches, (10 + batch_size - 1) / batch_size);
            assert_eq!(store.hit_count(&report.sample.sample_id).unwrap(), 10);
        }
    }

    #[test]
    fn test_sample_ids_are_sequential() {
        let catalog = catalog();
        let mut store = store(4, &catalog);
        let first = store
            .ingest_records(&catalog, "a.sam", records(2, "ctgA").into_iter())
            .unwrap();
        let second = store
            .ingest_records(&catalog, "b.sam", records(2, "ctgC").into_iter())
            .unwrap();
        assert_eq!(first.sample.sample_id, "sample_1");
        assert_eq!(second.sample.sample_id, "sample_2");
        assert!(!first.replaced && !second.replaced);
        assert_eq!(store.samples().unwrap().len(), 2);
    }

    #[test]
    fn test_reingestion_replaces_hits_and_keeps_id() {
        let catalog = catalog();
        let mut store = store(4, &catalog);
        store
            .ingest_records(&catalog, "a.sam", records(9, "ctgA").into_iter())
            .unwrap();
        let report = store
            .ingest_records(&catalog, "a.sam", records(2, "ctgC").into_iter())
            .unwrap();

        assert!(report.replaced);
        assert_eq!(report.sample.sample_id, "sample_1");
        let hits = store.hits("sample_1").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.contig_id == 3 && h.mag_id == 2));
        assert_eq!(store.mags_in_sample("a.sam").unwrap(), vec!["mag2".to_string()]);
    }

    #[test]
    fn test_membership_has_one_row_per_mag() {
        let catalog = catalog();
        let mut store = store(100, &catalog);
        let mut input = records(3, "ctgB");
        input.extend(records(2, "ctgA"));
        input.extend(records(1, "ctgC"));
        input.push(hit("unlisted", 99.0, 1, 10));
        let report = store.ingest_records(&catalog, "a.sam", input.into_iter()).unwrap();

        assert_eq!(report.mags, vec!["mag1".to_string(), "mag2".to_string()]);
        assert_eq!(report.summary.out_of_catalog, 1);
        assert_eq!(
            store.mag_pairs().unwrap(),
            vec![
                ("a.sam".to_string(), "mag1".to_string()),
                ("a.sam".to_string(), "mag2".to_string())
            ]
        );
    }

    #[test]
    fn test_failed_ingestion_of_new_sample_leaves_nothing() {
        let catalog = catalog();
        let mut store = store(2, &catalog);
        let mut input = records(5, "ctgA");
        input.push(Err(ParseError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "truncated",
        ))));

        let err = store
            .ingest_records(&catalog, "a.sam", input.into_iter())
            .unwrap_err();
        assert!(matches!(err, StoreError::Parse(ParseError::Io(_))));
        assert!(store.samples().unwrap().is_empty());

        let rows: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM hits", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_hits() {
        let catalog = catalog();
        let mut store = store(2, &catalog);
        store
            .ingest_records(&catalog, "a.sam", records(3, "ctgA").into_iter())
            .unwrap();
        let before = store.hits("sample_1").unwrap();

        let mut input = records(4, "ctgC");
        input.push(Err(ParseError::Bam("corrupt block".to_string())));
        assert!(store.ingest_records(&catalog, "a.sam", input.into_iter()).is_err());

        assert_eq!(store.hits("sample_1").unwrap(), before);
        assert_eq!(store.mags_in_sample("a.sam").unwrap(), vec!["mag1".to_string()]);
    }

    #[test]
    fn test_malformed_records_do_not_abort() {
        let catalog = catalog();
        let mut store = store(10, &catalog);
        let input = vec![
            hit("ctgA", 99.0, 1, 10),
            Ok(RawRecord::Malformed(SkipReason::ZeroLengthAlignment)),
            hit("ctgA", 98.0, 20, 30),
        ];
        let report = store.ingest_records(&catalog, "a.sam", input.into_iter()).unwrap();
        assert_eq!(report.summary.malformed, 1);
        assert_eq!(store.hit_count("sample_1").unwrap(), 2);
    }

    #[test]
    fn test_prune_removes_building_partitions() {
        let catalog = catalog();
        let mut store = store(10, &catalog);
        store
            .ingest_records(&catalog, "a.sam", records(3, "ctgA").into_iter())
            .unwrap();

        // Simulate a crash after one committed batch
        let partition = store.open_partition("b.sam").unwrap();
        let orphan = [NormalizedHit::new(1, 1, 90.0, 1, 10)];
        insert_hits(store.connection_mut(), partition, &orphan).unwrap();

        assert_eq!(store.prune_stale_partitions().unwrap(), 1);
        let rows: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM hits", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 3);
        assert_eq!(store.prune_stale_partitions().unwrap(), 0);
    }

    #[test]
    fn test_for_each_hit_filters_by_mag() {
        let catalog = catalog();
        let mut store = store(10, &catalog);
        let mut input = records(4, "ctgA");
        input.extend(records(2, "ctgC"));
        store.ingest_records(&catalog, "a.sam", input.into_iter()).unwrap();

        let mut contigs = Vec::new();
        let visited = store.for_each_hit("sample_1", 2, |hit| contigs.push(hit.contig_id)).unwrap();
        assert_eq!(visited, 2);
        assert_eq!(contigs, vec![3, 3]);

        let err = store.for_each_hit("sample_9", 1, |_| {}).unwrap_err();
        assert!(matches!(err, StoreError::UnknownSample(_)));
    }

    #[test]
    fn test_resolve_sample_by_name_or_id() {
        let catalog = catalog();
        let mut store = store(10, &catalog);
        store
            .ingest_records(&catalog, "reads/a.sam", records(1, "ctgA").into_iter())
            .unwrap();
        assert_eq!(store.resolve_sample("reads/a.sam").unwrap().sample_id, "sample_1");
        assert_eq!(store.resolve_sample("sample_1").unwrap().source_name, "reads/a.sam");
        assert!(store.resolve_sample("missing").is_err());
    }
}
