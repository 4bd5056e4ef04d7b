//! Init command implementation - build the reference catalog and ingest initial samples

use anyhow::{Context, Result};
use std::path::PathBuf;

use recplot_core::io::fasta::read_contig_lengths;
use recplot_core::io::membership::read_membership;
use recplot_core::{Catalog, SampleStore};

use crate::config::Config;
use crate::error::require_file;

pub fn execute(
    config: &Config,
    db: PathBuf,
    fasta: PathBuf,
    membership: PathBuf,
    samples: Vec<PathBuf>,
    format: Option<String>,
    batch_size: Option<usize>,
) -> Result<()> {
    require_file(&fasta)?;
    require_file(&membership)?;

    log::info!("Building reference catalog");
    let lengths = read_contig_lengths(&fasta)
        .with_context(|| format!("Failed to read contigs from {}", fasta.display()))?;
    let membership = read_membership(&membership)
        .with_context(|| format!("Failed to read MAG membership from {}", membership.display()))?;
    let catalog = Catalog::build(&lengths, &membership).context("Failed to build reference catalog")?;

    let mut store = SampleStore::open(&db, config.store_config(batch_size))
        .with_context(|| format!("Failed to open database: {}", db.display()))?;
    if !store.samples()?.is_empty() {
        log::warn!("Replacing the catalog of {}; existing samples are discarded", db.display());
    }
    catalog
        .persist(store.connection_mut())
        .context("Failed to write reference catalog")?;
    log::info!(
        "Wrote {} MAGs and {} contigs to {}",
        catalog.mags().len(),
        catalog.contigs().len(),
        db.display()
    );

    if !samples.is_empty() {
        super::ingest_files(&mut store, &catalog, &samples, format.as_deref())?;
    }

    log::info!("Database ready: {}", db.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_init_with_sample() {
        let dir = TempDir::new().unwrap();
        let fasta = write(&dir, "contigs.fa", ">ctgA\nACGTACGTAC\n>ctgB\nACGT\n");
        let membership = write(&dir, "bins.tsv", "ctgA\tmag1\nctgB\tmag2\n");
        let sample = write(
            &dir,
            "reads.blast",
            "r1\tctgA\t99.0\t5\t0\t0\t1\t5\t2\t6\t1e-5\t10\n",
        );
        let db = dir.path().join("recplot.db");

        execute(&Config::default(), db.clone(), fasta, membership, vec![sample.clone()], None, None).unwrap();

        let store = SampleStore::open(&db, Default::default()).unwrap();
        let samples = store.samples().unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].source_name, sample.display().to_string());
        assert_eq!(store.hit_count("sample_1").unwrap(), 1);
    }

    #[test]
    fn test_same_file_name_in_two_directories() {
        let dir = TempDir::new().unwrap();
        let fasta = write(&dir, "contigs.fa", ">ctgA\nACGTACGTAC\n>ctgB\nACGT\n");
        let membership = write(&dir, "bins.tsv", "ctgA\tmag1\nctgB\tmag2\n");
        std::fs::create_dir(dir.path().join("run1")).unwrap();
        std::fs::create_dir(dir.path().join("run2")).unwrap();
        let run1 = write(&dir, "run1/reads.blast", "r1\tctgA\t99.0\t5\t0\t0\t1\t5\t2\t6\t1e-5\t10\n");
        let run2 = write(&dir, "run2/reads.blast", "r1\tctgB\t99.0\t3\t0\t0\t1\t3\t1\t3\t1e-5\t10\n");
        let db = dir.path().join("recplot.db");

        execute(
            &Config::default(),
            db.clone(),
            fasta,
            membership,
            vec![run1.clone(), run2.clone()],
            None,
            None,
        )
        .unwrap();

        let store = SampleStore::open(&db, Default::default()).unwrap();
        assert_eq!(store.samples().unwrap().len(), 2);
        assert_eq!(store.hit_count("sample_1").unwrap(), 1);
        assert_eq!(store.hit_count("sample_2").unwrap(), 1);

        let mut pairs = store.mag_pairs().unwrap();
        pairs.sort();
        let mut expected = vec![
            (run1.display().to_string(), "mag1".to_string()),
            (run2.display().to_string(), "mag2".to_string()),
        ];
        expected.sort();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_missing_fasta() {
        let dir = TempDir::new().unwrap();
        let membership = write(&dir, "bins.tsv", "ctgA\tmag1\n");
        let result = execute(
            &Config::default(),
            dir.path().join("recplot.db"),
            dir.path().join("missing.fa"),
            membership,
            Vec::new(),
            None,
            None,
        );
        assert!(result.unwrap_err().to_string().contains("File not found"));
    }
}
