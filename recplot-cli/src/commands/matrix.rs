//! Matrix command implementation - fill recruitment matrices and export them as JSON

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use recplot_core::matrix::FillSummary;
use recplot_core::{fill, BinParams, MatrixError, RecruitmentMatrix, Sample, SampleStore, StoreError};

use crate::config::Config;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct MatrixExport {
    pub mag: String,
    pub bin_width: u64,
    pub id_step: f64,
    pub id_lower: f64,
    pub samples: Vec<SampleMatrix>,
}

#[derive(Debug, Serialize)]
pub struct SampleMatrix {
    pub sample_id: String,
    pub source_name: String,
    pub summary: FillSummary,
    pub matrix: RecruitmentMatrix,
}

#[allow(clippy::too_many_arguments)]
pub fn execute(
    config: &Config,
    db: PathBuf,
    mag: String,
    samples: Vec<String>,
    out: Option<PathBuf>,
    bin_width: Option<u64>,
    id_step: Option<f64>,
    id_lower: Option<f64>,
) -> Result<()> {
    let params = config.bin_params(bin_width, id_step, id_lower);
    let export = build_export(config, &db, &mag, &samples, params)?;

    match out {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_export(&export, BufWriter::new(file))?;
            log::info!("Matrices written to: {}", path.display());
        }
        None => write_export(&export, std::io::stdout().lock())?,
    }
    Ok(())
}

fn build_export(
    config: &Config,
    db: &Path,
    mag: &str,
    samples: &[String],
    params: BinParams,
) -> Result<MatrixExport> {
    let (store, catalog) = super::open_database(db, config.store_config(None))?;
    let template = RecruitmentMatrix::build(&catalog, mag, &params).map_err(|e| match e {
        MatrixError::UnknownMag(name) => anyhow::Error::from(CliError::unknown_mag(name)),
        other => anyhow::Error::from(other),
    })?;

    let selected = select_samples(&store, mag, samples)?;
    drop(store);
    if selected.is_empty() {
        log::warn!("No sample recruited reads to {}", mag);
    }
    log::info!("Filling {} matrices for {}", selected.len(), mag);

    // One connection per worker; WAL lets them read side by side.
    let filled: Vec<SampleMatrix> = selected
        .into_par_iter()
        .map(|sample| -> Result<SampleMatrix> {
            let store = SampleStore::open(db, config.store_config(None))?;
            let mut matrix = template.clone();
            let summary = fill(&store, &sample.sample_id, &mut matrix)?;
            Ok(SampleMatrix {
                sample_id: sample.sample_id,
                source_name: sample.source_name,
                summary,
                matrix,
            })
        })
        .collect::<Result<_>>()?;

    Ok(MatrixExport {
        mag: mag.to_string(),
        bin_width: params.bin_width,
        id_step: params.id_step,
        id_lower: params.id_lower,
        samples: filled,
    })
}

/// Named samples, or every sample that recruited `mag` when none are named.
fn select_samples(store: &SampleStore, mag: &str, names: &[String]) -> Result<Vec<Sample>> {
    if names.is_empty() {
        let mut selected = Vec::new();
        for (source, _) in store.mag_pairs()?.into_iter().filter(|(_, m)| m == mag) {
            selected.push(store.resolve_sample(&source)?);
        }
        return Ok(selected);
    }

    names
        .iter()
        .map(|name| {
            store.resolve_sample(name).map_err(|e| match e {
                StoreError::UnknownSample(name) => anyhow::Error::from(CliError::unknown_sample(name)),
                other => anyhow::Error::from(other),
            })
        })
        .collect()
}

fn write_export<W: Write>(export: &MatrixExport, mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, export).context("Failed to serialize matrices")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn database(dir: &TempDir) -> PathBuf {
        let fasta = dir.path().join("contigs.fa");
        std::fs::write(&fasta, format!(">ctgA\n{}\n>ctgB\n{}\n", "A".repeat(2350), "C".repeat(900))).unwrap();
        let membership = dir.path().join("bins.tsv");
        std::fs::write(&membership, "ctgA\tmag1\nctgB\tmag2\n").unwrap();

        let first = dir.path().join("first.blast");
        std::fs::write(&first, "r1\tctgA\t97.3\t21\t0\t0\t1\t21\t990\t1010\t1e-5\t40\n").unwrap();
        let second = dir.path().join("second.blast");
        std::fs::write(
            &second,
            "r1\tctgA\t99.9\t100\t0\t0\t1\t100\t1\t100\t1e-5\t40\nr2\tctgB\t99.9\t100\t0\t0\t1\t100\t1\t100\t1e-5\t40\n",
        )
        .unwrap();

        let db = dir.path().join("recplot.db");
        super::super::init::execute(
            &Config::default(),
            db.clone(),
            fasta,
            membership,
            vec![first, second],
            None,
            None,
        )
        .unwrap();
        db
    }

    #[test]
    fn test_export_all_samples_for_mag() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);
        let export = build_export(&Config::default(), &db, "mag1", &[], BinParams::default()).unwrap();

        assert_eq!(export.samples.len(), 2);
        let first = dir.path().join("first.blast");
        assert_eq!(export.samples[0].source_name, first.display().to_string());
        assert_eq!(export.samples[0].matrix.total_bases(), 21);
        assert_eq!(export.samples[1].matrix.total_bases(), 100);
    }

    #[test]
    fn test_export_named_sample() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);
        let export = build_export(
            &Config::default(),
            &db,
            "mag2",
            &["sample_2".to_string()],
            BinParams::default(),
        )
        .unwrap();
        assert_eq!(export.samples.len(), 1);
        assert_eq!(export.samples[0].summary.credited, 1);

        let mut out = Vec::new();
        write_export(&export, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json["mag"], "mag2");
        let second = dir.path().join("second.blast").display().to_string();
        assert_eq!(json["samples"][0]["source_name"], second.as_str());
    }

    #[test]
    fn test_unknown_names() {
        let dir = TempDir::new().unwrap();
        let db = database(&dir);
        let err = build_export(&Config::default(), &db, "mag9", &[], BinParams::default()).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::UnknownMag { .. })));

        let err = build_export(
            &Config::default(),
            &db,
            "mag1",
            &["missing.sam".to_string()],
            BinParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::UnknownSample { .. })));
    }
}
