//! Command implementations for the recplot CLI

pub mod add;
pub mod init;
pub mod list;
pub mod matrix;
pub mod prune;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use recplot_core::{AlignmentFormat, Catalog, IngestReport, SampleStore, StoreConfig};

use crate::error::{require_file, CliError};

/// Open an existing database and load its catalog.
pub(crate) fn open_database(db: &Path, store_config: StoreConfig) -> Result<(SampleStore, Catalog)> {
    require_file(db)?;
    let store = SampleStore::open(db, store_config)
        .with_context(|| format!("Failed to open database: {}", db.display()))?;
    let catalog = Catalog::load(store.connection()).context("Failed to load reference catalog")?;
    if catalog.is_empty() {
        return Err(CliError::empty_database(db.to_path_buf()).into());
    }
    Ok((store, catalog))
}

/// Guess the alignment format from the file extension, ignoring a trailing `.gz`.
pub(crate) fn detect_format(path: &Path) -> Result<AlignmentFormat, CliError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    let extension = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();

    match extension.as_str() {
        "sam" => Ok(AlignmentFormat::TaggedText),
        "bam" => Ok(AlignmentFormat::Binary),
        "blast" | "b6" | "m8" | "tsv" | "tab" | "txt" => Ok(AlignmentFormat::Tabular),
        _ => Err(CliError::invalid_format(format!(
            "cannot infer alignment format of {}",
            path.display()
        ))),
    }
}

/// Sample source name: the alignment file path exactly as given on the command line.
///
/// Files sharing a base name in different directories stay distinct samples.
pub(crate) fn source_name(path: &Path) -> String {
    path.display().to_string()
}

/// Ingest alignment files one after another, replacing samples seen before.
pub(crate) fn ingest_files(
    store: &mut SampleStore,
    catalog: &Catalog,
    files: &[PathBuf],
    format: Option<&str>,
) -> Result<Vec<IngestReport>> {
    let forced = format
        .map(str::parse::<AlignmentFormat>)
        .transpose()
        .map_err(|e| CliError::invalid_format(e.to_string()))?;

    let progress = ProgressBar::new(files.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .context("Invalid progress template")?,
    );

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        require_file(path)?;
        let format = match forced {
            Some(format) => format,
            None => detect_format(path)?,
        };
        let source = source_name(path);
        progress.set_message(source.clone());

        let report = store
            .ingest(catalog, &source, path, format)
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        log_report(&report);
        reports.push(report);
        progress.inc(1);
    }
    progress.finish_and_clear();
    Ok(reports)
}

fn log_report(report: &IngestReport) {
    log::info!(
        "{} {} as {}: {} hits in {} batches, {} MAGs",
        if report.replaced { "Replaced" } else { "Added" },
        report.sample.source_name,
        report.sample.sample_id,
        report.summary.retained,
        report.batches,
        report.mags.len()
    );
}
