//! Add command implementation - ingest or rebuild samples in an existing database

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;

pub fn execute(
    config: &Config,
    db: PathBuf,
    samples: Vec<PathBuf>,
    format: Option<String>,
    batch_size: Option<usize>,
) -> Result<()> {
    let (mut store, catalog) = super::open_database(&db, config.store_config(batch_size))?;
    let reports = super::ingest_files(&mut store, &catalog, &samples, format.as_deref())?;

    let replaced = reports.iter().filter(|r| r.replaced).count();
    log::info!(
        "Added {} samples, rebuilt {}",
        reports.len() - replaced,
        replaced
    );
    Ok(())
}
