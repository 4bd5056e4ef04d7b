//! Prune command implementation - remove partitions left behind by interrupted ingestions

use anyhow::Result;
use std::path::PathBuf;

use crate::config::Config;

pub fn execute(config: &Config, db: PathBuf) -> Result<()> {
    let (mut store, _) = super::open_database(&db, config.store_config(None))?;
    let removed = store.prune_stale_partitions()?;
    if removed == 0 {
        log::info!("No stale partitions in {}", db.display());
    } else {
        log::info!("Removed {} stale partitions from {}", removed, db.display());
    }
    Ok(())
}
