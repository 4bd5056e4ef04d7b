//! Samples and pairs commands - tabular listings of the database contents

use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;

use recplot_core::SampleStore;

use crate::config::Config;

pub fn samples(config: &Config, db: PathBuf) -> Result<()> {
    let (store, _) = super::open_database(&db, config.store_config(None))?;
    let stdout = std::io::stdout();
    write_samples(&store, &mut stdout.lock())
}

pub fn pairs(config: &Config, db: PathBuf, sample: Option<String>) -> Result<()> {
    let (store, _) = super::open_database(&db, config.store_config(None))?;
    let stdout = std::io::stdout();
    write_pairs(&store, sample.as_deref(), &mut stdout.lock())
}

fn write_samples<W: Write>(store: &SampleStore, out: &mut W) -> Result<()> {
    writeln!(out, "sample_id\tsource_name\thits")?;
    for sample in store.samples()? {
        let hits = store.hit_count(&sample.sample_id)?;
        writeln!(out, "{}\t{}\t{}", sample.sample_id, sample.source_name, hits)?;
    }
    Ok(())
}

/// (MAG, sample) pairs, optionally restricted to one sample id or source name.
fn write_pairs<W: Write>(store: &SampleStore, sample: Option<&str>, out: &mut W) -> Result<()> {
    writeln!(out, "mag\tsource_name")?;
    match sample {
        Some(name) => {
            let sample = store.resolve_sample(name)?;
            for mag in store.mags_in_sample(&sample.source_name)? {
                writeln!(out, "{}\t{}", mag, sample.source_name)?;
            }
        }
        None => {
            for (source, mag) in store.mag_pairs()? {
                writeln!(out, "{}\t{}", mag, source)?;
            }
        }
    }
    Ok(())
}
