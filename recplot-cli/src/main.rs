use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::{Result, Context};

mod config;
mod commands;
mod error;

use config::Config;
use error::{print_error_and_exit, CliError};

#[derive(Parser)]
#[command(name = "recplot")]
#[command(about = "recplot - read recruitment matrices for metagenome-assembled genomes")]
#[command(version)]
#[command(long_about = "
recplot builds a reference catalog of MAGs and their contigs, stores the
alignment hits of each read set in a SQLite database and turns them into
recruitment matrices: aligned bases per (percent identity, contig position) bin.

Examples:
  recplot init --db mags.db --fasta contigs.fa --membership bins.tsv reads1.sam
  recplot add --db mags.db --format blast reads2.blast.gz
  recplot pairs --db mags.db
  recplot matrix --db mags.db --mag bin_007 --sample reads1.sam --out bin_007.json
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads to use
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the reference catalog and optionally ingest alignment files
    Init {
        /// Database file to create or replace
        #[arg(long, required = true)]
        db: PathBuf,

        /// Contig sequences (FASTA, optionally gzipped)
        #[arg(long, required = true)]
        fasta: PathBuf,

        /// Contig to MAG assignments, one `contig mag` pair per line
        #[arg(long, required = true)]
        membership: PathBuf,

        /// Alignment format (blast, sam or bam; inferred from the extension if omitted)
        #[arg(long)]
        format: Option<String>,

        /// Hits per batch transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Alignment files to ingest
        samples: Vec<PathBuf>,
    },

    /// Add alignment files to a database; known files are rebuilt
    Add {
        /// Database file
        #[arg(long, required = true)]
        db: PathBuf,

        /// Alignment format (blast, sam or bam; inferred from the extension if omitted)
        #[arg(long)]
        format: Option<String>,

        /// Hits per batch transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Alignment files to ingest
        #[arg(required = true)]
        samples: Vec<PathBuf>,
    },

    /// Fill recruitment matrices for one MAG and write them as JSON
    Matrix {
        /// Database file
        #[arg(long, required = true)]
        db: PathBuf,

        /// MAG name
        #[arg(long, required = true)]
        mag: String,

        /// Sample source names or ids (default: every sample recruiting the MAG)
        #[arg(long = "sample")]
        samples: Vec<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Approximate position bin width in bases
        #[arg(long)]
        bin_width: Option<u64>,

        /// Identity bin height in percent
        #[arg(long)]
        id_step: Option<f64>,

        /// Lowest identity kept (exclusive)
        #[arg(long)]
        id_lower: Option<f64>,
    },

    /// List samples with their ids and hit counts
    Samples {
        /// Database file
        #[arg(long, required = true)]
        db: PathBuf,
    },

    /// List (MAG, sample) pairs with recruited reads
    Pairs {
        /// Database file
        #[arg(long, required = true)]
        db: PathBuf,

        /// Restrict to one sample (source name or id)
        #[arg(long)]
        sample: Option<String>,
    },

    /// Remove hit partitions left behind by interrupted ingestions
    Prune {
        /// Database file
        #[arg(long, required = true)]
        db: PathBuf,
    },

    /// Print an example configuration file
    Config {
        /// Write the effective configuration to this file instead of printing the example
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp_secs()
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet)?;

    let config = Config::load(cli.config.as_deref())?;

    let threads = cli.threads.unwrap_or(config.general.threads);
    if threads == 0 {
        return Err(CliError::config("thread count must be at least 1").into());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to set thread count")?;

    match cli.command {
        Commands::Init {
            db,
            fasta,
            membership,
            format,
            batch_size,
            samples,
        } => {
            commands::init::execute(&config, db, fasta, membership, samples, format, batch_size)?;
        }

        Commands::Add {
            db,
            format,
            batch_size,
            samples,
        } => {
            commands::add::execute(&config, db, samples, format, batch_size)?;
        }

        Commands::Matrix {
            db,
            mag,
            samples,
            out,
            bin_width,
            id_step,
            id_lower,
        } => {
            commands::matrix::execute(&config, db, mag, samples, out, bin_width, id_step, id_lower)?;
        }

        Commands::Samples { db } => {
            commands::list::samples(&config, db)?;
        }

        Commands::Pairs { db, sample } => {
            commands::list::pairs(&config, db, sample)?;
        }

        Commands::Prune { db } => {
            commands::prune::execute(&config, db)?;
        }

        Commands::Config { out } => match out {
            Some(path) => {
                config.save_to_file(&path)?;
                log::info!("Configuration written to: {}", path.display());
            }
            None => print!("{}", Config::example_toml()?),
        },
    }

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        match err.downcast_ref::<CliError>() {
            Some(cli_error) => print_error_and_exit(cli_error),
            None => {
                eprintln!("Error: {:#}", err);
                std::process::exit(1);
            }
        }
    }
}
