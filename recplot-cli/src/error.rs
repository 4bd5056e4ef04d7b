//! Error handling for the recplot CLI

use thiserror::Error;
use std::path::PathBuf;

/// Main error type for recplot CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Database not initialised: {path}")]
    EmptyDatabase { path: PathBuf },

    #[error("Unknown MAG: {name}")]
    UnknownMag { name: String },

    #[error("Unknown sample: {name}")]
    UnknownSample { name: String },
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        Self::InvalidFormat { message: message.into() }
    }

    pub fn empty_database(path: PathBuf) -> Self {
        Self::EmptyDatabase { path }
    }

    pub fn unknown_mag<S: Into<String>>(name: S) -> Self {
        Self::UnknownMag { name: name.into() }
    }

    pub fn unknown_sample<S: Into<String>>(name: S) -> Self {
        Self::UnknownSample { name: name.into() }
    }
}

/// Ensure an input file exists before handing it to a parser
pub fn require_file(path: &std::path::Path) -> Result<(), CliError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::file_not_found(path.to_path_buf()))
    }
}

/// Provide helpful error messages and suggestions
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Ensure you have read permissions for the file\n\
                 • Compressed inputs must carry a .gz extension",
                path.display()
            ));
        }

        CliError::InvalidFormat { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Use --format blast, sam or bam to name the input format\n\
                 • Ensure the file is not corrupted or truncated"
            );
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check your recplot.toml configuration file\n\
                 • Use 'recplot config' to print a sample configuration"
            );
        }

        CliError::EmptyDatabase { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Create the database first with 'recplot init --fasta ... --membership ...'"
            );
        }

        CliError::UnknownMag { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Use 'recplot pairs' to list the MAGs recruited by each sample"
            );
        }

        CliError::UnknownSample { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Use 'recplot samples' to list sample ids and source names\n\
                 • Add the alignment file with 'recplot add'"
            );
        }
    }

    message
}

/// Print error with helpful suggestions and exit
pub fn print_error_and_exit(error: &CliError) -> ! {
    eprintln!("Error: {}", format_error_with_suggestions(error));
    std::process::exit(1);
}
