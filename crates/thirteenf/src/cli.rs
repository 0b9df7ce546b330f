use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets the level of tracing.
    ///
    /// Without it, progress bars are shown instead of logs.
    #[arg(short, long, global = true)]
    pub trace: Option<TraceLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the feed archives holding a quarter's 13F filings.
    Download {
        #[arg(value_parser = clap::value_parser!(u16).range(1993..=9999))]
        year: u16,

        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        quarter: u8,

        /// Only download the archives of these dates (YYYYMMDD), rather than every date the
        /// index lists.
        #[arg(short, long)]
        date: Vec<String>,
    },

    /// Extract the quarter's 13F filings from its downloaded archives.
    Unpack {
        #[arg(value_parser = clap::value_parser!(u16).range(1993..=9999))]
        year: u16,

        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        quarter: u8,

        /// Only scan the archive of this date (YYYYMMDD).
        #[arg(short, long)]
        date: Option<String>,

        /// Delete each archive once it has been scanned.
        #[arg(long)]
        delete_feeds: bool,
    },

    /// Store the extracted filings of a quarter in PostgreSQL.
    ToDatabase {
        #[arg(value_parser = clap::value_parser!(u16).range(1993..=9999))]
        year: u16,

        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        quarter: u8,

        /// Only store this filing, e.g. `0001234567-21-000001.nc`.
        #[arg(short, long)]
        filename: Option<String>,
    },

    /// Print a parsed filing as JSON.
    Inspect {
        /// Path of an extracted `.nc` filing.
        path: PathBuf,
    },

    /// Download, unpack and store a quarter.
    Run {
        #[arg(value_parser = clap::value_parser!(u16).range(1993..=9999))]
        year: u16,

        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        quarter: u8,

        /// Delete each archive once it has been scanned.
        #[arg(long)]
        delete_feeds: bool,
    },
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
#[clap(rename_all = "UPPERCASE")]
pub enum TraceLevel {
    DEBUG,
    ERROR,
    INFO,
    TRACE,
    WARN,
}
