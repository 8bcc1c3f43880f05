use clap::{Parser, Subcommand, ValueEnum};

use crate::models::Direction;

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the config file (trend_pipeline.toml); defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<String>,

    /// Print values with their provenance instead of a plain date -> percent map
    #[arg(long, global = true)]
    pub provenance: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the instrument list of a matrix request comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ListSource {
    /// `--instruments` on the command line
    Args,
    /// JSON array in the file named by `--input`
    File,
    /// JSON array on stdin
    Stdin,
    /// JSON array passed inline as `--input`
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve trading days around a date
    Days {
        /// Anchor date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Number of trading days
        #[arg(long, default_value = "5")]
        count: usize,

        /// forward: days after the anchor; backward: days ending on it
        #[arg(long, value_enum, default_value = "forward")]
        direction: Direction,
    },

    /// Daily changes of one instrument
    Performance {
        /// Instrument code (e.g. "600519" or "600519.SH")
        #[arg(long)]
        instrument: String,

        /// Base date (YYYY-MM-DD); the horizon starts the next trading day
        #[arg(long, required_unless_present = "dates")]
        base_date: Option<String>,

        /// Trading days after the base date; config default when omitted
        #[arg(long)]
        horizon: Option<usize>,

        /// Explicit comma-separated days instead of a base date and horizon
        #[arg(long, conflicts_with_all = ["base_date", "horizon"])]
        dates: Option<String>,
    },

    /// Daily changes over the five trading days ending on a date
    Week {
        #[arg(long)]
        instrument: String,

        #[arg(long)]
        date: String,
    },

    /// Daily changes of several instruments over the same horizon
    Matrix {
        /// Comma-separated instrument codes (with --source args)
        #[arg(long)]
        instruments: Option<String>,

        /// Source of the instrument list
        #[arg(long, value_enum, default_value = "args")]
        source: ListSource,

        /// Path to a JSON file (source=file) or an inline JSON array (source=json)
        #[arg(long)]
        input: Option<String>,

        #[arg(long)]
        base_date: String,

        #[arg(long)]
        horizon: Option<usize>,
    },
}
