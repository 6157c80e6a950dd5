//! Command-line argument parsing for newsquery
//!
//! Provides clap-based CLI with subcommands, log format and verbosity control.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::errors::{QueryError, Result};
use crate::query::{PublishDateRange, QueryFilters, SearchRequest};

/// newsquery - hybrid keyword and semantic search over the article index
#[derive(Parser, Debug)]
#[command(name = "newsquery")]
#[command(version)]
#[command(about = "Hybrid keyword and semantic search over the article index", long_about = None)]
pub struct Args {
    /// Configuration file path (TOML, JSON or YAML)
    #[arg(short, long, global = true, env = "QUERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one query and print the JSON response
    Search(SearchArgs),

    /// Read newline-delimited queries from stdin, print one response per line
    Batch {
        /// Final result count for every query
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Run deployment diagnostics
    Doctor,

    /// Display the effective configuration
    Config,
}

/// Arguments of `search`
#[derive(clap::Args, Debug, Clone)]
pub struct SearchArgs {
    /// Query text
    #[arg(value_name = "TEXT")]
    pub text: String,

    /// Final result count
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Earliest publish date: ISO date/time or `today-<N><d|w|m|y>`
    #[arg(long, value_name = "DATE")]
    pub from: Option<String>,

    /// Latest publish date; defaults to `today` when --from is given
    #[arg(long, value_name = "DATE")]
    pub to: Option<String>,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Human-readable
    Pretty,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl SearchArgs {
    /// Build the service request, resolving relative dates now
    pub fn to_request(&self) -> Result<SearchRequest> {
        let mut request = SearchRequest::new(self.text.clone());
        if let Some(limit) = self.limit {
            request = request.with_limit(limit);
        }

        let publish_date = match (&self.from, &self.to) {
            (None, None) => None,
            (Some(from), to) => Some(PublishDateRange::parse(from, to.as_deref().unwrap_or("today"))?),
            (None, Some(_)) => {
                return Err(QueryError::InputError("--to requires --from".to_string()));
            }
        };

        Ok(request.with_filters(QueryFilters { publish_date }))
    }
}

impl Verbosity {
    /// Default tracing filter directive when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
            Verbosity::VeryVerbose => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let args = Args::try_parse_from([
            "newsquery", "search", "central banks", "--limit", "5", "--from", "2024-01-01",
            "--to", "2024-02-01",
        ])
        .unwrap();

        match args.command {
            Commands::Search(search) => {
                assert_eq!(search.text, "central banks");
                let request = search.to_request().unwrap();
                assert_eq!(request.limit, Some(5));
                assert!(request.filters.publish_date.is_some());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["newsquery", "doctor", "--log-format", "pretty", "-vv"]).unwrap();
        assert_eq!(args.log_format, LogFormat::Pretty);
        assert_eq!(args.verbosity(), Verbosity::VeryVerbose);
        assert!(matches!(args.command, Commands::Doctor));
    }

    #[test]
    fn test_quiet_wins() {
        let args = Args::try_parse_from(["newsquery", "-q", "-v", "config"]).unwrap();
        assert_eq!(args.verbosity(), Verbosity::Quiet);
        assert_eq!(args.verbosity().filter_directive(), "warn");
    }

    #[test]
    fn test_to_without_from_is_input_error() {
        let search = SearchArgs {
            text: "rates".to_string(),
            limit: None,
            from: None,
            to: Some("2024-01-01".to_string()),
        };
        assert!(matches!(search.to_request(), Err(QueryError::InputError(_))));
    }

    #[test]
    fn test_bad_date_is_input_error() {
        let search = SearchArgs {
            text: "rates".to_string(),
            limit: None,
            from: Some("yesterday".to_string()),
            to: None,
        };
        assert!(matches!(search.to_request(), Err(QueryError::InputError(_))));
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Args::try_parse_from(["newsquery"]).is_err());
    }
}
