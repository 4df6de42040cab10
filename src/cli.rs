use crate::resolver::parse_nameserver;
use crate::sources::{SourceId, SourceSelection};
use crate::types::{Config, OutputFormat, ScoutError};
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

#[derive(Parser, Debug, Clone)]
#[command(
    name = "subscout",
    version,
    long_version = LONG_VERSION,
    about = "Passive subdomain discovery",
    long_about = "subscout queries certificate transparency logs, search engines, DNS aggregators and web archives\nto enumerate subdomains without sending any traffic to the target."
)]
pub struct Args {
    /// Target domain(s) to enumerate
    #[arg(short = 'd', long = "domain", value_name = "DOMAIN")]
    pub domain: Vec<String>,

    /// File containing list of domains, one per line
    #[arg(short = 'l', long = "list", value_name = "FILE")]
    pub domains_file: Option<PathBuf>,

    /// Aggregate output file for all domains
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// Directory receiving one output file per domain
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long = "json", conflicts_with_all = ["csv", "aquatone"])]
    pub json: bool,

    /// Output in CSV format
    #[arg(long = "csv", conflicts_with = "aquatone")]
    pub csv: bool,

    /// Output a host -> IP map for aquatone (implies --alive)
    #[arg(long = "aquatone")]
    pub aquatone: bool,

    /// Sources to use, comma-separated, or "all"
    #[arg(short = 's', long = "sources", value_name = "SOURCES")]
    pub sources: Option<String>,

    /// Sources to skip, comma-separated
    #[arg(long = "exclude-sources", value_delimiter = ',', value_name = "SOURCES")]
    pub exclude_sources: Vec<String>,

    /// Custom DNS resolvers, comma-separated (ip or ip:port)
    #[arg(short = 'r', long = "resolvers", value_delimiter = ',', value_name = "IPS")]
    pub resolvers: Vec<String>,

    /// Re-enumerate every discovered subdomain once
    #[arg(long = "recursive")]
    pub recursive: bool,

    /// Only keep subdomains that resolve and are not wildcard answers
    #[arg(long = "alive")]
    pub alive: bool,

    /// With --alive, keep subdomains that do not resolve
    #[arg(long = "keep-unresolved", requires = "alive")]
    pub keep_unresolved: bool,

    /// Seconds to wait for a single source
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds for the whole run; partial results are kept
    #[arg(long = "max-time", value_name = "SECS")]
    pub max_time: Option<u64>,

    /// Concurrent DNS lookups
    #[arg(short = 't', long = "threads")]
    pub threads: Option<usize>,

    /// Silent mode (only output subdomains)
    #[arg(long = "silent", conflicts_with = "verbose")]
    pub silent: bool,

    /// Verbose mode
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// List all available sources
    #[arg(long = "list-sources")]
    pub list_sources: bool,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_path: Option<PathBuf>,
}

impl Args {
    /// Read domains from stdin when nothing else was given and stdin is piped.
    pub fn use_stdin(&self) -> bool {
        self.domain.is_empty() && self.domains_file.is_none() && !atty::is(atty::Stream::Stdin)
    }

    pub fn confirm_live(&self) -> bool {
        self.alive || self.aquatone
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else if self.csv {
            OutputFormat::Csv
        } else if self.aquatone {
            OutputFormat::Aquatone
        } else {
            OutputFormat::Text
        }
    }

    /// Command line flags win over the config file.
    pub fn apply_to(&self, config: &mut Config) -> Result<(), ScoutError> {
        if let Some(sources) = &self.sources {
            config.sources = SourceSelection::parse(sources)?;
        }
        for name in &self.exclude_sources {
            config.excluded_sources.insert(SourceId::from_str(name)?);
        }
        if !self.resolvers.is_empty() {
            for ns in &self.resolvers {
                parse_nameserver(ns)?;
            }
            config.resolver.nameservers = self.resolvers.clone();
            config.resolver.use_system_resolver = false;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = Duration::from_secs(timeout);
        }
        if let Some(max_time) = self.max_time {
            config.max_time = Some(Duration::from_secs(max_time));
        }
        if let Some(threads) = self.threads {
            config.resolver.threads = threads;
        }
        if self.keep_unresolved {
            config.resolver.keep_unresolved = true;
        }

        config.output.format = self.output_format();
        config.output.file = self.output_file.clone();
        config.output.directory = self.output_dir.clone();
        config.output.verbose = self.verbose;
        config.output.silent = self.silent;

        crate::config::validate_config(config)
    }
}
