// src/lib.rs
pub mod cli;
pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod output;
pub mod resolver;
pub mod runner;
pub mod session;
pub mod sources;
pub mod types;
pub mod utils;
pub mod wildcard;

pub use cli::Args;
pub use engine::{Discovery, DiscoveryEngine};
pub use output::{OutputManager, OutputSink};
pub use runner::{ProcessedSet, RecursionController, RunOptions, RunReport};
pub use sources::{SourceId, SourceRegistry, SourceSelection};
pub use types::{Config, DomainReport, ScoutError, ValidatedResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
