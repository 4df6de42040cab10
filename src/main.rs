use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, LevelFilter};
use std::io;
use std::process;
use std::time::Duration;
use subscout::config::load_config;
use subscout::utils::{parse_domain_lines, read_domain_list};
use subscout::{
    Args, DiscoveryEngine, OutputManager, ProcessedSet, RecursionController, RunOptions, SourceRegistry,
};

const BANNER: &str = r#"
           __                          __
  ___ __ _/ /  ___ _______  __ _____  / /_
 (_-</ // / _ \(_-</ __/ _ \/ // / _ \/ __/
/___/\_,_/_.__/___/\__/\___/\_,_/_//_/\__/

        Passive Subdomain Discovery
"#;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    if !args.silent {
        eprintln!("{}", BANNER);
    }

    if args.list_sources {
        list_sources();
        return Ok(());
    }

    let domains = collect_domains(&args);
    if domains.is_empty() {
        error!("No input provided. Use -d <domain>, -l <file>, or pipe domains to stdin");
        process::exit(1);
    }

    let mut config = load_config(args.config_path.as_deref()).context("Failed to load configuration")?;
    args.apply_to(&mut config).context("Invalid command line options")?;

    let engine = DiscoveryEngine::new(&config).context("Failed to initialize discovery engine")?;
    let mut controller = RecursionController::new(engine, &config);
    if !args.silent {
        controller = controller.with_progress(progress_bar());
    }

    let output = OutputManager::new(config.output.clone());
    let options = RunOptions::from_config(&config, args.recursive, args.confirm_live());
    let processed = ProcessedSet::new();

    let report = controller.run(&domains, &options, &processed, &output).await;

    if !args.silent {
        info!(
            "Enumeration completed: {} unique subdomains for {} domain(s) in {:.2}s ({} source errors)",
            report.all_hostnames().len(),
            report.reports.len(),
            report.duration.as_secs_f64(),
            report.source_errors()
        );
    }

    if report.reports.is_empty() && !report.failed_roots.is_empty() {
        process::exit(1);
    }

    Ok(())
}

fn init_logging(args: &Args) {
    let level = if args.silent {
        LevelFilter::Error
    } else if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos}/{len} {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn list_sources() {
    let registry = SourceRegistry::from_config(&Default::default());
    let (keyed, free): (Vec<_>, Vec<_>) = registry.infos().into_iter().partition(|info| info.needs_key);

    println!("Available sources:\n");
    println!("Free sources ({})", free.len());
    for info in &free {
        println!("  {}", info.id);
    }

    println!("\nAPI sources ({})", keyed.len());
    for info in &keyed {
        println!("  {} *", info.id);
    }

    println!("\n* = Requires API key");
    println!("\nSet keys under [api_keys] in the config file or via <SOURCE>_API_KEYS");
}

fn collect_domains(args: &Args) -> Vec<String> {
    let mut domains = args.domain.clone();

    if let Some(path) = &args.domains_file {
        match read_domain_list(path) {
            Ok(list) => domains.extend(list),
            Err(e) => {
                error!("{}", e);
                process::exit(1);
            }
        }
    }

    if args.use_stdin() {
        match parse_domain_lines(io::stdin().lock()) {
            Ok(list) => domains.extend(list),
            Err(e) => error!("Failed to read domains from stdin: {}", e),
        }
    }

    domains
}
