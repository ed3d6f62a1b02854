use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod dispatcher;
mod loader;
mod report;
mod request;
mod stats;
#[cfg(test)]
mod testing;

use cli::Args;
use config::{ConfigError, Profile, RunConfiguration, Sources};
use dispatcher::Dispatcher;
use report::{ConsoleReport, ReportWriter};

fn main() -> Result<()> {
    if std::env::args_os().len() <= 1 {
        Args::command().print_help()?;
        return Ok(());
    }

    let args = Args::parse();
    if args.version {
        println!("volley - Version {}", cli::version());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("volley=info")),
        )
        .init();

    let profile = match &args.config {
        Some(path) => {
            info!("Loading run profile from {}", path.display());
            Profile::from_file(path)?
        }
        None => Profile::default(),
    };

    let Some(sources) = args.sources(profile) else {
        Args::command().print_help()?;
        return Ok(());
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(sources.cores)
        .enable_all()
        .build()?;
    runtime.block_on(run(sources, &args))
}

async fn run(sources: Sources, args: &Args) -> Result<()> {
    let config = match RunConfiguration::load(sources) {
        Ok(config) => Arc::new(config),
        Err(ConfigError::NoTarget) => {
            Args::command().print_help()?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        "Starting {} {:?} requests, {} at a time, on {} cores",
        config.total,
        config.method(),
        config.worker_count(),
        config.cores
    );

    let dispatcher = Dispatcher::new(config.clone());
    let cancel = dispatcher.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for in-flight requests to finish");
            cancel.cancel();
        }
    });

    let summary = dispatcher.run().await?;

    if args.json {
        println!("{}", report::json(&summary)?);
    } else {
        println!();
        print!(
            "{}",
            ConsoleReport {
                summary: &summary,
                config: &config,
            }
        );
    }

    if !args.no_report {
        let files = ReportWriter::new(&args.report_prefix, &args.report_dir)
            .write(&summary, &config)?;
        println!();
        println!("For more details, please view the following saved reports:");
        for file in files {
            println!("\t{}", file.display());
        }
    }

    Ok(())
}
