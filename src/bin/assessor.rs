use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use runtime_assessment::{EngineHandle, SystemTransport, logging, read_config_file};
use tokio::io::BufReader;
use tokio::spawn;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Do not read channel values from stdin
    #[arg(long)]
    no_stdin: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = read_config_file(&args.file)?;
    let log_directory = logging::init(&config)?;
    trace!("started with args: {args:?}");
    info!("writing logs to {}", log_directory.display());

    let transport = SystemTransport::new();

    if !args.no_stdin {
        let bus = transport.bus().clone();
        spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            match bus.feed_json_lines(stdin, Utc::now).await {
                Ok(published) => debug!("stdin closed after {published} values"),
                Err(e) => warn!("failed to read channel values from stdin: {e}"),
            }
        });
    }

    let mut engine = EngineHandle::start(config, Arc::new(transport));

    loop {
        tokio::select! {
            report = engine.next_report() => match report {
                Some(report) => {
                    let json = serde_json::to_string_pretty(&report)
                        .context("failed to serialize report")?;
                    println!("{json}");
                }
                None => break,
            },

            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, finishing assessment");
                engine.shutdown().await?;
                // the report of the interrupted cycle, if any
                if let Some(report) = engine.next_report().await {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                break;
            }
        }
    }

    if let Err(e) = engine.join().await {
        error!("assessment aborted: {e:#}");
        return Err(e);
    }

    Ok(())
}
