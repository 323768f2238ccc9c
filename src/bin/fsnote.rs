//! fsnote - print filesystem change notes for the given paths until stdin closes.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fsnote::backend::canonicalize_paths;
use fsnote::{sink_fn, Delivery, FsNoteResult, Note, PatternSink, Subscriber, WatchConfig, WatchContext};

#[derive(Debug, Parser)]
#[command(name = "fsnote", version, about = "Watch paths and print change notes")]
struct Args {
    /// JSON file with a watch configuration.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Coalescing latency in milliseconds. Overrides the config file.
    #[arg(long, value_name = "N")]
    latency_ms: Option<u64>,

    /// Only report files with this extension. Repeatable. Replaces the
    /// configured `watched_extensions`.
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Print one JSON object per delivery.
    #[arg(long)]
    json: bool,

    /// Paths to watch. Subscribers are registered under the first.
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "fsnote=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fsnote failed");
            eprintln!("fsnote: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> FsNoteResult<()> {
    let mut config = match &args.config {
        Some(path) => WatchConfig::from_json_file(path)?,
        None => WatchConfig::default(),
    };
    if let Some(latency_ms) = args.latency_ms {
        config.latency_ms = latency_ms;
    }
    config.validate()?;

    let json = args.json;
    let printer = sink_fn(move |path: &str, note: &Note| {
        print_delivery(path, note, json);
        Ok(())
    });
    let extensions = if args.extensions.is_empty() {
        &config.watched_extensions
    } else {
        &args.extensions
    };
    let subscriber = if extensions.is_empty() {
        Subscriber::new(printer)
    } else {
        Subscriber::new(PatternSink::extensions(extensions, printer)?)
    };

    // Events arrive under absolute paths; keys must match that form.
    let paths = canonicalize_paths(&args.paths)?;

    let mut ctx = WatchContext::native(config);
    ctx.schedule_subscriber(subscriber, &paths)?;
    let stream_id = ctx.start()?;
    tracing::info!(%stream_id, ?paths, "watching; close stdin to stop");

    // Blocks until EOF.
    if let Err(e) = io::copy(&mut io::stdin().lock(), &mut io::sink()) {
        tracing::warn!(error = %e, "stdin read failed, stopping");
    }

    ctx.stop()?;
    let stats = ctx.stats();
    tracing::info!(
        events = stats.events,
        deliveries = stats.deliveries,
        unrouted = stats.unrouted_events,
        "stopped"
    );
    Ok(())
}

fn print_delivery(path: &str, note: &Note, json: bool) {
    let mut out = io::stdout().lock();
    let written = if json {
        let delivery = Delivery {
            path: path.to_string(),
            note: note.clone(),
            received_at: Utc::now(),
        };
        match serde_json::to_string(&delivery) {
            Ok(line) => writeln!(out, "{line}"),
            Err(e) => {
                tracing::warn!(error = %e, path, "could not encode delivery");
                return;
            }
        }
    } else {
        writeln!(out, "{path}: {note}")
    };
    if written.and_then(|()| out.flush()).is_err() {
        tracing::debug!(path, "stdout closed");
    }
}
