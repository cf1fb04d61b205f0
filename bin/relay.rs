use clap::Parser;
use std::io::BufRead;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing_subscriber::filter::EnvFilter;

fn init_env_filter(env_filter: EnvFilter) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_level(true)
        .with_target(true);

    let subscriber = subscriber.finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut conn = multi_conn::MultiConnection::dial_timeout(
        &args.proto,
        &args.upstream,
        Duration::from_millis(args.timeout_ms),
    );
    tracing::info!(id = %conn.id(), connected = conn.len(), requested = args.upstream.len(), "Upstreams dialed");

    if conn.is_empty() || (args.require_all && conn.len() != args.upstream.len()) {
        if let Err(e) = conn.close() {
            tracing::warn!("{e}");
        }
        return Err(format!("only {} of {} upstreams connected", conn.len(), args.upstream.len()).into());
    }

    let stdin = std::io::stdin();
    let mut total = 0;
    for line in stdin.lock().lines() {
        let mut line = line?;
        line.push('\n');
        if let Some(ms) = args.write_timeout_ms {
            conn.set_write_deadline(Some(Instant::now() + Duration::from_millis(ms)))?;
        }
        match conn.write(line.as_bytes()) {
            Ok(n) => total += n,
            Err(e) => tracing::error!(transferred = e.transferred(), "{e}"),
        }
    }
    tracing::info!(total, "Input exhausted, closing upstreams");
    conn.close()?;
    Ok(())
}

fn main() -> ExitCode {
    tracing_log::LogTracer::init().expect("Failed to set logger");

    // Initialize tracing subscriber
    match EnvFilter::try_from_default_env() {
        Ok(env_filter) => init_env_filter(env_filter),
        _ => init_env_filter(EnvFilter::new("warn")),
    }

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Replicates lines read from stdin to every upstream, e.g. statsd metrics
/// to several collectors.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The network protocol: tcp, tcp4, tcp6, udp, udp4 or udp6.
    #[arg(short, long, default_value = "udp")]
    proto: String,
    /// An upstream address <host:port>. Repeat for every upstream.
    #[arg(short, long, required = true)]
    upstream: Vec<String>,
    /// The dial timeout per upstream, in milliseconds
    #[arg(short, long, default_value = "1000")]
    timeout_ms: u64,
    /// Fail unless every upstream connected
    #[arg(short, long)]
    require_all: bool,
    /// Write deadline applied before each line, in milliseconds
    #[arg(short, long)]
    write_timeout_ms: Option<u64>,
}
