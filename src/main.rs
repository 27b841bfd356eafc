mod config;
mod dns_header;
mod dns_name;
mod dns_query;
mod error;
mod logging;
mod probe;
mod scheduler;
mod sink;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;

use config::{CliOverrides, Config, FailurePolicy, LogFormat};
use probe::DnsProbe;
use scheduler::Scheduler;
use sink::{LogSink, MetricSink, PutvalSink};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    /// Log each sample through tracing
    Log,
    /// Print collectd PUTVAL lines on stdout
    Putval,
}

#[derive(Parser, Debug)]
#[command(name = "dns-rtt-probe", version)]
#[command(about = "Measure how long a DNS resolver takes to answer an A query")]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Network interface to send queries from (e.g., eth0)
    #[arg(short = 'i', long)]
    interface: Option<String>,

    /// IPv4 address of the resolver to probe (e.g., 9.9.9.9)
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Hostname to look up
    #[arg(short = 'H', long)]
    hostname: Option<String>,

    /// Resolver port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// How long to wait for a reply, in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Seconds between probes
    #[arg(long)]
    interval_secs: Option<u64>,

    /// What to do when the socket cannot be bound to the interface
    #[arg(long, value_enum)]
    on_bind_error: Option<FailurePolicy>,

    /// What to do when the query cannot be sent
    #[arg(long, value_enum)]
    on_send_error: Option<FailurePolicy>,

    /// Probe once and exit; the exit status reflects the outcome
    #[arg(long)]
    once: bool,

    /// Where samples are reported
    #[arg(long, value_enum, default_value = "log")]
    output: Output,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            interface: self.interface.clone(),
            server: self.server.clone(),
            hostname: self.hostname.clone(),
            port: self.port,
            timeout_ms: self.timeout_ms,
            interval_secs: self.interval_secs,
            on_bind_error: self.on_bind_error,
            on_send_error: self.on_send_error,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref(), args.overrides())
        .context("failed to load configuration")?;

    logging::init_logging(&config.logging);

    let probe_config = config.validate().context("invalid probe configuration")?;
    info!(
        interface = %probe_config.interface,
        server = %probe_config.resolver_addr(),
        hostname = %probe_config.hostname,
        timeout = ?probe_config.timeout,
        "dns-rtt-probe v{}",
        env!("CARGO_PKG_VERSION")
    );

    let probe = DnsProbe::new(probe_config);
    let host = sink::local_hostname();

    match args.output {
        Output::Log => drive(Scheduler::new(probe, LogSink, host, config.interval()), args.once),
        Output::Putval => drive(
            Scheduler::new(probe, PutvalSink::stdout(), host, config.interval()),
            args.once,
        ),
    }
}

fn drive<S: MetricSink>(mut scheduler: Scheduler<S>, once: bool) -> anyhow::Result<()> {
    if once {
        scheduler.run_once().context("probe failed")?;
        return Ok(());
    }
    scheduler.run()
}
