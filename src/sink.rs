//! Where round-trip samples go once a probe succeeds.

use std::io::{self, Write};
use std::time::Duration;

use tracing::{info, warn};

pub const PLUGIN_NAME: &str = "dns_request";
pub const RTT_TYPE: &str = "dns_rtt";

/// One gauge value, identified the way collectd identifies a value list:
/// `host/plugin/type`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    pub host: String,
    pub plugin: &'static str,
    pub type_name: &'static str,
    pub value: f64,
    pub interval: Duration,
}

impl GaugeSample {
    /// DNS round-trip time in seconds.
    pub fn rtt(host: &str, seconds: f64, interval: Duration) -> Self {
        GaugeSample {
            host: host.to_string(),
            plugin: PLUGIN_NAME,
            type_name: RTT_TYPE,
            value: seconds,
            interval,
        }
    }

    pub fn identifier(&self) -> String {
        format!("{}/{}/{}", self.host, self.plugin, self.type_name)
    }
}

/// Receiver of successful samples. Failures never reach a sink.
pub trait MetricSink {
    fn submit(&mut self, sample: &GaugeSample);
}

/// Emits each sample as a structured log event.
pub struct LogSink;

impl MetricSink for LogSink {
    fn submit(&mut self, sample: &GaugeSample) {
        info!(
            metric = %sample.identifier(),
            value = sample.value,
            "dns round-trip time"
        );
    }
}

/// Writes samples in the collectd exec-plugin text protocol:
/// `PUTVAL "host/dns_request/dns_rtt" interval=10 N:0.012`
pub struct PutvalSink<W: Write> {
    out: W,
}

impl PutvalSink<io::Stdout> {
    pub fn stdout() -> Self {
        PutvalSink { out: io::stdout() }
    }
}

impl<W: Write> PutvalSink<W> {
    #[cfg(test)]
    pub fn new(out: W) -> Self {
        PutvalSink { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_sample(&mut self, sample: &GaugeSample) -> io::Result<()> {
        writeln!(
            self.out,
            "PUTVAL \"{}\" interval={} N:{}",
            sample.identifier(),
            sample.interval.as_secs_f64(),
            sample.value
        )?;
        self.out.flush()
    }
}

impl<W: Write> MetricSink for PutvalSink<W> {
    fn submit(&mut self, sample: &GaugeSample) {
        if let Err(e) = self.write_sample(sample) {
            warn!(metric = %sample.identifier(), error = %e, "failed to write PUTVAL line");
        }
    }
}

/// Keeps every sample in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub samples: Vec<GaugeSample>,
}

#[cfg(test)]
impl MetricSink for MemorySink {
    fn submit(&mut self, sample: &GaugeSample) {
        self.samples.push(sample.clone());
    }
}

/// Host name reported with every sample.
pub fn local_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!(error = %e, "could not read local host name, using localhost");
            "localhost".to_string()
        }
    }
}
