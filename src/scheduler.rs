use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::probe::{DnsProbe, ProbeResult};
use crate::sink::{GaugeSample, MetricSink};

/// Runs the probe once per interval and hands successful samples to the sink.
pub struct Scheduler<S: MetricSink> {
    probe: DnsProbe,
    sink: S,
    host: String,
    interval: Duration,
}

impl<S: MetricSink> Scheduler<S> {
    pub fn new(probe: DnsProbe, sink: S, host: String, interval: Duration) -> Self {
        Self {
            probe,
            sink,
            host,
            interval,
        }
    }

    /// One probe. A failure is logged and produces no sample.
    pub fn run_once(&mut self) -> ProbeResult {
        let result = self.probe.run();
        match &result {
            Ok(round_trip) => {
                debug!(
                    answers = round_trip.answer_count,
                    bytes = round_trip.reply_len,
                    "reply received"
                );
                let sample = GaugeSample::rtt(&self.host, round_trip.seconds(), self.interval);
                self.sink.submit(&sample);
            }
            Err(e) => {
                warn!(
                    hostname = %self.probe.config().hostname,
                    server = %self.probe.config().resolver_addr(),
                    reason = e.reason(),
                    error = %e,
                    "probe failed, no sample this interval"
                );
            }
        }
        result
    }

    /// Probe forever, one invocation per interval.
    pub fn run(&mut self) -> ! {
        info!(interval = ?self.interval, "starting probe loop");
        loop {
            let started = Instant::now();
            let _ = self.run_once();
            let pause = pause_after(self.interval, started.elapsed());
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }
}

/// Time left in the current interval after a probe that took `spent`.
/// A probe that overruns its interval is followed immediately by the next one.
fn pause_after(interval: Duration, spent: Duration) -> Duration {
    interval.saturating_sub(spent)
}
