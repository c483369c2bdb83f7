use std::fmt::Write as _;
use std::io::{self, Write};
use std::time::Duration;

use super::{ProbeResult, Target};

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningStats {
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub sum: Duration,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one attempt into the counters.
    pub fn record(&mut self, result: &ProbeResult) {
        self.total += 1;
        if result.connected {
            self.successful += 1;
            self.sum += result.duration;
            self.min = Some(self.min.map_or(result.duration, |m| m.min(result.duration)));
            self.max = Some(self.max.map_or(result.duration, |m| m.max(result.duration)));
        }
        if result.error.as_ref().is_some_and(|e| !e.is_cancelled()) {
            self.failed += 1;
        }
    }

    /// Mean over successful attempts only.
    pub fn average(&self) -> Option<Duration> {
        if self.successful == 0 {
            return None;
        }
        Some(self.sum / self.successful)
    }

    /// Final summary block for `target`.
    pub fn summary(&self, target: &Target) -> String {
        let mut out = String::new();
        let _ = writeln!(out);
        let _ = writeln!(out, "Ping statistics {target}");
        let _ = writeln!(out, "    {} probes sent.", self.total);
        let _ = writeln!(out, "    {} successful, {} failed.", self.successful, self.failed);
        let _ = writeln!(out, "Approximate trip times:");
        match (self.min, self.max, self.average()) {
            (Some(min), Some(max), Some(avg)) => {
                let _ = writeln!(
                    out,
                    "    Minimum = {min:?}, Maximum = {max:?}, Average = {avg:?}"
                );
            }
            _ => {
                let _ = writeln!(out, "    No probes completed successfully.");
            }
        }
        out
    }
}

/// Renders the line printed for every attempt, plus the optional extra block.
pub fn format_line(target: &Target, result: &ProbeResult) -> String {
    let status = if result.connected { "connected" } else { "Failed" };
    let reason = result
        .error
        .as_ref()
        .map(|e| format!("({})", e.reason()))
        .unwrap_or_default();

    let mut line = format!(
        "Ping {target}({}) {status}{reason} - time={:?} dns={:?}",
        result.address, result.duration, result.dns_duration
    );
    if !result.meta.is_empty() {
        line.push(' ');
        line.push_str(&result.format_meta());
    }
    line.push('\n');

    if let Some(extra) = &result.extra {
        let extra = extra.to_string();
        let extra = extra.trim();
        if !extra.is_empty() {
            line.push(' ');
            line.push_str(extra);
            line.push('\n');
        }
    }
    line
}

/// Consumes results one at a time, keeping stats and writing lines to `out`.
pub struct Aggregator<W> {
    target: Target,
    out: W,
    stats: RunningStats,
}

impl<W: Write> Aggregator<W> {
    pub fn new(target: Target, out: W) -> Self {
        Self {
            target,
            out,
            stats: RunningStats::new(),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    /// Takes ownership of `result`, updates the stats and writes its line.
    pub fn consume(&mut self, result: ProbeResult) -> io::Result<()> {
        self.stats.record(&result);
        self.out
            .write_all(format_line(&self.target, &result).as_bytes())?;
        self.out.flush()
    }

    pub fn summarize(&mut self) -> io::Result<()> {
        self.out
            .write_all(self.stats.summary(&self.target).as_bytes())?;
        self.out.flush()
    }

    pub fn report_error(&mut self, err: &dyn std::error::Error) -> io::Result<()> {
        writeln!(self.out, "Pinger runtime error: {err}")
    }
}
