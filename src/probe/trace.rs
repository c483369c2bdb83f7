use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Lifecycle points of one HTTP attempt, in the order they normally fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    DnsStart,
    DnsDone,
    ConnectStart,
    ConnectDone,
    TlsStart,
    TlsDone,
    WroteRequest,
    FirstResponseByte,
}

const CHECKPOINTS: usize = 8;

/// Timestamps of one attempt. Phase durations are derived on read.
#[derive(Debug, Clone)]
pub struct Trace {
    start: Instant,
    marks: [Option<Instant>; CHECKPOINTS],
    body: Duration,
    address: String,
}

impl Trace {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            marks: [None; CHECKPOINTS],
            body: Duration::ZERO,
            address: String::new(),
        }
    }

    /// Records `checkpoint` now. A checkpoint that fires twice keeps the
    /// latest time.
    pub fn mark(&mut self, checkpoint: Checkpoint) {
        self.mark_at(checkpoint, Instant::now());
    }

    pub fn mark_at(&mut self, checkpoint: Checkpoint, at: Instant) {
        self.marks[checkpoint as usize] = Some(at);
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    pub fn set_body_duration(&mut self, body: Duration) {
        self.body = body;
    }

    fn at(&self, checkpoint: Checkpoint) -> Option<Instant> {
        self.marks[checkpoint as usize]
    }

    fn between(&self, from: Checkpoint, to: Checkpoint) -> Duration {
        match (self.at(from), self.at(to)) {
            (Some(from), Some(to)) => to.saturating_duration_since(from),
            _ => Duration::ZERO,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn tls_attempted(&self) -> bool {
        self.at(Checkpoint::TlsStart).is_some()
    }

    pub fn dns(&self) -> Duration {
        self.between(Checkpoint::DnsStart, Checkpoint::DnsDone)
    }

    pub fn connect(&self) -> Duration {
        self.between(Checkpoint::ConnectStart, Checkpoint::ConnectDone)
    }

    pub fn tls(&self) -> Duration {
        self.between(Checkpoint::TlsStart, Checkpoint::TlsDone)
    }

    /// Time spent writing the request: elapsed time up to the write minus the
    /// earlier phases. Clamped at zero when checkpoints fired out of order.
    pub fn request(&self) -> Duration {
        match self.at(Checkpoint::WroteRequest) {
            Some(wrote) => wrote
                .saturating_duration_since(self.start)
                .saturating_sub(self.dns())
                .saturating_sub(self.connect())
                .saturating_sub(self.tls()),
            None => Duration::ZERO,
        }
    }

    pub fn wait_response(&self) -> Duration {
        self.between(Checkpoint::WroteRequest, Checkpoint::FirstResponseByte)
    }

    pub fn body(&self) -> Duration {
        self.body
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut phases = Vec::with_capacity(5);
        if self.at(Checkpoint::ConnectStart).is_some() {
            phases.push(format!("connect={:?}", self.connect()));
        }
        if self.tls_attempted() {
            phases.push(format!("tls={:?}", self.tls()));
        }
        if self.at(Checkpoint::WroteRequest).is_some() {
            phases.push(format!("request={:?}", self.request()));
        }
        if self.at(Checkpoint::FirstResponseByte).is_some() {
            phases.push(format!("wait_response={:?}", self.wait_response()));
        }
        if !self.body.is_zero() {
            phases.push(format!("response_body={:?}", self.body));
        }
        f.write_str(&phases.join(" "))
    }
}

/// Shared handle to a [`Trace`], handed to the I/O layer of an attempt.
#[derive(Debug, Clone, Default)]
pub struct TraceHandle(Arc<Mutex<Trace>>);

impl TraceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, checkpoint: Checkpoint) {
        self.with(|trace| trace.mark(checkpoint));
    }

    /// Marks `checkpoint` only if it has not fired yet.
    pub fn mark_once(&self, checkpoint: Checkpoint) {
        self.with(|trace| {
            if trace.at(checkpoint).is_none() {
                trace.mark(checkpoint);
            }
        });
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut Trace) -> T) -> T {
        let mut trace = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut trace)
    }

    pub fn snapshot(&self) -> Trace {
        self.with(|trace| trace.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn full_trace(tls: bool) -> Trace {
        let t0 = Instant::now();
        let mut trace = Trace::starting_at(t0);
        trace.mark_at(Checkpoint::DnsStart, t0);
        trace.mark_at(Checkpoint::DnsDone, t0 + ms(10));
        trace.mark_at(Checkpoint::ConnectStart, t0 + ms(10));
        trace.mark_at(Checkpoint::ConnectDone, t0 + ms(30));
        let mut next = t0 + ms(30);
        if tls {
            trace.mark_at(Checkpoint::TlsStart, next);
            next += ms(40);
            trace.mark_at(Checkpoint::TlsDone, next);
        }
        trace.mark_at(Checkpoint::WroteRequest, next + ms(5));
        trace.mark_at(Checkpoint::FirstResponseByte, next + ms(55));
        trace.set_body_duration(ms(7));
        trace
    }

    #[test]
    fn phases_do_not_overlap() {
        let trace = full_trace(true);
        assert_eq!(trace.dns(), ms(10));
        assert_eq!(trace.connect(), ms(20));
        assert_eq!(trace.tls(), ms(40));
        assert_eq!(trace.request(), ms(5));
        assert_eq!(trace.wait_response(), ms(50));
        assert_eq!(
            trace.to_string(),
            "connect=20ms tls=40ms request=5ms wait_response=50ms response_body=7ms"
        );
    }

    #[test]
    fn tls_phase_omitted_without_handshake() {
        let trace = full_trace(false);
        assert!(!trace.tls_attempted());
        assert_eq!(trace.tls(), Duration::ZERO);
        assert_eq!(
            trace.to_string(),
            "connect=20ms request=5ms wait_response=50ms response_body=7ms"
        );
    }

    #[test]
    fn missing_start_marker_leaves_phase_zero() {
        let t0 = Instant::now();
        let mut trace = Trace::starting_at(t0);
        trace.mark_at(Checkpoint::DnsDone, t0 + ms(3));
        assert_eq!(trace.dns(), Duration::ZERO);
        assert_eq!(trace.to_string(), "");
    }

    #[test]
    fn request_phase_clamps_at_zero() {
        let t0 = Instant::now();
        let mut trace = Trace::starting_at(t0);
        // A late second DNS round makes the accumulated phases exceed the
        // elapsed time at write.
        trace.mark_at(Checkpoint::DnsStart, t0 + ms(20));
        trace.mark_at(Checkpoint::DnsDone, t0 + ms(60));
        trace.mark_at(Checkpoint::WroteRequest, t0 + ms(25));
        assert_eq!(trace.request(), Duration::ZERO);
    }

    #[test]
    fn handle_mark_once_keeps_first() {
        let handle = TraceHandle::new();
        handle.mark_once(Checkpoint::FirstResponseByte);
        let first = handle.with(|t| t.at(Checkpoint::FirstResponseByte));
        std::thread::sleep(ms(2));
        handle.mark_once(Checkpoint::FirstResponseByte);
        assert_eq!(handle.with(|t| t.at(Checkpoint::FirstResponseByte)), first);
    }
}
