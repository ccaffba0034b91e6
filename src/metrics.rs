//! Request counters, throughput accumulators and the text exposition format.
//!
//! Throughput is accumulated as a running sum of per-request instantaneous
//! rates (`1 / elapsed`, optionally weighted by core count). The exported
//! `rps` values are that sum divided by the total request count, i.e. the mean
//! instantaneous rate since process start. They are not a sliding-window
//! requests-per-second gauge.

use axum::http::Method;
use std::fmt::{Display, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::system::{ConnectionState, LoadAverage, MemoryUsage, ResourceSampler, ResourceSnapshot};

/// Metric name prefix used in the exposition output
pub const METRIC_PREFIX: &str = "anonkv";

/// Lower bound on elapsed time so a zero-duration request cannot add infinity
const MIN_ELAPSED_SECS: f64 = 1e-9;

#[derive(Debug, Default, Clone, Copy)]
struct Throughput {
    rps: f64,
    rps_physical: f64,
    rps_logical: f64,
}

/// Process-lifetime request metrics
#[derive(Debug)]
pub struct MetricsCollector {
    started: Instant,
    physical_cores: usize,
    logical_cores: usize,
    get_requests: AtomicU64,
    post_requests: AtomicU64,
    throughput: Mutex<Throughput>,
}

/// Immutable point-in-time view of counters and resource usage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub cpu: Vec<f64>,
    pub connections: Vec<ConnectionState>,
    pub load: LoadAverage,
    pub virtual_memory: MemoryUsage,
    pub swap: MemoryUsage,
    pub open_files: u64,
    pub threads: u64,
    /// Seconds since the collector was created
    pub uptime: f64,
    pub get_requests: u64,
    pub post_requests: u64,
    pub rps: f64,
    pub rps_physical: f64,
    pub rps_logical: f64,
}

impl MetricsCollector {
    pub fn new(physical_cores: usize, logical_cores: usize) -> Self {
        Self {
            started: Instant::now(),
            physical_cores,
            logical_cores,
            get_requests: AtomicU64::new(0),
            post_requests: AtomicU64::new(0),
            throughput: Mutex::new(Throughput::default()),
        }
    }

    /// Record one dispatched request. Only GET and POST are counted.
    pub fn record_request(&self, method: &Method, elapsed: Duration) {
        let counter = if method == Method::GET {
            &self.get_requests
        } else if method == Method::POST {
            &self.post_requests
        } else {
            return;
        };

        let secs = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
        let mut throughput = self
            .throughput
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        counter.fetch_add(1, Ordering::Relaxed);
        throughput.rps += 1.0 / secs;
        throughput.rps_physical += self.physical_cores as f64 / secs;
        throughput.rps_logical += self.logical_cores as f64 / secs;
    }

    pub fn get_requests(&self) -> u64 {
        self.get_requests.load(Ordering::Relaxed)
    }

    pub fn post_requests(&self) -> u64 {
        self.post_requests.load(Ordering::Relaxed)
    }

    /// Sample resources and combine them with the current counters
    pub fn snapshot(&self, sampler: &dyn ResourceSampler) -> Metrics {
        self.combine(sampler.sample())
    }

    /// Combine a resource sample with the current counters
    pub fn combine(&self, resources: ResourceSnapshot) -> Metrics {
        let (get_requests, post_requests, throughput) = {
            let throughput = self
                .throughput
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (self.get_requests(), self.post_requests(), *throughput)
        };

        let total = get_requests + post_requests;
        let mean = |sum: f64| if total > 0 { sum / total as f64 } else { 0.0 };

        Metrics {
            cpu: resources.cpu,
            connections: resources.connections,
            load: resources.load,
            virtual_memory: resources.virtual_memory,
            swap: resources.swap,
            open_files: resources.open_files,
            threads: resources.threads,
            uptime: self.started.elapsed().as_secs_f64(),
            get_requests,
            post_requests,
            rps: mean(throughput.rps),
            rps_physical: mean(throughput.rps_physical),
            rps_logical: mean(throughput.rps_logical),
        }
    }
}

fn write_metric(out: &mut String, name: &str, help: &str, kind: &str, value: impl Display) {
    let _ = writeln!(out, "# HELP {METRIC_PREFIX}_{name} {help}");
    let _ = writeln!(out, "# TYPE {METRIC_PREFIX}_{name} {kind}");
    let _ = writeln!(out, "{METRIC_PREFIX}_{name} {value}");
}

/// Render metrics in the text exposition format.
///
/// Emission order is fixed, so identical input always renders identically.
pub fn render_text(metrics: &Metrics) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# HELP {METRIC_PREFIX}_cpu percentage of cpu used per CPU");
    let _ = writeln!(out, "# TYPE {METRIC_PREFIX}_cpu gauge");
    for (core, usage) in metrics.cpu.iter().enumerate() {
        let _ = writeln!(out, "{METRIC_PREFIX}_cpu{{core=\"{core}\"}} {usage}");
    }

    let established = metrics
        .connections
        .iter()
        .filter(|state| **state == ConnectionState::Established)
        .count();
    let listening = metrics
        .connections
        .iter()
        .filter(|state| **state == ConnectionState::Listen)
        .count();
    write_metric(
        &mut out,
        "total_connections",
        "reports total number of connections",
        "gauge",
        metrics.connections.len(),
    );
    write_metric(
        &mut out,
        "established_connections",
        "reports number of established connections",
        "gauge",
        established,
    );
    write_metric(
        &mut out,
        "listen_connections",
        "reports number of listening sockets",
        "gauge",
        listening,
    );

    write_metric(&mut out, "load1", "reports one-minute load average", "gauge", metrics.load.one);
    write_metric(&mut out, "load5", "reports five-minute load average", "gauge", metrics.load.five);
    write_metric(
        &mut out,
        "load15",
        "reports fifteen-minute load average",
        "gauge",
        metrics.load.fifteen,
    );

    let memory = [("virt", "virtual", &metrics.virtual_memory), ("swap", "swap", &metrics.swap)];
    for (short, long, usage) in memory {
        write_metric(
            &mut out,
            &format!("mem_{short}_total"),
            &format!("reports total {long} memory in bytes"),
            "gauge",
            usage.total,
        );
        write_metric(
            &mut out,
            &format!("mem_{short}_free"),
            &format!("reports free {long} memory in bytes"),
            "gauge",
            usage.free,
        );
        write_metric(
            &mut out,
            &format!("mem_{short}_used"),
            &format!("reports used {long} memory in bytes"),
            "gauge",
            usage.used,
        );
        write_metric(
            &mut out,
            &format!("mem_{short}_pct"),
            &format!("reports percentage of {long} memory used"),
            "gauge",
            usage.used_percent,
        );
    }

    write_metric(
        &mut out,
        "open_files",
        "reports total number of open file descriptors",
        "gauge",
        metrics.open_files,
    );
    write_metric(
        &mut out,
        "threads",
        "reports total number of process threads",
        "gauge",
        metrics.threads,
    );
    write_metric(
        &mut out,
        "uptime",
        "reports server uptime in seconds",
        "counter",
        metrics.uptime,
    );
    write_metric(
        &mut out,
        "get_requests",
        "reports total number of HTTP GET requests",
        "counter",
        metrics.get_requests,
    );
    write_metric(
        &mut out,
        "post_requests",
        "reports total number of HTTP POST requests",
        "counter",
        metrics.post_requests,
    );
    write_metric(
        &mut out,
        "rps",
        "reports mean per-request throughput since start",
        "gauge",
        metrics.rps,
    );
    write_metric(
        &mut out,
        "rps_physical_cpu",
        "reports mean per-request throughput weighted by physical CPU cores",
        "gauge",
        metrics.rps_physical,
    );
    write_metric(
        &mut out,
        "rps_logical_cpu",
        "reports mean per-request throughput weighted by logical CPU cores",
        "gauge",
        metrics.rps_logical,
    );

    out
}
