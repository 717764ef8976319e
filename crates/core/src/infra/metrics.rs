use serde::Serialize;
use std::sync::Mutex;

/// 保持するレイテンシ記録の上限
const MAX_LATENCY_RECORDS: usize = 1000;

/// ローカルメトリクス収集器
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    jobs_started: u64,
    jobs_completed: u64,
    jobs_failed: u64,
    jobs_canceled: u64,
    poll_transient_errors: u64,
    failures_upload: u64,
    failures_notify: u64,
    failures_poll: u64,
    failures_other: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub phase: String,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー（UIに返す用）
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub jobs_started: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_canceled: u64,
    pub poll_transient_errors: u64,
    pub failure_counts: FailureCounts,
    pub avg_latency_ms: AvgLatency,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureCounts {
    pub upload: u64,
    pub notify: u64,
    pub poll: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvgLatency {
    pub upload: Option<f64>,
    pub notify: Option<f64>,
    pub processing: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    fn with_counters(&self, f: impl FnOnce(&mut MetricsCounters)) {
        // ロックが汚染されていても集計は続ける
        let mut c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut c);
    }

    pub fn inc_jobs_started(&self) {
        self.with_counters(|c| c.jobs_started += 1);
    }

    pub fn inc_jobs_completed(&self) {
        self.with_counters(|c| c.jobs_completed += 1);
    }

    pub fn inc_jobs_canceled(&self) {
        self.with_counters(|c| c.jobs_canceled += 1);
    }

    pub fn inc_poll_transient_errors(&self) {
        self.with_counters(|c| c.poll_transient_errors += 1);
    }

    /// 失敗したジョブをフェーズ別に数える
    pub fn inc_job_failed(&self, phase: &str) {
        self.with_counters(|c| {
            c.jobs_failed += 1;
            match phase {
                "upload" => c.failures_upload += 1,
                "notify" => c.failures_notify += 1,
                "poll" => c.failures_poll += 1,
                _ => c.failures_other += 1,
            }
        });
    }

    pub fn record_latency(&self, phase: &str, duration_ms: u64) {
        let record = LatencyRecord {
            phase: phase.to_string(),
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());
        latencies.push(record);
        if latencies.len() > MAX_LATENCY_RECORDS {
            let excess = latencies.len() - MAX_LATENCY_RECORDS;
            latencies.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let latencies = self.latencies.lock().unwrap_or_else(|e| e.into_inner());

        let avg = |phase: &str| -> Option<f64> {
            let vals: Vec<f64> = latencies
                .iter()
                .filter(|r| r.phase == phase)
                .map(|r| r.duration_ms as f64)
                .collect();
            if vals.is_empty() {
                None
            } else {
                Some(vals.iter().sum::<f64>() / vals.len() as f64)
            }
        };

        let recent: Vec<LatencyRecord> = latencies.iter().rev().take(20).cloned().collect();

        MetricsSummary {
            jobs_started: c.jobs_started,
            jobs_completed: c.jobs_completed,
            jobs_failed: c.jobs_failed,
            jobs_canceled: c.jobs_canceled,
            poll_transient_errors: c.poll_transient_errors,
            failure_counts: FailureCounts {
                upload: c.failures_upload,
                notify: c.failures_notify,
                poll: c.failures_poll,
                other: c.failures_other,
            },
            avg_latency_ms: AvgLatency {
                upload: avg("upload"),
                notify: avg("notify"),
                processing: avg("processing"),
            },
            recent_latencies: recent,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
