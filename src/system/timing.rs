use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// 初始化各阶段的计时
pub struct PhaseTimer {
    start_time: Instant,
    phase_start_times: HashMap<String, Instant>,
    phase_durations: BTreeMap<String, Duration>,
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTimer {
    pub const DOCUMENTS: &'static str = "documents";
    pub const SCHEMA: &'static str = "schema";
    pub const QUERY_PROCESSOR: &'static str = "query_processor";
    pub const QA: &'static str = "qa";

    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: HashMap::new(),
            phase_durations: BTreeMap::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .insert(phase_name.to_string(), Instant::now());
    }

    /// 结束一个阶段的计时，未开始的阶段返回None
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let start_time = self.phase_start_times.remove(phase_name)?;
        let duration = start_time.elapsed();
        self.phase_durations
            .insert(phase_name.to_string(), duration);
        tracing::debug!(
            phase = phase_name,
            secs = duration.as_secs_f64(),
            "phase finished"
        );
        Some(duration)
    }

    pub fn total(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 已结束阶段的耗时（秒）
    pub fn phase_secs(&self) -> BTreeMap<String, f64> {
        self.phase_durations
            .iter()
            .map(|(phase, duration)| (phase.clone(), duration.as_secs_f64()))
            .collect()
    }
}
