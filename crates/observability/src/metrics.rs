//! 传输与分发指标模块
//!
//! 基于 `metrics` crate 记录分片收发、重组与分发的运行指标，
//! 并提供内存中的接收统计聚合器。

use std::collections::HashMap;

use contracts::{LogEvent, LogLevel};
use metrics::{counter, gauge};

/// 记录发送的分片数
pub fn record_fragments_sent(sender: &str, fragments: usize) {
    counter!(
        "logpipe_fragments_sent_total",
        "sender" => sender.to_string()
    )
    .increment(fragments as u64);
}

/// 记录收到的分片
pub fn record_fragment_received() {
    counter!("logpipe_fragments_received_total").increment(1);
}

/// 记录被丢弃的畸形分片
pub fn record_fragment_malformed() {
    counter!("logpipe_fragments_malformed_total").increment(1);
}

/// 记录重复分片 (覆盖写入)
pub fn record_fragment_duplicate() {
    counter!("logpipe_fragments_duplicate_total").increment(1);
}

/// 记录重组完成的消息
pub fn record_message_restored() {
    counter!("logpipe_messages_restored_total").increment(1);
}

/// 记录未完成的重组缓冲数量
pub fn record_reassembly_pending(pending: usize) {
    gauge!("logpipe_reassembly_pending").set(pending as f64);
}

/// 记录被淘汰的重组缓冲
pub fn record_reassembly_evicted(evicted: usize) {
    counter!("logpipe_reassembly_evicted_total").increment(evicted as u64);
}

/// 记录消费回调失败
pub fn record_callback_failure() {
    counter!("logpipe_callback_failures_total").increment(1);
}

/// 记录事件分发
pub fn record_event_dispatched(channel: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "logpipe_events_dispatched_total",
        "channel" => channel.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录配置切换
pub fn record_reconfiguration(channels: usize) {
    counter!("logpipe_reconfigurations_total").increment(1);
    gauge!("logpipe_channels_active").set(channels as f64);
}

/// 接收统计聚合器
///
/// 在内存中聚合收到的事件，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ReceiveStatsAggregator {
    /// 事件总数
    pub total_events: u64,

    /// 严重错误总数
    pub total_critical: u64,

    /// 载荷大小统计 (字节)
    pub payload_stats: RunningStats,

    /// 各 monitor 事件数
    pub monitor_counts: HashMap<String, u64>,

    /// 各级别事件数
    pub level_counts: HashMap<LogLevel, u64>,
}

impl ReceiveStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, event: &LogEvent) {
        self.total_events += 1;
        self.payload_stats.push(event.payload.len() as f64);
        *self
            .monitor_counts
            .entry(event.monitor_id.clone())
            .or_insert(0) += 1;
        *self.level_counts.entry(event.level).or_insert(0) += 1;
    }

    /// 记录一次严重错误
    pub fn record_critical(&mut self) {
        self.total_critical += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_events: self.total_events,
            total_critical: self.total_critical,
            payload_bytes: StatsSummary::from(&self.payload_stats),
            monitor_counts: self.monitor_counts.clone(),
            level_counts: self.level_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_events: u64,
    pub total_critical: u64,
    pub payload_bytes: StatsSummary,
    pub monitor_counts: HashMap<String, u64>,
    pub level_counts: HashMap<LogLevel, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Receive Summary ===")?;
        writeln!(f, "Events: {}", self.total_events)?;
        writeln!(f, "Critical errors: {}", self.total_critical)?;
        writeln!(f, "Payload size (bytes): {}", self.payload_bytes)?;

        if !self.level_counts.is_empty() {
            writeln!(f, "By level:")?;
            for level in LogLevel::ALL {
                if let Some(count) = self.level_counts.get(&level) {
                    writeln!(f, "  {}: {}", level, count)?;
                }
            }
        }

        if !self.monitor_counts.is_empty() {
            writeln!(f, "By monitor:")?;
            let mut monitors: Vec<_> = self.monitor_counts.iter().collect();
            monitors.sort();
            for (monitor, count) in monitors {
                writeln!(f, "  {}: {}", monitor, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
