//! 姿态管线指标收集模块
//!
//! 总线、评估器、传感源和 sink 的运行指标。

use std::collections::BTreeMap;

use contracts::{CalibrationBaseline, Channel, EventCategory, PostureResult, PostureStatus};
use metrics::{counter, gauge, histogram};

/// 记录事件发布
pub fn record_event_published(category: EventCategory) {
    counter!(
        "posture_sentinel_events_published_total",
        "category" => category.as_str()
    )
    .increment(1);
}

/// 记录事件投递到一个订阅者
pub fn record_event_delivered(category: EventCategory) {
    counter!(
        "posture_sentinel_events_delivered_total",
        "category" => category.as_str()
    )
    .increment(1);
}

/// 记录订阅者处理失败 (错误或 panic)
pub fn record_handler_failure(category: EventCategory, handler: &str) {
    counter!(
        "posture_sentinel_handler_failures_total",
        "category" => category.as_str(),
        "handler" => handler.to_string()
    )
    .increment(1);
}

/// 记录无订阅者的事件
pub fn record_event_unrouted(category: EventCategory) {
    counter!(
        "posture_sentinel_events_unrouted_total",
        "category" => category.as_str()
    )
    .increment(1);
}

/// 记录总线停止时仍在队列中的事件数
pub fn record_bus_pending(pending: usize) {
    gauge!("posture_sentinel_bus_pending_events").set(pending as f64);
}

/// 从 PostureResult 记录评估指标
///
/// 每次评估周期完成时调用。
pub fn record_evaluation(result: &PostureResult) {
    counter!(
        "posture_sentinel_evaluations_total",
        "status" => result.status.as_str()
    )
    .increment(1);

    gauge!("posture_sentinel_score").set(result.score as f64);
    gauge!("posture_sentinel_elapsed_seconds").set(result.elapsed_seconds);

    if result.alert {
        counter!("posture_sentinel_penalties_total").increment(1);
    }
    if result.cooldown_active {
        counter!("posture_sentinel_evaluations_in_cooldown_total").increment(1);
    }

    if let Some(deviation) = result.details.get("eye_ratio_deviation") {
        histogram!("posture_sentinel_eye_ratio_deviation").record(*deviation);
    }
    for key in ["foot_deviation", "cushion_deviation"] {
        if let Some(deviation) = result.details.get(key) {
            histogram!("posture_sentinel_pressure_deviation", "channel" => key).record(*deviation);
        }
    }
}

/// 记录校准结果
pub fn record_calibration(baseline: &CalibrationBaseline) {
    counter!("posture_sentinel_calibrations_total").increment(1);
    for channel in Channel::ALL {
        match baseline.channel(channel) {
            Some(value) => {
                gauge!("posture_sentinel_baseline", "channel" => channel.as_str()).set(value);
            }
            None => {
                counter!(
                    "posture_sentinel_baseline_invalid_total",
                    "channel" => channel.as_str()
                )
                .increment(1);
            }
        }
    }
}

/// 记录传感源采样
pub fn record_sample_published(source: &str, simulated: bool) {
    let origin = if simulated { "simulated" } else { "hardware" };
    counter!(
        "posture_sentinel_samples_total",
        "source" => source.to_string(),
        "origin" => origin
    )
    .increment(1);
}

/// 记录传感源读取失败
pub fn record_source_unavailable(source: &str) {
    counter!(
        "posture_sentinel_source_unavailable_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录传感源切换为模拟数据
pub fn record_source_fallback(source: &str) {
    counter!(
        "posture_sentinel_source_fallbacks_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// 记录 sink 写入
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "posture_sentinel_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 会话指标聚合器
///
/// 在内存中聚合评估结果，便于输出会话摘要。
#[derive(Debug, Clone, Default)]
pub struct SessionStatsAggregator {
    /// 评估总数
    pub total_evaluations: u64,

    /// 扣分次数
    pub penalties: u64,

    /// 冷却期内的评估次数
    pub in_cooldown: u64,

    /// 各状态计数
    pub status_counts: BTreeMap<PostureStatus, u64>,

    /// 最新分数
    pub last_score: Option<u8>,

    /// 眼距比偏差统计
    pub eye_deviation_stats: RunningStats,

    /// 脚踏压力偏差统计
    pub foot_deviation_stats: RunningStats,

    /// 坐垫压力偏差统计
    pub cushion_deviation_stats: RunningStats,
}

impl SessionStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, result: &PostureResult) {
        self.total_evaluations += 1;
        if result.alert {
            self.penalties += 1;
        }
        if result.cooldown_active {
            self.in_cooldown += 1;
        }
        *self.status_counts.entry(result.status).or_insert(0) += 1;
        self.last_score = Some(result.score);

        if let Some(v) = result.details.get("eye_ratio_deviation") {
            self.eye_deviation_stats.push(*v);
        }
        if let Some(v) = result.details.get("foot_deviation") {
            self.foot_deviation_stats.push(*v);
        }
        if let Some(v) = result.details.get("cushion_deviation") {
            self.cushion_deviation_stats.push(*v);
        }
    }

    /// 生成摘要报告
    pub fn summary(&self) -> SessionSummary {
        let good = self
            .status_counts
            .get(&PostureStatus::Good)
            .copied()
            .unwrap_or(0);
        SessionSummary {
            total_evaluations: self.total_evaluations,
            penalties: self.penalties,
            in_cooldown: self.in_cooldown,
            good_rate: if self.total_evaluations > 0 {
                good as f64 / self.total_evaluations as f64 * 100.0
            } else {
                0.0
            },
            status_counts: self.status_counts.clone(),
            last_score: self.last_score,
            eye_ratio_deviation: StatsSummary::from(&self.eye_deviation_stats),
            foot_deviation: StatsSummary::from(&self.foot_deviation_stats),
            cushion_deviation: StatsSummary::from(&self.cushion_deviation_stats),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 会话摘要
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    pub total_evaluations: u64,
    pub penalties: u64,
    pub in_cooldown: u64,
    pub good_rate: f64,
    pub status_counts: BTreeMap<PostureStatus, u64>,
    pub last_score: Option<u8>,
    pub eye_ratio_deviation: StatsSummary,
    pub foot_deviation: StatsSummary,
    pub cushion_deviation: StatsSummary,
}

impl std::fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Posture Session Summary ===")?;
        writeln!(f, "Evaluations: {}", self.total_evaluations)?;
        writeln!(f, "Good posture: {:.2}%", self.good_rate)?;
        writeln!(f, "Penalties: {}", self.penalties)?;
        writeln!(f, "Evaluations in cooldown: {}", self.in_cooldown)?;
        match self.last_score {
            Some(score) => writeln!(f, "Final score: {score}")?,
            None => writeln!(f, "Final score: N/A")?,
        }
        writeln!(f, "Eye ratio deviation: {}", self.eye_ratio_deviation)?;
        writeln!(f, "Foot deviation: {}", self.foot_deviation)?;
        writeln!(f, "Cushion deviation: {}", self.cushion_deviation)?;

        if !self.status_counts.is_empty() {
            writeln!(f, "Status counts:")?;
            for (status, count) in &self.status_counts {
                writeln!(f, "  {}: {}", status, count)?;
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
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
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

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn result(status: PostureStatus, score: u8, alert: bool) -> PostureResult {
        PostureResult {
            timestamp: Utc::now(),
            status,
            score,
            elapsed_seconds: 1.0,
            details: BTreeMap::from([("foot_deviation".to_string(), 300.0)]),
            alert,
            cooldown_active: false,
        }
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = SessionStatsAggregator::new();
        aggregator.update(&result(PostureStatus::Good, 10, false));
        aggregator.update(&result(PostureStatus::BadFoot, 9, true));

        assert_eq!(aggregator.total_evaluations, 2);
        assert_eq!(aggregator.penalties, 1);
        assert_eq!(aggregator.last_score, Some(9));
        assert_eq!(aggregator.status_counts.get(&PostureStatus::BadFoot), Some(&1));
        assert_eq!(aggregator.foot_deviation_stats.count(), 2);

        let summary = aggregator.summary();
        assert!((summary.good_rate - 50.0).abs() < 1e-10);
    }

    #[test]
    fn test_status_counts_are_ordered() {
        let mut aggregator = SessionStatsAggregator::new();
        for status in [
            PostureStatus::Unknown,
            PostureStatus::BadCushion,
            PostureStatus::Good,
            PostureStatus::BadEyes,
            PostureStatus::BadCushion,
        ] {
            aggregator.update(&result(status, 10, false));
        }

        let counts: Vec<_> = aggregator.summary().status_counts.into_iter().collect();
        assert_eq!(
            counts,
            vec![
                (PostureStatus::Good, 1),
                (PostureStatus::BadEyes, 1),
                (PostureStatus::BadCushion, 2),
                (PostureStatus::Unknown, 1),
            ]
        );
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = SessionStatsAggregator::new();
        aggregator.update(&result(PostureStatus::BadFoot, 9, true));

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Evaluations: 1"));
        assert!(output.contains("Final score: 9"));
        assert!(output.contains("bad_foot: 1"));
    }
}
