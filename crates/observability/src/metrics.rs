//! 批处理分发指标收集模块
//!
//! 记录分片生命周期、批次 flush 与 worker 池等待的运行指标。
//! 未安装 recorder 时，所有记录调用都是空操作。

use metrics::{counter, gauge, histogram};

/// 记录分片创建
///
/// `active` 为创建后注册表中的分片数。
pub fn record_shard_created(active: usize) {
    counter!("shardbatch_shards_created_total").increment(1);
    gauge!("shardbatch_shards_active").set(active as f64);
}

/// 记录当前活跃分片数
///
/// 分发器关闭时随分片逐个停止而下调。
pub fn record_shards_active(active: usize) {
    gauge!("shardbatch_shards_active").set(active as f64);
}

/// 记录分片创建竞争失败（被丢弃的候选分片）
pub fn record_shard_race_lost() {
    counter!("shardbatch_shard_races_lost_total").increment(1);
}

/// 记录一次批次发送
///
/// `reason` 为触发 flush 的原因 (min_size / max_size / timeout / shutdown)，
/// `size` 以 sizer 单位计。
pub fn record_batch_flushed(reason: &'static str, size: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "shardbatch_batches_flushed_total",
        "reason" => reason,
        "status" => status
    )
    .increment(1);
    histogram!("shardbatch_batch_size", "reason" => reason).record(size as f64);
}

/// 记录下游发送耗时
pub fn record_send_latency_ms(latency_ms: f64) {
    histogram!("shardbatch_send_latency_ms").record(latency_ms);
}

/// 记录 flush 等待 worker 许可的时间
pub fn record_worker_permit_wait_ms(wait_ms: f64) {
    histogram!("shardbatch_worker_permit_wait_ms").record(wait_ms);
}

/// 批次发送聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct FlushStatsAggregator {
    /// 发送批次数
    pub total_batches: u64,

    /// 发送失败批次数
    pub failed_batches: u64,

    /// 发送条目总数
    pub total_items: u64,

    /// 批次大小统计
    pub batch_size_stats: RunningStats,

    /// 发送耗时统计 (毫秒)
    pub latency_stats: RunningStats,
}

impl FlushStatsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, items: usize, latency_ms: f64, success: bool) {
        self.total_batches += 1;
        if success {
            self.total_items += items as u64;
        } else {
            self.failed_batches += 1;
        }
        self.batch_size_stats.push(items as f64);
        self.latency_stats.push(latency_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> FlushSummary {
        FlushSummary {
            total_batches: self.total_batches,
            failed_batches: self.failed_batches,
            total_items: self.total_items,
            failure_rate: if self.total_batches > 0 {
                self.failed_batches as f64 / self.total_batches as f64 * 100.0
            } else {
                0.0
            },
            batch_size: StatsSummary::from(&self.batch_size_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct FlushSummary {
    pub total_batches: u64,
    pub failed_batches: u64,
    pub total_items: u64,
    pub failure_rate: f64,
    pub batch_size: StatsSummary,
    pub latency_ms: StatsSummary,
}

impl std::fmt::Display for FlushSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Flush Summary ===")?;
        writeln!(f, "Batches: {}", self.total_batches)?;
        writeln!(
            f,
            "Failed batches: {} ({:.2}%)",
            self.failed_batches, self.failure_rate
        )?;
        writeln!(f, "Items delivered: {}", self.total_items)?;
        writeln!(f, "Batch size: {}", self.batch_size)?;
        writeln!(f, "Send latency (ms): {}", self.latency_ms)?;
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
