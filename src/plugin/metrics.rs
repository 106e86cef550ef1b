use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::time::{Duration, Instant};
use sysinfo::System;
use thiserror::Error;
use tokio::task::{spawn_blocking, JoinError};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

// 进程启动时间，main 中尽早初始化
pub static PROCESS_STARTED: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Debug, Clone, PartialEq)]
pub struct CpuInfo {
    pub brand: String,
    pub physical_cores: usize,
    pub threads: usize,
}

// 内存信息，单位为字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemInfo {
    pub total: u64,
    pub used: u64,
}

#[derive(Debug, Error)]
pub enum MetricFetchError {
    #[error("cpu query failed: {0}")]
    Cpu(String),
    #[error("memory query failed: {0}")]
    Memory(String),
    #[error("load query failed: {0}")]
    Load(String),
    #[error("metric task aborted: {0}")]
    Join(#[from] JoinError),
    #[error("metric fetch timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Source of the three independent host metrics.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn cpu(&self) -> Result<CpuInfo, MetricFetchError>;

    async fn mem(&self) -> Result<MemInfo, MetricFetchError>;

    // 当前 CPU 总负载百分比
    async fn current_load(&self) -> Result<f64, MetricFetchError>;

    fn process_uptime(&self) -> Duration;
}

// 基于 sysinfo 与 num_cpus 的实现，阻塞调用放到 blocking 线程池中执行
#[derive(Debug, Clone, Copy, Default)]
pub struct SysinfoProvider;

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    async fn cpu(&self) -> Result<CpuInfo, MetricFetchError> {
        spawn_blocking(|| -> Result<CpuInfo, MetricFetchError> {
            let mut sys = System::new();
            sys.refresh_cpu_all();

            let brand = sys
                .cpus()
                .first()
                .map(|cpu| cpu.brand().trim().to_string())
                .ok_or_else(|| MetricFetchError::Cpu("no cpu reported".to_string()))?;

            Ok(CpuInfo {
                brand,
                physical_cores: num_cpus::get_physical(),
                threads: num_cpus::get(),
            })
        })
        .await?
    }

    async fn mem(&self) -> Result<MemInfo, MetricFetchError> {
        spawn_blocking(|| {
            let mut sys = System::new();
            sys.refresh_memory();

            let total = sys.total_memory();
            if total == 0 {
                return Err(MetricFetchError::Memory("total memory reported as zero".to_string()));
            }

            Ok(MemInfo {
                total,
                used: sys.used_memory(),
            })
        })
        .await?
    }

    async fn current_load(&self) -> Result<f64, MetricFetchError> {
        spawn_blocking(|| {
            // 两次采样之间需要间隔，否则使用率恒为 0
            let mut sys = System::new();
            sys.refresh_cpu_usage();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            sys.refresh_cpu_usage();

            let load = f64::from(sys.global_cpu_usage());
            if load.is_finite() {
                Ok(load)
            } else {
                Err(MetricFetchError::Load(format!("invalid cpu usage value {}", load)))
            }
        })
        .await?
    }

    fn process_uptime(&self) -> Duration {
        PROCESS_STARTED.elapsed()
    }
}

// 一次命令调用的指标快照，不缓存
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub cpu_model: String,
    pub cpu_cores: usize,
    pub cpu_threads: usize,
    pub cpu_load: f64,
    pub total_mem_bytes: u64,
    pub used_mem_bytes: u64,
    pub uptime: Duration,
}

impl MetricSnapshot {
    pub fn total_mem_mib(&self) -> u64 {
        bytes_to_mib(self.total_mem_bytes)
    }

    pub fn used_mem_mib(&self) -> u64 {
        bytes_to_mib(self.used_mem_bytes)
    }
}

// 四舍五入到整数 MiB，恰好一半时远离零
pub fn bytes_to_mib(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MIB).round() as u64
}

/// Issues the three metric queries together and waits for all of them.
///
/// The first failing query fails the whole fetch, and the joint wait is
/// bounded by `limit`.
pub async fn fetch_snapshot(
    provider: &dyn MetricsProvider,
    limit: Duration,
) -> Result<MetricSnapshot, MetricFetchError> {
    let joint = async { futures::try_join!(provider.cpu(), provider.mem(), provider.current_load()) };

    let (cpu, mem, load) = tokio::time::timeout(limit, joint)
        .await
        .map_err(|_| MetricFetchError::Timeout { secs: limit.as_secs() })??;

    Ok(MetricSnapshot {
        cpu_model: cpu.brand,
        cpu_cores: cpu.physical_cores,
        cpu_threads: cpu.threads,
        cpu_load: load,
        total_mem_bytes: mem.total,
        used_mem_bytes: mem.used,
        uptime: provider.process_uptime(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticProvider;

    #[test]
    fn mib_rounding_goes_to_nearest() {
        let mib = 1024 * 1024;
        assert_eq!(bytes_to_mib(0), 0);
        assert_eq!(bytes_to_mib(mib), 1);
        assert_eq!(bytes_to_mib(mib + mib / 2), 2);
        assert_eq!(bytes_to_mib(mib + mib / 2 - 1), 1);
        assert_eq!(bytes_to_mib(16384 * mib), 16384);
    }

    #[tokio::test]
    async fn snapshot_collects_all_three_queries() {
        let provider = StaticProvider::reference();
        let snapshot = fetch_snapshot(&provider, Duration::from_secs(1)).await.unwrap();

        assert_eq!(snapshot.cpu_model, "Ryzen 9");
        assert_eq!((snapshot.cpu_cores, snapshot.cpu_threads), (6, 12));
        assert_eq!(snapshot.used_mem_mib(), 4096);
        assert_eq!(snapshot.total_mem_mib(), 16384);
        assert_eq!(snapshot.uptime, Duration::from_secs(3661));
    }

    #[tokio::test]
    async fn any_failing_query_fails_the_fetch() {
        let mut provider = StaticProvider::reference();
        provider.fail_mem = true;

        let error = fetch_snapshot(&provider, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(error, MetricFetchError::Memory(_)));
    }

    #[tokio::test]
    async fn slow_queries_hit_the_timeout() {
        let mut provider = StaticProvider::reference();
        provider.load_delay = Duration::from_secs(5);

        let error = fetch_snapshot(&provider, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(error, MetricFetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn queries_run_concurrently() {
        let mut provider = StaticProvider::reference();
        provider.cpu_delay = Duration::from_millis(200);
        provider.mem_delay = Duration::from_millis(200);
        provider.load_delay = Duration::from_millis(200);

        // 串行执行需要 600ms，并发执行只需约 200ms
        let started = Instant::now();
        fetch_snapshot(&provider, Duration::from_millis(500)).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn sysinfo_provider_reports_this_machine() {
        let provider = SysinfoProvider;
        let snapshot = fetch_snapshot(&provider, Duration::from_secs(10)).await.unwrap();

        assert!(snapshot.cpu_threads >= 1);
        assert!(snapshot.cpu_cores >= 1);
        assert!(snapshot.total_mem_bytes > 0);
        assert!((0.0..=100.0).contains(&snapshot.cpu_load));
    }
}
