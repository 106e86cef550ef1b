// 测试用的协作者替身
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::host::LogSink;
use crate::plugin::metrics::{CpuInfo, MemInfo, MetricFetchError, MetricsProvider};

const MIB: u64 = 1024 * 1024;

pub struct StaticProvider {
    pub cpu: CpuInfo,
    pub mem: MemInfo,
    pub load: f64,
    pub uptime: Duration,
    pub fail_cpu: bool,
    pub fail_mem: bool,
    pub fail_load: bool,
    pub cpu_delay: Duration,
    pub mem_delay: Duration,
    pub load_delay: Duration,
}

impl StaticProvider {
    pub fn reference() -> Self {
        Self {
            cpu: CpuInfo {
                brand: "Ryzen 9".to_string(),
                physical_cores: 6,
                threads: 12,
            },
            mem: MemInfo {
                total: 16384 * MIB,
                used: 4096 * MIB,
            },
            load: 37.45,
            uptime: Duration::from_secs(3661),
            fail_cpu: false,
            fail_mem: false,
            fail_load: false,
            cpu_delay: Duration::ZERO,
            mem_delay: Duration::ZERO,
            load_delay: Duration::ZERO,
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl MetricsProvider for StaticProvider {
    async fn cpu(&self) -> Result<CpuInfo, MetricFetchError> {
        pause(self.cpu_delay).await;
        if self.fail_cpu {
            return Err(MetricFetchError::Cpu("cpu unavailable".to_string()));
        }
        Ok(self.cpu.clone())
    }

    async fn mem(&self) -> Result<MemInfo, MetricFetchError> {
        pause(self.mem_delay).await;
        if self.fail_mem {
            return Err(MetricFetchError::Memory("meminfo unreadable".to_string()));
        }
        Ok(self.mem)
    }

    async fn current_load(&self) -> Result<f64, MetricFetchError> {
        pause(self.load_delay).await;
        if self.fail_load {
            return Err(MetricFetchError::Load("load unavailable".to_string()));
        }
        Ok(self.load)
    }

    fn process_uptime(&self) -> Duration {
        self.uptime
    }
}

#[derive(Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<String>>,
}

impl RecordingLog {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl LogSink for RecordingLog {
    fn log(&self, message: &str) {
        self.entries.lock().unwrap().push(message.to_string());
    }
}
