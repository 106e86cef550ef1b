use rimplog::{error, info, init_logger, LoggerBuilder, LoggerPreset};

use crate::host::LogSink;

pub fn init_log() {
    let logger = LoggerBuilder {
        level: "INFO".to_string(),
        only_project_logs: false,
        path_depth: 0,
        time_format: "%Y-%m-%d %H:%M:%S".to_string(),
        preset: LoggerPreset::SIMPLE,
    };
    init_logger(logger);
}

// 插件日志输出到 rimplog
#[derive(Debug, Clone, Copy, Default)]
pub struct RimplogSink;

impl LogSink for RimplogSink {
    fn log(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }
}
