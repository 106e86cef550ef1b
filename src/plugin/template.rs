use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

use super::metrics::MetricSnapshot;
use super::uptime::{format_uptime, UnitSuffixes};

// 支持的占位符
pub const PLACEHOLDERS: [&str; 7] = [
    "cpuModel",
    "cpuCores",
    "cpuThreads",
    "cpuLoad",
    "usedMem",
    "totalMem",
    "uptime",
];

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("占位符正则无效"));

/// Current values for the recognised placeholders of one invocation.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    values: HashMap<&'static str, String>,
}

impl Placeholders {
    pub fn from_snapshot(snapshot: &MetricSnapshot, units: &UnitSuffixes) -> Self {
        let mut values = HashMap::with_capacity(PLACEHOLDERS.len());
        values.insert("cpuModel", snapshot.cpu_model.clone());
        values.insert("cpuCores", snapshot.cpu_cores.to_string());
        values.insert("cpuThreads", snapshot.cpu_threads.to_string());
        values.insert("cpuLoad", format!("{:.1}", snapshot.cpu_load));
        values.insert("usedMem", snapshot.used_mem_mib().to_string());
        values.insert("totalMem", snapshot.total_mem_mib().to_string());
        values.insert("uptime", format_uptime(snapshot.uptime, units));
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

// 单次扫描替换，替换结果不会被再次展开
pub fn render_line(line: &str, values: &Placeholders) -> String {
    PLACEHOLDER_RE
        .replace_all(line, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn render_lines(lines: &[String], values: &Placeholders) -> Vec<String> {
    lines.iter().map(|line| render_line(line, values)).collect()
}

// 找出模板中无法识别的占位符，按首次出现顺序去重
pub fn unknown_placeholders(lines: &[String]) -> Vec<String> {
    let mut unknown: Vec<String> = Vec::new();

    for line in lines {
        for caps in PLACEHOLDER_RE.captures_iter(line) {
            let name = &caps[1];
            if !PLACEHOLDERS.contains(&name) && !unknown.iter().any(|seen| seen == name) {
                unknown.push(name.to_string());
            }
        }
    }

    unknown
}
