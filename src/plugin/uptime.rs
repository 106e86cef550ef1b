use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECS_PER_DAY: u64 = 86_400;
const SECS_PER_HOUR: u64 = 3_600;
const SECS_PER_MINUTE: u64 = 60;

// 时长各单位的后缀，默认使用俄语缩写
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitSuffixes {
    pub day: String,
    pub hour: String,
    pub minute: String,
    pub second: String,
}

impl Default for UnitSuffixes {
    fn default() -> Self {
        Self {
            day: "д".to_string(),
            hour: "ч".to_string(),
            minute: "м".to_string(),
            second: "с".to_string(),
        }
    }
}

/// Formats an uptime as sparse `<n><unit>` tokens, e.g. `1д 1ч 1с`.
///
/// Zero components are skipped; a zero duration still yields the seconds
/// token so the result is never empty. Sub-second precision is truncated.
pub fn format_uptime(uptime: Duration, units: &UnitSuffixes) -> String {
    let total = uptime.as_secs();

    let days = total / SECS_PER_DAY;
    let hours = total % SECS_PER_DAY / SECS_PER_HOUR;
    let minutes = total % SECS_PER_HOUR / SECS_PER_MINUTE;
    let seconds = total % SECS_PER_MINUTE;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{}{}", days, units.day));
    }
    if hours > 0 {
        parts.push(format!("{}{}", hours, units.hour));
    }
    if minutes > 0 {
        parts.push(format!("{}{}", minutes, units.minute));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{}{}", seconds, units.second));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(secs: u64) -> String {
        format_uptime(Duration::from_secs(secs), &UnitSuffixes::default())
    }

    #[test]
    fn zero_still_renders_seconds() {
        assert_eq!(fmt(0), "0с");
    }

    #[test]
    fn single_units() {
        assert_eq!(fmt(59), "59с");
        assert_eq!(fmt(60), "1м");
        assert_eq!(fmt(3600), "1ч");
        assert_eq!(fmt(86400), "1д");
    }

    #[test]
    fn all_components_in_order() {
        assert_eq!(fmt(90061), "1д 1ч 1м 1с");
        assert_eq!(fmt(3661), "1ч 1м 1с");
    }

    #[test]
    fn zero_components_are_skipped() {
        assert_eq!(fmt(3601), "1ч 1с");
        assert_eq!(fmt(86460), "1д 1м");
    }

    #[test]
    fn fractions_are_truncated() {
        let units = UnitSuffixes::default();
        assert_eq!(format_uptime(Duration::from_millis(59_999), &units), "59с");
        assert_eq!(format_uptime(Duration::from_millis(999), &units), "0с");
    }

    #[test]
    fn very_long_uptimes_do_not_overflow() {
        // 约 5849 亿年
        let rendered = format_uptime(Duration::MAX, &UnitSuffixes::default());
        assert!(rendered.starts_with(&format!("{}д", u64::MAX / SECS_PER_DAY)));
    }

    #[test]
    fn custom_suffixes() {
        let units = UnitSuffixes {
            day: "d".to_string(),
            hour: "h".to_string(),
            minute: "m".to_string(),
            second: "s".to_string(),
        };
        assert_eq!(format_uptime(Duration::from_secs(93_784), &units), "1d 2h 3m 4s");
    }
}
