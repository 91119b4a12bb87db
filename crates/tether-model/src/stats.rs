use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// CPU counters of a task or process.
///
/// `None` means the driver did not measure the field; `Some(0.0)` is a measured
/// zero. The distinction survives the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub system_mode: Option<f64>,
    pub user_mode: Option<f64>,
    pub total_ticks: Option<f64>,
    pub throttled_periods: Option<u64>,
    pub throttled_time: Option<u64>,
    pub percent: Option<f64>,
}

impl CpuStats {
    pub const SYSTEM_MODE: &'static str = "System Mode";
    pub const USER_MODE: &'static str = "User Mode";
    pub const TOTAL_TICKS: &'static str = "Total Ticks";
    pub const THROTTLED_PERIODS: &'static str = "Throttled Periods";
    pub const THROTTLED_TIME: &'static str = "Throttled Time";
    pub const PERCENT: &'static str = "Percent";

    /// Names of the fields that carry a value.
    pub fn measured(&self) -> Vec<&'static str> {
        [
            (self.system_mode.is_some(), Self::SYSTEM_MODE),
            (self.user_mode.is_some(), Self::USER_MODE),
            (self.total_ticks.is_some(), Self::TOTAL_TICKS),
            (self.throttled_periods.is_some(), Self::THROTTLED_PERIODS),
            (self.throttled_time.is_some(), Self::THROTTLED_TIME),
            (self.percent.is_some(), Self::PERCENT),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

/// Memory counters in bytes. Same presence rules as [`CpuStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub rss: Option<u64>,
    pub cache: Option<u64>,
    pub swap: Option<u64>,
    pub usage: Option<u64>,
    pub max_usage: Option<u64>,
    pub kernel_usage: Option<u64>,
    pub kernel_max_usage: Option<u64>,
}

impl MemoryStats {
    pub const RSS: &'static str = "RSS";
    pub const CACHE: &'static str = "Cache";
    pub const SWAP: &'static str = "Swap";
    pub const USAGE: &'static str = "Usage";
    pub const MAX_USAGE: &'static str = "Max Usage";
    pub const KERNEL_USAGE: &'static str = "Kernel Usage";
    pub const KERNEL_MAX_USAGE: &'static str = "Kernel Max Usage";

    pub fn measured(&self) -> Vec<&'static str> {
        [
            (self.rss.is_some(), Self::RSS),
            (self.cache.is_some(), Self::CACHE),
            (self.swap.is_some(), Self::SWAP),
            (self.usage.is_some(), Self::USAGE),
            (self.max_usage.is_some(), Self::MAX_USAGE),
            (self.kernel_usage.is_some(), Self::KERNEL_USAGE),
            (self.kernel_max_usage.is_some(), Self::KERNEL_MAX_USAGE),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub cpu: Option<CpuStats>,
    pub memory: Option<MemoryStats>,
}

/// One sample of the `TaskStats` stream: aggregate usage plus per-process usage
/// keyed by pid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResourceUsage {
    pub timestamp: Option<SystemTime>,
    pub usage: ResourceUsage,
    pub pids: BTreeMap<String, ResourceUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measured_lists_only_present_fields() {
        let cpu = CpuStats {
            user_mode: Some(0.0),
            percent: Some(12.5),
            ..Default::default()
        };
        assert_eq!(cpu.measured(), vec![CpuStats::USER_MODE, CpuStats::PERCENT]);
        assert!(CpuStats::default().measured().is_empty());

        let mem = MemoryStats {
            rss: Some(0),
            kernel_max_usage: Some(4096),
            ..Default::default()
        };
        assert_eq!(mem.measured(), vec![MemoryStats::RSS, MemoryStats::KERNEL_MAX_USAGE]);
    }
}
