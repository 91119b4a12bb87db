use tether_model::{CpuStats, MemoryStats, ResourceUsage, TaskResourceUsage};

use super::{timestamp_from_proto, timestamp_to_proto};
use crate::proto::{self, cpu_usage, memory_usage};

// Each stat struct travels as plain scalars plus a list naming the fields that
// were measured. Only listed fields decode to `Some`.

fn put<T: Default>(value: Option<T>, field: i32, measured: &mut Vec<i32>) -> T {
    match value {
        Some(v) => {
            measured.push(field);
            v
        }
        None => T::default(),
    }
}

fn has(measured: &[i32], field: i32) -> bool {
    measured.contains(&field)
}

impl From<CpuStats> for proto::CpuUsage {
    fn from(cpu: CpuStats) -> Self {
        use cpu_usage::Field;

        let mut m = Vec::new();
        proto::CpuUsage {
            system_mode: put(cpu.system_mode, Field::SystemMode as i32, &mut m),
            user_mode: put(cpu.user_mode, Field::UserMode as i32, &mut m),
            total_ticks: put(cpu.total_ticks, Field::TotalTicks as i32, &mut m),
            throttled_periods: put(cpu.throttled_periods, Field::ThrottledPeriods as i32, &mut m),
            throttled_time: put(cpu.throttled_time, Field::ThrottledTime as i32, &mut m),
            percent: put(cpu.percent, Field::Percent as i32, &mut m),
            measured_fields: m,
        }
    }
}

impl From<proto::CpuUsage> for CpuStats {
    fn from(cpu: proto::CpuUsage) -> Self {
        use cpu_usage::Field;

        let m = &cpu.measured_fields;
        CpuStats {
            system_mode: has(m, Field::SystemMode as i32).then_some(cpu.system_mode),
            user_mode: has(m, Field::UserMode as i32).then_some(cpu.user_mode),
            total_ticks: has(m, Field::TotalTicks as i32).then_some(cpu.total_ticks),
            throttled_periods: has(m, Field::ThrottledPeriods as i32)
                .then_some(cpu.throttled_periods),
            throttled_time: has(m, Field::ThrottledTime as i32).then_some(cpu.throttled_time),
            percent: has(m, Field::Percent as i32).then_some(cpu.percent),
        }
    }
}

impl From<MemoryStats> for proto::MemoryUsage {
    fn from(mem: MemoryStats) -> Self {
        use memory_usage::Field;

        let mut m = Vec::new();
        proto::MemoryUsage {
            rss: put(mem.rss, Field::Rss as i32, &mut m),
            cache: put(mem.cache, Field::Cache as i32, &mut m),
            swap: put(mem.swap, Field::Swap as i32, &mut m),
            usage: put(mem.usage, Field::Usage as i32, &mut m),
            max_usage: put(mem.max_usage, Field::MaxUsage as i32, &mut m),
            kernel_usage: put(mem.kernel_usage, Field::KernelUsage as i32, &mut m),
            kernel_max_usage: put(mem.kernel_max_usage, Field::KernelMaxUsage as i32, &mut m),
            measured_fields: m,
        }
    }
}

impl From<proto::MemoryUsage> for MemoryStats {
    fn from(mem: proto::MemoryUsage) -> Self {
        use memory_usage::Field;

        let m = &mem.measured_fields;
        MemoryStats {
            rss: has(m, Field::Rss as i32).then_some(mem.rss),
            cache: has(m, Field::Cache as i32).then_some(mem.cache),
            swap: has(m, Field::Swap as i32).then_some(mem.swap),
            usage: has(m, Field::Usage as i32).then_some(mem.usage),
            max_usage: has(m, Field::MaxUsage as i32).then_some(mem.max_usage),
            kernel_usage: has(m, Field::KernelUsage as i32).then_some(mem.kernel_usage),
            kernel_max_usage: has(m, Field::KernelMaxUsage as i32).then_some(mem.kernel_max_usage),
        }
    }
}

impl From<ResourceUsage> for proto::ResourceUsage {
    fn from(u: ResourceUsage) -> Self {
        proto::ResourceUsage {
            cpu: u.cpu.map(Into::into),
            memory: u.memory.map(Into::into),
        }
    }
}

impl From<proto::ResourceUsage> for ResourceUsage {
    fn from(u: proto::ResourceUsage) -> Self {
        ResourceUsage {
            cpu: u.cpu.map(Into::into),
            memory: u.memory.map(Into::into),
        }
    }
}

impl From<TaskResourceUsage> for proto::TaskStatsResponse {
    fn from(u: TaskResourceUsage) -> Self {
        proto::TaskStatsResponse {
            stats: Some(proto::TaskResourceUsage {
                timestamp: timestamp_to_proto(u.timestamp),
                agg: Some(u.usage.into()),
                pids: u.pids.into_iter().map(|(pid, u)| (pid, u.into())).collect(),
            }),
        }
    }
}

impl From<proto::TaskStatsResponse> for TaskResourceUsage {
    fn from(resp: proto::TaskStatsResponse) -> Self {
        let stats = resp.stats.unwrap_or_default();
        TaskResourceUsage {
            timestamp: timestamp_from_proto(stats.timestamp),
            usage: stats.agg.map(Into::into).unwrap_or_default(),
            pids: stats.pids.into_iter().map(|(pid, u)| (pid, u.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every subset of the six CPU fields, with zero as the value so that a
    // lost presence bit would be indistinguishable from the default.
    #[test]
    fn cpu_presence_survives_for_every_subset() {
        for mask in 0u8..64 {
            let pick = |bit: u8| (mask & (1 << bit) != 0).then_some(0.0);
            let cpu = CpuStats {
                system_mode: pick(0),
                user_mode: pick(1),
                total_ticks: pick(2),
                throttled_periods: pick(3).map(|_| 0),
                throttled_time: pick(4).map(|_| 0),
                percent: pick(5),
            };
            let wire = proto::CpuUsage::from(cpu.clone());
            assert_eq!(wire.measured_fields.len(), mask.count_ones() as usize);
            assert_eq!(CpuStats::from(wire), cpu, "mask {mask:#08b}");
        }
    }

    #[test]
    fn memory_presence_survives() {
        let mem = MemoryStats {
            rss: Some(0),
            swap: Some(1024),
            kernel_max_usage: Some(0),
            ..Default::default()
        };
        let back = MemoryStats::from(proto::MemoryUsage::from(mem.clone()));
        assert_eq!(back, mem);
        assert_eq!(back.measured(), mem.measured());
    }

    #[test]
    fn unlisted_wire_values_decode_as_absent() {
        let wire = proto::MemoryUsage {
            rss: 4096,
            cache: 128,
            measured_fields: vec![memory_usage::Field::Cache as i32],
            ..Default::default()
        };
        let mem = MemoryStats::from(wire);
        assert_eq!(mem.rss, None);
        assert_eq!(mem.cache, Some(128));
    }

    #[test]
    fn task_usage_keeps_pids() {
        let usage = TaskResourceUsage {
            timestamp: None,
            usage: ResourceUsage {
                cpu: Some(CpuStats {
                    percent: Some(12.5),
                    ..Default::default()
                }),
                memory: None,
            },
            pids: [
                ("1".to_string(), ResourceUsage::default()),
                (
                    "7".to_string(),
                    ResourceUsage {
                        cpu: None,
                        memory: Some(MemoryStats {
                            rss: Some(10),
                            ..Default::default()
                        }),
                    },
                ),
            ]
            .into_iter()
            .collect(),
        };
        let back = TaskResourceUsage::from(proto::TaskStatsResponse::from(usage.clone()));
        assert_eq!(back, usage);
    }
}
