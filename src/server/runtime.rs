use std::fmt;

/// Where the worker thread count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitSource {
    Env,
    CgroupV2,
    CgroupV1,
    Host,
}

impl fmt::Display for LimitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitSource::Env => write!(f, "HERMES_WORKER_THREADS"),
            LimitSource::CgroupV2 => write!(f, "cgroup v2"),
            LimitSource::CgroupV1 => write!(f, "cgroup v1"),
            LimitSource::Host => write!(f, "host"),
        }
    }
}

/// Tokio worker count sized to the container's CPU quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerThreads {
    pub count: usize,
    pub source: LimitSource,
}

impl WorkerThreads {
    /// Checks, in order: `HERMES_WORKER_THREADS` (`"4"` or `"1500m"`), cgroup
    /// v2 `cpu.max`, cgroup v1 CFS quota, then the host CPU count. Fractional
    /// quotas round up.
    pub fn detect() -> Self {
        let found = std::env::var("HERMES_WORKER_THREADS")
            .ok()
            .and_then(|v| parse_cpu_value(&v))
            .map(|n| (n, LimitSource::Env))
            .or_else(|| {
                std::fs::read_to_string("/sys/fs/cgroup/cpu.max")
                    .ok()
                    .and_then(|v| parse_cgroup_v2(&v))
                    .map(|n| (n, LimitSource::CgroupV2))
            })
            .or_else(|| {
                let quota = std::fs::read_to_string("/sys/fs/cgroup/cpu/cpu.cfs_quota_us").ok()?;
                let period =
                    std::fs::read_to_string("/sys/fs/cgroup/cpu/cpu.cfs_period_us").ok()?;
                parse_cgroup_v1(&quota, &period).map(|n| (n, LimitSource::CgroupV1))
            });

        let (count, source) = found.unwrap_or_else(|| {
            let host = std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(1);
            (host, LimitSource::Host)
        });
        Self {
            count: count.max(1),
            source,
        }
    }
}

/// `"4"` cores or `"4000m"` millicores.
fn parse_cpu_value(value: &str) -> Option<usize> {
    let value = value.trim();
    match value.strip_suffix('m') {
        Some(milli) => milli.parse::<usize>().ok().map(|m| m.div_ceil(1000)),
        None => value.parse().ok(),
    }
}

/// `cpu.max` holds `"<quota> <period>"`; a quota of `max` means unlimited.
fn parse_cgroup_v2(content: &str) -> Option<usize> {
    let mut parts = content.split_whitespace();
    let quota = parts.next()?;
    let period = parts.next()?;
    if quota == "max" {
        return None;
    }
    quota_cores(quota, period)
}

fn parse_cgroup_v1(quota: &str, period: &str) -> Option<usize> {
    quota_cores(quota, period)
}

fn quota_cores(quota: &str, period: &str) -> Option<usize> {
    let quota: i64 = quota.trim().parse().ok()?;
    let period: i64 = period.trim().parse().ok()?;
    if quota <= 0 || period <= 0 {
        return None;
    }
    Some((quota as u64).div_ceil(period as u64) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_value_in_cores_or_millicores() {
        assert_eq!(parse_cpu_value(" 8 "), Some(8));
        assert_eq!(parse_cpu_value("4000m"), Some(4));
        assert_eq!(parse_cpu_value("500m"), Some(1));
        assert_eq!(parse_cpu_value("1500m"), Some(2));
        assert_eq!(parse_cpu_value("lots"), None);
    }

    #[test]
    fn cgroup_v2_quota() {
        assert_eq!(parse_cgroup_v2("400000 100000\n"), Some(4));
        assert_eq!(parse_cgroup_v2("150000 100000"), Some(2));
        assert_eq!(parse_cgroup_v2("max 100000"), None);
        assert_eq!(parse_cgroup_v2(""), None);
    }

    #[test]
    fn cgroup_v1_quota() {
        assert_eq!(parse_cgroup_v1("400000\n", "100000\n"), Some(4));
        assert_eq!(parse_cgroup_v1("-1", "100000"), None);
    }

    #[test]
    fn detect_never_returns_zero() {
        assert!(WorkerThreads::detect().count >= 1);
    }
}
