use crate::state::HostSnapshot;
use std::net::IpAddr;
use std::path::Path;
use sysinfo::{Components, CpuRefreshKind, MemoryRefreshKind, Networks, RefreshKind, System};
use thiserror::Error;
use tracing::debug;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("temperature sensor '{0}' not found")]
    TemperatureSensorMissing(String),
    #[error("temperature sensor '{0}' has no reading")]
    TemperatureUnavailable(String),
    #[error("statvfs on / failed: {0}")]
    RootFilesystem(String),
    #[error("no CPUs reported")]
    NoCpus,
}

pub trait HostMetrics {
    fn collect(&mut self, iface: &str, temp_sensor: &str) -> Result<HostSnapshot, HostError>;
}

pub struct SysinfoHost {
    system: System,
}

impl SysinfoHost {
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self { system }
    }
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMetrics for SysinfoHost {
    fn collect(&mut self, iface: &str, temp_sensor: &str) -> Result<HostSnapshot, HostError> {
        self.system.refresh_memory();

        let networks = Networks::new_with_refreshed_list();
        let addresses: Option<Vec<IpAddr>> = networks
            .get(iface)
            .map(|data| data.ip_networks().iter().map(|net| net.addr).collect());
        let ip_address = select_address(iface, addresses.as_deref());

        let load_percent =
            load_percent(System::load_average().one, self.system.cpus().len())?;

        let components = Components::new_with_refreshed_list();
        let sensor = components
            .iter()
            .find(|c| c.label().contains(temp_sensor))
            .ok_or_else(|| HostError::TemperatureSensorMissing(temp_sensor.to_string()))?;
        let temp = sensor
            .temperature()
            .ok_or_else(|| HostError::TemperatureUnavailable(temp_sensor.to_string()))?;

        let root = nix::sys::statvfs::statvfs(Path::new("/"))
            .map_err(|err| HostError::RootFilesystem(err.to_string()))?;
        let disk = FilesystemUsage::from_blocks(
            u64::from(root.blocks()),
            u64::from(root.blocks_free()),
            u64::from(root.fragment_size()),
        );

        debug!(
            iface,
            sensor = sensor.label(),
            components = components.len(),
            disk_used = disk.used,
            "host metrics collected"
        );

        Ok(HostSnapshot {
            ip_address,
            load_percent,
            cpu_temp_c: round_tenth(f64::from(temp)),
            mem_used_mb: bytes_to_mb(self.system.used_memory()),
            // reported as-is: "total" here is the memory still available
            mem_total_mb: bytes_to_mb(self.system.available_memory()),
            disk_used_gb: bytes_to_gb(disk.used),
            disk_total_gb: bytes_to_gb(disk.total),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilesystemUsage {
    pub total: u64,
    pub used: u64,
}

impl FilesystemUsage {
    // root-reserved blocks are free, not used
    pub fn from_blocks(blocks: u64, blocks_free: u64, fragment_size: u64) -> Self {
        Self {
            total: blocks.saturating_mul(fragment_size),
            used: blocks.saturating_sub(blocks_free).saturating_mul(fragment_size),
        }
    }
}

pub fn select_address(iface: &str, addresses: Option<&[IpAddr]>) -> String {
    let Some(addresses) = addresses else {
        return format!("{iface} NA");
    };
    addresses
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addresses.first())
        .map(|a| a.to_string())
        .unwrap_or_else(|| format!("{iface} NA"))
}

pub fn load_percent(load_one: f64, cores: usize) -> Result<u32, HostError> {
    if cores == 0 {
        return Err(HostError::NoCpus);
    }
    Ok((load_one.max(0.0) * 100.0 / cores as f64).round() as u32)
}

pub fn bytes_to_mb(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_MB).round() as u64
}

pub fn bytes_to_gb(bytes: u64) -> u64 {
    (bytes as f64 / BYTES_PER_GB).round() as u64
}

pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn missing_interface_yields_sentinel() {
        assert_eq!(select_address("eth0", None), "eth0 NA");
        assert_eq!(select_address("wlan0", Some(&[])), "wlan0 NA");
    }

    #[test]
    fn prefers_ipv4_address() {
        let addrs = [
            IpAddr::V6(Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
        ];
        assert_eq!(select_address("eth0", Some(&addrs)), "192.168.1.20");
    }

    #[test]
    fn falls_back_to_first_address() {
        let addrs = [IpAddr::V6(Ipv6Addr::LOCALHOST)];
        assert_eq!(select_address("lo", Some(&addrs)), "::1");
    }

    #[test]
    fn load_is_normalized_to_core_count() {
        assert_eq!(load_percent(1.0, 4), Ok(25));
        assert_eq!(load_percent(0.53, 4), Ok(13));
        assert_eq!(load_percent(6.0, 4), Ok(150));
        assert_eq!(load_percent(1.0, 0), Err(HostError::NoCpus));
    }

    #[test]
    fn sizes_round_to_nearest_unit() {
        assert_eq!(bytes_to_mb(1024 * 1024 * 3 / 2), 2);
        assert_eq!(bytes_to_mb(1024 * 1024 - 1), 1);
        assert_eq!(bytes_to_gb(29 * 1024 * 1024 * 1024 + 100), 29);
    }

    #[test]
    fn reserved_blocks_do_not_count_as_used() {
        // 1M blocks of 4 KiB: 300k free, of which 50k are reserved for root
        let usage = FilesystemUsage::from_blocks(1_000_000, 300_000, 4096);
        assert_eq!(usage.total, 4_096_000_000);
        assert_eq!(usage.used, 700_000 * 4096);
    }

    #[test]
    fn free_count_above_total_clamps_to_zero_used() {
        assert_eq!(FilesystemUsage::from_blocks(10, 12, 512).used, 0);
    }

    #[test]
    fn temperature_rounds_to_one_decimal() {
        assert_eq!(round_tenth(48.312), 48.3);
        assert_eq!(round_tenth(48.35001), 48.4);
    }
}
