pub mod ina219;
pub mod power;
pub mod system;
pub mod ups;

use crate::state::{DisplayPage, PowerSnapshot, Snapshot};
use embedded_hal::i2c::I2c;
use power::{PowerMonitor, PowerMonitorReader};
use system::{HostError, HostMetrics};
use thiserror::Error;
use tracing::warn;
use ups::{read_ups_status, DecodeError, UpsError};

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("host metrics unavailable: {0}")]
    Host(#[from] HostError),
    #[error("{rail} power monitor read failed: {detail}")]
    Monitor { rail: &'static str, detail: String },
    #[error("UPS register block malformed: {0}")]
    Decode(#[from] DecodeError),
}

pub trait Sampler {
    fn sample(&mut self, page: DisplayPage) -> Result<Snapshot, SampleError>;
}

#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub interface: String,
    pub temperature_sensor: String,
    pub ups_address: u8,
}

pub struct TelemetrySampler<H, M, U> {
    settings: SamplerSettings,
    host: H,
    host_rail: PowerMonitorReader<M>,
    battery_rail: PowerMonitorReader<M>,
    ups_bus: U,
}

impl<H, M, U> TelemetrySampler<H, M, U>
where
    H: HostMetrics,
    M: PowerMonitor,
    U: I2c,
{
    pub fn new(settings: SamplerSettings, host: H, host_rail: M, battery_rail: M, ups_bus: U) -> Self {
        Self {
            settings,
            host,
            host_rail: PowerMonitorReader::new("host", host_rail),
            battery_rail: PowerMonitorReader::new("battery", battery_rail),
            ups_bus,
        }
    }

    fn sample_power(&mut self) -> Result<PowerSnapshot, SampleError> {
        let host_rail = read_rail(&mut self.host_rail)?;
        let battery_rail = read_rail(&mut self.battery_rail)?;

        let ups = match read_ups_status(&mut self.ups_bus, self.settings.ups_address) {
            Ok(status) => Some(status),
            Err(UpsError::Bus(err)) => {
                warn!(
                    address = self.settings.ups_address,
                    error = ?err,
                    "UPS register read failed"
                );
                None
            }
            Err(UpsError::Decode(err)) => return Err(err.into()),
        };

        Ok(PowerSnapshot {
            host_rail,
            battery_rail,
            ups,
        })
    }
}

fn read_rail<M: PowerMonitor>(
    reader: &mut PowerMonitorReader<M>,
) -> Result<crate::state::PowerReading, SampleError> {
    reader.sample().map_err(|err| SampleError::Monitor {
        rail: reader.rail(),
        detail: format!("{err:?}"),
    })
}

impl<H, M, U> Sampler for TelemetrySampler<H, M, U>
where
    H: HostMetrics,
    M: PowerMonitor,
    U: I2c,
{
    fn sample(&mut self, page: DisplayPage) -> Result<Snapshot, SampleError> {
        match page {
            DisplayPage::Host => {
                let snapshot = self
                    .host
                    .collect(&self.settings.interface, &self.settings.temperature_sensor)?;
                Ok(Snapshot::Host(snapshot))
            }
            DisplayPage::Power => Ok(Snapshot::Power(self.sample_power()?)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::power::tests::FakeMonitor;
    use super::ups::tests::FakeUpsBus;
    use super::*;
    use crate::state::{ChargingState, HostSnapshot, Measured};

    pub(crate) struct FakeHost {
        pub calls: usize,
        pub missing_sensor: bool,
    }

    impl HostMetrics for FakeHost {
        fn collect(&mut self, iface: &str, temp_sensor: &str) -> Result<HostSnapshot, HostError> {
            self.calls += 1;
            if self.missing_sensor {
                return Err(HostError::TemperatureSensorMissing(temp_sensor.to_string()));
            }
            Ok(HostSnapshot {
                ip_address: format!("{iface} NA"),
                load_percent: 12,
                cpu_temp_c: 47.2,
                mem_used_mb: 512,
                mem_total_mb: 3300,
                disk_used_gb: 7,
                disk_total_gb: 29,
            })
        }
    }

    fn settings() -> SamplerSettings {
        SamplerSettings {
            interface: "eth0".to_string(),
            temperature_sensor: "cpu_thermal".to_string(),
            ups_address: 0x17,
        }
    }

    fn sampler(ups: FakeUpsBus) -> TelemetrySampler<FakeHost, FakeMonitor, FakeUpsBus> {
        TelemetrySampler::new(
            settings(),
            FakeHost {
                calls: 0,
                missing_sensor: false,
            },
            FakeMonitor::steady(5.1, 820.0, 4100.0),
            FakeMonitor::steady(3.9, -150.0, 585.0),
            ups,
        )
    }

    #[test]
    fn host_page_skips_bus_reads() {
        let mut s = sampler(FakeUpsBus::with_fields(5000, 0, 90));
        let snapshot = s.sample(DisplayPage::Host).expect("host sample");
        assert!(matches!(snapshot, Snapshot::Host(_)));
        assert_eq!(s.host.calls, 1);
        assert_eq!(s.ups_bus.reads, 0);
    }

    #[test]
    fn power_page_skips_host_metrics() {
        let mut s = sampler(FakeUpsBus::with_fields(5000, 0, 90));
        let Snapshot::Power(power) = s.sample(DisplayPage::Power).expect("power sample") else {
            panic!("expected power snapshot");
        };
        assert_eq!(s.host.calls, 0);
        assert_eq!(power.host_rail.millivolts, 5100);
        assert_eq!(power.battery_rail.milliamps, Measured::Value(-150));
        assert_eq!(power.ups.map(|u| u.battery_remaining_percent), Some(90));
        assert_eq!(power.charging_state(), ChargingState::ChargingUsbC);
    }

    #[test]
    fn ups_bus_failure_is_masked_and_next_tick_recovers() {
        let mut s = sampler(FakeUpsBus::failing());
        let Snapshot::Power(power) = s.sample(DisplayPage::Power).expect("masked") else {
            panic!("expected power snapshot");
        };
        assert_eq!(power.ups, None);
        assert_eq!(power.charging_state(), ChargingState::UpsReadError);
        assert_eq!(s.ups_bus.reads, 1);

        s.ups_bus.fail = false;
        let Snapshot::Power(power) = s.sample(DisplayPage::Power).expect("recovered") else {
            panic!("expected power snapshot");
        };
        assert!(power.ups.is_some());
    }

    #[test]
    fn missing_temperature_sensor_is_fatal() {
        let mut s = sampler(FakeUpsBus::with_fields(0, 0, 0));
        s.host.missing_sensor = true;
        let err = s.sample(DisplayPage::Host).unwrap_err();
        assert!(matches!(err, SampleError::Host(HostError::TemperatureSensorMissing(_))));
    }

    #[test]
    fn monitor_bus_fault_is_fatal() {
        let mut s = sampler(FakeUpsBus::with_fields(0, 0, 0));
        s.battery_rail = PowerMonitorReader::new("battery", {
            let mut m = FakeMonitor::steady(0.0, 0.0, 0.0);
            m.bus_fault = true;
            m
        });
        let err = s.sample(DisplayPage::Power).unwrap_err();
        assert!(matches!(err, SampleError::Monitor { rail: "battery", .. }));
    }
}
