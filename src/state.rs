// USB input voltage above which the UPS is considered to be charging from that port.
pub const CHARGING_THRESHOLD_MV: u16 = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayPage {
    Host,
    Power,
}

impl DisplayPage {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayPage::Host => "host",
            DisplayPage::Power => "power",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostSnapshot {
    pub ip_address: String,
    pub load_percent: u32,
    pub cpu_temp_c: f64,
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
    pub disk_used_gb: u64,
    pub disk_total_gb: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measured {
    Value(i64),
    OutOfRange,
}

impl Measured {
    pub fn value(self) -> Option<i64> {
        match self {
            Measured::Value(v) => Some(v),
            Measured::OutOfRange => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerReading {
    pub millivolts: i64,
    pub milliamps: Measured,
    pub milliwatts: Measured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsStatus {
    pub usb_c_millivolts: u16,
    pub usb_micro_millivolts: u16,
    pub battery_temp_c: u16,
    pub battery_remaining_percent: u16,
    pub auto_power_on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingState {
    ChargingUsbC,
    ChargingMicroUsb,
    NotCharging,
    UpsReadError,
}

impl ChargingState {
    pub fn label(self) -> &'static str {
        match self {
            ChargingState::ChargingUsbC => "Charging USB C",
            ChargingState::ChargingMicroUsb => "Charging Micro USB",
            ChargingState::NotCharging => "Not Charging",
            ChargingState::UpsReadError => "UPS read error",
        }
    }
}

impl UpsStatus {
    // USB-C wins when both inputs are above the threshold.
    pub fn charging_state(&self) -> ChargingState {
        if self.usb_c_millivolts > CHARGING_THRESHOLD_MV {
            ChargingState::ChargingUsbC
        } else if self.usb_micro_millivolts > CHARGING_THRESHOLD_MV {
            ChargingState::ChargingMicroUsb
        } else {
            ChargingState::NotCharging
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerSnapshot {
    pub host_rail: PowerReading,
    pub battery_rail: PowerReading,
    pub ups: Option<UpsStatus>,
}

impl PowerSnapshot {
    pub fn charging_state(&self) -> ChargingState {
        match &self.ups {
            Some(ups) => ups.charging_state(),
            None => ChargingState::UpsReadError,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Host(HostSnapshot),
    Power(PowerSnapshot),
}

impl Snapshot {
    pub fn page(&self) -> DisplayPage {
        match self {
            Snapshot::Host(_) => DisplayPage::Host,
            Snapshot::Power(_) => DisplayPage::Power,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ups(usb_c: u16, micro: u16) -> UpsStatus {
        UpsStatus {
            usb_c_millivolts: usb_c,
            usb_micro_millivolts: micro,
            battery_temp_c: 25,
            battery_remaining_percent: 80,
            auto_power_on: false,
        }
    }

    #[test]
    fn usb_c_takes_priority_when_both_inputs_present() {
        assert_eq!(ups(5000, 5000).charging_state(), ChargingState::ChargingUsbC);
    }

    #[test]
    fn micro_usb_used_when_usb_c_below_threshold() {
        assert_eq!(
            ups(3000, 5000).charging_state(),
            ChargingState::ChargingMicroUsb
        );
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(ups(4000, 4000).charging_state(), ChargingState::NotCharging);
        assert_eq!(ups(0, 0).charging_state(), ChargingState::NotCharging);
        assert_eq!(ups(4001, 0).charging_state(), ChargingState::ChargingUsbC);
    }

    #[test]
    fn missing_ups_block_reports_read_error() {
        let reading = PowerReading {
            millivolts: 5100,
            milliamps: Measured::Value(400),
            milliwatts: Measured::Value(2000),
        };
        let snapshot = PowerSnapshot {
            host_rail: reading,
            battery_rail: reading,
            ups: None,
        };
        assert_eq!(snapshot.charging_state(), ChargingState::UpsReadError);
        assert_eq!(snapshot.charging_state().label(), "UPS read error");
    }
}
