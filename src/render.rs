use crate::state::{HostSnapshot, Measured, PowerSnapshot, Snapshot};

pub const LINE_Y: [i32; 4] = [0, 16, 32, 48];
pub const OUT_OF_RANGE_MARKER: &str = "OOR";
const MISSING_MARKER: &str = "--";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCommand {
    pub x: i32,
    pub y: i32,
    pub text: String,
}

fn lines(texts: [String; 4]) -> Vec<DrawCommand> {
    texts
        .into_iter()
        .zip(LINE_Y)
        .map(|(text, y)| DrawCommand { x: 0, y, text })
        .collect()
}

pub fn render(snapshot: &Snapshot) -> Vec<DrawCommand> {
    match snapshot {
        Snapshot::Host(host) => render_host(host),
        Snapshot::Power(power) => render_power(power),
    }
}

pub fn render_stopped() -> Vec<DrawCommand> {
    vec![DrawCommand {
        x: 0,
        y: LINE_Y[0],
        text: "STOPPED".to_string(),
    }]
}

fn render_host(host: &HostSnapshot) -> Vec<DrawCommand> {
    lines([
        host.ip_address.clone(),
        format!("CPU: {}% / {:.1}C", host.load_percent, host.cpu_temp_c),
        format!("Mem: {}/{} MB", host.mem_used_mb, host.mem_total_mb),
        format!("Disk: {}/{} GB", host.disk_used_gb, host.disk_total_gb),
    ])
}

fn render_power(power: &PowerSnapshot) -> Vec<DrawCommand> {
    let battery_percent = power
        .ups
        .map(|ups| ups.battery_remaining_percent.to_string())
        .unwrap_or_else(|| MISSING_MARKER.to_string());

    let watts = format_watts(power.battery_rail.milliwatts);
    let flow = match power.battery_rail.milliamps {
        Measured::Value(ma) if ma < 0 => format!("Dchrg: {}mA {watts}", -ma),
        ma => format!("Chrg: {} {watts}", format_milliamps(ma)),
    };

    lines([
        format!(
            "Pi: {}mV {}",
            power.host_rail.millivolts,
            format_milliamps(power.host_rail.milliamps)
        ),
        format!(
            "Batt: {}mV {battery_percent}%",
            power.battery_rail.millivolts
        ),
        flow,
        power.charging_state().label().to_string(),
    ])
}

fn format_milliamps(value: Measured) -> String {
    match value {
        Measured::Value(ma) => format!("{ma}mA"),
        Measured::OutOfRange => OUT_OF_RANGE_MARKER.to_string(),
    }
}

fn format_watts(value: Measured) -> String {
    match value {
        Measured::Value(mw) => format!("{:.1}W", mw as f64 / 1000.0),
        Measured::OutOfRange => OUT_OF_RANGE_MARKER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PowerReading, UpsStatus};

    fn host() -> HostSnapshot {
        HostSnapshot {
            ip_address: "192.168.1.20".to_string(),
            load_percent: 7,
            cpu_temp_c: 48.0,
            mem_used_mb: 412,
            mem_total_mb: 3410,
            disk_used_gb: 6,
            disk_total_gb: 29,
        }
    }

    fn reading(mv: i64, ma: Measured, mw: Measured) -> PowerReading {
        PowerReading {
            millivolts: mv,
            milliamps: ma,
            milliwatts: mw,
        }
    }

    fn power(battery_ma: Measured, battery_mw: Measured) -> PowerSnapshot {
        PowerSnapshot {
            host_rail: reading(5120, Measured::Value(640), Measured::Value(3277)),
            battery_rail: reading(3980, battery_ma, battery_mw),
            ups: Some(UpsStatus {
                usb_c_millivolts: 0,
                usb_micro_millivolts: 5050,
                battery_temp_c: 28,
                battery_remaining_percent: 76,
                auto_power_on: true,
            }),
        }
    }

    fn texts(commands: &[DrawCommand]) -> Vec<&str> {
        commands.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn host_page_layout() {
        let commands = render(&Snapshot::Host(host()));
        assert_eq!(
            texts(&commands),
            vec![
                "192.168.1.20",
                "CPU: 7% / 48.0C",
                "Mem: 412/3410 MB",
                "Disk: 6/29 GB"
            ]
        );
        let ys: Vec<i32> = commands.iter().map(|c| c.y).collect();
        assert_eq!(ys, LINE_Y.to_vec());
        assert!(commands.iter().all(|c| c.x == 0));
    }

    #[test]
    fn power_page_layout_while_charging() {
        let commands = render(&Snapshot::Power(power(
            Measured::Value(320),
            Measured::Value(1274),
        )));
        assert_eq!(
            texts(&commands),
            vec![
                "Pi: 5120mV 640mA",
                "Batt: 3980mV 76%",
                "Chrg: 320mA 1.3W",
                "Charging Micro USB"
            ]
        );
    }

    #[test]
    fn discharge_shows_magnitude() {
        let commands = render(&Snapshot::Power(power(
            Measured::Value(-150),
            Measured::Value(585),
        )));
        assert_eq!(commands[2].text, "Dchrg: 150mA 0.6W");
        assert!(!commands[2].text.contains("-150"));
    }

    #[test]
    fn zero_current_counts_as_charging_line() {
        let commands = render(&Snapshot::Power(power(Measured::Value(0), Measured::Value(0))));
        assert_eq!(commands[2].text, "Chrg: 0mA 0.0W");
    }

    #[test]
    fn out_of_range_fields_render_marker() {
        let mut snapshot = power(Measured::OutOfRange, Measured::OutOfRange);
        snapshot.host_rail.milliamps = Measured::OutOfRange;
        let commands = render(&Snapshot::Power(snapshot));
        assert_eq!(commands[0].text, "Pi: 5120mV OOR");
        assert_eq!(commands[2].text, "Chrg: OOR OOR");
    }

    #[test]
    fn ups_read_error_degrades_text() {
        let mut snapshot = power(Measured::Value(10), Measured::Value(40));
        snapshot.ups = None;
        let commands = render(&Snapshot::Power(snapshot));
        assert_eq!(commands[1].text, "Batt: 3980mV --%");
        assert_eq!(commands[3].text, "UPS read error");
    }

    #[test]
    fn render_is_pure() {
        let snapshot = Snapshot::Host(host());
        assert_eq!(render(&snapshot), render(&snapshot));
        let snapshot = Snapshot::Power(power(Measured::Value(-5), Measured::Value(20)));
        assert_eq!(render(&snapshot), render(&snapshot));
    }

    #[test]
    fn stopped_screen_is_single_line() {
        assert_eq!(
            render_stopped(),
            vec![DrawCommand {
                x: 0,
                y: 0,
                text: "STOPPED".to_string()
            }]
        );
    }
}
