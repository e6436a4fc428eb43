use crate::state::{HostSnapshot, PowerReading, PowerSnapshot, Snapshot};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub host_load_percent: Gauge,
    pub host_cpu_temperature_celsius: Gauge,
    pub host_memory_used_megabytes: Gauge,
    pub host_memory_total_megabytes: Gauge,
    pub host_disk_used_gigabytes: Gauge,
    pub host_disk_total_gigabytes: Gauge,
    pub rail_millivolts: GaugeVec,
    pub rail_milliamps: GaugeVec,
    pub rail_milliwatts: GaugeVec,
    pub ups_usb_c_millivolts: Gauge,
    pub ups_usb_micro_millivolts: Gauge,
    pub ups_battery_remaining_percent: Gauge,
    pub ups_battery_temperature_celsius: Gauge,
    pub ups_auto_power_on: Gauge,
    pub ups_charging: GaugeVec,
    pub display_page: GaugeVec,
    pub ticks_total: CounterVec,
    pub register_read_errors_total: Counter,
    pub out_of_range_total: CounterVec,
    pub scrape_count_total: Counter,
    pub last_sample_timestamp_seconds: Gauge,
}

const RAILS: [&str; 2] = ["host", "battery"];
const PAGES: [&str; 2] = ["host", "power"];

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let host_load_percent = Gauge::with_opts(opts!(
            "ups_host_load_percent",
            "1-minute load average normalized to core count, in percent"
        ))?;
        let host_cpu_temperature_celsius = Gauge::with_opts(opts!(
            "ups_host_cpu_temperature_celsius",
            "CPU temperature in Celsius"
        ))?;
        let host_memory_used_megabytes = Gauge::with_opts(opts!(
            "ups_host_memory_used_megabytes",
            "Used memory in MB"
        ))?;
        let host_memory_total_megabytes = Gauge::with_opts(opts!(
            "ups_host_memory_total_megabytes",
            "Memory total as shown on the display (available memory) in MB"
        ))?;
        let host_disk_used_gigabytes = Gauge::with_opts(opts!(
            "ups_host_disk_used_gigabytes",
            "Root filesystem used space in GB"
        ))?;
        let host_disk_total_gigabytes = Gauge::with_opts(opts!(
            "ups_host_disk_total_gigabytes",
            "Root filesystem size in GB"
        ))?;
        let rail_millivolts = GaugeVec::new(
            opts!("ups_rail_millivolts", "Bus voltage by rail in mV"),
            &["rail"],
        )?;
        let rail_milliamps = GaugeVec::new(
            opts!(
                "ups_rail_milliamps",
                "Current by rail in mA, negative while discharging"
            ),
            &["rail"],
        )?;
        let rail_milliwatts = GaugeVec::new(
            opts!("ups_rail_milliwatts", "Power by rail in mW"),
            &["rail"],
        )?;
        let ups_usb_c_millivolts = Gauge::with_opts(opts!(
            "ups_usb_c_millivolts",
            "USB-C input voltage in mV"
        ))?;
        let ups_usb_micro_millivolts = Gauge::with_opts(opts!(
            "ups_usb_micro_millivolts",
            "Micro-USB input voltage in mV"
        ))?;
        let ups_battery_remaining_percent = Gauge::with_opts(opts!(
            "ups_battery_remaining_percent",
            "Battery remaining capacity in percent"
        ))?;
        let ups_battery_temperature_celsius = Gauge::with_opts(opts!(
            "ups_battery_temperature_celsius",
            "Battery temperature in Celsius"
        ))?;
        let ups_auto_power_on = Gauge::with_opts(opts!(
            "ups_auto_power_on",
            "1 when the UPS powers the host back on once external power returns"
        ))?;
        let ups_charging = GaugeVec::new(
            opts!(
                "ups_charging_state",
                "1 for the current charging state, 0 otherwise"
            ),
            &["state"],
        )?;
        let display_page = GaugeVec::new(
            opts!("ups_display_page", "1 for the page currently shown"),
            &["page"],
        )?;
        let ticks_total = CounterVec::new(
            opts!("ups_ticks_total", "Display cycle ticks by page"),
            &["page"],
        )?;
        let register_read_errors_total = Counter::with_opts(opts!(
            "ups_register_read_errors_total",
            "Failed UPS register block reads"
        ))?;
        let out_of_range_total = CounterVec::new(
            opts!(
                "ups_monitor_out_of_range_total",
                "Power monitor readings outside the calibrated range, by rail"
            ),
            &["rail"],
        )?;
        let scrape_count_total = Counter::with_opts(opts!(
            "ups_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let last_sample_timestamp_seconds = Gauge::with_opts(opts!(
            "ups_last_sample_timestamp_seconds",
            "Unix time of the last sample"
        ))?;

        register(&registry, &host_load_percent)?;
        register(&registry, &host_cpu_temperature_celsius)?;
        register(&registry, &host_memory_used_megabytes)?;
        register(&registry, &host_memory_total_megabytes)?;
        register(&registry, &host_disk_used_gigabytes)?;
        register(&registry, &host_disk_total_gigabytes)?;
        register(&registry, &rail_millivolts)?;
        register(&registry, &rail_milliamps)?;
        register(&registry, &rail_milliwatts)?;
        register(&registry, &ups_usb_c_millivolts)?;
        register(&registry, &ups_usb_micro_millivolts)?;
        register(&registry, &ups_battery_remaining_percent)?;
        register(&registry, &ups_battery_temperature_celsius)?;
        register(&registry, &ups_auto_power_on)?;
        register(&registry, &ups_charging)?;
        register(&registry, &display_page)?;
        register(&registry, &ticks_total)?;
        register(&registry, &register_read_errors_total)?;
        register(&registry, &out_of_range_total)?;
        register(&registry, &scrape_count_total)?;
        register(&registry, &last_sample_timestamp_seconds)?;

        // pre-create labelled series so they show up before the first event
        for rail in RAILS {
            out_of_range_total.with_label_values(&[rail]);
        }
        for page in PAGES {
            ticks_total.with_label_values(&[page]);
        }

        Ok(Arc::new(Self {
            registry,
            host_load_percent,
            host_cpu_temperature_celsius,
            host_memory_used_megabytes,
            host_memory_total_megabytes,
            host_disk_used_gigabytes,
            host_disk_total_gigabytes,
            rail_millivolts,
            rail_milliamps,
            rail_milliwatts,
            ups_usb_c_millivolts,
            ups_usb_micro_millivolts,
            ups_battery_remaining_percent,
            ups_battery_temperature_celsius,
            ups_auto_power_on,
            ups_charging,
            display_page,
            ticks_total,
            register_read_errors_total,
            out_of_range_total,
            scrape_count_total,
            last_sample_timestamp_seconds,
        }))
    }

    pub fn record_snapshot(&self, snapshot: &Snapshot) {
        let page = snapshot.page().as_str();
        self.ticks_total.with_label_values(&[page]).inc();
        for p in PAGES {
            self.display_page
                .with_label_values(&[p])
                .set(if p == page { 1.0 } else { 0.0 });
        }
        self.last_sample_timestamp_seconds.set(now_unix() as f64);

        match snapshot {
            Snapshot::Host(host) => self.record_host(host),
            Snapshot::Power(power) => self.record_power(power),
        }
    }

    fn record_host(&self, host: &HostSnapshot) {
        self.host_load_percent.set(f64::from(host.load_percent));
        self.host_cpu_temperature_celsius.set(host.cpu_temp_c);
        self.host_memory_used_megabytes.set(host.mem_used_mb as f64);
        self.host_memory_total_megabytes
            .set(host.mem_total_mb as f64);
        self.host_disk_used_gigabytes.set(host.disk_used_gb as f64);
        self.host_disk_total_gigabytes
            .set(host.disk_total_gb as f64);
    }

    fn record_power(&self, power: &PowerSnapshot) {
        self.record_rail("host", &power.host_rail);
        self.record_rail("battery", &power.battery_rail);

        let state = power.charging_state();
        for candidate in [
            crate::state::ChargingState::ChargingUsbC,
            crate::state::ChargingState::ChargingMicroUsb,
            crate::state::ChargingState::NotCharging,
            crate::state::ChargingState::UpsReadError,
        ] {
            self.ups_charging
                .with_label_values(&[candidate.label()])
                .set(if candidate == state { 1.0 } else { 0.0 });
        }

        match &power.ups {
            Some(ups) => {
                self.ups_usb_c_millivolts
                    .set(f64::from(ups.usb_c_millivolts));
                self.ups_usb_micro_millivolts
                    .set(f64::from(ups.usb_micro_millivolts));
                self.ups_battery_remaining_percent
                    .set(f64::from(ups.battery_remaining_percent));
                self.ups_battery_temperature_celsius
                    .set(f64::from(ups.battery_temp_c));
                self.ups_auto_power_on
                    .set(if ups.auto_power_on { 1.0 } else { 0.0 });
            }
            None => self.register_read_errors_total.inc(),
        }
    }

    fn record_rail(&self, rail: &str, reading: &PowerReading) {
        self.rail_millivolts
            .with_label_values(&[rail])
            .set(reading.millivolts as f64);
        match (reading.milliamps.value(), reading.milliwatts.value()) {
            (Some(ma), Some(mw)) => {
                self.rail_milliamps.with_label_values(&[rail]).set(ma as f64);
                self.rail_milliwatts.with_label_values(&[rail]).set(mw as f64);
            }
            _ => {
                // keep the previous values; the counter records the gap
                self.out_of_range_total.with_label_values(&[rail]).inc();
            }
        }
    }

    pub fn inc_scrape_count(&self) {
        self.scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Measured, UpsStatus};

    fn encoded(metrics: &Metrics) -> String {
        String::from_utf8(metrics.encode_metrics().expect("encode")).expect("utf8")
    }

    fn power(ups: Option<UpsStatus>, battery_ma: Measured) -> Snapshot {
        Snapshot::Power(PowerSnapshot {
            host_rail: PowerReading {
                millivolts: 5100,
                milliamps: Measured::Value(700),
                milliwatts: Measured::Value(3570),
            },
            battery_rail: PowerReading {
                millivolts: 3900,
                milliamps: battery_ma,
                milliwatts: battery_ma,
            },
            ups,
        })
    }

    #[test]
    fn power_snapshot_sets_rail_gauges() {
        let metrics = Metrics::new().expect("metrics");
        metrics.record_snapshot(&power(
            Some(UpsStatus {
                usb_c_millivolts: 5020,
                usb_micro_millivolts: 0,
                battery_temp_c: 30,
                battery_remaining_percent: 64,
                auto_power_on: false,
            }),
            Measured::Value(-200),
        ));

        assert_eq!(metrics.rail_millivolts.with_label_values(&["host"]).get(), 5100.0);
        assert_eq!(metrics.rail_milliamps.with_label_values(&["battery"]).get(), -200.0);
        assert_eq!(metrics.ups_battery_remaining_percent.get(), 64.0);
        assert_eq!(
            metrics
                .ups_charging
                .with_label_values(&["Charging USB C"])
                .get(),
            1.0
        );
        assert_eq!(metrics.ticks_total.with_label_values(&["power"]).get(), 1.0);
        assert_eq!(metrics.register_read_errors_total.get(), 0.0);
    }

    #[test]
    fn read_errors_and_out_of_range_are_counted() {
        let metrics = Metrics::new().expect("metrics");
        metrics.record_snapshot(&power(None, Measured::OutOfRange));
        metrics.record_snapshot(&power(None, Measured::OutOfRange));

        assert_eq!(metrics.register_read_errors_total.get(), 2.0);
        assert_eq!(
            metrics.out_of_range_total.with_label_values(&["battery"]).get(),
            2.0
        );
        assert_eq!(
            metrics.out_of_range_total.with_label_values(&["host"]).get(),
            0.0
        );
    }

    #[test]
    fn host_snapshot_selects_host_page() {
        let metrics = Metrics::new().expect("metrics");
        metrics.record_snapshot(&Snapshot::Host(HostSnapshot {
            ip_address: "eth0 NA".into(),
            load_percent: 42,
            cpu_temp_c: 51.5,
            mem_used_mb: 300,
            mem_total_mb: 700,
            disk_used_gb: 4,
            disk_total_gb: 15,
        }));

        assert_eq!(metrics.host_load_percent.get(), 42.0);
        assert_eq!(metrics.display_page.with_label_values(&["host"]).get(), 1.0);
        assert_eq!(metrics.display_page.with_label_values(&["power"]).get(), 0.0);
        let text = encoded(&metrics);
        assert!(text.contains("ups_host_cpu_temperature_celsius 51.5"));
    }
}
