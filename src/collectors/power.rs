use crate::state::{Measured, PowerReading};
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RangeError<E: fmt::Debug> {
    #[error("reading exceeds calibrated range")]
    OutOfRange,
    #[error("bus error: {0:?}")]
    Bus(E),
}

pub trait PowerMonitor {
    type Error: fmt::Debug;

    fn voltage(&mut self) -> Result<f64, Self::Error>;
    // Current in milliamps; negative while the rail is discharging.
    fn current(&mut self) -> Result<f64, RangeError<Self::Error>>;
    fn power(&mut self) -> Result<f64, RangeError<Self::Error>>;
}

pub struct PowerMonitorReader<M> {
    rail: &'static str,
    monitor: M,
}

impl<M: PowerMonitor> PowerMonitorReader<M> {
    pub fn new(rail: &'static str, monitor: M) -> Self {
        Self { rail, monitor }
    }

    pub fn rail(&self) -> &'static str {
        self.rail
    }

    // Voltage is read first; a range error on current or power masks both.
    pub fn sample(&mut self) -> Result<PowerReading, M::Error> {
        let volts = self.monitor.voltage()?;
        let millivolts = (volts * 1000.0).round() as i64;

        let measured = self
            .monitor
            .current()
            .and_then(|ma| self.monitor.power().map(|mw| (ma, mw)));
        let (milliamps, milliwatts) = match measured {
            Ok((ma, mw)) => (
                Measured::Value(ma.round() as i64),
                Measured::Value(mw.round() as i64),
            ),
            Err(RangeError::OutOfRange) => {
                debug!(rail = self.rail, millivolts, "power monitor out of range");
                (Measured::OutOfRange, Measured::OutOfRange)
            }
            Err(RangeError::Bus(err)) => return Err(err),
        };

        Ok(PowerReading {
            millivolts,
            milliamps,
            milliwatts,
        })
    }
}
