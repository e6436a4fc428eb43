use crate::collectors::power::{PowerMonitor, RangeError};
use embedded_hal::i2c::I2c;

mod reg {
    pub const CONFIG: u8 = 0x00;
    pub const BUS_VOLTAGE: u8 = 0x02;
    pub const POWER: u8 = 0x03;
    pub const CURRENT: u8 = 0x04;
    pub const CALIBRATION: u8 = 0x05;
}

// 32 V bus range.
const CONFIG_BRNG_32V: u16 = 1 << 13;
// 12-bit, single sample for both bus and shunt ADCs.
const CONFIG_ADC_12BIT: u16 = 0b0011;
// Shunt and bus, continuous.
const CONFIG_MODE_CONTINUOUS: u16 = 0b111;

// Bus voltage register: math overflow flag.
const BUS_VOLTAGE_OVF: u16 = 1 << 0;
const BUS_VOLTAGE_LSB_MV: f64 = 4.0;

const CALIBRATION_SCALE: f64 = 0.04096;
const CALIBRATION_MAX: f64 = 65534.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    Mv40,
    Mv80,
    Mv160,
    Mv320,
}

impl Gain {
    pub fn from_millivolts(mv: u16) -> Option<Self> {
        match mv {
            40 => Some(Gain::Mv40),
            80 => Some(Gain::Mv80),
            160 => Some(Gain::Mv160),
            320 => Some(Gain::Mv320),
            _ => None,
        }
    }

    fn bits(self) -> u16 {
        match self {
            Gain::Mv40 => 0b00,
            Gain::Mv80 => 0b01,
            Gain::Mv160 => 0b10,
            Gain::Mv320 => 0b11,
        }
    }

    fn full_scale_volts(self) -> f64 {
        match self {
            Gain::Mv40 => 0.04,
            Gain::Mv80 => 0.08,
            Gain::Mv160 => 0.16,
            Gain::Mv320 => 0.32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub register: u16,
    pub current_lsb: f64,
    pub power_lsb: f64,
}

impl Calibration {
    // None when the calibration register cannot encode the requested current LSB
    pub fn compute(shunt_ohms: f64, gain: Gain, max_expected_amps: Option<f64>) -> Option<Self> {
        let max_amps = max_expected_amps.unwrap_or(gain.full_scale_volts() / shunt_ohms);
        let current_lsb = max_amps / 32767.0;
        let raw = (CALIBRATION_SCALE / (current_lsb * shunt_ohms)).trunc();
        // bit 0 of the calibration register is read-only and always zero
        if !(2.0..=CALIBRATION_MAX).contains(&raw) {
            return None;
        }
        Some(Self {
            register: (raw as u16) & !1,
            current_lsb,
            power_lsb: current_lsb * 20.0,
        })
    }
}

pub struct Ina219<I2C> {
    i2c: I2C,
    address: u8,
    gain: Gain,
    calibration: Calibration,
}

impl<I2C: I2c> Ina219<I2C> {
    pub fn new(i2c: I2C, address: u8, gain: Gain, calibration: Calibration) -> Self {
        Self {
            i2c,
            address,
            gain,
            calibration,
        }
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn configure(&mut self) -> Result<(), I2C::Error> {
        let config = CONFIG_BRNG_32V
            | (self.gain.bits() << 11)
            | (CONFIG_ADC_12BIT << 7)
            | (CONFIG_ADC_12BIT << 3)
            | CONFIG_MODE_CONTINUOUS;
        self.write_register(reg::CONFIG, config)?;
        self.write_register(reg::CALIBRATION, self.calibration.register)
    }

    fn write_register(&mut self, register: u8, value: u16) -> Result<(), I2C::Error> {
        let [hi, lo] = value.to_be_bytes();
        self.i2c.write(self.address, &[register, hi, lo])
    }

    fn read_register(&mut self, register: u8) -> Result<u16, I2C::Error> {
        let mut buf = [0_u8; 2];
        self.i2c.write_read(self.address, &[register], &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn check_overflow(&mut self) -> Result<(), RangeError<I2C::Error>> {
        let bus = self.read_register(reg::BUS_VOLTAGE).map_err(RangeError::Bus)?;
        if bus & BUS_VOLTAGE_OVF != 0 {
            return Err(RangeError::OutOfRange);
        }
        Ok(())
    }
}

impl<I2C: I2c> PowerMonitor for Ina219<I2C> {
    type Error = I2C::Error;

    fn voltage(&mut self) -> Result<f64, Self::Error> {
        let raw = self.read_register(reg::BUS_VOLTAGE)?;
        Ok(f64::from(raw >> 3) * BUS_VOLTAGE_LSB_MV / 1000.0)
    }

    fn current(&mut self) -> Result<f64, RangeError<Self::Error>> {
        self.check_overflow()?;
        let raw = self.read_register(reg::CURRENT).map_err(RangeError::Bus)? as i16;
        Ok(f64::from(raw) * self.calibration.current_lsb * 1000.0)
    }

    fn power(&mut self) -> Result<f64, RangeError<Self::Error>> {
        self.check_overflow()?;
        let raw = self.read_register(reg::POWER).map_err(RangeError::Bus)?;
        Ok(f64::from(raw) * self.calibration.power_lsb * 1000.0)
    }
}
