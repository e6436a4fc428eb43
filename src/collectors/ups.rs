use crate::state::UpsStatus;
use embedded_hal::i2c::I2c;
use thiserror::Error;

pub const REGISTER_BLOCK_START: u8 = 0x00;
pub const REGISTER_BLOCK_LEN: usize = 32;

pub const REG_USB_C_MILLIVOLTS: usize = 0x07;
pub const REG_USB_MICRO_MILLIVOLTS: usize = 0x09;
pub const REG_BATTERY_TEMP_C: usize = 0x0B;
pub const REG_BATTERY_REMAINING_PERCENT: usize = 0x13;
pub const REG_AUTO_POWER_ON: usize = 0x19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    Byte,
    Word,
}

impl FieldWidth {
    pub fn bytes(self) -> usize {
        match self {
            FieldWidth::Byte => 1,
            FieldWidth::Word => 2,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("register block too short: field at 0x{offset:02x} needs {width} bytes, block has {len}")]
    ShortBuffer {
        offset: usize,
        width: usize,
        len: usize,
    },
}

#[derive(Debug, Error)]
pub enum UpsError<E: core::fmt::Debug> {
    #[error("UPS register read failed: {0:?}")]
    Bus(E),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

// Decodes an unsigned little-endian field. Any value is accepted; the protocol has no checksum.
pub fn decode_field(bytes: &[u8], offset: usize, width: FieldWidth) -> Result<u16, DecodeError> {
    let end = offset
        .checked_add(width.bytes())
        .filter(|end| *end <= bytes.len())
        .ok_or(DecodeError::ShortBuffer {
            offset,
            width: width.bytes(),
            len: bytes.len(),
        })?;
    let field = &bytes[offset..end];
    Ok(match width {
        FieldWidth::Byte => u16::from(field[0]),
        FieldWidth::Word => u16::from_le_bytes([field[0], field[1]]),
    })
}

impl UpsStatus {
    pub fn decode(block: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            usb_c_millivolts: decode_field(block, REG_USB_C_MILLIVOLTS, FieldWidth::Word)?,
            usb_micro_millivolts: decode_field(block, REG_USB_MICRO_MILLIVOLTS, FieldWidth::Word)?,
            battery_temp_c: decode_field(block, REG_BATTERY_TEMP_C, FieldWidth::Word)?,
            battery_remaining_percent: decode_field(
                block,
                REG_BATTERY_REMAINING_PERCENT,
                FieldWidth::Word,
            )?,
            auto_power_on: decode_field(block, REG_AUTO_POWER_ON, FieldWidth::Byte)? != 0,
        })
    }
}

pub fn read_ups_status<I: I2c>(i2c: &mut I, address: u8) -> Result<UpsStatus, UpsError<I::Error>> {
    let mut block = [0_u8; REGISTER_BLOCK_LEN];
    i2c.write_read(address, &[REGISTER_BLOCK_START], &mut block)
        .map_err(UpsError::Bus)?;
    Ok(UpsStatus::decode(&block)?)
}
