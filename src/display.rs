use crate::render::DrawCommand;
use embedded_graphics::{
    mono_font::{ascii::FONT_6X13, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};
use embedded_hal::i2c::I2c;
use ssd1306::{prelude::*, I2CDisplayInterface, Ssd1306};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display init failed: {0}")]
    Init(String),
    #[error("display draw failed: {0}")]
    Draw(String),
    #[error("display commit failed: {0}")]
    Commit(String),
}

pub trait Display {
    fn clear(&mut self) -> Result<(), DisplayError>;
    fn draw_text(&mut self, x: i32, y: i32, text: &str) -> Result<(), DisplayError>;
    fn commit(&mut self) -> Result<(), DisplayError>;
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn clear(&mut self) -> Result<(), DisplayError> {
        (**self).clear()
    }

    fn draw_text(&mut self, x: i32, y: i32, text: &str) -> Result<(), DisplayError> {
        (**self).draw_text(x, y, text)
    }

    fn commit(&mut self) -> Result<(), DisplayError> {
        (**self).commit()
    }
}

pub fn show_frame<D: Display + ?Sized>(
    display: &mut D,
    commands: &[DrawCommand],
) -> Result<(), DisplayError> {
    display.clear()?;
    for cmd in commands {
        display.draw_text(cmd.x, cmd.y, &cmd.text)?;
    }
    display.commit()
}

type BufferedSsd1306<I2C> = Ssd1306<
    I2CInterface<I2C>,
    DisplaySize128x64,
    ssd1306::mode::BufferedGraphicsMode<DisplaySize128x64>,
>;

pub struct Ssd1306Display<I2C> {
    device: BufferedSsd1306<I2C>,
    style: MonoTextStyle<'static, BinaryColor>,
}

impl<I2C: I2c> Ssd1306Display<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Result<Self, DisplayError> {
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let mut device = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        device
            .init()
            .map_err(|e| DisplayError::Init(format!("{e:?}")))?;
        device.clear_buffer();
        device
            .flush()
            .map_err(|e| DisplayError::Init(format!("{e:?}")))?;
        Ok(Self {
            device,
            style: MonoTextStyle::new(&FONT_6X13, BinaryColor::On),
        })
    }
}

impl<I2C: I2c> Display for Ssd1306Display<I2C> {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.device.clear_buffer();
        Ok(())
    }

    fn draw_text(&mut self, x: i32, y: i32, text: &str) -> Result<(), DisplayError> {
        Text::with_baseline(text, Point::new(x, y), self.style, Baseline::Top)
            .draw(&mut self.device)
            .map_err(|e| DisplayError::Draw(format!("{e:?}")))?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DisplayError> {
        self.device
            .flush()
            .map_err(|e| DisplayError::Commit(format!("{e:?}")))
    }
}

#[derive(Debug, Default)]
pub struct LogDisplay {
    pending: Vec<DrawCommand>,
    frames: u64,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for LogDisplay {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.pending.clear();
        Ok(())
    }

    fn draw_text(&mut self, x: i32, y: i32, text: &str) -> Result<(), DisplayError> {
        self.pending.push(DrawCommand {
            x,
            y,
            text: text.to_string(),
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DisplayError> {
        self.frames += 1;
        let lines: Vec<&str> = self.pending.iter().map(|c| c.text.as_str()).collect();
        info!(frame = self.frames, lines = ?lines, "display frame");
        Ok(())
    }
}
