use crate::collectors::{SampleError, Sampler};
use crate::display::{show_frame, Display, DisplayError};
use crate::metrics::Metrics;
use crate::render::{render, render_stopped};
use crate::state::DisplayPage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSettings {
    pub tick_interval: Duration,
    pub page_switch_threshold: u32,
    pub cycle_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Sample(#[from] SampleError),
    #[error(transparent)]
    Display(#[from] DisplayError),
}

#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub fn page_for(counter: u32, page_switch_threshold: u32) -> DisplayPage {
    if counter < page_switch_threshold {
        DisplayPage::Host
    } else {
        DisplayPage::Power
    }
}

pub struct CycleScheduler<S, D, Z> {
    settings: CycleSettings,
    sampler: S,
    display: D,
    sleeper: Z,
    metrics: Arc<Metrics>,
    stop: StopFlag,
    state: CycleState,
    counter: u32,
}

impl<S, D, Z> CycleScheduler<S, D, Z>
where
    S: Sampler,
    D: Display,
    Z: Sleeper,
{
    pub fn new(
        settings: CycleSettings,
        sampler: S,
        display: D,
        sleeper: Z,
        metrics: Arc<Metrics>,
        stop: StopFlag,
    ) -> Self {
        Self {
            settings,
            sampler,
            display,
            sleeper,
            metrics,
            stop,
            state: CycleState::Running,
            counter: 0,
        }
    }

    pub fn run(&mut self) -> Result<(), CycleError> {
        info!(
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            page_switch_threshold = self.settings.page_switch_threshold,
            cycle_length = self.settings.cycle_length,
            "display cycle started"
        );
        loop {
            match self.state {
                CycleState::Running => {
                    if self.stop.is_set() {
                        info!("stop requested, finishing display cycle");
                        self.state = CycleState::Stopping;
                        continue;
                    }
                    self.tick()?;
                }
                CycleState::Stopping => {
                    show_frame(&mut self.display, &render_stopped())?;
                    self.state = CycleState::Stopped;
                }
                CycleState::Stopped => {
                    info!("display cycle stopped");
                    return Ok(());
                }
            }
        }
    }

    fn tick(&mut self) -> Result<(), CycleError> {
        let page = page_for(self.counter, self.settings.page_switch_threshold);
        debug!(counter = self.counter, page = page.as_str(), "tick");

        let snapshot = self.sampler.sample(page)?;
        self.metrics.record_snapshot(&snapshot);
        show_frame(&mut self.display, &render(&snapshot))?;

        self.sleeper.sleep(self.settings.tick_interval);
        self.counter = (self.counter + 1) % self.settings.cycle_length;
        Ok(())
    }
}
