//! Clock
//!
//! The time driver of a slot graph. A [`Clock`] owns a `time` slot and a
//! `frame` slot; anything time-dependent connects to them or reads them
//! from a procedural slot. Each [`step`](Clock::step) advances both, which
//! invalidates every downstream slot, then notifies the `on_frame_step`
//! observers.
//!
//! The clock is an explicit handle. Whatever drives playback (a timer, a
//! render loop, a test) owns it and decides when to step.
//!
//! ```rust
//! use tether_core::clock::Clock;
//! use tether_core::config::EngineConfig;
//! use tether_core::slot::Slot;
//!
//! let clock = Clock::new(&EngineConfig::default()).unwrap();
//! let time = clock.time();
//! let doubled = Slot::procedural(move || Ok(time.get()? * 2.0));
//!
//! clock.seek(1.5).unwrap();
//! assert_eq!(doubled.get().unwrap(), 3.0);
//! ```

use tracing::debug;

use crate::config::{ClockConfig, EngineConfig, SlotConfig};
use crate::error::{Result, SlotError};
use crate::event::Observers;
use crate::slot::{Slot, SlotValue};

/// Reported to `on_frame_step` observers after each step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStep {
    pub frame: i64,
    pub time: f64,
    /// Seconds since the previous step or seek.
    pub dt: f64,
}

/// Owns the time and frame driver slots.
#[derive(Debug)]
pub struct Clock {
    config: ClockConfig,
    slots: SlotConfig,
    time: Slot<f64>,
    frame: Slot<i64>,
    on_frame_step: Observers<FrameStep>,
}

impl Clock {
    /// Create a clock at frame zero.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let clock = config.clock;
        Ok(Self {
            config: clock,
            slots: config.slots,
            time: Slot::with_config(clock.start, config.slots),
            frame: Slot::with_config(0, config.slots),
            on_frame_step: Observers::new(),
        })
    }

    /// The time slot, in seconds.
    pub fn time(&self) -> Slot<f64> {
        self.time.clone()
    }

    pub fn frame(&self) -> Slot<i64> {
        self.frame.clone()
    }

    pub fn current_time(&self) -> Result<f64> {
        self.time.get_untracked()
    }

    pub fn current_frame(&self) -> Result<i64> {
        self.frame.get_untracked()
    }

    /// Advance one frame.
    pub fn step(&self) -> Result<FrameStep> {
        let frame = self.current_frame()? + 1;
        let time = self.config.start + frame as f64 * self.config.step;
        self.advance(frame, time)
    }

    /// Move to `time`, and to the frame containing it.
    ///
    /// Fails with [`SlotError::Config`] when `time` is not finite.
    pub fn seek(&self, time: f64) -> Result<FrameStep> {
        if !time.is_finite() {
            return Err(SlotError::Config(format!("seek time {time} is not finite")));
        }
        let frame = ((time - self.config.start) / self.config.step).floor() as i64;
        self.advance(frame, time)
    }

    fn advance(&self, frame: i64, time: f64) -> Result<FrameStep> {
        let previous = self.current_time()?;
        self.frame.set(frame)?;
        self.time.set(time)?;

        let step = FrameStep {
            frame,
            time,
            dt: time - previous,
        };
        debug!(frame, time, "clock step");
        self.on_frame_step.emit(&step);
        Ok(step)
    }

    /// Observers notified after every step or seek, once the invalidation
    /// cascade has finished.
    pub fn on_frame_step(&self) -> &Observers<FrameStep> {
        &self.on_frame_step
    }

    /// Create a plain slot with the engine's slot configuration.
    pub fn slot<T: SlotValue>(&self, value: T) -> Slot<T> {
        Slot::with_config(value, self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::connect;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn clock() -> Clock {
        let config = EngineConfig {
            clock: ClockConfig {
                start: 0.0,
                step: 0.5,
            },
            ..EngineConfig::default()
        };
        Clock::new(&config).unwrap()
    }

    #[test]
    fn step_advances_time_and_frame() {
        let clock = clock();
        let step = clock.step().unwrap();
        assert_eq!(step, FrameStep { frame: 1, time: 0.5, dt: 0.5 });

        clock.step().unwrap();
        assert_eq!(clock.current_frame().unwrap(), 2);
        assert_eq!(clock.current_time().unwrap(), 1.0);
    }

    #[test]
    fn step_invalidates_connected_slots() {
        let clock = clock();
        let follower = clock.slot(0.0_f64);
        connect(&clock.time(), &follower).unwrap();
        assert_eq!(follower.get().unwrap(), 0.0);

        clock.step().unwrap();
        assert!(!follower.is_cache_valid());
        assert_eq!(follower.get().unwrap(), 0.5);
    }

    #[test]
    fn observers_run_after_each_step() {
        let clock = clock();
        let frames = Arc::new(AtomicI32::new(0));
        let f = frames.clone();
        clock.on_frame_step().subscribe(move |step| {
            f.store(step.frame as i32, Ordering::SeqCst);
        });

        clock.step().unwrap();
        clock.step().unwrap();
        assert_eq!(frames.load(Ordering::SeqCst), 2);

        clock.seek(10.2).unwrap();
        assert_eq!(frames.load(Ordering::SeqCst), 20);
        assert_eq!(clock.current_time().unwrap(), 10.2);
    }

    #[test]
    fn controlled_time_slot_rejects_step() {
        let clock = clock();
        let other = Slot::new(3.0_f64);
        connect(&other, &clock.time()).unwrap();
        assert!(clock.step().is_err());
    }

    #[test]
    fn seek_rejects_non_finite_time() {
        let clock = clock();
        clock.seek(2.0).unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(clock.seek(bad), Err(SlotError::Config(_))));
        }
        assert_eq!(clock.current_time().unwrap(), 2.0);
        assert_eq!(clock.current_frame().unwrap(), 4);
    }
}
