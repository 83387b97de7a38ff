//! The clock the machine suspends on.
//!
//! `WAIT` either sleeps for a number of seconds or blocks until the wall
//! clock matches a time pattern. The trait keeps the machine testable:
//! the fake clock records calls instead of sleeping.

use std::thread;
use std::time::Duration;

use chrono::{Local, Timelike};

use crate::time_pattern::TimePattern;

pub trait Clock {
    /// Called once when a run starts.
    fn start(&mut self) {}
    /// Called when a run finishes or is stopped.
    fn stop(&mut self) {}
    fn pause_for(&mut self, seconds: f64);
    fn wait_until(&mut self, pattern: &TimePattern);
}

/// Real time: sleeps on the current thread and polls the local wall clock
/// once per minute for pattern matches.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn pause_for(&mut self, seconds: f64) {
        if seconds > 0.0 {
            thread::sleep(Duration::from_secs_f64(seconds));
        }
    }

    fn wait_until(&mut self, pattern: &TimePattern) {
        loop {
            let now = Local::now();
            if pattern.matches(now.hour(), now.minute()) {
                return;
            }
            let to_next_minute = 60 - now.second().min(59) as u64;
            thread::sleep(Duration::from_secs(to_next_minute));
        }
    }
}
