//! Simulated vehicle shared by every session
//!
//! The model holds speed, battery, temperature and heading. Admin sessions
//! change speed and heading through guarded mutators; the telemetry
//! broadcaster advances battery drain and heating once per tick.
//! All operations take the same lock, so each one is atomic with respect to
//! the others, and a rejected mutation leaves the previous state untouched.

use crate::error::SpeedError;
use shared::{Direction, VehicleSnapshot};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const MAX_SPEED: i32 = 100;
/// Speed changes are refused below this battery level
pub const MIN_DRIVE_BATTERY: u8 = 15;
/// At or above this speed the battery drains twice as fast
pub const HIGH_DRAIN_SPEED: u8 = 60;
/// Above this speed the motor heats up
pub const HEATING_SPEED: u8 = 70;
pub const MAX_TEMP: i32 = 80;
pub const AMBIENT_TEMP: i32 = 35;

/// Plain vehicle state; [`Vehicle`] wraps it in a mutex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleState {
    speed: u8,
    battery: u8,
    temp: i32,
    dir: Direction,
}

impl Default for VehicleState {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleState {
    /// Startup state: parked, fully charged, at ambient temperature, facing north
    pub fn new() -> Self {
        Self {
            speed: 0,
            battery: 100,
            temp: AMBIENT_TEMP,
            dir: Direction::N,
        }
    }

    /// Restores a state from a snapshot, clamping speed and battery to 0..=100
    pub fn from_snapshot(snapshot: VehicleSnapshot) -> Self {
        Self {
            speed: snapshot.speed.min(MAX_SPEED as u8),
            battery: snapshot.battery.min(100),
            temp: snapshot.temp,
            dir: snapshot.dir,
        }
    }

    /// Applies a speed change, returning the new speed.
    ///
    /// Refused with [`SpeedError::BatteryLow`] when the battery is under 15,
    /// and with `MinSpeed`/`MaxSpeed` when the result would leave 0..=100.
    pub fn apply_speed_delta(&mut self, delta: i32) -> Result<u8, SpeedError> {
        if self.battery < MIN_DRIVE_BATTERY {
            return Err(SpeedError::BatteryLow);
        }

        let next = i32::from(self.speed) + delta;
        if next < 0 {
            return Err(SpeedError::MinSpeed);
        }
        if next > MAX_SPEED {
            return Err(SpeedError::MaxSpeed);
        }

        self.speed = next as u8;
        Ok(self.speed)
    }

    /// Rotates the heading one quadrant and returns the new heading
    pub fn apply_turn(&mut self, left: bool) -> Direction {
        self.dir = if left { self.dir.left() } else { self.dir.right() };
        self.dir
    }

    /// Advances the simulated physics by one broadcaster tick
    pub fn tick(&mut self) {
        if self.speed > 0 && self.battery > 0 {
            let drain = if self.speed >= HIGH_DRAIN_SPEED { 2 } else { 1 };
            self.battery = self.battery.saturating_sub(drain);
        }

        if self.speed > HEATING_SPEED && self.temp < MAX_TEMP {
            self.temp += 1;
        } else if self.temp > AMBIENT_TEMP {
            self.temp -= 1;
        }
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            speed: self.speed,
            battery: self.battery,
            temp: self.temp,
            dir: self.dir,
        }
    }
}

/// Process-wide vehicle guarded by one mutex.
///
/// The lock is only held for the duration of a read or mutation and never
/// across I/O.
#[derive(Debug, Default)]
pub struct Vehicle {
    state: Mutex<VehicleState>,
}

impl Vehicle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: VehicleState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VehicleState> {
        // Every mutation is a single assignment, so a poisoned guard is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply_speed_delta(&self, delta: i32) -> Result<u8, SpeedError> {
        self.lock().apply_speed_delta(delta)
    }

    pub fn apply_turn(&self, left: bool) -> Direction {
        self.lock().apply_turn(left)
    }

    pub fn tick(&self) {
        self.lock().tick();
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        self.lock().snapshot()
    }

    /// Ticks and reads under one lock, so the snapshot reflects exactly that tick
    pub fn tick_and_snapshot(&self) -> VehicleSnapshot {
        let mut state = self.lock();
        state.tick();
        state.snapshot()
    }
}
