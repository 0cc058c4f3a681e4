// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Simulated flame sensors for running without hardware

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use rand::prelude::*;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

use crate::config::SimulationConfig;
use crate::core::{AlertEngine, Origin, CLEAR, SLOT_COUNT, TRIPPED};

/// What one simulator tick produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimTick {
    /// Drive `slot` to tripped and clear it later
    Fire { slot: usize },
    /// Routine reading
    Routine { sensors: [u8; SLOT_COUNT] },
}

/// Generates plausible sensor behavior
pub struct SensorSimulator {
    rng: StdRng,
    fire_probability: f64,
    flip_probability: f64,
    /// Slots tripped by a simulated fire and awaiting their auto-clear
    held: [bool; SLOT_COUNT],
}

impl SensorSimulator {
    pub fn new(config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            fire_probability: config.fire_probability.clamp(0.0, 1.0),
            flip_probability: config.flip_probability.clamp(0.0, 1.0),
            held: [false; SLOT_COUNT],
        }
    }

    pub fn tick(&mut self, current: [u8; SLOT_COUNT]) -> SimTick {
        if self.rng.gen_bool(self.fire_probability) {
            let slot = self.rng.gen_range(0..SLOT_COUNT);
            self.held[slot] = true;
            return SimTick::Fire { slot };
        }

        let mut sensors = [CLEAR; SLOT_COUNT];
        for (slot, value) in sensors.iter_mut().enumerate() {
            *value = if self.held[slot] {
                current[slot]
            } else if self.rng.gen_bool(self.flip_probability) {
                TRIPPED
            } else {
                CLEAR
            };
        }
        SimTick::Routine { sensors }
    }

    /// The auto-clear for `slot` fired
    pub fn release(&mut self, slot: usize) {
        if let Some(held) = self.held.get_mut(slot) {
            *held = false;
        }
    }

    pub fn is_held(&self, slot: usize) -> bool {
        self.held.get(slot).copied().unwrap_or(false)
    }
}

type PendingClear = Pin<Box<dyn Future<Output = usize> + Send>>;

/// A running simulation: tick timer plus pending auto-clears.
///
/// Dropping the session stops the timer and discards every pending clear.
pub struct SimulationSession {
    simulator: SensorSimulator,
    ticker: Interval,
    clears: FuturesUnordered<PendingClear>,
    clear_delay: Duration,
    alert: AlertEngine,
}

impl SimulationSession {
    pub fn start(config: &SimulationConfig, alert: AlertEngine) -> Self {
        let mut ticker = interval(config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            simulator: SensorSimulator::new(config),
            ticker,
            clears: FuturesUnordered::new(),
            clear_delay: config.clear_delay(),
            alert,
        }
    }

    /// Wait for the next tick or auto-clear and apply it. Cancel safe.
    pub async fn step(&mut self) {
        tokio::select! {
            Some(slot) = self.clears.next(), if !self.clears.is_empty() => {
                self.simulator.release(slot);
                debug!("Simulated fire on slot {} cleared", slot);
                self.alert.set_slot(slot, CLEAR, Origin::Simulation);
            }
            _ = self.ticker.tick() => {
                let current = self.alert.hub().reading().sensors;
                match self.simulator.tick(current) {
                    SimTick::Fire { slot } => {
                        self.alert.set_slot(slot, TRIPPED, Origin::Simulation);
                        let delay = self.clear_delay;
                        self.clears.push(Box::pin(async move {
                            tokio::time::sleep(delay).await;
                            slot
                        }));
                    }
                    SimTick::Routine { sensors } => {
                        self.alert.ingest(sensors, Origin::Simulation);
                    }
                }
            }
        }
    }

    pub fn pending_clears(&self) -> usize {
        self.clears.len()
    }
}
