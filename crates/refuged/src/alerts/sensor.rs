//! Entry-point temperature sensors.
//!
//! Each interval every sensor gets a fresh simulated reading. A reading
//! above the threshold produces one alert naming the sensor.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use refuge_core::AlertRecord;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sensor names, one per entry point.
pub const SENSOR_NAMES: [&str; 4] = ["NORTH ENTRY", "SOUTH ENTRY", "WEST ENTRY", "EAST ENTRY"];

/// Lowest simulated reading in degrees Celsius.
pub const MIN_TEMPERATURE: f64 = 35.0;

/// Highest simulated reading in degrees Celsius.
pub const MAX_TEMPERATURE: f64 = 39.5;

/// Formats the alert text for `name` reading `temperature`.
pub fn alert_text(name: &str, temperature: f64) -> String {
    format!("Alert of possible infection in {name}, temperature: {temperature:.1}")
}

/// The four simulated entry sensors.
#[derive(Debug, Clone)]
pub struct SensorArray {
    readings: [f64; 4],
    threshold: f64,
    rng: SmallRng,
}

impl SensorArray {
    /// Creates sensors seeded from the thread RNG.
    pub fn new(threshold: f64) -> Self {
        Self::with_rng(threshold, SmallRng::from_rng(&mut rand::rng()))
    }

    /// Creates sensors with a reproducible sequence.
    pub fn seeded(threshold: f64, seed: u64) -> Self {
        Self::with_rng(threshold, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(threshold: f64, rng: SmallRng) -> Self {
        Self {
            readings: [MIN_TEMPERATURE; 4],
            threshold,
            rng,
        }
    }

    pub fn readings(&self) -> &[f64; 4] {
        &self.readings
    }

    /// Takes new readings and returns an alert for each one above the threshold.
    pub fn sample(&mut self) -> Vec<AlertRecord> {
        for reading in self.readings.iter_mut() {
            *reading = self.rng.random_range(MIN_TEMPERATURE..=MAX_TEMPERATURE);
        }
        self.alerts()
    }

    /// Alerts for the current readings.
    pub fn alerts(&self) -> Vec<AlertRecord> {
        SENSOR_NAMES
            .iter()
            .zip(self.readings.iter())
            .filter(|(_, reading)| **reading > self.threshold)
            .map(|(name, reading)| AlertRecord::new(alert_text(name, *reading)))
            .collect()
    }
}

/// Samples `sensors` every `period` until cancelled or the channel closes.
pub async fn run_sensor_worker(
    mut sensors: SensorArray,
    period: Duration,
    alerts: mpsc::Sender<AlertRecord>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "Sensor worker started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for record in sensors.sample() {
            debug!(alert = record.text(), "Sensor threshold exceeded");
            if alerts.send(record).await.is_err() {
                debug!("Alert channel closed, sensor worker exiting");
                return;
            }
        }
    }

    debug!("Sensor worker stopped");
}
