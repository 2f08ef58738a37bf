//! Power-outage simulator.
//!
//! Sleeps a random delay drawn uniformly from a window, then reports an
//! electricity failure over the daemon's Unix control socket. Repeats
//! until cancelled.

use std::path::PathBuf;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use refuge_protocol::send_control;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Text delivered to the control socket on each simulated failure.
pub const OUTAGE_MESSAGE: &str = "Electricity failure detected, switching to emergency power";

/// Random delay source for the outage worker.
#[derive(Debug, Clone)]
pub struct OutageSchedule {
    min: Duration,
    max: Duration,
    rng: SmallRng,
}

impl OutageSchedule {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            rng: SmallRng::from_rng(&mut rand::rng()),
        }
    }

    pub fn seeded(min: Duration, max: Duration, seed: u64) -> Self {
        Self {
            min,
            max,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Next delay, uniform in `[min, max]` at millisecond resolution.
    pub fn next_delay(&mut self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = (self.max.as_millis() as u64).max(min);
        Duration::from_millis(self.rng.random_range(min..=max))
    }
}

/// Runs the outage loop until cancelled.
pub async fn run_outage_worker(
    mut schedule: OutageSchedule,
    control_socket: PathBuf,
    cancel: CancellationToken,
) {
    info!(socket = %control_socket.display(), "Power outage worker started");

    loop {
        let delay = schedule.next_delay();
        debug!(delay_secs = delay.as_secs(), "Next simulated power outage scheduled");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        match send_control(&control_socket, OUTAGE_MESSAGE).await {
            Ok(()) => info!("Simulated power outage reported"),
            Err(e) => warn!(
                socket = %control_socket.display(),
                error = %e,
                "Failed to report power outage"
            ),
        }
    }

    debug!("Power outage worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    #[test]
    fn test_delay_within_window() {
        let min = Duration::from_secs(300);
        let max = Duration::from_secs(600);
        let mut schedule = OutageSchedule::seeded(min, max, 11);

        for _ in 0..200 {
            let delay = schedule.next_delay();
            assert!(delay >= min && delay <= max, "{delay:?} out of range");
        }
    }

    #[test]
    fn test_degenerate_window() {
        let fixed = Duration::from_secs(5);
        let mut schedule = OutageSchedule::seeded(fixed, fixed, 0);
        assert_eq!(schedule.next_delay(), fixed);
    }

    #[tokio::test]
    async fn test_worker_reports_to_control_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let cancel = CancellationToken::new();

        let schedule = OutageSchedule::seeded(Duration::from_millis(10), Duration::from_millis(20), 5);
        let worker = tokio::spawn(run_outage_worker(schedule, path.clone(), cancel.clone()));

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut text = String::new();
        stream.read_to_string(&mut text).await.unwrap();
        assert_eq!(text, OUTAGE_MESSAGE);

        cancel.cancel();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_survives_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        let cancel = CancellationToken::new();

        let schedule = OutageSchedule::seeded(Duration::from_millis(10), Duration::from_millis(20), 9);
        let worker = tokio::spawn(run_outage_worker(schedule, path, cancel.clone()));

        // Several failed reports are logged, the worker keeps going
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!worker.is_finished());

        cancel.cancel();
        worker.await.unwrap();
    }
}
