use std::time::{Duration, Instant};

use crate::config::TRIGGER_INTERVAL;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("No printer connected.")]
    NotConnected,

    #[error("Printed less than {0:?} ago.")]
    TooSoon(Duration),
}

/// Rate limit for the manual print button.
#[derive(Debug, Clone)]
pub struct ManualTrigger {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl Default for ManualTrigger {
    fn default() -> Self {
        Self::new(TRIGGER_INTERVAL)
    }
}

impl ManualTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    /// Whether a press at `now` would be accepted, without taking the window.
    pub fn check(&self, now: Instant, connected: bool) -> Result<(), Error> {
        if !connected {
            return Err(Error::NotConnected);
        }

        match self.last_fired {
            Some(last) if now.saturating_duration_since(last) <= self.interval => {
                Err(Error::TooSoon(self.interval))
            }
            _ => Ok(()),
        }
    }

    /// A press at `now`. Accepted only with a connected printer and once the interval since
    /// the last accepted press has passed. Rejected presses do not restart the interval.
    pub fn press(&mut self, now: Instant, connected: bool) -> Result<(), Error> {
        self.check(now, connected)?;

        self.last_fired = Some(now);
        Ok(())
    }
}
