use super::{Error, Printer, Request, Response};

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// The write half of a printer connection.
pub trait Transport: Send + Sync {
    /// Write one complete packet (no response expected at this level).
    fn write(&self, data: &[u8]) -> Result<(), Error>;
}

/// Single-slot mailbox for printer notifications.
///
/// The notification handler delivers without ever waiting on the consumer. A newer
/// notification replaces an unconsumed older one.
#[derive(Debug, Default)]
pub struct ResponseSlot {
    frame: Mutex<Option<Vec<u8>>>,
    cvar: Condvar,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, data: &[u8]) {
        *self.frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(data.to_vec());
        self.cvar.notify_all();
    }

    pub fn clear(&self) {
        self.take();
    }

    /// Consume a pending notification without waiting.
    pub fn take(&self) -> Option<Vec<u8>> {
        self.frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wait for any notification.
    pub fn wait(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.wait_for(timeout, |_| true)
    }

    /// Wait for a notification that satisfies `accept`. Others are consumed and dropped.
    pub fn wait_for<F: Fn(&[u8]) -> bool>(&self, timeout: Duration, accept: F) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut frame = self.frame.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if let Some(data) = frame.take() {
                if accept(&data) {
                    return Some(data);
                }
            }

            let remaining = deadline.checked_duration_since(Instant::now())?;

            if remaining.is_zero() {
                return None;
            }

            frame = self
                .cvar
                .wait_timeout(frame, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Printer {
    /// Fire and forget.
    pub(super) fn send(&self, request: &Request) -> Result<(), Error> {
        let packet = request.encode()?;
        log::trace!("-> {:?} ({} bytes)", request.command(), packet.len());

        self.transport.write(&packet)
    }

    /// Send and block until the printer answers (any notification counts) or the ack timeout
    /// passes.
    pub(super) fn send_and_wait(&self, request: &Request) -> Result<Vec<u8>, Error> {
        self.responses.clear();
        self.send(request)?;

        let command = request.command();
        let frame = self
            .responses
            .wait(self.config.ack_timeout)
            .ok_or(Error::NoAcknowledgement(command))?;

        match Response::parse(&frame) {
            Ok(response) => log::trace!("<- {:#04x} for {command:?}", response.command),
            Err(err) => log::debug!("Unframed notification for {command:?} ({err}): {frame:02x?}"),
        }

        Ok(frame)
    }
}
