use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use crate::config::{ANALYZER_PRODUCT_ID, ANALYZER_VENDOR_ID};

/// Turn the analyzer's text output into structured fields.
mod parser;
pub use parser::{parse_line, ParsedLine};

/// Reassemble lines from the chunked byte stream.
mod lines;
pub use lines::{LineAssembler, MAX_LINE_LEN};

/// Talk to the FTDI bridge directly over USB bulk transfers.
mod ftdi;
pub use ftdi::{baud_divisor, Error as FtdiError, FtdiSource};

/// Read the analyzer through the kernel's serial driver instead.
mod serial;
pub use serial::SerialSource;

/// Readers wait at most this long for the reading lock before giving up.
const LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// How often the worker re-checks its exit flag while the event queue is idle.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exit flag shared by the worker and the device sources.
pub type GuardPair = Arc<(Mutex<bool>, Condvar)>;

/// The latest gas measurement published by the analyzer link.
#[derive(Debug, Clone, PartialEq)]
pub struct GasReading {
    pub valid: bool,
    pub oxygen: f32,
    pub helium: f32,
    pub temperature: f32,
    pub pressure: f32,
    pub timestamp: String,
}

impl Default for GasReading {
    fn default() -> Self {
        Self {
            valid: false,
            oxygen: 0.0,
            helium: 0.0,
            temperature: 0.0,
            pressure: 1013.0,
            timestamp: String::new(),
        }
    }
}

impl GasReading {
    fn invalid() -> Self {
        Self::default()
    }

    /// The analyzer's date (`YYYY/MM/DD hh:mm:ss`) in label form (`DD.MM.YYYY`).
    pub fn label_date(&self) -> Option<String> {
        let date = self.timestamp.split_whitespace().next()?;

        NaiveDate::parse_from_str(date, "%Y/%m/%d")
            .ok()
            .map(|date| date.format("%d.%m.%Y").to_string())
    }

    fn apply(&mut self, line: ParsedLine) {
        self.helium = line.helium;
        self.oxygen = line.oxygen;

        if let Some(temperature) = line.temperature {
            self.temperature = temperature;
        }

        if let Some(pressure) = line.pressure {
            self.pressure = pressure;
        }

        if let Some(timestamp) = line.timestamp {
            self.timestamp = timestamp;
        }

        self.valid = true;
    }
}

/// USB vendor/product pair a device source reports on attach.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Signature {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Signature {
    pub const FTDI_FT232: Signature = Signature {
        vendor_id: ANALYZER_VENDOR_ID,
        product_id: ANALYZER_PRODUCT_ID,
    };
}

/// What a device source reports to the link worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerEvent {
    /// A device has been opened and configured.
    Attached(Signature),

    /// Payload bytes (modem status bytes already stripped).
    Data(Vec<u8>),

    /// The device went away.
    Detached,
}

struct Published {
    reading: GasReading,
    last_update: Option<Instant>,
}

struct Shared {
    published: Mutex<Published>,
    connected: AtomicBool,
}

/// Owns the worker that turns analyzer events into a published [`GasReading`].
pub struct AnalyzerLink {
    shared: Arc<Shared>,
    events: Sender<AnalyzerEvent>,
    guard_pair: GuardPair,
    worker_handle: Option<thread::JoinHandle<()>>,
    source_handle: Option<thread::JoinHandle<()>>,
}

impl AnalyzerLink {
    /// Start the worker without a device source. Feed it through [`AnalyzerLink::events`].
    pub fn spawn(expected: Signature) -> Self {
        let shared = Arc::new(Shared {
            published: Mutex::new(Published {
                reading: GasReading::default(),
                last_update: None,
            }),
            connected: AtomicBool::new(false),
        });

        let guard_pair = Arc::new((Mutex::new(false), Condvar::new()));
        let (events, receiver) = mpsc::channel();

        let worker = Worker {
            expected,
            shared: Arc::clone(&shared),
            assembler: LineAssembler::new(),
            events: receiver,
            guard_pair: Arc::clone(&guard_pair),
        };

        let worker_handle = thread::Builder::new()
            .name(String::from("analyzer"))
            .spawn(move || worker.run())
            .ok();

        if worker_handle.is_none() {
            log::error!("Failed to spawn the analyzer worker.");
        }

        Self {
            shared,
            events,
            guard_pair,
            worker_handle,
            source_handle: None,
        }
    }

    /// Read the analyzer over raw USB.
    pub fn on_usb() -> Self {
        let mut link = Self::spawn(Signature::FTDI_FT232);
        let source = FtdiSource::new(Signature::FTDI_FT232);

        link.source_handle = source.spawn(link.events(), Arc::clone(&link.guard_pair));
        link
    }

    /// Read the analyzer through a serial device node.
    pub fn on_serial_port(port_path: &str) -> Self {
        let mut link = Self::spawn(Signature::FTDI_FT232);
        let source = SerialSource::new(port_path, Signature::FTDI_FT232);

        link.source_handle = source.spawn(link.events(), Arc::clone(&link.guard_pair));
        link
    }

    /// A sender for device sources (or tests) to push events into the worker.
    pub fn events(&self) -> Sender<AnalyzerEvent> {
        self.events.clone()
    }

    /// Copy of the latest reading.
    ///
    /// Waits up to 100 ms for the worker to release the reading. On timeout an invalid reading
    /// is returned.
    pub fn reading(&self) -> GasReading {
        let deadline = Instant::now() + LOCK_TIMEOUT;

        loop {
            match self.shared.published.try_lock() {
                Ok(published) => return published.reading.clone(),
                Err(TryLockError::Poisoned(err)) => return err.into_inner().reading.clone(),
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(1))
                }
                Err(TryLockError::WouldBlock) => return GasReading::invalid(),
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// When the last line was accepted.
    pub fn last_update(&self) -> Option<Instant> {
        self.shared
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_update
    }
}

impl Drop for AnalyzerLink {
    fn drop(&mut self) {
        // Set the exit flag and issue the condvar.
        let (guard, cvar) = &*self.guard_pair;
        *guard.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();

        // Wait for the source and the worker to come down.
        for handle in [self.source_handle.take(), self.worker_handle.take()]
            .into_iter()
            .flatten()
        {
            if handle.join().is_err() {
                log::error!("An analyzer thread panicked.");
            }
        }
    }
}

struct Worker {
    expected: Signature,
    shared: Arc<Shared>,
    assembler: LineAssembler,
    events: Receiver<AnalyzerEvent>,
    guard_pair: GuardPair,
}

impl Worker {
    fn should_exit(&self) -> bool {
        *self.guard_pair.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(mut self) {
        while !self.should_exit() {
            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        log::debug!("Analyzer worker stopped.");
    }

    fn handle(&mut self, event: AnalyzerEvent) {
        match event {
            AnalyzerEvent::Attached(signature) => {
                if signature != self.expected {
                    log::warn!(
                        "Ignoring USB device {:04x}:{:04x} (not the analyzer).",
                        signature.vendor_id,
                        signature.product_id
                    );

                    return;
                }

                self.assembler.reset();
                self.shared.connected.store(true, Ordering::Release);

                log::info!("Analyzer connected.");
            }

            AnalyzerEvent::Data(chunk) => {
                if !self.shared.connected.load(Ordering::Acquire) {
                    return;
                }

                let shared = &self.shared;

                self.assembler.push(&chunk, |line| match parse_line(line) {
                    Some(parsed) => {
                        log::debug!("Analyzer line: {line}");

                        let mut published =
                            shared.published.lock().unwrap_or_else(PoisonError::into_inner);

                        published.reading.apply(parsed);
                        published.last_update = Some(Instant::now());
                    }

                    None => log::trace!("Skipping analyzer line: {line}"),
                });
            }

            AnalyzerEvent::Detached => {
                self.assembler.reset();
                self.shared
                    .published
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .reading
                    .valid = false;

                // Nobody may see a detached analyzer with a valid reading.
                self.shared.connected.store(false, Ordering::Release);

                log::info!("Analyzer disconnected.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);

        while Instant::now() < deadline {
            if condition() {
                return true;
            }

            thread::sleep(Duration::from_millis(5));
        }

        false
    }

    #[test]
    fn initial_reading_is_invalid() {
        let link = AnalyzerLink::spawn(Signature::FTDI_FT232);
        let reading = link.reading();

        assert!(!reading.valid);
        assert_eq!(reading.pressure, 1013.0);
        assert!(!link.is_connected());
        assert_eq!(link.last_update(), None);
    }

    #[test]
    fn publishes_parsed_lines() {
        let link = AnalyzerLink::spawn(Signature::FTDI_FT232);
        let events = link.events();

        events.send(AnalyzerEvent::Attached(Signature::FTDI_FT232)).unwrap();
        events
            .send(AnalyzerEvent::Data(b"He  10.0 %  O2  ".to_vec()))
            .unwrap();
        events
            .send(AnalyzerEvent::Data(
                b"30.5 %  Ti  21.0 ~C  1002.0 hPa   2025/03/04 10:00:00\r\n".to_vec(),
            ))
            .unwrap();

        assert!(wait_until(|| link.reading().valid));

        let reading = link.reading();
        assert_eq!(reading.oxygen, 30.5);
        assert_eq!(reading.helium, 10.0);
        assert_eq!(reading.temperature, 21.0);
        assert_eq!(reading.pressure, 1002.0);
        assert_eq!(reading.label_date().as_deref(), Some("04.03.2025"));
        assert!(link.last_update().is_some());
    }

    #[test]
    fn data_before_attach_is_ignored() {
        let link = AnalyzerLink::spawn(Signature::FTDI_FT232);
        let events = link.events();

        events
            .send(AnalyzerEvent::Data(b"He 1.0 % O2 21.0 %\n".to_vec()))
            .unwrap();
        events
            .send(AnalyzerEvent::Attached(Signature {
                vendor_id: 0x1234,
                product_id: 0x5678,
            }))
            .unwrap();
        events
            .send(AnalyzerEvent::Data(b"He 1.0 % O2 21.0 %\n".to_vec()))
            .unwrap();

        thread::sleep(Duration::from_millis(150));

        assert!(!link.is_connected());
        assert!(!link.reading().valid);
    }

    #[test]
    fn detach_invalidates_reading() {
        let link = AnalyzerLink::spawn(Signature::FTDI_FT232);
        let events = link.events();

        events.send(AnalyzerEvent::Attached(Signature::FTDI_FT232)).unwrap();
        events
            .send(AnalyzerEvent::Data(b"He 0.0 % O2 32.0 %\n".to_vec()))
            .unwrap();

        assert!(wait_until(|| link.reading().valid));

        events.send(AnalyzerEvent::Detached).unwrap();

        assert!(wait_until(|| !link.is_connected()));
        assert!(!link.reading().valid);
        assert_eq!(link.reading().oxygen, 32.0);
    }

    #[test]
    fn never_detached_with_a_valid_reading() {
        let link = AnalyzerLink::spawn(Signature::FTDI_FT232);
        let events = link.events();

        for _ in 0..20 {
            events.send(AnalyzerEvent::Attached(Signature::FTDI_FT232)).unwrap();
            events
                .send(AnalyzerEvent::Data(b"He 0.0 % O2 32.0 %\n".to_vec()))
                .unwrap();

            assert!(wait_until(|| link.reading().valid));

            events.send(AnalyzerEvent::Detached).unwrap();

            // Polled tightly so the window between the two updates is hit.
            while link.is_connected() {}
            assert!(!link.reading().valid);
        }
    }

    #[test]
    fn keeps_optional_fields_from_earlier_lines() {
        let mut reading = GasReading::default();

        reading.apply(parse_line("He 0.5 % O2 21.0 % Ti 20.0 ~C  1010.0 hPa  2025/01/01 00:00:00").unwrap());
        reading.apply(parse_line("He 0.7 % O2 20.8 %").unwrap());

        assert_eq!(reading.helium, 0.7);
        assert_eq!(reading.temperature, 20.0);
        assert_eq!(reading.pressure, 1010.0);
        assert_eq!(reading.timestamp, "2025/01/01 00:00:00");
    }
}
