use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};

use crate::analyzer::{AnalyzerLink, GasReading};
use crate::ble::{self, LinkStatus, PrinterLink};
use crate::config::HEARTBEAT_INTERVAL;
use crate::db::{self, Database, PrintEntry};
use crate::label::{GasLabel, LabelComposer};
use crate::printer::{LabelSize, PrintJob, PrintOutcome, PrintQueue, QueueError, Typeface};
use crate::trigger::{self, ManualTrigger};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Trigger(#[from] trigger::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("No gas reading yet.")]
    NoReading,

    #[error(transparent)]
    Link(#[from] ble::Error),

    #[error(transparent)]
    Db(#[from] db::Error),

    #[error("Failed to save the label preview: {0}")]
    Preview(#[from] image::ImageError),
}

/// The periodic main loop: watches the analyzer, keeps the printer session alive and turns
/// button presses into printed labels.
///
/// Nothing in here blocks for long. Printing and Bluetooth run on their own threads.
pub struct Station {
    analyzer: AnalyzerLink,
    link: PrinterLink,
    queue: PrintQueue,
    font: Box<dyn Typeface>,
    label_size: LabelSize,
    db: Database,
    trigger: ManualTrigger,

    heartbeat_interval: Duration,
    last_heartbeat: Option<Instant>,

    /// Update time of the last reading we took over.
    last_processed: Option<Instant>,
    reading: Option<GasReading>,
    analyzer_connected: bool,

    /// Used while the analyzer has not sent a usable timestamp.
    fallback_date: String,

    preview: Option<PathBuf>,

    /// Last line for the operator.
    message: String,
}

impl Station {
    pub fn new(
        analyzer: AnalyzerLink,
        link: PrinterLink,
        queue: PrintQueue,
        font: Box<dyn Typeface>,
        db: Database,
    ) -> Self {
        Self {
            analyzer,
            link,
            queue,
            font,
            label_size: LabelSize::default(),
            db,
            trigger: ManualTrigger::default(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            last_heartbeat: None,
            last_processed: None,
            reading: None,
            analyzer_connected: false,
            fallback_date: Local::now().format("%d.%m.%Y").to_string(),
            preview: None,
            message: String::new(),
        }
    }

    /// Save every composed label as an image here.
    pub fn with_preview(mut self, path: Option<PathBuf>) -> Self {
        self.preview = path;
        self
    }

    pub fn with_label_size(mut self, label_size: LabelSize) -> Self {
        self.label_size = label_size;
        self
    }

    pub fn with_trigger(mut self, trigger: ManualTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// One pass of the main loop.
    pub fn tick(&mut self, now: Instant) {
        let connected = self.analyzer.is_connected();

        if connected != self.analyzer_connected {
            self.analyzer_connected = connected;
            self.set_message(if connected {
                "Analyzer: Connected"
            } else {
                "Analyzer: Waiting..."
            });
        }

        // Take over new readings.
        if connected {
            let last_update = self.analyzer.last_update();

            if last_update.is_some() && last_update > self.last_processed {
                let reading = self.analyzer.reading();

                if reading.valid {
                    log::debug!("O2 {:.1} % He {:.1} %", reading.oxygen, reading.helium);

                    self.last_processed = last_update;
                    self.reading = Some(reading);
                }
            }
        }

        // Keepalive, never in the middle of a label.
        let heartbeat_due = self
            .last_heartbeat
            .map_or(true, |last| now.saturating_duration_since(last) > self.heartbeat_interval);

        if heartbeat_due && self.link.is_connected() && !self.queue.is_busy() {
            match self.queue.heartbeat() {
                Ok(()) => self.last_heartbeat = Some(now),
                Err(err) => log::debug!("Heartbeat skipped: {err}"),
            }
        }
    }

    /// The manual print button.
    pub fn manual_print(&mut self, now: Instant) -> Result<(), Error> {
        let result = self.print(now);

        match &result {
            Ok(()) => self.set_message("Print job sent"),
            Err(err) => self.set_message(&err.to_string()),
        }

        result
    }

    fn print(&mut self, now: Instant) -> Result<(), Error> {
        let connected = self.link.is_connected();
        self.trigger.check(now, connected)?;

        // A keepalive in flight must not use up the trigger window.
        if self.queue.is_busy() {
            return Err(QueueError::Busy.into());
        }

        self.trigger.press(now, connected)?;

        let label = self.label().ok_or(Error::NoReading)?;
        let bitmap = LabelComposer::new(self.label_size, self.font.as_mut()).compose_gas(&label);

        if let Some(path) = &self.preview {
            bitmap.to_image().save(path)?;
        }

        self.queue.submit(PrintJob::new(bitmap))?;

        log::info!(
            "Label queued: O2 {} % He {} % MOD {} m ({})",
            label.oxygen,
            label.helium,
            label.mod_m,
            label.name
        );

        // The label is on its way; a failing log entry does not change that.
        if let Some(reading) = &self.reading {
            let entry = PrintEntry::new(
                Utc::now(),
                label.name.clone(),
                f64::from(reading.oxygen),
                f64::from(reading.helium),
                label.mod_m.parse().unwrap_or_default(),
            );

            if let Err(err) = self.db.add_print(&entry) {
                log::warn!("Failed to log the print: {err}");
            }
        }

        Ok(())
    }

    pub fn scan(&mut self) -> Result<(), Error> {
        let result = self.link.scan();

        if let Err(err) = &result {
            self.set_message(&err.to_string());
        }

        result.map_err(Error::from)
    }

    pub fn disconnect(&mut self) -> Result<(), Error> {
        let result = self.link.disconnect();

        if let Err(err) = &result {
            self.set_message(&err.to_string());
        }

        result.map_err(Error::from)
    }

    /// Select the next stored diver name.
    pub fn cycle_name(&mut self) -> Result<(), Error> {
        let message = match self.db.cycle_name()? {
            Some(name) => format!("Name: {name}"),
            None => String::from("No names stored"),
        };

        self.set_message(&message);
        Ok(())
    }

    /// Select `name`, storing it first if it is new.
    pub fn use_name(&mut self, name: &str) -> Result<(), Error> {
        let name = match self.db.add_name(name) {
            Ok(name) => name,
            Err(db::Error::DuplicateName(name)) => name,
            Err(err) => return Err(err.into()),
        };

        self.db.select_name(Some(&name))?;
        Ok(())
    }

    /// The label as it would be printed now.
    pub fn label(&self) -> Option<GasLabel> {
        let reading = self.reading.as_ref()?;
        let name = self.db.current_name().unwrap_or_default();

        Some(GasLabel::from_reading(reading, name, &self.fallback_date))
    }

    pub fn reading(&self) -> Option<&GasReading> {
        self.reading.as_ref()
    }

    pub fn analyzer_connected(&self) -> bool {
        self.analyzer_connected
    }

    pub fn link_status(&self) -> LinkStatus {
        self.link.status()
    }

    pub fn printer_busy(&self) -> bool {
        self.queue.is_busy()
    }

    pub fn jobs_queued(&self) -> usize {
        self.queue.jobs_queued()
    }

    pub fn last_outcome(&self) -> Option<PrintOutcome> {
        self.queue.last_outcome()
    }

    pub fn current_name(&self) -> Option<&str> {
        self.db.current_name()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    fn set_message(&mut self, message: &str) {
        log::info!("{message}");
        self.message = String::from(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerEvent, Signature};
    use crate::ble::{ConnectionState, PrinterIdentity};
    use crate::printer::{BuiltinFont, Session};
    use crate::testing::{link_config, print_config, printer_advertisement, wait_until, FakeBackend, Script};

    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    fn station(script: &Arc<Mutex<Script>>) -> Station {
        script.lock().unwrap().advertise = vec![printer_advertisement()];

        let session = Session::new();
        let link = PrinterLink::spawn(
            FakeBackend::factory(Arc::clone(script)),
            PrinterIdentity::default(),
            link_config(),
            print_config(),
            session.clone(),
        );

        Station::new(
            AnalyzerLink::spawn(Signature::FTDI_FT232),
            link,
            PrintQueue::spawn(session),
            Box::new(BuiltinFont),
            Database::open_in_memory().unwrap(),
        )
        .with_heartbeat_interval(Duration::from_secs(3600))
    }

    fn feed(station: &Station, line: &[u8]) {
        let events = station.analyzer.events();

        events.send(AnalyzerEvent::Attached(Signature::FTDI_FT232)).unwrap();
        events.send(AnalyzerEvent::Data(line.to_vec())).unwrap();
    }

    fn connect(station: &mut Station) {
        station.scan().unwrap();

        assert!(wait_until(|| station.link_status().message == "Printer ready"));
        assert_eq!(station.link_status().state, ConnectionState::Connected);
    }

    fn take_reading(station: &mut Station) {
        assert!(wait_until(|| {
            station.tick(Instant::now());
            station.reading().is_some()
        }));

        // The first tick also sends a keepalive.
        assert!(wait_until(|| !station.printer_busy()));
    }

    #[test]
    fn prints_the_current_reading() {
        let script = Script::shared();
        let mut station = station(&script);

        station.use_name("Kim").unwrap();
        connect(&mut station);
        feed(&station, b"He 10.0 % O2 30.0 % Ti 20.0 ~C  1010.0 hPa  2025/06/01 09:30:00\n");
        take_reading(&mut station);

        let label = station.label().unwrap();
        assert_eq!(label.oxygen, "30.0");
        assert_eq!(label.date, "01.06.2025");
        assert_eq!(label.name, "Kim");

        let now = Instant::now();
        assert!(station.manual_print(now).is_ok());
        assert_eq!(station.message(), "Print job sent");

        // Right away again: rate limited.
        assert!(matches!(
            station.manual_print(now + Duration::from_millis(500)),
            Err(Error::Trigger(trigger::Error::TooSoon(_)))
        ));

        assert!(wait_until(|| station.last_outcome().is_some()));
        assert!(matches!(station.last_outcome(), Some(PrintOutcome::Printed(_))));
        assert_eq!(station.jobs_queued(), 1);

        let commands = script.lock().unwrap().transport.as_ref().unwrap().commands();
        assert!(commands.contains(&0x85));
        assert_eq!(commands.last(), Some(&0xf3));

        let mut prints = Vec::new();
        station.database().prints(&mut prints).unwrap();

        assert_eq!(prints.len(), 1);
        assert_eq!(prints[0].name, "Kim");
        assert_eq!(prints[0].mod_m, 30.0);
    }

    #[test]
    fn print_needs_a_printer() {
        let script = Script::shared();
        let mut station = station(&script);

        assert!(matches!(
            station.manual_print(Instant::now()),
            Err(Error::Trigger(trigger::Error::NotConnected))
        ));
        assert_eq!(station.message(), "No printer connected.");
    }

    #[test]
    fn print_needs_a_reading() {
        let script = Script::shared();
        let mut station = station(&script);

        connect(&mut station);

        assert!(matches!(station.manual_print(Instant::now()), Err(Error::NoReading)));
    }

    #[test]
    fn press_during_keepalive_keeps_the_window() {
        let script = Script::shared();
        script.lock().unwrap().silent = true;

        let mut station = station(&script);

        connect(&mut station);
        feed(&station, b"He 0.0 % O2 32.0 %\n");
        take_reading(&mut station);

        // Unanswered, so it holds the printer for the whole ack timeout.
        station.queue.heartbeat().unwrap();

        let now = Instant::now();
        assert!(matches!(
            station.manual_print(now),
            Err(Error::Queue(QueueError::Busy))
        ));

        assert!(wait_until(|| !station.printer_busy()));
        assert!(station.manual_print(now + Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn keepalive_while_connected() {
        let script = Script::shared();
        let mut station = station(&script).with_heartbeat_interval(Duration::from_millis(20));

        connect(&mut station);

        let heartbeats = || {
            script
                .lock()
                .unwrap()
                .transport
                .as_ref()
                .map_or(0, |transport| transport.commands().iter().filter(|&&c| c == 0xdc).count())
        };

        // Connect and the greeting heartbeat.
        assert_eq!(heartbeats(), 2);

        assert!(wait_until(|| {
            station.tick(Instant::now());
            heartbeats() >= 5
        }));
    }

    #[test]
    fn names_cycle_through_the_message_line() {
        let script = Script::shared();
        let mut station = station(&script);

        station.cycle_name().unwrap();
        assert_eq!(station.message(), "No names stored");

        station.use_name("Ada").unwrap();
        station.use_name("Bo").unwrap();
        station.use_name("Ada").unwrap();
        assert_eq!(station.current_name(), Some("Ada"));

        station.cycle_name().unwrap();
        assert_eq!(station.message(), "Name: Bo");
        assert_eq!(station.database().names(), ["Ada", "Bo"]);
    }
}
