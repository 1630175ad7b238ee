use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::printer::{PrintConfig, Printer, ResponseSlot, Session};

/// Which device is our printer and which GATT layouts it may expose.
mod identity;
pub use identity::{GattProfile, PrinterIdentity};

/// The radio stack seen from the link worker.
mod backend;
pub use backend::{Advertisement, Backend, LinkEvent, Unavailable};

/// The real radio stack (btleplug).
#[cfg(feature = "bluetooth")]
mod btle;
#[cfg(feature = "bluetooth")]
pub use btle::BtleBackend;

/// Commands waiting for the worker. Further commands are rejected.
pub const COMMAND_QUEUE_DEPTH: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No Bluetooth adapter available.")]
    NoAdapter,

    #[error("The Bluetooth operation timed out.")]
    Timeout,

    #[error("The printer was not found.")]
    DeviceNotFound,

    #[error("\"{0}\" is not a valid hardware address.")]
    InvalidAddress(String),

    #[error("None of the known printer services was found.")]
    ServiceNotFound,

    #[error("The printer service lacks a usable characteristic.")]
    CharacteristicNotFound,

    #[error("Not connected to the printer.")]
    NotConnected,

    #[error("The link command queue is full.")]
    QueueFull,

    #[error("The link worker is not running.")]
    WorkerGone,

    #[error("Bluetooth stack error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Found,
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

/// State plus the short message shown next to it. Both change together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub message: String,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            message: String::from("Idle"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Scan for the printer, then connect and initialise it.
    Scan,

    /// Connect to the remembered device, then initialise it.
    Connect,

    Disconnect,

    /// Repeat the printer handshake on an open session.
    InitPrinter,
}

/// Timings of the connection procedure.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub scan_timeout: Duration,
    pub connect_timeout: Duration,

    /// Pause between the link coming up and service discovery.
    pub connect_settle: Duration,

    /// Pause between subscribing and reporting the session as ready.
    pub subscribe_settle: Duration,

    /// Pause before the connect-by-address fallback.
    pub fallback_delay: Duration,

    /// Pause between the printer's connect command and the first heartbeat.
    pub init_delay: Duration,

    /// Wait this long after a lost link before connecting again.
    pub reconnect_backoff: Duration,

    /// How often the idle worker looks at events and the exit flag.
    pub poll_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            connect_settle: Duration::from_secs(1),
            subscribe_settle: Duration::from_millis(500),
            fallback_delay: Duration::from_millis(500),
            init_delay: Duration::from_millis(100),
            reconnect_backoff: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

struct Shared {
    status: Mutex<LinkStatus>,
    exit: AtomicBool,
}

impl Shared {
    fn set(&self, state: ConnectionState, message: &str) {
        log::info!("Printer link: {state:?} ({message})");

        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = LinkStatus {
            state,
            message: String::from(message),
        };
    }

    fn set_message(&self, message: &str) {
        log::info!("Printer link: {message}");

        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .message = String::from(message);
    }

    fn state(&self) -> ConnectionState {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    fn should_exit(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }
}

/// Owns the Bluetooth worker thread and the command queue feeding it.
///
/// The worker opens the printer [`Session`] once a link is usable and closes it when the
/// link goes away.
pub struct PrinterLink {
    commands: Option<SyncSender<LinkCommand>>,
    shared: Arc<Shared>,
    worker_handle: Option<thread::JoinHandle<()>>,
}

impl PrinterLink {
    /// Start the worker. The backend is built on the worker thread by `factory`, which receives
    /// the sender for [`LinkEvent`]s.
    pub fn spawn<B, F>(
        factory: F,
        identity: PrinterIdentity,
        config: LinkConfig,
        print_config: PrintConfig,
        session: Session,
    ) -> Self
    where
        B: Backend + 'static,
        F: FnOnce(Sender<LinkEvent>) -> Result<B, Error> + Send + 'static,
    {
        let (commands, command_receiver) = mpsc::sync_channel(COMMAND_QUEUE_DEPTH);

        let shared = Arc::new(Shared {
            status: Mutex::new(LinkStatus::default()),
            exit: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);

        let worker_handle = thread::Builder::new()
            .name(String::from("ble"))
            .spawn(move || {
                let (event_sender, events) = mpsc::channel();

                let backend = match factory(event_sender) {
                    Ok(backend) => backend,

                    Err(err) => {
                        log::error!("Failed to start Bluetooth: {err}");
                        worker_shared.set(ConnectionState::Failed, "Bluetooth unavailable!");
                        return;
                    }
                };

                Worker {
                    backend,
                    events,
                    identity,
                    config,
                    print_config,
                    session,
                    shared: worker_shared,
                    target: None,
                    reconnect_at: None,
                }
                .runloop(command_receiver)
            })
            .map_err(|err| log::error!("Failed to spawn the Bluetooth worker: {err}"))
            .ok();

        Self {
            commands: Some(commands),
            shared,
            worker_handle,
        }
    }

    /// Queue a command without blocking.
    pub fn send(&self, command: LinkCommand) -> Result<(), Error> {
        let sender = self.commands.as_ref().ok_or(Error::WorkerGone)?;

        sender.try_send(command).map_err(|err| match err {
            TrySendError::Full(_) => Error::QueueFull,
            TrySendError::Disconnected(_) => Error::WorkerGone,
        })
    }

    pub fn scan(&self) -> Result<(), Error> {
        self.send(LinkCommand::Scan)
    }

    pub fn connect(&self) -> Result<(), Error> {
        self.send(LinkCommand::Connect)
    }

    pub fn disconnect(&self) -> Result<(), Error> {
        self.send(LinkCommand::Disconnect)
    }

    pub fn init_printer(&self) -> Result<(), Error> {
        self.send(LinkCommand::InitPrinter)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// A copy of state and message, taken under one lock.
    pub fn status(&self) -> LinkStatus {
        self.shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

impl Drop for PrinterLink {
    fn drop(&mut self) {
        self.shared.exit.store(true, Ordering::Release);
        drop(self.commands.take());

        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                log::error!("The Bluetooth worker panicked.");
            }
        }
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

struct Worker<B: Backend> {
    backend: B,
    events: Receiver<LinkEvent>,
    identity: PrinterIdentity,
    config: LinkConfig,
    print_config: PrintConfig,
    session: Session,
    shared: Arc<Shared>,

    /// The device found by the last successful scan.
    target: Option<Advertisement>,

    /// When to attempt the next automatic reconnect.
    reconnect_at: Option<Instant>,
}

impl<B: Backend> Worker<B> {
    fn runloop(mut self, commands: Receiver<LinkCommand>) {
        log::debug!("Bluetooth worker started.");

        while !self.shared.should_exit() {
            match commands.recv_timeout(self.config.poll_interval) {
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            self.drain_events();
            self.maybe_reconnect();
        }

        self.session.close();

        if self.backend.is_connected() {
            if let Err(err) = self.backend.disconnect() {
                log::warn!("Failed to disconnect on shutdown: {err}");
            }
        }

        log::debug!("Bluetooth worker stopped.");
    }

    fn handle(&mut self, command: LinkCommand) {
        log::debug!("Link command: {command:?}");

        match command {
            LinkCommand::Scan => {
                if self.scan().is_ok() && self.connect().is_ok() {
                    self.init_printer();
                }
            }

            LinkCommand::Connect => {
                if self.connect().is_ok() {
                    self.init_printer();
                }
            }

            LinkCommand::Disconnect => {
                self.session.close();

                if let Err(err) = self.backend.disconnect() {
                    log::warn!("Failed to disconnect: {err}");
                }

                self.shared.set(ConnectionState::Disconnected, "Disconnected");
                self.schedule_reconnect();
            }

            LinkCommand::InitPrinter => {
                if self.session.is_open() {
                    self.init_printer();
                }
            }
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if event == LinkEvent::Disconnected {
                self.link_lost();
            }
        }
    }

    fn link_lost(&mut self) {
        if !self.session.is_open() && self.shared.state() != ConnectionState::Connected {
            return;
        }

        self.session.close();
        self.shared.set(ConnectionState::Disconnected, "Disconnected");

        self.schedule_reconnect();
    }

    /// A remembered printer is tried again once the backoff has passed.
    fn schedule_reconnect(&mut self) {
        self.reconnect_at = self
            .target
            .as_ref()
            .map(|_| Instant::now() + self.config.reconnect_backoff);
    }

    fn maybe_reconnect(&mut self) {
        let Some(at) = self.reconnect_at else {
            return;
        };

        if Instant::now() < at {
            return;
        }

        self.reconnect_at = None;

        if self.backend.is_connected() && self.session.is_open() {
            return;
        }

        self.shared.set_message("Reconnecting...");

        if self.connect().is_ok() {
            self.init_printer();
        } else {
            self.schedule_reconnect();
        }
    }

    fn scan(&mut self) -> Result<(), Error> {
        self.shared.set(ConnectionState::Scanning, "Scanning...");

        if let Err(err) = self.backend.start_scan() {
            log::error!("Failed to start scanning: {err}");
            self.shared.set(ConnectionState::Failed, "Printer not found!");
            return Err(err);
        }

        let deadline = Instant::now() + self.config.scan_timeout;
        let mut found = None;

        while found.is_none() && !self.shared.should_exit() {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };

            match self.events.recv_timeout(remaining.min(self.config.poll_interval)) {
                Ok(LinkEvent::Discovered(device)) => {
                    log::trace!("Seen {:?} ({})", device.name, device.address);

                    if self.identity.matches(device.name.as_deref(), &device.address) {
                        found = Some(device);
                    }
                }

                Ok(LinkEvent::Disconnected) => self.link_lost(),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Err(err) = self.backend.stop_scan() {
            log::warn!("Failed to stop scanning: {err}");
        }

        match found {
            Some(device) => {
                log::info!("Found printer {:?} at {}.", device.name, device.address);
                self.target = Some(device);
                self.shared.set(ConnectionState::Found, "Printer found!");
                Ok(())
            }

            None => {
                self.shared.set(ConnectionState::Failed, "Printer not found!");
                Err(Error::DeviceNotFound)
            }
        }
    }

    fn connect(&mut self) -> Result<(), Error> {
        let Some(target) = self.target.clone() else {
            self.shared.set(ConnectionState::Failed, "No device to connect!");
            return Err(Error::DeviceNotFound);
        };

        self.shared.set(ConnectionState::Connecting, "Connecting...");
        self.session.close();

        // Start from a clean link.
        if self.backend.is_connected() {
            if let Err(err) = self.backend.disconnect() {
                log::warn!("Failed to drop the old link: {err}");
            }
        }

        if let Err(err) = self.backend.connect(&target, self.config.connect_timeout) {
            log::warn!("Connecting to {} failed ({err}), trying the fixed address.", target.address);
            pause(self.config.fallback_delay);

            if let Err(err) = self
                .backend
                .connect_address(&self.identity.address, self.config.connect_timeout)
            {
                log::error!("Connecting to {} failed: {err}", self.identity.address);
                self.shared.set(ConnectionState::Failed, "Connection failed!");
                return Err(err);
            }
        }

        pause(self.config.connect_settle);

        let responses = Arc::new(ResponseSlot::new());

        let transport = match self.backend.open_channel(GattProfile::ALL, Arc::clone(&responses)) {
            Ok(transport) => transport,

            Err(err) => {
                log::error!("Failed to open the printer channel: {err}");

                let message = match err {
                    Error::ServiceNotFound => "Service not found!",
                    Error::CharacteristicNotFound => "Characteristic error!",
                    _ => "Connection failed!",
                };

                if let Err(err) = self.backend.disconnect() {
                    log::warn!("Failed to disconnect: {err}");
                }

                self.shared.set(ConnectionState::Failed, message);
                return Err(err);
            }
        };

        pause(self.config.subscribe_settle);

        self.session
            .open(Printer::new(transport, responses, self.print_config.clone()));

        self.shared.set(ConnectionState::Connected, "Ready");

        Ok(())
    }

    fn init_printer(&mut self) {
        let Some(printer) = self.session.current() else {
            return;
        };

        if let Err(err) = printer.connect() {
            log::warn!("Printer connect command failed: {err}");
        }

        pause(self.config.init_delay);

        if let Err(err) = printer.heartbeat() {
            log::warn!("Printer heartbeat failed: {err}");
        }

        self.shared.set_message("Printer ready");
    }
}
