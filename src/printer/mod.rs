use std::sync::{Arc, Mutex, PoisonError};

/// Frame commands for the printer's BLE protocol.
mod packet;
pub use packet::{checksum, frame, Command, Request, CONNECT_PREFIX, MAX_PAYLOAD};

/// Label stock: physical size and how the printer finds the label edge.
mod label;
pub use label::{LabelSize, LabelType};

/// The 1-bit raster a label is drawn into.
mod bitmap;
pub use bitmap::{Ink, LabelBitmap};

/// Fonts that can draw onto a label bitmap.
mod font;
pub use font::{BuiltinFont, Typeface, GLYPH_HEIGHT, GLYPH_WIDTH};

/// Writing packets and waiting for the printer's notifications.
mod io;
pub use io::{ResponseSlot, Transport};

/// Notifications coming back from the printer.
mod status;
pub use status::{is_page_complete, Error as ResponseError, Response, PAGE_COMPLETE};

/// The print sequence and its pacing.
mod print;
pub use print::{PrintConfig, PrintReport};

/// Queue labels for a dedicated print thread.
mod job;
pub use job::{PrintJob, PrintOutcome, PrintQueue, QueueError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to write to the printer: {0}")]
    Transport(String),

    #[error("The printer did not acknowledge {0:?}.")]
    NoAcknowledgement(Command),

    #[error("A payload of {0} bytes does not fit into one packet.")]
    PayloadTooLong(usize),

    #[error("A {width}x{height} label exceeds the page size limits.")]
    InvalidLabel { width: u32, height: u32 },

    #[error("There is no printer session.")]
    NotConnected,
}

/// An open printer session: a transport plus the mailbox its notifications land in.
#[derive(Clone)]
pub struct Printer {
    transport: Arc<dyn Transport>,
    responses: Arc<ResponseSlot>,
    config: PrintConfig,
}

impl Printer {
    pub fn new(transport: Arc<dyn Transport>, responses: Arc<ResponseSlot>, config: PrintConfig) -> Self {
        Self {
            transport,
            responses,
            config,
        }
    }

    pub fn config(&self) -> &PrintConfig {
        &self.config
    }

    /// Announce ourselves after the link is up.
    pub fn connect(&self) -> Result<(), Error> {
        self.send_and_wait(&Request::Connect).map(|_| ())
    }

    /// Keep the session alive.
    pub fn heartbeat(&self) -> Result<(), Error> {
        self.send_and_wait(&Request::Heartbeat).map(|_| ())
    }
}

/// The currently open printer session, shared between the link worker (which opens and closes
/// it) and everyone who wants to talk to the printer.
#[derive(Clone, Default)]
pub struct Session {
    current: Arc<Mutex<Option<Printer>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, printer: Printer) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(printer);
    }

    pub fn close(&self) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_open(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// A handle to the open session. The lock is not held while the caller uses it.
    pub fn current(&self) -> Option<Printer> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
