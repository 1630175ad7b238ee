use super::{Error, LabelBitmap, PrintReport, Session};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

/// One label waiting to be printed. The job owns its raster.
#[derive(Debug, Clone)]
pub struct PrintJob {
    pub bitmap: LabelBitmap,
}

impl PrintJob {
    pub fn new(bitmap: LabelBitmap) -> Self {
        Self { bitmap }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("The printer is not connected.")]
    NotConnected,

    #[error("The printer is busy with another label.")]
    Busy,

    #[error("The print queue is full.")]
    QueueFull,
}

/// What the print thread is asked to do.
enum Work {
    Print(PrintJob),
    Heartbeat,
}

/// How the last job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    Printed(PrintReport),
    Failed(String),
}

struct Shared {
    busy: AtomicBool,
    queued: AtomicUsize,
    last_outcome: Mutex<Option<PrintOutcome>>,
}

/// Single-slot print queue served by a dedicated print thread.
///
/// At most one job is in flight: it is claimed with a compare-and-swap on the busy flag at
/// submission and released by the print thread when the job ends. Keepalives go through the
/// same thread so they never interleave with a label.
pub struct PrintQueue {
    session: Session,
    sender: Option<SyncSender<Work>>,
    shared: Arc<Shared>,
    worker_handle: Option<thread::JoinHandle<()>>,
}

impl PrintQueue {
    pub fn spawn(session: Session) -> Self {
        let (sender, receiver) = mpsc::sync_channel(1);

        let shared = Arc::new(Shared {
            busy: AtomicBool::new(false),
            queued: AtomicUsize::new(0),
            last_outcome: Mutex::new(None),
        });

        let worker_session = session.clone();
        let worker_shared = Arc::clone(&shared);

        let worker_handle = thread::Builder::new()
            .name(String::from("print"))
            .spawn(move || Self::runloop(receiver, worker_session, worker_shared))
            .map_err(|err| log::error!("Failed to spawn the print worker: {err}"))
            .ok();

        Self {
            session,
            sender: Some(sender),
            shared,
            worker_handle,
        }
    }

    /// Hand a job to the print thread without blocking.
    pub fn submit(&self, job: PrintJob) -> Result<(), QueueError> {
        self.dispatch(Work::Print(job))?;
        self.shared.queued.fetch_add(1, Ordering::AcqRel);

        Ok(())
    }

    /// Send a keepalive on the print thread. Rejected like a job while a label is printing.
    pub fn heartbeat(&self) -> Result<(), QueueError> {
        self.dispatch(Work::Heartbeat)
    }

    fn dispatch(&self, work: Work) -> Result<(), QueueError> {
        if !self.session.is_open() {
            return Err(QueueError::NotConnected);
        }

        if self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(QueueError::Busy);
        }

        let Some(sender) = &self.sender else {
            self.shared.busy.store(false, Ordering::Release);
            return Err(QueueError::QueueFull);
        };

        // Full or disconnected: either way the job does not run.
        sender.try_send(work).map_err(|_: TrySendError<Work>| {
            self.shared.busy.store(false, Ordering::Release);
            QueueError::QueueFull
        })
    }

    pub fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    /// Number of jobs accepted since startup.
    pub fn jobs_queued(&self) -> usize {
        self.shared.queued.load(Ordering::Acquire)
    }

    pub fn last_outcome(&self) -> Option<PrintOutcome> {
        self.shared
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn runloop(receiver: Receiver<Work>, session: Session, shared: Arc<Shared>) {
        for work in receiver {
            // Copy the session out; the link may drop it while we print.
            let printer = session.current();

            match work {
                Work::Print(job) => {
                    let result = match printer {
                        Some(printer) => printer.print(&job.bitmap),
                        None => Err(Error::NotConnected),
                    };

                    let outcome = match result {
                        Ok(report) => PrintOutcome::Printed(report),

                        Err(err) => {
                            log::error!("Print failed: {err}");
                            PrintOutcome::Failed(err.to_string())
                        }
                    };

                    *shared
                        .last_outcome
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(outcome);
                }

                Work::Heartbeat => {
                    if let Some(Err(err)) = printer.map(|printer| printer.heartbeat()) {
                        log::warn!("Heartbeat failed: {err}");
                    }
                }
            }

            shared.busy.store(false, Ordering::Release);
        }

        log::debug!("Print worker stopped.");
    }
}

impl Drop for PrintQueue {
    fn drop(&mut self) {
        // Closing the channel ends the worker after the current job.
        drop(self.sender.take());

        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                log::error!("The print worker panicked.");
            }
        }
    }
}
