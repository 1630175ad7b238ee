use super::{AnalyzerEvent, GuardPair, Signature};

use std::io::{ErrorKind, Read};
use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::ANALYZER_BAUD_RATE;

/// The timeout after which a pending read returns without data.
const IO_TIMEOUT: Duration = Duration::from_millis(100);

/// The timeout to wait until a new port access is issued.
const PORT_TIMEOUT: Duration = Duration::from_secs(2);

const READ_SIZE: usize = 64;

/// Reads the analyzer through an OS serial device (e.g. `/dev/ttyUSB0`).
///
/// The kernel driver strips the FTDI status bytes, so data is forwarded as is.
pub struct SerialSource {
    port_path: String,
    signature: Signature,
}

impl SerialSource {
    pub fn new(port_path: &str, signature: Signature) -> Self {
        Self {
            port_path: String::from(port_path),
            signature,
        }
    }

    pub fn spawn(
        self,
        events: Sender<AnalyzerEvent>,
        guard_pair: GuardPair,
    ) -> Option<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(String::from("analyzer-serial"))
            .spawn(move || self.runloop(events, guard_pair))
            .map_err(|err| log::error!("Failed to spawn the serial reader: {err}"))
            .ok()
    }

    fn runloop(self, events: Sender<AnalyzerEvent>, guard_pair: GuardPair) {
        let (guard, cvar) = &*guard_pair;

        loop {
            // Try to open the port.
            let Some(port) = self.open_port(guard, cvar) else {
                return;
            };

            // Yay, we have an open port.
            if events.send(AnalyzerEvent::Attached(self.signature)).is_err() {
                return;
            }

            let exit = Self::perform_io(port, guard, &events);
            let _ = events.send(AnalyzerEvent::Detached);

            // When we leave `perform_io()` without the exit flag, the port has been lost.
            // Therefore, we simply restart the loop.
            if exit {
                return;
            }
        }
    }

    fn open_port(&self, guard: &Mutex<bool>, cvar: &Condvar) -> Option<Box<dyn SerialPort>> {
        loop {
            // Specify the characteristics of the port.
            let port_builder = serialport::new(&self.port_path, ANALYZER_BAUD_RATE)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .parity(Parity::None)
                .timeout(IO_TIMEOUT);

            match port_builder.open() {
                Ok(mut port) => {
                    // The analyzer only talks once DTR and RTS are up.
                    let lines = port
                        .write_data_terminal_ready(true)
                        .and_then(|_| port.write_request_to_send(true));

                    match lines {
                        Ok(()) => {
                            log::info!("Opened analyzer on {}.", self.port_path);
                            return Some(port);
                        }

                        Err(err) => log::warn!("Failed to raise DTR/RTS on {}: {err}", self.port_path),
                    }
                }

                Err(err) => log::debug!("Failed to open {}: {err}", self.port_path),
            }

            // Wait the given timeout on the condvar.
            let (_guard, wait_result) = cvar
                .wait_timeout_while(
                    guard.lock().unwrap_or_else(PoisonError::into_inner),
                    PORT_TIMEOUT,
                    |&mut should_exit| !should_exit,
                )
                .unwrap_or_else(PoisonError::into_inner);

            // If no timeout has happened, we have been awoken.
            if !wait_result.timed_out() {
                return None;
            }
        }
    }

    /// Returns `true` if we should leave the runloop, `false` if the port has been lost.
    fn perform_io(
        mut port: Box<dyn SerialPort>,
        guard: &Mutex<bool>,
        events: &Sender<AnalyzerEvent>,
    ) -> bool {
        let mut buffer = [0u8; READ_SIZE];

        loop {
            if *guard.lock().unwrap_or_else(PoisonError::into_inner) {
                return true;
            }

            match port.read(&mut buffer) {
                Ok(0) => {}

                Ok(len) => {
                    if events.send(AnalyzerEvent::Data(buffer[..len].to_vec())).is_err() {
                        return true;
                    }
                }

                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}

                Err(err) => {
                    log::warn!("Analyzer port lost: {err}");
                    return false;
                }
            }
        }
    }
}
