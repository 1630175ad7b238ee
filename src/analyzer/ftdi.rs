use super::{AnalyzerEvent, GuardPair, Signature};

use std::sync::mpsc::Sender;
use std::sync::PoisonError;
use std::thread;
use std::time::Duration;

use rusb::{Device, DeviceHandle, Direction, GlobalContext, Recipient, RequestType, TransferType};

use crate::config::ANALYZER_BAUD_RATE;

/// Timeout for the vendor control requests of the handshake.
const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

/// A bulk read returns after this long even without data, so we can check the exit flag.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// How long to wait between device list scans while no analyzer is plugged in.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(1);

/// Every bulk IN packet starts with two modem status bytes.
const STATUS_BYTES: usize = 2;

const READ_SIZE: usize = 64;

/// Data format: 8 data bits, no parity, 1 stop bit.
const DATA_8N1: u16 = 0x0008;

/// FTDI vendor requests.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum Request {
    Reset = 0x00,
    ModemCtrl = 0x01,
    SetFlowCtrl = 0x02,
    SetBaudRate = 0x03,
    SetData = 0x04,
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    struct ModemCtrl: u16 {
        const DTR = 0x0001;
        const RTS = 0x0002;
        const DTR_ENABLE = 0x0100;
        const RTS_ENABLE = 0x0200;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("An USB error has occurred: {0}")]
    Usb(#[from] rusb::Error),

    #[error("The analyzer offers no interface.")]
    NoInterface,

    #[error("The analyzer interface offers no descriptor.")]
    NoInterfaceDescriptor,

    #[error("The analyzer interface offers no bulk input endpoint.")]
    NoInEndpoint,

    #[error("The analyzer interface offers no bulk output endpoint.")]
    NoOutEndpoint,
}

/// Encode a baud rate as the FT232R divisor (`wValue`, `wIndex`).
///
/// The chip divides 3 MHz by an integer plus a multiple of 1/8. The fraction is stored in the
/// top bits of `wValue` with an odd encoding.
pub fn baud_divisor(baud_rate: u32) -> (u16, u16) {
    const FRACTION_CODE: [u32; 8] = [0, 3, 2, 4, 1, 5, 6, 7];
    const BASE_CLOCK: u32 = 3_000_000;

    match baud_rate {
        0 => return (0, 0),
        rate if rate >= BASE_CLOCK => return (0, 0),
        rate if rate >= BASE_CLOCK * 2 / 3 => return (1, 0),
        _ => {}
    }

    // Divisor in eighths, rounded to nearest.
    let eighths = (BASE_CLOCK * 8 + baud_rate / 2) / baud_rate;
    let encoded = (eighths >> 3) | (FRACTION_CODE[(eighths & 7) as usize] << 14);

    ((encoded & 0xffff) as u16, (encoded >> 16) as u16)
}

/// Polls the USB bus for the analyzer and streams its output to the link worker.
pub struct FtdiSource {
    signature: Signature,
}

struct Opened {
    handle: DeviceHandle<GlobalContext>,
    interface: u8,
    in_addr: u8,
}

impl FtdiSource {
    pub fn new(signature: Signature) -> Self {
        Self { signature }
    }

    pub fn spawn(
        self,
        events: Sender<AnalyzerEvent>,
        guard_pair: GuardPair,
    ) -> Option<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name(String::from("analyzer-usb"))
            .spawn(move || self.runloop(events, guard_pair))
            .map_err(|err| log::error!("Failed to spawn the USB reader: {err}"))
            .ok()
    }

    fn runloop(self, events: Sender<AnalyzerEvent>, guard_pair: GuardPair) {
        let (guard, cvar) = &*guard_pair;

        loop {
            // Look for the device and bring it up.
            match self.open() {
                Ok(Some(mut opened)) => {
                    if events.send(AnalyzerEvent::Attached(self.signature)).is_err() {
                        return;
                    }

                    // Stream until the device is lost or we are asked to exit.
                    let exit = Self::perform_io(&opened, &events, &guard_pair);

                    let _ = opened.handle.release_interface(opened.interface);
                    let _ = events.send(AnalyzerEvent::Detached);

                    if exit {
                        return;
                    }
                }

                Ok(None) => log::trace!("No analyzer on the bus."),
                Err(err) => log::warn!("Failed to open the analyzer: {err}"),
            }

            // Wait the given timeout on the condvar.
            let Ok((_guard, wait_result)) = cvar.wait_timeout_while(
                guard.lock().unwrap_or_else(PoisonError::into_inner),
                ATTACH_TIMEOUT,
                |&mut should_exit| !should_exit,
            ) else {
                return;
            };

            // If no timeout has happened, we have been awoken.
            if !wait_result.timed_out() {
                return;
            }
        }
    }

    fn select_device(&self) -> Result<Option<Device<GlobalContext>>, rusb::Error> {
        Ok(rusb::DeviceList::new()?.iter().find(|device| {
            // Skip devices where the descriptor cannot be read.
            device.device_descriptor().is_ok_and(|desc| {
                desc.vendor_id() == self.signature.vendor_id
                    && desc.product_id() == self.signature.product_id
            })
        }))
    }

    fn open(&self) -> Result<Option<Opened>, Error> {
        let Some(device) = self.select_device()? else {
            return Ok(None);
        };

        let (interface, in_addr, _out_addr) = select_interface(&device)?;
        let mut handle = device.open()?;

        // Not every platform can detach kernel drivers. That is fine as long as claiming works.
        match handle.set_auto_detach_kernel_driver(true) {
            Ok(()) | Err(rusb::Error::NotSupported) => {}
            Err(err) => return Err(err.into()),
        }

        handle.claim_interface(interface)?;

        if let Err(err) = handshake(&handle) {
            let _ = handle.release_interface(interface);
            return Err(err);
        }

        log::info!(
            "Opened FTDI analyzer on bus {} address {}.",
            device.bus_number(),
            device.address()
        );

        Ok(Some(Opened {
            handle,
            interface,
            in_addr,
        }))
    }

    /// Returns `true` if we should leave the runloop, `false` if the device has been lost.
    fn perform_io(opened: &Opened, events: &Sender<AnalyzerEvent>, guard_pair: &GuardPair) -> bool {
        let mut buffer = [0u8; READ_SIZE];

        loop {
            if *guard_pair.0.lock().unwrap_or_else(PoisonError::into_inner) {
                return true;
            }

            match opened
                .handle
                .read_bulk(opened.in_addr, &mut buffer, READ_TIMEOUT)
            {
                Ok(len) if len > STATUS_BYTES => {
                    let data = buffer[STATUS_BYTES..len].to_vec();

                    if events.send(AnalyzerEvent::Data(data)).is_err() {
                        return true;
                    }
                }

                // Only modem status, no payload.
                Ok(_) | Err(rusb::Error::Timeout) => {}

                Err(err @ (rusb::Error::NoDevice | rusb::Error::Io | rusb::Error::NotFound)) => {
                    log::warn!("Analyzer read failed: {err}");
                    return false;
                }

                // Resubmit on everything else.
                Err(err) => log::debug!("Analyzer read error: {err}"),
            }
        }
    }
}

fn select_interface(device: &Device<GlobalContext>) -> Result<(u8, u8, u8), Error> {
    // The FT232R has exactly one interface with one descriptor.
    let config_desc = device.active_config_descriptor()?;
    let interface = config_desc.interfaces().next().ok_or(Error::NoInterface)?;

    let interface_desc = interface
        .descriptors()
        .next()
        .ok_or(Error::NoInterfaceDescriptor)?;

    // Walk the bulk endpoints to find input and output.
    let (mut in_addr, mut out_addr) = (None, None);

    for endpoint_desc in interface_desc
        .endpoint_descriptors()
        .filter(|desc| desc.transfer_type() == TransferType::Bulk)
    {
        match endpoint_desc.direction() {
            Direction::In => in_addr = Some(endpoint_desc.address()),
            Direction::Out => out_addr = Some(endpoint_desc.address()),
        }
    }

    Ok((
        interface_desc.interface_number(),
        in_addr.ok_or(Error::NoInEndpoint)?,
        out_addr.ok_or(Error::NoOutEndpoint)?,
    ))
}

fn control(handle: &DeviceHandle<GlobalContext>, request: Request, value: u16, index: u16) -> Result<(), Error> {
    let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);

    handle.write_control(request_type, request as u8, value, index, &[], CONTROL_TIMEOUT)?;
    Ok(())
}

/// Reset, 115200 8N1, no flow control, DTR and RTS asserted.
fn handshake(handle: &DeviceHandle<GlobalContext>) -> Result<(), Error> {
    let (baud_value, baud_index) = baud_divisor(ANALYZER_BAUD_RATE);
    let modem = ModemCtrl::DTR | ModemCtrl::RTS | ModemCtrl::DTR_ENABLE | ModemCtrl::RTS_ENABLE;

    control(handle, Request::Reset, 0, 0)?;
    control(handle, Request::SetBaudRate, baud_value, baud_index)?;
    control(handle, Request::SetData, DATA_8N1, 0)?;
    control(handle, Request::SetFlowCtrl, 0, 0)?;
    control(handle, Request::ModemCtrl, modem.bits(), 0)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_for_common_rates() {
        assert_eq!(baud_divisor(115_200), (0x001a, 0));
        assert_eq!(baud_divisor(9_600), (0x4138, 0));
        assert_eq!(baud_divisor(3_000_000), (0, 0));
        assert_eq!(baud_divisor(2_000_000), (1, 0));
    }

    #[test]
    fn modem_control_asserts_both_lines() {
        let modem = ModemCtrl::DTR | ModemCtrl::RTS | ModemCtrl::DTR_ENABLE | ModemCtrl::RTS_ENABLE;
        assert_eq!(modem.bits(), 0x0303);
    }
}
