//! Stand-ins for the printer and the radio stack.

use crate::ble::{Advertisement, Backend, Error as LinkError, GattProfile, LinkConfig, LinkEvent};
use crate::printer::{
    frame, Error, PrintConfig, ResponseSlot, Transport, CONNECT_PREFIX, PAGE_COMPLETE,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);

    while Instant::now() < deadline {
        if condition() {
            return true;
        }

        thread::sleep(Duration::from_millis(5));
    }

    false
}

/// No pacing, short timeouts.
pub fn print_config() -> PrintConfig {
    PrintConfig {
        ack_timeout: Duration::from_millis(200),
        setup_delay: Duration::ZERO,
        page_delay: Duration::ZERO,
        empty_row_delay: Duration::ZERO,
        row_delay: Duration::ZERO,
        row_delay_after_10: Duration::ZERO,
        row_delay_after_20: Duration::ZERO,
        burst_rows: 0,
        burst_pause: Duration::ZERO,
        settle_delay: Duration::ZERO,
        completion_timeout: Duration::from_secs(1),
        ..PrintConfig::default()
    }
}

pub fn link_config() -> LinkConfig {
    LinkConfig {
        scan_timeout: Duration::from_millis(300),
        connect_timeout: Duration::from_millis(100),
        connect_settle: Duration::ZERO,
        subscribe_settle: Duration::ZERO,
        fallback_delay: Duration::ZERO,
        init_delay: Duration::ZERO,
        reconnect_backoff: Duration::from_millis(50),
        poll_interval: Duration::from_millis(10),
    }
}

/// A printer that answers every acknowledged command with a one-byte frame.
///
/// With a label height set, it also reports the finished page shortly after the last row.
pub struct FakeTransport {
    responses: Arc<ResponseSlot>,
    packets: Mutex<Vec<Vec<u8>>>,
    label_height: Option<u32>,
    acks: bool,
    broken: AtomicBool,
}

impl FakeTransport {
    pub fn new(responses: Arc<ResponseSlot>) -> Self {
        Self {
            responses,
            packets: Mutex::new(Vec::new()),
            label_height: None,
            acks: true,
            broken: AtomicBool::new(false),
        }
    }

    pub fn confirming_pages(mut self, height: u32) -> Self {
        self.label_height = Some(height);
        self
    }

    /// Never answer.
    pub fn silent(mut self) -> Self {
        self.acks = false;
        self
    }

    pub fn break_link(&self) {
        self.broken.store(true, Ordering::Release);
    }

    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.packets.lock().unwrap().clone()
    }

    /// The command byte of every packet written so far.
    pub fn commands(&self) -> Vec<u8> {
        self.packets()
            .iter()
            .map(|packet| unprefixed(packet)[2])
            .collect()
    }

    fn rows_done(&self, packet: &[u8]) -> bool {
        let Some(height) = self.label_height else {
            return false;
        };

        let row = u32::from(u16::from_be_bytes([packet[4], packet[5]]));

        let end = match packet[2] {
            0x84 => row + u32::from(packet[6]),
            _ => row + 1,
        };

        end >= height
    }
}

fn unprefixed(packet: &[u8]) -> &[u8] {
    match packet {
        [CONNECT_PREFIX, rest @ ..] => rest,
        _ => packet,
    }
}

impl Transport for FakeTransport {
    fn write(&self, data: &[u8]) -> Result<(), Error> {
        if self.broken.load(Ordering::Acquire) {
            return Err(Error::Transport(String::from("link lost")));
        }

        self.packets.lock().unwrap().push(data.to_vec());

        let packet = unprefixed(data);
        let command = packet[2];

        match command {
            0x84 | 0x85 => {
                if self.rows_done(packet) {
                    let responses = Arc::clone(&self.responses);

                    thread::spawn(move || {
                        thread::sleep(Duration::from_millis(50));
                        responses.deliver(&frame(PAGE_COMPLETE, &[0x01]).unwrap());
                    });
                }
            }

            _ if self.acks => self.responses.deliver(&frame(command, &[0x01]).unwrap()),
            _ => {}
        }

        Ok(())
    }
}

/// What the fake radio does and what it was asked to do.
#[derive(Default)]
pub struct Script {
    /// Reported on every scan start.
    pub advertise: Vec<Advertisement>,

    pub connect_fails: bool,
    pub address_connect_fails: bool,
    pub service_missing: bool,

    /// The printer behind the channel never answers.
    pub silent: bool,

    pub connected: bool,
    pub calls: Vec<String>,

    pub events: Option<Sender<LinkEvent>>,
    pub transport: Option<Arc<FakeTransport>>,
}

impl Script {
    pub fn shared() -> Arc<Mutex<Script>> {
        Arc::new(Mutex::new(Script::default()))
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|made| made.as_str() == call).count()
    }
}

pub fn printer_advertisement() -> Advertisement {
    Advertisement {
        name: Some(String::from(crate::config::PRINTER_NAME)),
        address: String::from("AA:BB:CC:DD:EE:FF"),
    }
}

/// Simulate the printer going out of range.
pub fn drop_link(script: &Arc<Mutex<Script>>) {
    let mut script = script.lock().unwrap();
    script.connected = false;

    if let Some(events) = &script.events {
        events.send(LinkEvent::Disconnected).unwrap();
    }
}

pub struct FakeBackend {
    script: Arc<Mutex<Script>>,
}

impl FakeBackend {
    /// A factory for [`crate::ble::PrinterLink::spawn`].
    pub fn factory(
        script: Arc<Mutex<Script>>,
    ) -> impl FnOnce(Sender<LinkEvent>) -> Result<FakeBackend, LinkError> + Send + 'static {
        move |events| {
            script.lock().unwrap().events = Some(events);
            Ok(FakeBackend { script })
        }
    }
}

impl Backend for FakeBackend {
    fn start_scan(&mut self) -> Result<(), LinkError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(String::from("start_scan"));

        if let Some(events) = &script.events {
            for device in &script.advertise {
                events.send(LinkEvent::Discovered(device.clone())).unwrap();
            }
        }

        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), LinkError> {
        self.script.lock().unwrap().calls.push(String::from("stop_scan"));
        Ok(())
    }

    fn connect(&mut self, _device: &Advertisement, _timeout: Duration) -> Result<(), LinkError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(String::from("connect"));

        if script.connect_fails {
            return Err(LinkError::Timeout);
        }

        script.connected = true;
        Ok(())
    }

    fn connect_address(&mut self, address: &str, _timeout: Duration) -> Result<(), LinkError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("connect_address {address}"));

        if script.address_connect_fails {
            return Err(LinkError::Timeout);
        }

        script.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.script.lock().unwrap().connected
    }

    fn open_channel(
        &mut self,
        profiles: &[GattProfile],
        responses: Arc<ResponseSlot>,
    ) -> Result<Arc<dyn Transport>, LinkError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("open_channel {}", profiles.len()));

        if script.service_missing {
            return Err(LinkError::ServiceNotFound);
        }

        let transport = FakeTransport::new(responses);
        let transport = Arc::new(if script.silent { transport.silent() } else { transport });
        script.transport = Some(Arc::clone(&transport));

        Ok(transport as Arc<dyn Transport>)
    }

    fn disconnect(&mut self) -> Result<(), LinkError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(String::from("disconnect"));
        script.connected = false;

        Ok(())
    }
}
