use super::{Advertisement, Backend, Error, GattProfile, LinkEvent};
use crate::printer::{self, ResponseSlot, Transport};

use std::future::Future;
use std::str::FromStr;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use btleplug::api::{
    BDAddr, Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use tokio::runtime::{self, Runtime};
use tokio::task::JoinHandle;

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::NotConnected => Error::NotConnected,
            btleplug::Error::TimedOut(_) => Error::Timeout,
            btleplug::Error::DeviceNotFound => Error::DeviceNotFound,
            err => Error::Backend(err.to_string()),
        }
    }
}

/// Host Bluetooth through btleplug, driven from the blocking link worker.
///
/// The backend owns a small tokio runtime. Adapter events and notifications are pumped by
/// tasks on that runtime; everything else is `block_on`.
pub struct BtleBackend {
    runtime: Runtime,
    adapter: Adapter,
    peripheral: Option<Peripheral>,

    /// Id of the connected peripheral, so disconnects of other devices are ignored.
    current: Arc<Mutex<Option<PeripheralId>>>,

    notifications: Option<JoinHandle<()>>,
}

impl BtleBackend {
    /// Use the first adapter of the system.
    pub fn new(events: Sender<LinkEvent>) -> Result<Self, Error> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("btle")
            .enable_all()
            .build()?;

        let adapter = runtime.block_on(async {
            let manager = Manager::new().await?;
            let adapters = manager.adapters().await?;

            adapters.into_iter().next().ok_or(Error::NoAdapter)
        })?;

        let current = Arc::new(Mutex::new(None));
        let mut stream = runtime.block_on(adapter.events())?;

        let task_adapter = adapter.clone();
        let task_current = Arc::clone(&current);

        runtime.spawn(async move {
            while let Some(event) = stream.next().await {
                let event = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        match advertisement(&task_adapter, &id).await {
                            Some(device) => LinkEvent::Discovered(device),
                            None => continue,
                        }
                    }

                    CentralEvent::DeviceDisconnected(id) => {
                        let ours = task_current
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .as_ref()
                            == Some(&id);

                        if !ours {
                            continue;
                        }

                        LinkEvent::Disconnected
                    }

                    _ => continue,
                };

                // The worker is gone.
                if events.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            runtime,
            adapter,
            peripheral: None,
            current,
            notifications: None,
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn find(&self, address: BDAddr) -> Result<Peripheral, Error> {
        let peripherals = self.block_on(self.adapter.peripherals())?;

        peripherals
            .into_iter()
            .find(|peripheral| peripheral.address() == address)
            .ok_or(Error::DeviceNotFound)
    }

    fn connect_peripheral(&mut self, peripheral: Peripheral, timeout: Duration) -> Result<(), Error> {
        self.block_on(async {
            tokio::time::timeout(timeout, peripheral.connect())
                .await
                .map_err(|_| Error::Timeout)?
                .map_err(Error::from)
        })?;

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(peripheral.id());
        self.peripheral = Some(peripheral);

        Ok(())
    }
}

async fn advertisement(adapter: &Adapter, id: &PeripheralId) -> Option<Advertisement> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let properties = peripheral.properties().await.ok()??;

    Some(Advertisement {
        name: properties.local_name,
        address: properties.address.to_string(),
    })
}

fn parse_address(address: &str) -> Result<BDAddr, Error> {
    BDAddr::from_str(address).map_err(|_| Error::InvalidAddress(String::from(address)))
}

impl Backend for BtleBackend {
    fn start_scan(&mut self) -> Result<(), Error> {
        self.block_on(self.adapter.start_scan(ScanFilter::default()))?;
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<(), Error> {
        self.block_on(self.adapter.stop_scan())?;
        Ok(())
    }

    fn connect(&mut self, device: &Advertisement, timeout: Duration) -> Result<(), Error> {
        let peripheral = self.find(parse_address(&device.address)?)?;
        self.connect_peripheral(peripheral, timeout)
    }

    fn connect_address(&mut self, address: &str, timeout: Duration) -> Result<(), Error> {
        let address = parse_address(address)?;

        // The adapter only knows devices it has seen; give it a short look around first.
        if let Err(err) = self.find(address) {
            log::debug!("{address} not known yet ({err}), scanning briefly.");

            self.start_scan()?;
            self.block_on(tokio::time::sleep(timeout.min(Duration::from_secs(2))));
            self.stop_scan()?;
        }

        let peripheral = self.find(address)?;
        self.connect_peripheral(peripheral, timeout)
    }

    fn is_connected(&self) -> bool {
        self.peripheral.as_ref().is_some_and(|peripheral| {
            self.block_on(peripheral.is_connected()).unwrap_or(false)
        })
    }

    fn open_channel(
        &mut self,
        profiles: &[GattProfile],
        responses: Arc<ResponseSlot>,
    ) -> Result<Arc<dyn Transport>, Error> {
        let peripheral = self.peripheral.clone().ok_or(Error::NotConnected)?;

        self.block_on(peripheral.discover_services())?;
        let services = peripheral.services();

        let (profile, service) = profiles
            .iter()
            .find_map(|profile| {
                services
                    .iter()
                    .find(|service| service.uuid == profile.service)
                    .map(|service| (profile, service))
            })
            .ok_or(Error::ServiceNotFound)?;

        log::info!("Using printer service {}.", service.uuid);

        let find = |candidates: &[uuid::Uuid]| -> Option<Characteristic> {
            candidates.iter().find_map(|uuid| {
                service
                    .characteristics
                    .iter()
                    .find(|characteristic| characteristic.uuid == *uuid)
                    .cloned()
            })
        };

        let write = find(profile.write).ok_or(Error::CharacteristicNotFound)?;

        let notify = find(profile.notify)
            .filter(|characteristic| characteristic.properties.contains(CharPropFlags::NOTIFY));

        match notify {
            Some(notify) => {
                let mut stream = self.block_on(peripheral.notifications())?;
                self.block_on(peripheral.subscribe(&notify))?;

                log::debug!("Subscribed to {}.", notify.uuid);

                let uuid = notify.uuid;

                if let Some(task) = self.notifications.take() {
                    task.abort();
                }

                self.notifications = Some(self.runtime.spawn(async move {
                    while let Some(notification) = stream.next().await {
                        if notification.uuid == uuid {
                            log::trace!("<- {:02x?}", notification.value);
                            responses.deliver(&notification.value);
                        }
                    }
                }));
            }

            None => log::warn!("The printer characteristic cannot notify, acknowledgements will time out."),
        }

        Ok(Arc::new(BtleTransport {
            handle: self.runtime.handle().clone(),
            peripheral,
            characteristic: write,
        }))
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        if let Some(task) = self.notifications.take() {
            task.abort();
        }

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;

        match self.peripheral.take() {
            Some(peripheral) => {
                self.block_on(peripheral.disconnect())?;
                Ok(())
            }

            None => Ok(()),
        }
    }
}

/// Writes packets to the printer characteristic without response.
struct BtleTransport {
    handle: runtime::Handle,
    peripheral: Peripheral,
    characteristic: Characteristic,
}

impl Transport for BtleTransport {
    fn write(&self, data: &[u8]) -> Result<(), printer::Error> {
        self.handle
            .block_on(
                self.peripheral
                    .write(&self.characteristic, data, WriteType::WithoutResponse),
            )
            .map_err(|err| printer::Error::Transport(err.to_string()))
    }
}
