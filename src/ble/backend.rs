use super::{Error, GattProfile};
use crate::printer::{ResponseSlot, Transport};

use std::sync::Arc;
use std::time::Duration;

/// What a scan reports about a device in range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub name: Option<String>,
    pub address: String,
}

/// Events the radio stack pushes at the link worker. The sender side never blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Discovered(Advertisement),

    /// The connected peripheral went away.
    Disconnected,
}

/// The operations the link worker needs from a Bluetooth stack.
///
/// All calls block the worker until they finish or their timeout passes. Implementations
/// report discoveries and link loss through the event sender they were built with.
pub trait Backend: Send {
    fn start_scan(&mut self) -> Result<(), Error>;

    fn stop_scan(&mut self) -> Result<(), Error>;

    /// Connect to a device that was seen while scanning.
    fn connect(&mut self, device: &Advertisement, timeout: Duration) -> Result<(), Error>;

    /// Connect by hardware address alone.
    fn connect_address(&mut self, address: &str, timeout: Duration) -> Result<(), Error>;

    fn is_connected(&self) -> bool;

    /// Discover services on the connected device, pick the first matching profile and subscribe
    /// to its notifications. Notifications are delivered into `responses`.
    fn open_channel(
        &mut self,
        profiles: &[GattProfile],
        responses: Arc<ResponseSlot>,
    ) -> Result<Arc<dyn Transport>, Error>;

    fn disconnect(&mut self) -> Result<(), Error>;
}

/// A stack that does not exist. Stands in where the build has no Bluetooth support.
#[derive(Debug)]
pub enum Unavailable {}

impl Backend for Unavailable {
    fn start_scan(&mut self) -> Result<(), Error> {
        match *self {}
    }

    fn stop_scan(&mut self) -> Result<(), Error> {
        match *self {}
    }

    fn connect(&mut self, _device: &Advertisement, _timeout: Duration) -> Result<(), Error> {
        match *self {}
    }

    fn connect_address(&mut self, _address: &str, _timeout: Duration) -> Result<(), Error> {
        match *self {}
    }

    fn is_connected(&self) -> bool {
        match *self {}
    }

    fn open_channel(
        &mut self,
        _profiles: &[GattProfile],
        _responses: Arc<ResponseSlot>,
    ) -> Result<Arc<dyn Transport>, Error> {
        match *self {}
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        match *self {}
    }
}
