use uuid::Uuid;

use crate::config::{PRINTER_ADDRESS, PRINTER_NAME};

/// How the printer is recognised while scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterIdentity {
    pub name: String,
    pub address: String,
}

impl Default for PrinterIdentity {
    fn default() -> Self {
        Self {
            name: String::from(PRINTER_NAME),
            address: String::from(PRINTER_ADDRESS),
        }
    }
}

impl PrinterIdentity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Either the advertised name or the hardware address has to match.
    pub fn matches(&self, name: Option<&str>, address: &str) -> bool {
        name == Some(self.name.as_str()) || address.eq_ignore_ascii_case(&self.address)
    }
}

/// A GATT service plus the characteristics we accept on it, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattProfile {
    pub service: Uuid,

    /// Candidates for the characteristic packets are written to.
    pub write: &'static [Uuid],

    /// Candidates for the characteristic the printer answers on.
    pub notify: &'static [Uuid],
}

const VENDOR_SERVICE: Uuid = Uuid::from_u128(0xe7810a71_73ae_499d_8c15_faa9aef0c3f2);
const VENDOR_CHARACTERISTIC: Uuid = Uuid::from_u128(0xbef8d6c9_9c21_4c9e_b632_bd58c1009f9f);

const UART_SERVICE: Uuid = Uuid::from_u128(0x49535343_fe7d_4ae5_8fa9_9fafd205e455);
const UART_TX: Uuid = Uuid::from_u128(0x49535343_1e4d_4bd9_ba61_23c647249616);
const UART_RX: Uuid = Uuid::from_u128(0x49535343_8841_43f4_a8d4_ecbe34729bb3);

impl GattProfile {
    /// The printer's own service. One characteristic carries both directions.
    pub const VENDOR: GattProfile = GattProfile {
        service: VENDOR_SERVICE,
        write: &[VENDOR_CHARACTERISTIC],
        notify: &[VENDOR_CHARACTERISTIC],
    };

    /// Generic UART bridge some units expose instead.
    pub const UART_BRIDGE: GattProfile = GattProfile {
        service: UART_SERVICE,
        write: &[UART_TX, UART_RX],
        notify: &[UART_TX],
    };

    /// Profiles to try, first match wins.
    pub const ALL: &'static [GattProfile] = &[GattProfile::VENDOR, GattProfile::UART_BRIDGE];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_by_name_or_address() {
        let identity = PrinterIdentity::default();

        assert!(identity.matches(Some("B1-H119122559"), "00:00:00:00:00:00"));
        assert!(identity.matches(None, "19:01:12:f0:2f:4c"));
        assert!(identity.matches(Some("Other"), "19:01:12:F0:2F:4C"));
        assert!(!identity.matches(Some("B1-H000000000"), "19:01:12:F0:2F:4D"));
        assert!(!identity.matches(None, ""));
    }

    #[test]
    fn profile_uuids() {
        assert_eq!(
            GattProfile::VENDOR.service.to_string(),
            "e7810a71-73ae-499d-8c15-faa9aef0c3f2"
        );
        assert_eq!(
            GattProfile::UART_BRIDGE.write[0].to_string(),
            "49535343-1e4d-4bd9-ba61-23c647249616"
        );
        assert_eq!(GattProfile::ALL.len(), 2);
    }
}
