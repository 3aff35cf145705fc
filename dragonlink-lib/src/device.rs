use crate::constants::{DRAGONLINK_MANUFACTURER, DRAGONLINK_PRODUCT};
use crate::error::DlError;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Snapshot of one enumerated USB device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceDescriptor {
    pub bus_number: u8,
    pub device_number: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl UsbDeviceDescriptor {
    pub fn address(&self) -> DeviceAddress {
        DeviceAddress::new(self.vendor_id, self.product_id)
    }
}

impl fmt::Display for UsbDeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03}: ID {} {} {}",
            self.bus_number,
            self.device_number,
            self.address(),
            self.manufacturer.as_deref().unwrap_or("<unknown>"),
            self.product.as_deref().unwrap_or("<unknown>"),
        )
    }
}

/// Manufacturer/product pair identifying a class of hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSignature {
    pub manufacturer: String,
    pub product: String,
}

impl DeviceSignature {
    pub fn new(manufacturer: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            product: product.into(),
        }
    }

    /// The signature of the DragonLink's NXP VCOM interface.
    pub fn dragonlink() -> Self {
        Self::new(DRAGONLINK_MANUFACTURER, DRAGONLINK_PRODUCT)
    }

    /// Exact, case-sensitive match. Missing strings never match.
    pub fn matches(&self, descriptor: &UsbDeviceDescriptor) -> bool {
        descriptor.manufacturer.as_deref() == Some(self.manufacturer.as_str())
            && descriptor.product.as_deref() == Some(self.product.as_str())
    }
}

impl Default for DeviceSignature {
    fn default() -> Self {
        Self::dragonlink()
    }
}

impl fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?}", self.manufacturer, self.product)
    }
}

/// `vvvv:pppp` address handed to the replay tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceAddress {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self { vendor_id, product_id }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

impl FromStr for DeviceAddress {
    type Err = DlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DlError::InvalidAddress(s.to_string());
        let (vendor, product) = s.split_once(':').ok_or_else(invalid)?;
        let parse = |part: &str| {
            if part.len() != 4 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            u16::from_str_radix(part, 16).map_err(|_| invalid())
        };
        Ok(Self::new(parse(vendor)?, parse(product)?))
    }
}

/// Source of USB device descriptors.
pub trait DeviceEnumerator {
    fn descriptors(&self) -> Result<Vec<UsbDeviceDescriptor>, DlError>;
}

/// Enumerates the devices attached to this host through `nusb`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NusbEnumerator;

impl DeviceEnumerator for NusbEnumerator {
    fn descriptors(&self) -> Result<Vec<UsbDeviceDescriptor>, DlError> {
        let descriptors = nusb::list_devices()?
            .map(|d| UsbDeviceDescriptor {
                bus_number: d.bus_number(),
                device_number: d.device_address(),
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                manufacturer: d.manufacturer_string().map(str::to_owned),
                product: d.product_string().map(str::to_owned),
            })
            .collect::<Vec<_>>();
        debug!("Enumerated {} USB device(s)", descriptors.len());
        Ok(descriptors)
    }
}

/// Return the address of the first descriptor matching `signature`.
///
/// Descriptors are scanned in the order given. If several identical devices
/// are attached, which one wins depends entirely on the enumeration order.
pub fn locate(descriptors: &[UsbDeviceDescriptor], signature: &DeviceSignature) -> Result<DeviceAddress, DlError> {
    let mut matches = descriptors.iter().filter(|d| signature.matches(d));

    let found = matches.next().ok_or_else(|| DlError::DeviceNotFound {
        manufacturer: signature.manufacturer.clone(),
        product: signature.product.clone(),
        scanned: descriptors.len(),
    })?;
    info!("Found USB: {}", found);

    for other in matches {
        warn!("Ignoring additional matching device: {}", other);
    }

    Ok(found.address())
}
