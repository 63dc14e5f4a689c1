use crate::region::RegionKind;

/// Device address (4 bytes, little endian on air)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DevAddr(pub u32);

impl DevAddr {
    /// Create a device address from its over-the-air byte order
    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    /// Address as an integer, as used by the ping slot hopping formula
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Configuration of one stack instance
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackConfig {
    /// Regional channel plan used by the stack
    pub region: RegionKind,
    /// Device address (assigned by activation, zero until then)
    pub dev_addr: DevAddr,
}

impl StackConfig {
    /// Create a stack configuration for a region with no device address yet
    pub fn new(region: RegionKind) -> Self {
        Self {
            region,
            dev_addr: DevAddr::default(),
        }
    }

    /// Set the device address
    pub fn with_dev_addr(mut self, dev_addr: DevAddr) -> Self {
        self.dev_addr = dev_addr;
        self
    }
}
