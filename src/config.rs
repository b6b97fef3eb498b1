//! Legacy PCI configuration mechanism #1.

use crate::io::PortAccess;
use crate::{ConfigAccess, DeviceAddress};

/// The index port: a function address and register offset are latched here.
pub const CONFIG_ADDRESS: u16 = 0xCF8;
/// The data port: the addressed register window appears in these four bytes.
pub const CONFIG_DATA: u16 = 0xCFC;

/// Configuration access through the `0xCF8`/`0xCFC` index/data port pair.
///
/// An access latches
/// `0x80000000 | bus << 16 | device << 11 | function << 8 | (offset & 0xFC)`
/// into [`CONFIG_ADDRESS`] and then moves the data through
/// `CONFIG_DATA + (offset & m)`, where the low offset bits select the byte
/// lane: `m` is 3 for 8-bit, 2 for 16-bit and 0 for 32-bit transfers.
pub struct Mechanism1<P> {
    ports: P,
}

impl<P: PortAccess> Mechanism1<P> {
    pub fn new(ports: P) -> Mechanism1<P> {
        Mechanism1 { ports }
    }

    fn address(address: DeviceAddress, offset: u16) -> u32 {
        0x8000_0000
            | (address.bus() as u32) << 16
            | (address.device() as u32) << 11
            | (address.function() as u32) << 8
            | (offset as u32 & 0xFC)
    }
}

impl<P: PortAccess> ConfigAccess for Mechanism1<P> {
    unsafe fn read8(&self, address: DeviceAddress, offset: u16) -> u8 {
        self.ports.outl(CONFIG_ADDRESS, Self::address(address, offset));
        self.ports.inb(CONFIG_DATA + (offset & 3))
    }

    unsafe fn read16(&self, address: DeviceAddress, offset: u16) -> u16 {
        self.ports.outl(CONFIG_ADDRESS, Self::address(address, offset));
        self.ports.inw(CONFIG_DATA + (offset & 2))
    }

    unsafe fn read32(&self, address: DeviceAddress, offset: u16) -> u32 {
        self.ports.outl(CONFIG_ADDRESS, Self::address(address, offset));
        self.ports.inl(CONFIG_DATA)
    }

    unsafe fn write8(&self, address: DeviceAddress, offset: u16, value: u8) {
        self.ports.outl(CONFIG_ADDRESS, Self::address(address, offset));
        self.ports.outb(CONFIG_DATA + (offset & 3), value);
    }

    unsafe fn write16(&self, address: DeviceAddress, offset: u16, value: u16) {
        self.ports.outl(CONFIG_ADDRESS, Self::address(address, offset));
        self.ports.outw(CONFIG_DATA + (offset & 2), value);
    }

    unsafe fn write32(&self, address: DeviceAddress, offset: u16, value: u32) {
        self.ports.outl(CONFIG_ADDRESS, Self::address(address, offset));
        self.ports.outl(CONFIG_DATA, value);
    }
}
