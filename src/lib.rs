//! Register-space fuzzing for PCI devices.
//!
//! Given a device named by its (bus, device, function) triple, this crate
//! enumerates the device's Base Address Registers, sizes and classifies each
//! window (port I/O vs. memory, 32-bit vs. 64-bit), maps memory windows into
//! the process through `/dev/mem`, and then drives pseudo-random 8/16/32-bit
//! reads and writes at random offsets within those windows. Every issued
//! access is handed to a [`RecordSink`](fuzzer::RecordSink) as a structured
//! [`Record`](fuzzer::Record).
//!
//! The operand stream is decoded from an arbitrary byte source by
//! [`Input`](input::Input), so a run is replayable from a saved corpus file
//! and the whole driver can sit behind a coverage-guided fuzzing front-end.
//!
//! Hardware is reached through three small traits ([`ConfigAccess`] for
//! configuration space, [`PortAccess`](io::PortAccess) for the x86 port bus,
//! [`PhysMapper`](mem::PhysMapper) for physical-memory windows), so the
//! probing and driving logic can be exercised against scripted backends.
//! [`HostBackend`] bundles the real implementations of all three; building
//! one is `unsafe` because everything below it assumes the process holds
//! x86 I/O-port privilege (`iopl(3)`).

pub mod config;
pub mod device;
pub mod fuzzer;
pub mod input;
pub mod io;
pub mod mem;
mod register;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::Mechanism1;
pub use device::PciDevice;
pub use fuzzer::{Fuzzer, JsonLinesSink, Record, RecordSink, MAX_INPUT};
pub use input::Input;
pub use io::{PortAccess, PortIo};
pub use mem::{DevMem, MemoryMap, PhysMapper};
pub use register::CommandRegister;

use bit_field::BitField;
use core::fmt;

/// The largest number of base address registers a configuration header can
/// carry, and therefore the largest number of regions a device can expose.
pub const MAX_REGIONS: usize = 6;

/// The address of a PCI function on the legacy configuration bus.
///
/// 256 buses, each with 32 slots, each with 8 possible functions. We pack
/// this into a `u16`:
///
/// ```ignore
/// 16              8         3      0
///  +--------------+---------+------+
///  |      bus     | device  | func |
///  +--------------+---------+------+
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct DeviceAddress(u16);

impl DeviceAddress {
    /// Validates and packs a (bus, device, function) triple.
    ///
    /// Fails with [`Error::InvalidArgument`] when `bus > 255`,
    /// `device > 31`, or `function > 7`.
    pub fn new(bus: u16, device: u8, function: u8) -> Result<DeviceAddress> {
        if bus > 255 {
            return Err(Error::InvalidArgument("bus number out of range"));
        }
        if device > 31 {
            return Err(Error::InvalidArgument("device number out of range"));
        }
        if function > 7 {
            return Err(Error::InvalidArgument("function number out of range"));
        }

        let mut result = 0u16;
        result.set_bits(0..3, function as u16);
        result.set_bits(3..8, device as u16);
        result.set_bits(8..16, bus);
        Ok(DeviceAddress(result))
    }

    pub fn bus(&self) -> u8 {
        self.0.get_bits(8..16) as u8
    }

    pub fn device(&self) -> u8 {
        self.0.get_bits(3..8) as u8
    }

    pub fn function(&self) -> u8 {
        self.0.get_bits(0..3) as u8
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus(), self.device(), self.function())
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Access to the configuration space of PCI functions.
///
/// The device object speaks to configuration space exclusively through this
/// trait, at the width the protocol step calls for; the data-port offset
/// math of the legacy mechanism lives behind it (see [`Mechanism1`]).
pub trait ConfigAccess {
    /// Performs an 8-bit configuration read at `address` with `offset`.
    ///
    /// # Safety
    ///
    /// `address` and `offset` must be valid for PCI reads.
    unsafe fn read8(&self, address: DeviceAddress, offset: u16) -> u8;

    /// Performs a 16-bit configuration read at `address` with `offset`.
    ///
    /// # Safety
    ///
    /// `address` and `offset` must be valid for PCI reads.
    unsafe fn read16(&self, address: DeviceAddress, offset: u16) -> u16;

    /// Performs a 32-bit configuration read at `address` with `offset`.
    ///
    /// # Safety
    ///
    /// `address` and `offset` must be valid for PCI reads.
    unsafe fn read32(&self, address: DeviceAddress, offset: u16) -> u32;

    /// Performs an 8-bit configuration write at `address` with `offset`.
    ///
    /// # Safety
    ///
    /// `address` and `offset` must be valid for PCI writes.
    unsafe fn write8(&self, address: DeviceAddress, offset: u16, value: u8);

    /// Performs a 16-bit configuration write at `address` with `offset`.
    ///
    /// # Safety
    ///
    /// `address` and `offset` must be valid for PCI writes.
    unsafe fn write16(&self, address: DeviceAddress, offset: u16, value: u16);

    /// Performs a 32-bit configuration write at `address` with `offset`.
    ///
    /// # Safety
    ///
    /// `address` and `offset` must be valid for PCI writes.
    unsafe fn write32(&self, address: DeviceAddress, offset: u16, value: u32);
}

impl<T: ConfigAccess + ?Sized> ConfigAccess for &T {
    #[inline]
    unsafe fn read8(&self, address: DeviceAddress, offset: u16) -> u8 {
        (**self).read8(address, offset)
    }

    #[inline]
    unsafe fn read16(&self, address: DeviceAddress, offset: u16) -> u16 {
        (**self).read16(address, offset)
    }

    #[inline]
    unsafe fn read32(&self, address: DeviceAddress, offset: u16) -> u32 {
        (**self).read32(address, offset)
    }

    #[inline]
    unsafe fn write8(&self, address: DeviceAddress, offset: u16, value: u8) {
        (**self).write8(address, offset, value)
    }

    #[inline]
    unsafe fn write16(&self, address: DeviceAddress, offset: u16, value: u16) {
        (**self).write16(address, offset, value)
    }

    #[inline]
    unsafe fn write32(&self, address: DeviceAddress, offset: u16, value: u32) {
        (**self).write32(address, offset, value)
    }
}

/// Everything [`PciDevice`] needs from the platform: configuration space,
/// the port bus for I/O regions, and a physical-memory mapper for memory
/// regions. Blanket-implemented; [`HostBackend`] is the hardware instance.
pub trait Backend: ConfigAccess + io::PortAccess + mem::PhysMapper {}

impl<T: ConfigAccess + io::PortAccess + mem::PhysMapper> Backend for T {}

/// The hardware backend: configuration mechanism #1 over the CPU's port
/// bus, plus `/dev/mem` for memory windows.
pub struct HostBackend {
    config: Mechanism1<PortIo>,
    ports: PortIo,
    mapper: DevMem,
}

impl HostBackend {
    /// # Safety
    ///
    /// The process must hold x86 I/O-port privilege (e.g. via `iopl(3)`)
    /// for the lifetime of the returned value; port accesses fault
    /// otherwise.
    pub unsafe fn new() -> HostBackend {
        HostBackend { config: Mechanism1::new(PortIo::new()), ports: PortIo::new(), mapper: DevMem }
    }
}

impl ConfigAccess for HostBackend {
    unsafe fn read8(&self, address: DeviceAddress, offset: u16) -> u8 {
        self.config.read8(address, offset)
    }

    unsafe fn read16(&self, address: DeviceAddress, offset: u16) -> u16 {
        self.config.read16(address, offset)
    }

    unsafe fn read32(&self, address: DeviceAddress, offset: u16) -> u32 {
        self.config.read32(address, offset)
    }

    unsafe fn write8(&self, address: DeviceAddress, offset: u16, value: u8) {
        self.config.write8(address, offset, value)
    }

    unsafe fn write16(&self, address: DeviceAddress, offset: u16, value: u16) {
        self.config.write16(address, offset, value)
    }

    unsafe fn write32(&self, address: DeviceAddress, offset: u16, value: u32) {
        self.config.write32(address, offset, value)
    }
}

impl io::PortAccess for HostBackend {
    unsafe fn inb(&self, port: u16) -> u8 {
        self.ports.inb(port)
    }

    unsafe fn inw(&self, port: u16) -> u16 {
        self.ports.inw(port)
    }

    unsafe fn inl(&self, port: u16) -> u32 {
        self.ports.inl(port)
    }

    unsafe fn outb(&self, port: u16, value: u8) {
        self.ports.outb(port, value)
    }

    unsafe fn outw(&self, port: u16, value: u16) {
        self.ports.outw(port, value)
    }

    unsafe fn outl(&self, port: u16, value: u32) {
        self.ports.outl(port, value)
    }
}

impl mem::PhysMapper for HostBackend {
    fn map_region(&self, base: u64, len: u64) -> Result<MemoryMap> {
        self.mapper.map_region(base, len)
    }
}

/// The error kinds of this crate.
#[derive(Debug)]
pub enum Error {
    /// An out-of-range bus/device/function component, region index, or
    /// offset.
    InvalidArgument(&'static str),
    /// The configuration read at offset 0 returned vendor `0xFFFF`: no
    /// function answers at that address.
    NoSuchDevice,
    /// The header-type field names a layout other than endpoint,
    /// PCI-to-PCI bridge, or CardBus bridge.
    UnsupportedHeader(u8),
    /// Mapping a memory region failed for a non-permission reason.
    MappingFailed(std::io::Error),
    /// Mapping a memory region was refused by the kernel; the region stays
    /// declared but unmapped.
    PermissionDenied,
    /// The input stream returned fewer bytes than requested; for a
    /// corpus-driven run this is the normal end-of-run signal.
    InputExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            Error::NoSuchDevice => write!(f, "no device at the given address"),
            Error::UnsupportedHeader(ty) => write!(f, "unsupported header type {:#04x}", ty),
            Error::MappingFailed(err) => write!(f, "mapping a memory region failed: {}", err),
            Error::PermissionDenied => write!(f, "mapping a memory region was not permitted"),
            Error::InputExhausted => write!(f, "input exhausted"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MappingFailed(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_packs_and_unpacks() {
        let address = DeviceAddress::new(0xA5, 0x1F, 0x7).unwrap();
        assert_eq!(address.bus(), 0xA5);
        assert_eq!(address.device(), 0x1F);
        assert_eq!(address.function(), 0x7);
    }

    #[test]
    fn address_rejects_out_of_range_components() {
        assert!(matches!(DeviceAddress::new(256, 0, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(DeviceAddress::new(0, 32, 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(DeviceAddress::new(0, 0, 8), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn address_display() {
        let address = DeviceAddress::new(0, 2, 1).unwrap();
        assert_eq!(address.to_string(), "00:02.1");
    }
}
