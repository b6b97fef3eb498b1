//! The device object: identification, BAR probing, and the region access
//! surface.

use crate::io::PortAccess;
use crate::mem::{MemoryMap, PhysMapper};
use crate::register::CommandRegister;
use crate::{Backend, ConfigAccess, DeviceAddress, Error, Result};
use bit_field::BitField;
use core::mem::size_of;
use core::ptr;

/// Offset of the word the sizing protocol treats as the command register.
const COMMAND: u16 = 0x02;
/// Offset of the first base address register slot.
const BAR0: u16 = 0x10;

/// One addressable window of a device.
///
/// `size` is zero for unimplemented registers; such regions stay in the
/// array but every access to them fails. A 64-bit window consumes two
/// consecutive BAR slots but appears as a single region.
struct Region {
    base_address: u64,
    size: u64,
    is_io: bool,
    is_64: bool,
    map: Option<MemoryMap>,
}

/// A PCI function with its regions sized, classified, and (for memory
/// windows) mapped into the process.
///
/// Construction reads the predefined part of the configuration header:
///
/// ```ignore
///     32                            16                              0
///      +-----------------------------+------------------------------+
///      |       Device ID             |       Vendor ID              | 0x00
///      +-----------------------------+------------------------------+
///      |         Status              |       Command                | 0x04
///      +-----------------------------+---------------+--------------+
///      |               Class Code                    |   Revision   | 0x08
///      +--------------+--------------+---------------+--------------+
///      |     BIST     |    Header    |    Latency    |  Cacheline   | 0x0c
///      |              |     type     |     timer     |    size      |
///      +--------------+--------------+---------------+--------------+
/// ```
///
/// and then sizes the BAR slots starting at offset `0x10`. The number of
/// slots follows from bits 0..=6 of the header type: 6 for an endpoint,
/// 2 for a PCI-to-PCI bridge, 1 for a CardBus bridge. Dropping the device
/// releases every mapping it established.
pub struct PciDevice<A> {
    access: A,
    address: DeviceAddress,
    vendor_id: u16,
    device_id: u16,
    class_code: u32,
    header_type: u8,
    regions: Vec<Region>,
}

impl<A: Backend> PciDevice<A> {
    /// Probes the function at `address` and makes its regions accessible.
    ///
    /// Fails with [`Error::NoSuchDevice`] when nothing answers at
    /// `address`, [`Error::UnsupportedHeader`] for header layouts other
    /// than the three classified above, and [`Error::MappingFailed`] when
    /// a memory window cannot be mapped for a non-permission reason. A
    /// window the kernel refuses on permission grounds stays declared but
    /// unmapped. A failed construction leaves no mappings behind.
    pub fn new(access: A, address: DeviceAddress) -> Result<PciDevice<A>> {
        let vendor_id = unsafe { access.read16(address, 0x00) };
        if vendor_id == 0xFFFF {
            return Err(Error::NoSuchDevice);
        }

        let device_id = unsafe { access.read16(address, 0x02) };
        /* The low byte of the word at 8 is the revision ID; the class code
           is the upper three bytes. */
        let class_code = unsafe { access.read32(address, 0x08) } >> 8;
        let header_type = unsafe { access.read8(address, 0x0E) };
        let num_regions = match header_type & 0x7F {
            0x00 => 6,
            /* PCI-to-PCI bridge */
            0x01 => 2,
            /* CardBus bridge */
            0x02 => 1,
            ty => return Err(Error::UnsupportedHeader(ty)),
        };

        let mut device = PciDevice {
            access,
            address,
            vendor_id,
            device_id,
            class_code,
            header_type,
            regions: Vec::with_capacity(num_regions),
        };
        device.probe_regions(num_regions)?;
        Ok(device)
    }

    fn probe_regions(&mut self, num_regions: usize) -> Result<()> {
        let mut offset = BAR0;
        for _ in 0..num_regions {
            let (mut region, next) = self.size_bar(offset);
            if !region.is_io && region.size > 0 {
                match self.access.map_region(region.base_address, region.size) {
                    Ok(map) => region.map = Some(map),
                    Err(Error::PermissionDenied) => {
                        log::warn!(
                            "{}: memory region at {:#x} not mappable; leaving it inaccessible",
                            self.address,
                            region.base_address,
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
            self.regions.push(region);
            offset = next;
        }
        Ok(())
    }

    /// Sizes and classifies the BAR at `offset`, returning the region and
    /// the offset of the next slot to look at (one further for a 64-bit
    /// window, whose upper half is folded into this region).
    fn size_bar(&self, offset: u16) -> (Region, u16) {
        let access = &self.access;

        /* Disable I/O and memory decoding while the register holds the
           probe pattern, so the device cannot transiently claim a garbage
           address. */
        let command =
            CommandRegister::from_bits_retain(unsafe { access.read16(self.address, COMMAND) });
        unsafe {
            access.write16(self.address, COMMAND, (command & !CommandRegister::DECODE_MASK).bits())
        };

        let mut base = unsafe { access.read32(self.address, offset) } as u64;
        unsafe { access.write32(self.address, offset, 0xFFFF_FFFF) };
        let readback = unsafe { access.read32(self.address, offset) };
        /* All-ones is what the upper half of a 32-bit register would
           answer; a 64-bit register overwrites it below. */
        let mut mask = readback as u64 | 0xFFFF_FFFF_0000_0000;
        unsafe { access.write32(self.address, offset, base as u32) };
        unsafe { access.write16(self.address, COMMAND, command.bits()) };

        /* ATA/IDE controllers in compatibility mode leave BAR0..BAR3 zero
           and answer at the legacy ISA windows instead; substitute those. */
        if self.is_ata_controller() && self.class_code & 0x05 == 0 && base == 0 {
            let substitute = match offset {
                0x10 => Some((0x1F0 | 0x01, !0x07u64)),
                0x14 => Some((0x3F0 | 0x01, !0x03u64)),
                0x18 => Some((0x170 | 0x01, !0x07u64)),
                0x1C => Some((0x370 | 0x01, !0x03u64)),
                _ => None,
            };
            if let Some((compat_base, compat_mask)) = substitute {
                base = compat_base;
                mask = compat_mask;
            }
        }

        let mut region = Region { base_address: 0, size: 0, is_io: false, is_64: false, map: None };
        let mut next = offset + 4;
        if base.get_bit(0) {
            region.is_io = true;
            /* Bit 0 is the space-encoding flag, not part of the address. */
            base.set_bit(0, false);
            mask.set_bit(0, false);
            /* Ports live in a 16-bit space; confine the size to it. */
            region.size = (!mask).wrapping_add(1) & 0xFFFF;
        } else {
            if base.get_bits(1..3) == 0b10 {
                /* A 64-bit window: the next slot holds the upper halves of
                   the address and of the probe mask. Size it the same way. */
                region.is_64 = true;
                unsafe {
                    access.write16(
                        self.address,
                        COMMAND,
                        (command & !CommandRegister::DECODE_MASK).bits(),
                    )
                };
                base |= (unsafe { access.read32(self.address, offset + 4) } as u64) << 32;
                unsafe { access.write32(self.address, offset + 4, 0xFFFF_FFFF) };
                mask = (mask & 0xFFFF_FFFF)
                    | ((unsafe { access.read32(self.address, offset + 4) } as u64) << 32);
                unsafe { access.write32(self.address, offset + 4, (base >> 32) as u32) };
                unsafe { access.write16(self.address, COMMAND, command.bits()) };
                next = offset + 8;
            }

            /* Bits 0..=3 carry the space, width and prefetch encoding. */
            base.set_bits(0..4, 0);
            mask.set_bits(0..4, 0);
            if !region.is_64 && readback & !0xF == 0 {
                /* Nothing answered the probe: the register is
                   unimplemented and exposes no window. */
                region.size = 0;
            } else {
                region.size = (!mask).wrapping_add(1);
            }
        }

        region.base_address = base;
        (region, next)
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    /// The 24-bit class code (base class, subclass, programming interface).
    pub fn class_code(&self) -> u32 {
        self.class_code
    }

    pub fn header_type(&self) -> u8 {
        self.header_type
    }

    /// The number of region slots the header layout provides. Always in
    /// `1..=6`; unimplemented slots are included with size zero.
    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    /// Whether the function is a mass-storage ATA/IDE controller.
    pub fn is_ata_controller(&self) -> bool {
        self.class_code.get_bits(16..24) == 0x01 && self.class_code.get_bits(8..16) == 0x01
    }

    fn region(&self, region: usize) -> Result<&Region> {
        self.regions.get(region).ok_or(Error::InvalidArgument("region index out of range"))
    }

    /// The base port number (I/O region) or physical base address (memory
    /// region), encoding bits cleared.
    pub fn region_base_address(&self, region: usize) -> Result<u64> {
        Ok(self.region(region)?.base_address)
    }

    /// The window length in bytes; zero for an unimplemented register.
    pub fn region_size(&self, region: usize) -> Result<u64> {
        Ok(self.region(region)?.size)
    }

    pub fn region_is_io(&self, region: usize) -> Result<bool> {
        Ok(self.region(region)?.is_io)
    }

    pub fn region_is_64(&self, region: usize) -> Result<bool> {
        Ok(self.region(region)?.is_64)
    }

    /// Whether the region is a memory window that mapped successfully.
    pub fn region_is_mapped(&self, region: usize) -> Result<bool> {
        let region = self.region(region)?;
        Ok(!region.is_io && region.map.is_some())
    }

    fn checked_region(&self, region: usize, offset: u64) -> Result<&Region> {
        let region = self.region(region)?;
        if offset >= region.size {
            return Err(Error::InvalidArgument("offset out of range"));
        }
        Ok(region)
    }
}

/// The region access surface.
///
/// `offset` is bounds-checked against the region's length in bytes, but for
/// memory regions it is used as an *element* index: the effective byte
/// offset of an access is `offset * width`. I/O regions add `offset` to the
/// base port directly. The byte-addressed `*_at` methods below implement
/// plain byte offsets with full bounds and alignment checks.
macro_rules! region_access {
    ($read:ident, $write:ident, $read_at:ident, $write_at:ident, $ty:ty, $inop:ident, $outop:ident) => {
        impl<A: Backend> PciDevice<A> {
            /// Reads one value at `offset` (an element index) of `region`.
            ///
            /// # Safety
            ///
            /// Because the element index is checked against the byte
            /// length, a multi-byte access in the upper part of a memory
            /// window reaches past it; the caller accepts that the access
            /// may touch addresses beyond the mapping.
            pub unsafe fn $read(&self, region: usize, offset: u64) -> Result<$ty> {
                let region = self.checked_region(region, offset)?;
                if region.is_io {
                    return Ok(unsafe { self.access.$inop((region.base_address + offset) as u16) });
                }
                match &region.map {
                    Some(map) => {
                        let ptr = map.as_ptr() as *const $ty;
                        Ok(unsafe { ptr::read_volatile(ptr.add(offset as usize)) })
                    }
                    None => Err(Error::InvalidArgument("region is not mapped")),
                }
            }

            /// Writes one value at `offset` (an element index) of `region`.
            ///
            /// # Safety
            ///
            /// Because the element index is checked against the byte
            /// length, a multi-byte access in the upper part of a memory
            /// window reaches past it; the caller accepts that the access
            /// may touch addresses beyond the mapping.
            pub unsafe fn $write(&mut self, region: usize, offset: u64, value: $ty) -> Result<()> {
                let region = self.checked_region(region, offset)?;
                if region.is_io {
                    unsafe { self.access.$outop((region.base_address + offset) as u16, value) };
                    return Ok(());
                }
                match &region.map {
                    Some(map) => {
                        let ptr = map.as_ptr() as *mut $ty;
                        unsafe { ptr::write_volatile(ptr.add(offset as usize), value) };
                        Ok(())
                    }
                    None => Err(Error::InvalidArgument("region is not mapped")),
                }
            }

            /// Reads one value at byte offset `offset` of `region`. The
            /// whole access must fall inside the window and be
            /// width-aligned.
            pub fn $read_at(&self, region: usize, offset: u64) -> Result<$ty> {
                let region = self.byte_checked_region(region, offset, size_of::<$ty>() as u64)?;
                if region.is_io {
                    return Ok(unsafe { self.access.$inop((region.base_address + offset) as u16) });
                }
                match &region.map {
                    Some(map) => {
                        let ptr = unsafe { map.as_ptr().add(offset as usize) } as *const $ty;
                        Ok(unsafe { ptr::read_volatile(ptr) })
                    }
                    None => Err(Error::InvalidArgument("region is not mapped")),
                }
            }

            /// Writes one value at byte offset `offset` of `region`. The
            /// whole access must fall inside the window and be
            /// width-aligned.
            pub fn $write_at(&mut self, region: usize, offset: u64, value: $ty) -> Result<()> {
                let region = self.byte_checked_region(region, offset, size_of::<$ty>() as u64)?;
                if region.is_io {
                    unsafe { self.access.$outop((region.base_address + offset) as u16, value) };
                    return Ok(());
                }
                match &region.map {
                    Some(map) => {
                        let ptr = unsafe { map.as_ptr().add(offset as usize) } as *mut $ty;
                        unsafe { ptr::write_volatile(ptr, value) };
                        Ok(())
                    }
                    None => Err(Error::InvalidArgument("region is not mapped")),
                }
            }
        }
    };
}

region_access!(region_read8, region_write8, region_read8_at, region_write8_at, u8, inb, outb);
region_access!(region_read16, region_write16, region_read16_at, region_write16_at, u16, inw, outw);
region_access!(region_read32, region_write32, region_read32_at, region_write32_at, u32, inl, outl);

impl<A: Backend> PciDevice<A> {
    fn byte_checked_region(&self, region: usize, offset: u64, width: u64) -> Result<&Region> {
        let region = self.region(region)?;
        if offset % width != 0 {
            return Err(Error::InvalidArgument("offset not aligned to the access width"));
        }
        if offset.checked_add(width).map_or(true, |end| end > region.size) {
            return Err(Error::InvalidArgument("offset out of range"));
        }
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeBackend, MapMode, PortOp};

    fn address() -> DeviceAddress {
        DeviceAddress::new(0, 0, 0).unwrap()
    }

    fn endpoint(vendor_id: u16) -> FakeBackend {
        FakeBackend::new(vendor_id, 0x5678, 0x0200_0000, 0x00)
    }

    #[test]
    fn absent_device_fails_creation() {
        let backend = endpoint(0xFFFF);
        assert!(matches!(PciDevice::new(&backend, address()), Err(Error::NoSuchDevice)));
        assert!(backend.maps.borrow().is_empty());
    }

    #[test]
    fn unknown_header_layout_fails_creation() {
        let backend = FakeBackend::new(0x1234, 0x5678, 0, 0x7F);
        assert!(matches!(PciDevice::new(&backend, address()), Err(Error::UnsupportedHeader(0x7F))));
    }

    #[test]
    fn multi_function_bit_does_not_affect_classification() {
        let backend = FakeBackend::new(0x1234, 0x5678, 0, 0x80);
        let device = PciDevice::new(&backend, address()).unwrap();
        assert_eq!(device.num_regions(), 6);
    }

    #[test]
    fn bridge_headers_expose_fewer_regions() {
        let bridge = FakeBackend::new(0x1234, 0x5678, 0x0604_0000, 0x01);
        assert_eq!(PciDevice::new(&bridge, address()).unwrap().num_regions(), 2);

        let cardbus = FakeBackend::new(0x1234, 0x5678, 0x0607_0000, 0x02);
        assert_eq!(PciDevice::new(&cardbus, address()).unwrap().num_regions(), 1);
    }

    #[test]
    fn sizes_a_32_bit_memory_bar() {
        let mut backend = endpoint(0x1234);
        backend.set_bar(0, 0xFE00_0000, 0xFF00_0000);
        let device = PciDevice::new(&backend, address()).unwrap();

        assert_eq!(device.num_regions(), 6);
        assert_eq!(device.region_base_address(0).unwrap(), 0xFE00_0000);
        assert_eq!(device.region_size(0).unwrap(), 0x0100_0000);
        assert!(!device.region_is_io(0).unwrap());
        assert!(!device.region_is_64(0).unwrap());
        assert!(device.region_is_mapped(0).unwrap());
        assert_eq!(backend.maps.borrow().as_slice(), &[(0xFE00_0000, 0x0100_0000)]);

        /* The sizing sequence put the register back. */
        assert_eq!(backend.u32_at(0x10), 0xFE00_0000);
    }

    #[test]
    fn sizes_an_io_bar() {
        let mut backend = endpoint(0x1234);
        backend.set_bar(0, 0x0000_E001, 0xFFFF_FFE1);
        let device = PciDevice::new(&backend, address()).unwrap();

        assert_eq!(device.region_base_address(0).unwrap(), 0xE000);
        assert_eq!(device.region_size(0).unwrap(), 0x20);
        assert!(device.region_is_io(0).unwrap());
        assert!(!device.region_is_mapped(0).unwrap());
        assert!(backend.maps.borrow().is_empty());
    }

    #[test]
    fn io_bar_size_is_confined_to_the_port_space() {
        let mut backend = endpoint(0x1234);
        /* Devices may hardwire the upper half of an I/O register to zero. */
        backend.set_bar(0, 0x0000_E001, 0x0000_FFE1);
        let device = PciDevice::new(&backend, address()).unwrap();
        assert_eq!(device.region_size(0).unwrap(), 0x20);
    }

    #[test]
    fn folds_a_64_bit_bar_into_one_region() {
        let mut backend = endpoint(0x1234);
        backend.set_bar(0, 0xFE00_000C, 0xFFFF_F000);
        backend.set_bar(1, 0x0000_0001, 0xFFFF_FFFF);
        /* The slot after the pair is an independent window again. */
        backend.set_bar(2, 0x0000_E001, 0xFFFF_FFE1);
        let device = PciDevice::new(&backend, address()).unwrap();

        assert_eq!(device.num_regions(), 6);
        assert_eq!(device.region_base_address(0).unwrap(), 0x1_FE00_0000);
        assert_eq!(device.region_size(0).unwrap(), 0x1000);
        assert!(device.region_is_64(0).unwrap());
        assert!(device.region_is_mapped(0).unwrap());

        /* Region 1 comes from slot 2, not from the pair's upper half. */
        assert_eq!(device.region_base_address(1).unwrap(), 0xE000);
        assert!(device.region_is_io(1).unwrap());
        assert_eq!(device.region_size(1).unwrap(), 0x20);

        assert_eq!(backend.maps.borrow().as_slice(), &[(0x1_FE00_0000, 0x1000)]);

        /* Both halves were restored. */
        assert_eq!(backend.u32_at(0x10), 0xFE00_000C);
        assert_eq!(backend.u32_at(0x14), 0x0000_0001);
    }

    #[test]
    fn zero_bar_yields_an_inert_region() {
        let backend = endpoint(0x1234);
        let mut device = PciDevice::new(&backend, address()).unwrap();

        assert_eq!(device.region_size(0).unwrap(), 0);
        assert!(!device.region_is_io(0).unwrap());
        assert!(!device.region_is_mapped(0).unwrap());
        assert!(backend.maps.borrow().is_empty());

        assert!(matches!(
            unsafe { device.region_read8(0, 0) },
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            unsafe { device.region_write32(0, 0, 0) },
            Err(Error::InvalidArgument(_))
        ));
        assert!(backend.ports.ops().is_empty());
    }

    #[test]
    fn command_word_is_restored_after_construction() {
        let mut backend = endpoint(0x1234);
        backend.set_bar(0, 0xFE00_0000, 0xFF00_0000);
        let before = backend.u16_at(0x02);
        let _device = PciDevice::new(&backend, address()).unwrap();
        assert_eq!(backend.u16_at(0x02), before);
    }

    #[test]
    fn ata_compatibility_mode_substitutes_the_legacy_ports() {
        let backend = FakeBackend::new(0x8086, 0x7010, 0x0101_0000, 0x00);
        let device = PciDevice::new(&backend, address()).unwrap();

        assert!(device.is_ata_controller());
        let expected = [(0x1F0, 8), (0x3F0, 4), (0x170, 8), (0x370, 4)];
        for (region, (base, size)) in expected.iter().enumerate() {
            assert_eq!(device.region_base_address(region).unwrap(), *base);
            assert_eq!(device.region_size(region).unwrap(), *size);
            assert!(device.region_is_io(region).unwrap());
        }
        assert_eq!(device.region_size(4).unwrap(), 0);
        assert_eq!(device.region_size(5).unwrap(), 0);
    }

    #[test]
    fn ata_substitution_skips_programmed_bars() {
        let mut backend = FakeBackend::new(0x8086, 0x7010, 0x0101_0000, 0x00);
        backend.set_bar(0, 0x0000_C001, 0xFFFF_FFF9);
        let device = PciDevice::new(&backend, address()).unwrap();

        assert_eq!(device.region_base_address(0).unwrap(), 0xC000);
        assert_eq!(device.region_size(0).unwrap(), 8);
        /* BAR1 is still zero and still gets the legacy secondary window. */
        assert_eq!(device.region_base_address(1).unwrap(), 0x3F0);
    }

    #[test]
    fn native_mode_ata_gets_no_substitution() {
        /* Programming interface 0x05: both channels in native mode. */
        let backend = FakeBackend::new(0x8086, 0x7010, 0x0101_0500, 0x00);
        let device = PciDevice::new(&backend, address()).unwrap();
        assert!(device.is_ata_controller());
        assert_eq!(device.region_size(0).unwrap(), 0);
    }

    #[test]
    fn denied_mapping_leaves_the_region_declared() {
        let mut backend = endpoint(0x1234).map_mode(MapMode::Deny);
        backend.set_bar(0, 0xFE00_0000, 0xFF00_0000);
        let mut device = PciDevice::new(&backend, address()).unwrap();

        assert_eq!(device.region_size(0).unwrap(), 0x0100_0000);
        assert!(!device.region_is_mapped(0).unwrap());
        assert!(matches!(
            unsafe { device.region_read16(0, 0) },
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn failed_mapping_aborts_construction() {
        let mut backend = endpoint(0x1234).map_mode(MapMode::Fail);
        backend.set_bar(0, 0xFE00_0000, 0xFF00_0000);
        assert!(matches!(PciDevice::new(&backend, address()), Err(Error::MappingFailed(_))));
    }

    #[test]
    fn out_of_range_offset_touches_nothing() {
        let mut backend = endpoint(0x1234);
        backend.set_bar(0, 0x0000_E001, 0xFFFF_FFE1);
        let mut device = PciDevice::new(&backend, address()).unwrap();

        assert!(matches!(
            unsafe { device.region_read16(0, 0x20) },
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            unsafe { device.region_write8(0, 0x20, 0xAA) },
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            unsafe { device.region_read32(6, 0) },
            Err(Error::InvalidArgument(_))
        ));
        assert!(backend.ports.ops().is_empty());
    }

    #[test]
    fn io_region_accesses_reach_the_port_bus() {
        let mut backend = endpoint(0x1234);
        backend.set_bar(0, 0x0000_E001, 0xFFFF_FFE1);
        backend.ports.push_read16(0xCAFE);
        backend.ports.push_read8(0x7F);
        let mut device = PciDevice::new(&backend, address()).unwrap();

        assert_eq!(unsafe { device.region_read16(0, 4) }.unwrap(), 0xCAFE);
        assert_eq!(unsafe { device.region_read8(0, 7) }.unwrap(), 0x7F);
        unsafe { device.region_write8(0, 1, 0x55) }.unwrap();
        assert_eq!(
            backend.ports.ops(),
            vec![PortOp::In16(0xE004), PortOp::In8(0xE007), PortOp::Out8(0xE001, 0x55)],
        );
    }

    #[test]
    fn mapped_region_round_trips_values() {
        let mut backend = endpoint(0x1234);
        backend.set_bar(0, 0xFE00_0000, 0xFFFF_F000);
        let mut device = PciDevice::new(&backend, address()).unwrap();

        unsafe {
            device.region_write8(0, 5, 0xA5).unwrap();
            assert_eq!(device.region_read8(0, 5).unwrap(), 0xA5);

            /* Element indices: these land at byte offsets 6 and 12. */
            device.region_write16(0, 3, 0xBEEF).unwrap();
            assert_eq!(device.region_read16(0, 3).unwrap(), 0xBEEF);
            device.region_write32(0, 3, 0xDEAD_BEEF).unwrap();
            assert_eq!(device.region_read32(0, 3).unwrap(), 0xDEAD_BEEF);
        }

        /* The element and byte views agree on where things landed. */
        assert_eq!(device.region_read16_at(0, 6).unwrap(), 0xBEEF);
        assert_eq!(device.region_read32_at(0, 12).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn byte_addressed_accesses_are_checked_for_alignment_and_bounds() {
        let mut backend = endpoint(0x1234);
        backend.set_bar(0, 0xFE00_0000, 0xFFFF_F000);
        let mut device = PciDevice::new(&backend, address()).unwrap();

        device.region_write32_at(0, 0xFFC, 0x0123_4567).unwrap();
        assert_eq!(device.region_read32_at(0, 0xFFC).unwrap(), 0x0123_4567);

        assert!(matches!(device.region_read16_at(0, 1), Err(Error::InvalidArgument(_))));
        assert!(matches!(device.region_read32_at(0, 0xFFE), Err(Error::InvalidArgument(_))));
        assert!(matches!(device.region_write16_at(0, 0x1000, 0), Err(Error::InvalidArgument(_))));
    }
}
