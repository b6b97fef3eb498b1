//! The fuzz driver: one input draw becomes one register access.

use crate::device::PciDevice;
use crate::input::Input;
use crate::{Backend, Error, Result};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// The most input one [`Fuzzer::iterate`] call can consume: three range
/// draws of eight bytes each plus a four-byte write operand.
pub const MAX_INPUT: usize = 28;

/// One register access, as handed to the [`RecordSink`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Unix seconds at emission.
    pub time: u64,
    /// The operation name, e.g. `region_write16`.
    pub function: &'static str,
    pub region: usize,
    pub offset: u64,
    /// The operand of a write; absent for reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<u32>,
}

impl Record {
    fn new(function: &'static str, region: usize, offset: u64, value: Option<u32>) -> Record {
        let time = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        Record { time, function, region, offset, value }
    }
}

/// Receives one [`Record`] per access the driver issues.
pub trait RecordSink {
    fn emit(&mut self, record: &Record);
}

/// Renders records as newline-terminated JSON objects, one per line.
///
/// The stream is held under a lock for the duration of one record and
/// flushed afterwards, so records interleave cleanly should several
/// writers ever share a stream.
pub struct JsonLinesSink<W> {
    stream: Mutex<W>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(stream: W) -> JsonLinesSink<W> {
        JsonLinesSink { stream: Mutex::new(stream) }
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn emit(&mut self, record: &Record) {
        let mut stream = match self.stream.lock() {
            Ok(stream) => stream,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = serde_json::to_writer(&mut *stream, record)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(stream))
            .and_then(|()| stream.flush());
        if let Err(err) = result {
            log::warn!("writing a fuzz record failed: {}", err);
        }
    }
}

/// Drives pseudo-random register accesses against one device.
pub struct Fuzzer<'d, A> {
    device: &'d mut PciDevice<A>,
    regions: Vec<usize>,
    sink: Option<Box<dyn RecordSink>>,
}

impl<'d, A: Backend> Fuzzer<'d, A> {
    /// `regions` restricts the draw to the given region indices; leave it
    /// empty to fuzz every region the device has.
    pub fn new(device: &'d mut PciDevice<A>, regions: Vec<usize>) -> Fuzzer<'d, A> {
        Fuzzer { device, regions, sink: None }
    }

    /// Installs the sink that receives the records, returning the
    /// previous one.
    pub fn set_sink(&mut self, sink: Box<dyn RecordSink>) -> Option<Box<dyn RecordSink>> {
        self.sink.replace(sink)
    }

    fn emit(&mut self, record: Record) {
        if let Some(sink) = &mut self.sink {
            sink.emit(&record);
        }
    }

    /// Performs one fuzzing iteration over `input`.
    ///
    /// Draws a region, an offset and an operation (plus the operand for a
    /// write), emits the record, then issues the access. A region that is
    /// neither port I/O nor mapped is skipped, consuming only the region
    /// draw. The record is emitted *before* the access so that an access
    /// which wedges the device still appears in the log.
    ///
    /// # Safety
    ///
    /// Issues register accesses at fuzz-chosen offsets against the device;
    /// the safety notes on the element-indexed access methods of
    /// [`PciDevice`] apply to every iteration.
    pub unsafe fn iterate<R: Read>(&mut self, input: &mut Input<R>) -> Result<()> {
        let region = if self.regions.is_empty() {
            let num_regions = self.device.num_regions() as u64;
            input.derive_range(0, num_regions - 1)? as usize
        } else {
            let index = input.derive_range(0, self.regions.len() as u64 - 1)? as usize;
            match self.regions.get(index) {
                Some(&region) => region,
                /* A saturated draw lands one past the list. */
                None => return Ok(()),
            }
        };

        let usable =
            match (self.device.region_is_io(region), self.device.region_is_mapped(region)) {
                (Ok(is_io), Ok(is_mapped)) => is_io || is_mapped,
                /* A saturated draw names a region the device lacks. */
                _ => false,
            };
        if !usable {
            return Ok(());
        }

        let size = self.device.region_size(region)?;
        let offset = input.derive_range(0, size.wrapping_sub(1))?;

        match input.derive_range(0, 5)? {
            0 => {
                self.emit(Record::new("region_read16", region, offset, None));
                unsafe { self.device.region_read16(region, offset) }?;
            }
            1 => {
                self.emit(Record::new("region_read32", region, offset, None));
                unsafe { self.device.region_read32(region, offset) }?;
            }
            2 => {
                self.emit(Record::new("region_read8", region, offset, None));
                unsafe { self.device.region_read8(region, offset) }?;
            }
            3 => {
                let value = input.read_u16()?;
                self.emit(Record::new("region_write16", region, offset, Some(value as u32)));
                unsafe { self.device.region_write16(region, offset, value) }?;
            }
            4 => {
                let value = input.read_u32()?;
                self.emit(Record::new("region_write32", region, offset, Some(value)));
                unsafe { self.device.region_write32(region, offset, value) }?;
            }
            5 => {
                let value = input.read_u8()?;
                self.emit(Record::new("region_write8", region, offset, Some(value as u32)));
                unsafe { self.device.region_write8(region, offset, value) }?;
            }
            _ => return Err(Error::InvalidArgument("operation selector out of range")),
        }
        Ok(())
    }
}
