//! Per-clock JTAG stimulus generated from the MPSSE command stream.
//!
//! The buffer is filled completely by the command decoder before the TAP
//! simulator replays it, so it is append-only and bounded by a capacity
//! chosen at construction.

use crate::bitvec::byte_to_bits;

/// Historical capacity of the stimulus and input buffers.
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Stimulus buffer overflow: more than {capacity} clocks generated")]
    Overflow { capacity: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The state of TDI and TMS for one TCK cycle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stimulus {
    pub tdi: bool,
    pub tms: bool,
}

impl Stimulus {
    pub fn new(tdi: bool, tms: bool) -> Self {
        Stimulus { tdi, tms }
    }
}

pub struct StimulusBuffer {
    events: Vec<Stimulus>,
    capacity: usize,
    /// TMS level of the most recent clock, which MPSSE leaves unchanged
    /// until the next TMS command.
    last_tms: bool,
}

impl StimulusBuffer {
    pub fn new(capacity: usize) -> Self {
        StimulusBuffer { events: Vec::new(), capacity, last_tms: false }
    }

    /// Append a single clock.
    pub fn push(&mut self, tdi: bool, tms: bool) -> Result<()> {
        if self.events.len() == self.capacity {
            log::error!("Stimulus buffer full at {} clocks", self.capacity);
            return Err(Error::Overflow { capacity: self.capacity });
        }
        self.events.push(Stimulus::new(tdi, tms));
        self.last_tms = tms;
        Ok(())
    }

    /// Clock `count` bits of `bits` onto TDI, LSB first, holding TMS.
    pub fn push_tdi(&mut self, count: usize, bits: u8) -> Result<()> {
        let tms = self.last_tms;
        for tdi in byte_to_bits(bits, count) {
            self.push(tdi, tms)?;
        }
        Ok(())
    }

    /// Clock `count` bits of `bits` onto TMS, LSB first, holding TDI at `tdi`.
    pub fn push_tms(&mut self, count: usize, bits: u8, tdi: bool) -> Result<()> {
        for tms in byte_to_bits(bits, count) {
            self.push(tdi, tms)?;
        }
        Ok(())
    }

    /// Clock `count` cycles with TDI low and TMS held.
    pub fn push_clocks(&mut self, count: usize) -> Result<()> {
        let tms = self.last_tms;
        for _ in 0..count {
            self.push(false, tms)?;
        }
        Ok(())
    }

    pub fn events(&self) -> &[Stimulus] {
        &self.events[..]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

}

impl Default for StimulusBuffer {
    fn default() -> Self {
        StimulusBuffer::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tdi(buf: &StimulusBuffer) -> Vec<bool> {
        buf.events().iter().map(|e| e.tdi).collect()
    }

    fn tms(buf: &StimulusBuffer) -> Vec<bool> {
        buf.events().iter().map(|e| e.tms).collect()
    }

    #[test]
    fn test_push_tms_holds_tdi() {
        let mut buf = StimulusBuffer::default();
        buf.push_tms(3, 0b110, true).unwrap();
        assert_eq!(tms(&buf), bv![0, 1, 1]);
        assert_eq!(tdi(&buf), bv![1, 1, 1]);
        buf.push_clocks(1).unwrap();
        assert_eq!(tms(&buf), bv![0, 1, 1, 1]);
    }

    #[test]
    fn test_push_tdi_holds_last_tms() {
        let mut buf = StimulusBuffer::default();
        buf.push_tdi(2, 0b10).unwrap();
        assert_eq!(tms(&buf), bv![0, 0]);
        buf.push_tms(1, 1, false).unwrap();
        buf.push_tdi(4, 0b1001).unwrap();
        assert_eq!(tdi(&buf), bv![0, 1, 0, 1, 0, 0, 1]);
        assert_eq!(tms(&buf), bv![0, 0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_push_clocks() {
        let mut buf = StimulusBuffer::default();
        buf.push_tms(1, 1, true).unwrap();
        buf.push_clocks(3).unwrap();
        assert_eq!(buf.len(), 4);
        assert_eq!(tdi(&buf), bv![1, 0, 0, 0]);
        assert_eq!(tms(&buf), bv![1, 1, 1, 1]);
    }

    #[test]
    fn test_overflow() {
        let mut buf = StimulusBuffer::new(4);
        buf.push_tdi(4, 0xFF).unwrap();
        assert!(matches!(buf.push(true, false), Err(Error::Overflow { capacity: 4 })));
        assert_eq!(buf.len(), 4);

        let mut buf = StimulusBuffer::new(7);
        assert!(buf.push_tdi(8, 0x00).is_err());
        assert_eq!(buf.len(), 7);
    }
}
