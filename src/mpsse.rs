//! The MPSSE module parses FTDI MPSSE command streams, as sent by a JTAG
//! adapter in bulk-OUT transfers, and converts the shift commands into
//! per-clock JTAG stimulus.

use std::convert::TryFrom;
use std::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::bitvec::{byte_to_bits, bits_to_string};
use crate::stimulus::{StimulusBuffer, Error as StimulusError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unsupported MPSSE opcode 0x{opcode:02X} at offset {offset}")]
    UnsupportedOpcode { opcode: u8, offset: usize },
    #[error("Truncated MPSSE command 0x{opcode:02X} at offset {offset}: \
             needs {needed} bytes but only {available} remain")]
    TruncatedCommand { opcode: u8, offset: usize, needed: usize, available: usize },
    #[error("Stimulus error")]
    Stimulus(#[from] StimulusError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// MPSSE opcodes understood by the decoder.
///
/// Shift opcodes are all LSB first; the `_NEG` variants clock data out
/// on the falling edge and in on the rising edge, which is irrelevant
/// to the TAP simulation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[repr(u8)]
pub enum Opcode {
    WRITE_BYTES         = 0x19,
    WRITE_BITS          = 0x1B,
    READ_BYTES          = 0x28,
    READ_BITS           = 0x2A,
    READ_BYTES_NEG      = 0x2C,
    RW_BYTES            = 0x39,
    RW_BITS             = 0x3B,
    RW_BYTES_NEG        = 0x3D,
    RW_BITS_NEG         = 0x3F,
    WRITE_TMS           = 0x4B,
    RW_TMS              = 0x6B,
    RW_TMS_NEG          = 0x6F,
    SET_BITS_LOW        = 0x80,
    READ_BITS_LOW       = 0x81,
    SET_BITS_HIGH       = 0x82,
    READ_BITS_HIGH      = 0x83,
    LOOPBACK_ON         = 0x84,
    LOOPBACK_OFF        = 0x85,
    SET_CLOCK_DIVISOR   = 0x86,
    FLUSH               = 0x87,
    DISABLE_DIV_BY_5    = 0x8A,
    ENABLE_DIV_BY_5     = 0x8B,
    ENABLE_3_PHASE      = 0x8C,
    DISABLE_3_PHASE     = 0x8D,
    CLOCK_BITS          = 0x8E,
    CLOCK_BYTES         = 0x8F,
    ENABLE_ADAPTIVE     = 0x96,
    DISABLE_ADAPTIVE    = 0x97,
    BAD_COMMAND_AA      = 0xAA,
    BAD_COMMAND_AB      = 0xAB,
}

/// A single decoded MPSSE command.
///
/// Bit counts are the actual number of clocks, with the protocol's
/// "count minus one" encoding already removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// Clock `bits` TMS bits from `pattern`, holding TDI at pattern bit 7.
    Tms { bits: usize, pattern: u8, capture: bool },
    /// Clock `bits` TDI bits from `data`.
    WriteBits { bits: usize, data: u8, capture: bool },
    /// Clock out whole bytes on TDI.
    WriteBytes { data: &'a [u8], capture: bool },
    /// Clock `bits` cycles capturing TDO only.
    ReadBits { bits: usize },
    /// Clock `bytes` bytes capturing TDO only.
    ReadBytes { bytes: usize },
    /// Clock `bits` cycles with no data transfer.
    ClockBits { bits: usize },
    /// Clock `bytes` bytes with no data transfer.
    ClockBytes { bytes: usize },
    SetGpio { high: bool, value: u8, direction: u8 },
    ReadGpio { high: bool },
    Loopback(bool),
    ClockDivisor(u16),
    DivideBy5(bool),
    ThreePhase(bool),
    AdaptiveClocking(bool),
    Flush,
    BadCommand(u8),
}

impl<'a> Command<'a> {
    /// Number of TCK cycles this command generates.
    pub fn clocks(&self) -> usize {
        match self {
            Command::Tms { bits, .. } |
            Command::WriteBits { bits, .. } |
            Command::ReadBits { bits } |
            Command::ClockBits { bits } => *bits,
            Command::WriteBytes { data, .. } => data.len() * 8,
            Command::ReadBytes { bytes } |
            Command::ClockBytes { bytes } => bytes * 8,
            _ => 0,
        }
    }

    /// Append the TDI/TMS stimulus for this command to `buf`.
    ///
    /// Adapter configuration commands do not clock the chain and append nothing.
    pub fn stimulate(&self, buf: &mut StimulusBuffer) -> Result<()> {
        match *self {
            Command::Tms { bits, pattern, .. } =>
                buf.push_tms(bits, pattern, pattern & 0x80 != 0)?,
            Command::WriteBits { bits, data, .. } => buf.push_tdi(bits, data)?,
            Command::WriteBytes { data, .. } => {
                for byte in data {
                    buf.push_tdi(8, *byte)?;
                }
            },
            Command::ReadBits { .. } | Command::ReadBytes { .. } |
            Command::ClockBits { .. } | Command::ClockBytes { .. } =>
                buf.push_clocks(self.clocks())?,
            _ => (),
        }
        Ok(())
    }
}

fn fmt_tms(f: &mut fmt::Formatter, bits: usize, pattern: u8) -> fmt::Result {
    let tdi = if pattern & 0x80 != 0 { 0xFF } else { 0x00 };
    write!(f, "TMS <- {}, TDI <- {}",
           bits_to_string(&byte_to_bits(pattern, bits)),
           bits_to_string(&byte_to_bits(tdi, bits)))
}

fn fmt_tdo(f: &mut fmt::Formatter, bits: usize) -> fmt::Result {
    write!(f, "x{} <- TDO", bits)
}

impl<'a> fmt::Display for Command<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::Tms { bits, pattern, capture } => {
                if *capture {
                    fmt_tdo(f, 1)?;
                    write!(f, ", ")?;
                }
                fmt_tms(f, *bits, *pattern)
            },
            Command::WriteBits { bits, data, capture } => {
                write!(f, "TDI <- {}", bits_to_string(&byte_to_bits(*data, *bits)))?;
                if *capture {
                    write!(f, ", ")?;
                    fmt_tdo(f, *bits)?;
                }
                Ok(())
            },
            Command::WriteBytes { data, capture } => {
                write!(f, "TDI <- ")?;
                for byte in data.iter() {
                    write!(f, "{}", bits_to_string(&byte_to_bits(*byte, 8)))?;
                }
                if *capture {
                    write!(f, ", ")?;
                    fmt_tdo(f, data.len() * 8)?;
                }
                Ok(())
            },
            Command::ReadBits { bits } => fmt_tdo(f, *bits),
            Command::ReadBytes { bytes } => fmt_tdo(f, bytes * 8),
            Command::ClockBits { bits } => write!(f, "CLOCK x{}", bits),
            Command::ClockBytes { bytes } => write!(f, "CLOCK x{}", bytes * 8),
            Command::SetGpio { high, value, direction } =>
                write!(f, "SET{} {:02x} {:02x}", if *high { "HI" } else { "LO" }, value, direction),
            Command::ReadGpio { high } => write!(f, "READ{}", if *high { "HI" } else { "LO" }),
            Command::Loopback(on) => write!(f, "LOOPBACK {}", if *on { "ON" } else { "OFF" }),
            Command::ClockDivisor(div) => write!(f, "CLOCKDIV {}", div),
            Command::DivideBy5(on) =>
                write!(f, "DIVBY5 {}", if *on { "ENABLE" } else { "DISABLE" }),
            Command::ThreePhase(on) =>
                write!(f, "3PHASE {}", if *on { "ENABLE" } else { "DISABLE" }),
            Command::AdaptiveClocking(on) =>
                write!(f, "ADAPTIVE {}", if *on { "ENABLE" } else { "DISABLE" }),
            Command::Flush => write!(f, "FLUSH"),
            Command::BadCommand(_) => write!(f, "BADCMD"),
        }
    }
}

/// A command together with where it was found in the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decoded<'a> {
    pub offset: usize,
    pub opcode: Opcode,
    pub command: Command<'a>,
}

impl<'a> fmt::Display for Decoded<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02x}: {}", u8::from(self.opcode), self.command)
    }
}

/// Iterator over the commands in an MPSSE byte stream.
///
/// Stops after the first error; a bad opcode leaves the rest of the
/// stream undecodable as command boundaries are no longer known.
pub struct Commands<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Commands<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Commands { data, offset: 0, failed: false }
    }

    /// Return the `n` operand bytes following the opcode at the current offset.
    fn operands(&self, opcode: u8, n: usize) -> Result<&'a [u8]> {
        let start = self.offset + 1;
        let available = self.data.len() - start;
        if available < n {
            Err(Error::TruncatedCommand { opcode, offset: self.offset, needed: n, available })
        } else {
            Ok(&self.data[start..start + n])
        }
    }

    /// Decode a little-endian "count minus one" 16-bit length at the current offset.
    fn length(&self, opcode: u8) -> Result<usize> {
        let len = self.operands(opcode, 2)?;
        Ok(u16::from_le_bytes([len[0], len[1]]) as usize + 1)
    }

    /// Decode an opcode followed by a bit count and a data byte.
    fn bits_and_byte(&self, opcode: u8) -> Result<(usize, u8, usize)> {
        let ops = self.operands(opcode, 2)?;
        Ok((ops[0] as usize + 1, ops[1], 3))
    }

    /// Decode an opcode followed by a byte count and that many data bytes.
    fn byte_block(&self, opcode: u8) -> Result<(&'a [u8], usize)> {
        let n = self.length(opcode)?;
        let ops = self.operands(opcode, 2 + n)?;
        Ok((&ops[2..], 3 + n))
    }

    fn decode(&self) -> Result<(Decoded<'a>, usize)> {
        let byte = self.data[self.offset];
        let opcode = Opcode::try_from(byte)
            .map_err(|_| Error::UnsupportedOpcode { opcode: byte, offset: self.offset })?;

        let (command, size) = match opcode {
            Opcode::WRITE_TMS | Opcode::RW_TMS | Opcode::RW_TMS_NEG => {
                let (bits, pattern, size) = self.bits_and_byte(byte)?;
                let capture = opcode != Opcode::WRITE_TMS;
                (Command::Tms { bits, pattern, capture }, size)
            },
            Opcode::WRITE_BITS | Opcode::RW_BITS | Opcode::RW_BITS_NEG => {
                let (bits, data, size) = self.bits_and_byte(byte)?;
                let capture = opcode != Opcode::WRITE_BITS;
                (Command::WriteBits { bits, data, capture }, size)
            },
            Opcode::WRITE_BYTES | Opcode::RW_BYTES | Opcode::RW_BYTES_NEG => {
                let (data, size) = self.byte_block(byte)?;
                let capture = opcode != Opcode::WRITE_BYTES;
                (Command::WriteBytes { data, capture }, size)
            },
            Opcode::READ_BITS => {
                let ops = self.operands(byte, 1)?;
                (Command::ReadBits { bits: ops[0] as usize + 1 }, 2)
            },
            Opcode::READ_BYTES | Opcode::READ_BYTES_NEG =>
                (Command::ReadBytes { bytes: self.length(byte)? }, 3),
            Opcode::CLOCK_BITS => {
                let ops = self.operands(byte, 1)?;
                (Command::ClockBits { bits: ops[0] as usize + 1 }, 2)
            },
            Opcode::CLOCK_BYTES => (Command::ClockBytes { bytes: self.length(byte)? }, 3),
            Opcode::SET_BITS_LOW | Opcode::SET_BITS_HIGH => {
                let ops = self.operands(byte, 2)?;
                let high = opcode == Opcode::SET_BITS_HIGH;
                (Command::SetGpio { high, value: ops[0], direction: ops[1] }, 3)
            },
            Opcode::READ_BITS_LOW => (Command::ReadGpio { high: false }, 1),
            Opcode::READ_BITS_HIGH => (Command::ReadGpio { high: true }, 1),
            Opcode::SET_CLOCK_DIVISOR => {
                let ops = self.operands(byte, 2)?;
                (Command::ClockDivisor(u16::from_le_bytes([ops[0], ops[1]])), 3)
            },
            Opcode::LOOPBACK_ON => (Command::Loopback(true), 1),
            Opcode::LOOPBACK_OFF => (Command::Loopback(false), 1),
            Opcode::DISABLE_DIV_BY_5 => (Command::DivideBy5(false), 1),
            Opcode::ENABLE_DIV_BY_5 => (Command::DivideBy5(true), 1),
            Opcode::ENABLE_3_PHASE => (Command::ThreePhase(true), 1),
            Opcode::DISABLE_3_PHASE => (Command::ThreePhase(false), 1),
            Opcode::ENABLE_ADAPTIVE => (Command::AdaptiveClocking(true), 1),
            Opcode::DISABLE_ADAPTIVE => (Command::AdaptiveClocking(false), 1),
            Opcode::FLUSH => (Command::Flush, 1),
            Opcode::BAD_COMMAND_AA | Opcode::BAD_COMMAND_AB => (Command::BadCommand(byte), 1),
        };

        Ok((Decoded { offset: self.offset, opcode, command }, size))
    }
}

impl<'a> Iterator for Commands<'a> {
    type Item = Result<Decoded<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        match self.decode() {
            Ok((decoded, size)) => {
                log::trace!("Decoded {:?} at offset {}", decoded.opcode, self.offset);
                self.offset += size;
                Some(Ok(decoded))
            },
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(data: &[u8]) -> Result<Vec<Command>> {
        Commands::new(data).map(|d| d.map(|d| d.command)).collect()
    }

    fn stimulate(data: &[u8]) -> StimulusBuffer {
        let mut buf = StimulusBuffer::default();
        for decoded in Commands::new(data) {
            decoded.unwrap().command.stimulate(&mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn test_tms_command() {
        let buf = stimulate(&[0x4B, 0x07, 0x80]);
        assert_eq!(buf.len(), 8);
        let tdi: Vec<bool> = buf.events().iter().map(|e| e.tdi).collect();
        let tms: Vec<bool> = buf.events().iter().map(|e| e.tms).collect();
        assert_eq!(&tdi[..], bv![1, 1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(&tms[..], bv![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_tms_tdi_fill() {
        let buf = stimulate(&[0x4B, 0x04, 0x1F, 0x6B, 0x02, 0x83]);
        assert_eq!(buf.len(), 8);
        assert!(buf.events()[..5].iter().all(|e| !e.tdi));
        assert!(buf.events()[5..].iter().all(|e| e.tdi));
    }

    #[test]
    fn test_decode_fields() {
        let data = [
            0x4B, 0x02, 0x03,
            0x6F, 0x00, 0x01,
            0x1B, 0x03, 0x0A,
            0x3B, 0x00, 0x01,
            0x19, 0x01, 0x00, 0xAA, 0x55,
            0x2A, 0x05,
            0x2C, 0x00, 0x01,
            0x86, 0x05, 0x00,
            0x80, 0x08, 0x0B,
            0x8B, 0x85, 0x87, 0xAB,
        ];
        assert_eq!(decode_all(&data).unwrap(), vec![
            Command::Tms { bits: 3, pattern: 0x03, capture: false },
            Command::Tms { bits: 1, pattern: 0x01, capture: true },
            Command::WriteBits { bits: 4, data: 0x0A, capture: false },
            Command::WriteBits { bits: 1, data: 0x01, capture: true },
            Command::WriteBytes { data: &[0xAA, 0x55], capture: false },
            Command::ReadBits { bits: 6 },
            Command::ReadBytes { bytes: 257 },
            Command::ClockDivisor(5),
            Command::SetGpio { high: false, value: 0x08, direction: 0x0B },
            Command::DivideBy5(true),
            Command::Loopback(false),
            Command::Flush,
            Command::BadCommand(0xAB),
        ]);
    }

    #[test]
    fn test_stimulus_count() {
        let data = [
            0x4B, 0x05, 0x1F,               // 6 clocks
            0x1B, 0x06, 0x00,               // 7 clocks
            0x39, 0x02, 0x00, 1, 2, 3,      // 24 clocks
            0x2A, 0x01,                     // 2 clocks
            0x28, 0x01, 0x00,               // 16 clocks
            0x8E, 0x02,                     // 3 clocks
            0x87, 0x86, 0x00, 0x00,         // none
        ];
        let expected: usize = decode_all(&data).unwrap().iter().map(|c| c.clocks()).sum();
        assert_eq!(expected, 58);
        assert_eq!(stimulate(&data).len(), 58);
    }

    #[test]
    fn test_read_holds_tms() {
        let buf = stimulate(&[0x4B, 0x00, 0x01, 0x2A, 0x02]);
        assert_eq!(buf.len(), 4);
        assert!(buf.events().iter().all(|e| e.tms));
        assert!(buf.events()[1..].iter().all(|e| !e.tdi));
    }

    #[test]
    fn test_write_bytes_lsb_first() {
        let buf = stimulate(&[0x19, 0x00, 0x00, 0x81]);
        let tdi: Vec<bool> = buf.events().iter().map(|e| e.tdi).collect();
        assert_eq!(&tdi[..], bv![1, 0, 0, 0, 0, 0, 0, 1]);
        assert!(buf.events().iter().all(|e| !e.tms));
    }

    #[test]
    fn test_unsupported_opcode() {
        let mut commands = Commands::new(&[0x87, 0x12, 0x87]);
        assert!(commands.next().unwrap().is_ok());
        assert!(matches!(commands.next(),
                         Some(Err(Error::UnsupportedOpcode { opcode: 0x12, offset: 1 }))));
        assert!(commands.next().is_none());
    }

    #[test]
    fn test_truncated_command() {
        assert!(matches!(decode_all(&[0x4B, 0x07]),
                         Err(Error::TruncatedCommand { opcode: 0x4B, offset: 0, needed: 2, available: 1 })));
        assert!(matches!(decode_all(&[0x19, 0x03, 0x00, 0x01]),
                         Err(Error::TruncatedCommand { opcode: 0x19, needed: 6, available: 3, .. })));
    }

    #[test]
    fn test_trace_format() {
        let data = [0x4B, 0x07, 0x80, 0x3B, 0x02, 0x05, 0x2A, 0x00, 0x82, 0x01, 0x02];
        let lines: Vec<String> = Commands::new(&data).map(|d| d.unwrap().to_string()).collect();
        assert_eq!(lines, vec![
            "4b: TMS <- 00000001, TDI <- 11111111",
            "3b: TDI <- 101, x3 <- TDO",
            "2a: x1 <- TDO",
            "82: SETHI 01 02",
        ]);
    }
}
