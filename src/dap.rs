//! The DAP module interprets JTAG register updates on a two-TAP scan chain
//! as ARM Debug Access Port transactions.
//!
//! The chain is TDI -> ARM DAP (4-bit IR) -> FPGA (6-bit IR) -> TDO. DAP
//! transactions are only meaningful while the FPGA is in BYPASS, in which
//! case the first bit shifted into the chain belongs to the FPGA's bypass
//! register and the following 35 bits form the DAP's DPACC/APACC/ABORT scan.

use std::convert::TryFrom;
use std::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Width of the ARM DAP instruction register.
pub const ARM_IR_LEN: usize = 4;

/// Width of the FPGA instruction register.
pub const FPGA_IR_LEN: usize = 6;

/// The FPGA's BYPASS instruction.
pub const FPGA_BYPASS: u8 = 0x3F;

/// Length of a DAP DPACC/APACC/ABORT scan.
pub const DAP_SCAN_LEN: usize = 35;

/// JTAG-DP instructions.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[allow(clippy::upper_case_acronyms)]
#[repr(u8)]
pub enum ArmInstruction {
    ABORT       = 0x8,
    DPACC       = 0xA,
    APACC       = 0xB,
    IDCODE      = 0xE,
    BYPASS      = 0xF,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    Abort,
    DPAcc,
    APAcc,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Read,
    Write,
}

/// The register space a transaction addressed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Port {
    DP,
    AP(u8),
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Port::DP => write!(f, "DP"),
            Port::AP(apsel) => write!(f, "AP{}", apsel),
        }
    }
}

/// Name a DP register address.
pub fn dp_register_name(addr: u8) -> &'static str {
    match addr {
        0x00 => "ABORT",
        0x04 => "CSW",
        0x08 => "SELECT",
        0x0C => "RDBUFF",
        _    => "XXX",
    }
}

/// Name a MEM-AP register address.
pub fn ap_register_name(addr: u8) -> &'static str {
    match addr {
        0x00 => "CSW",
        0x04 => "TAR",
        0x0C => "DRW",
        0x10 => "BD0",
        0x14 => "BD1",
        0x18 => "BD2",
        0x1C => "BD3",
        0xF4 => "CFG",
        0xF8 => "BASE",
        0xFC => "IDR",
        _    => "XXX",
    }
}

/// A decoded DAP transaction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub kind: Kind,
    pub direction: Direction,
    pub port: Port,
    pub addr: u8,
    pub data: u32,
}

impl Transaction {
    pub fn register_name(&self) -> &'static str {
        match self.port {
            Port::DP => dp_register_name(self.addr),
            Port::AP(_) => ap_register_name(self.addr),
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            Kind::Abort => "abort",
            Kind::DPAcc => "dpacc",
            Kind::APAcc => "apacc",
        };
        let direction = match self.direction {
            Direction::Read => "rd",
            Direction::Write => "wr",
        };
        write!(f, "{} {} {:08x} -> {:<3} {:02x} {}",
               kind, direction, self.data, self.port.to_string(), self.addr,
               self.register_name())
    }
}

/// Contents of the DP SELECT register which apply to APACC scans.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Select {
    pub apsel: u8,
    pub apbank: u8,
}

impl Select {
    pub fn from_word(word: u32) -> Self {
        Select {
            apsel: (word >> 24) as u8,
            apbank: (word & 0xF0) as u8,
        }
    }
}

/// Instruction register and DP state of the ARM + FPGA scan chain.
pub struct Chain {
    ir_arm: u8,
    ir_fpga: u8,
    select: Select,
    short_scans: usize,
}

impl Chain {
    /// Both TAPs start in BYPASS, as after Test-Logic-Reset.
    pub fn new() -> Self {
        Chain {
            ir_arm: ArmInstruction::BYPASS.into(),
            ir_fpga: FPGA_BYPASS,
            select: Select::default(),
            short_scans: 0,
        }
    }

    pub fn ir_arm(&self) -> u8 {
        self.ir_arm
    }

    pub fn ir_fpga(&self) -> u8 {
        self.ir_fpga
    }

    pub fn select(&self) -> Select {
        self.select
    }

    /// Number of ABORT/DPACC/APACC scans too short to hold a full DAP scan.
    pub fn short_scans(&self) -> usize {
        self.short_scans
    }

    fn check_scan_len(&mut self, len: usize) {
        if len < 1 + DAP_SCAN_LEN {
            log::warn!("DAP scan of {} bits is shorter than {} bits", len, 1 + DAP_SCAN_LEN);
            self.short_scans += 1;
        }
    }

    /// Load both instruction registers from an IR scan.
    ///
    /// The FPGA is closest to TDO, so its instruction is in the low bits.
    pub fn update_ir(&mut self, data: u64) {
        self.ir_fpga = (data & ((1 << FPGA_IR_LEN) - 1)) as u8;
        self.ir_arm = ((data >> FPGA_IR_LEN) & ((1 << ARM_IR_LEN) - 1)) as u8;
        log::debug!("IR update: ARM 0x{:X} FPGA 0x{:02X}", self.ir_arm, self.ir_fpga);
    }

    /// Decode a DR scan of `len` bits, returning the DAP transaction it carried, if any.
    pub fn update_dr(&mut self, data: u64, len: usize) -> Option<Transaction> {
        if self.ir_fpga != FPGA_BYPASS {
            log::debug!("Ignoring DR update with FPGA IR 0x{:02X}", self.ir_fpga);
            return None;
        }

        // Discard the bit shifted into the FPGA's bypass register.
        let scan = (data >> 1) & ((1 << DAP_SCAN_LEN) - 1);
        let data = (scan >> 3) as u32;
        let direction = if scan & 1 == 1 { Direction::Read } else { Direction::Write };
        let a32 = (((scan >> 1) & 0b11) << 2) as u8;

        let instruction = ArmInstruction::try_from(self.ir_arm);
        if let Ok(ArmInstruction::ABORT) | Ok(ArmInstruction::DPACC) | Ok(ArmInstruction::APACC) = instruction {
            self.check_scan_len(len);
        }

        match instruction {
            Ok(ArmInstruction::ABORT) => Some(Transaction {
                kind: Kind::Abort,
                direction: Direction::Write,
                port: Port::DP,
                addr: 0x00,
                data,
            }),
            Ok(ArmInstruction::DPACC) => {
                if a32 == 0x08 && direction == Direction::Write {
                    self.select = Select::from_word(data);
                    log::debug!("SELECT: APSEL {} APBANK 0x{:02X}",
                                self.select.apsel, self.select.apbank);
                }
                Some(Transaction { kind: Kind::DPAcc, direction, port: Port::DP, addr: a32, data })
            },
            Ok(ArmInstruction::APACC) => Some(Transaction {
                kind: Kind::APAcc,
                direction,
                port: Port::AP(self.select.apsel),
                addr: self.select.apbank | a32,
                data,
            }),
            _ => {
                log::debug!("Ignoring DR update with ARM IR 0x{:X}", self.ir_arm);
                None
            },
        }
    }
}

impl Default for Chain {
    fn default() -> Self {
        Chain::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build the DR contents for a DAP scan, including the FPGA bypass bit.
    fn scan(data: u32, a32: u8, read: bool) -> u64 {
        let payload = ((data as u64) << 3) | (((a32 as u64) >> 2) << 1) | read as u64;
        payload << 1
    }

    fn ir(arm: ArmInstruction) -> u64 {
        ((u8::from(arm) as u64) << FPGA_IR_LEN) | FPGA_BYPASS as u64
    }

    #[test]
    fn test_ir_demux() {
        let mut chain = Chain::new();
        chain.update_ir(0x0A5);
        assert_eq!(chain.ir_fpga(), 0x25);
        assert_eq!(chain.ir_arm(), 0x2);
        chain.update_ir(0x3FF);
        assert_eq!(chain.ir_fpga(), FPGA_BYPASS);
        assert_eq!(chain.ir_arm(), u8::from(ArmInstruction::BYPASS));
    }

    #[test]
    fn test_select_then_apacc() {
        let mut chain = Chain::new();
        chain.update_ir(ir(ArmInstruction::DPACC));
        let t = chain.update_dr(scan(0x0100_0010, 0x08, false), 36).unwrap();
        assert_eq!(t.to_string(), "dpacc wr 01000010 -> DP  08 SELECT");
        assert_eq!(chain.select(), Select { apsel: 1, apbank: 0x10 });

        chain.update_ir(ir(ArmInstruction::APACC));
        let t = chain.update_dr(scan(0, 0x00, true), 36).unwrap();
        assert_eq!(t.port, Port::AP(1));
        assert_eq!(t.addr, 0x10);
        assert_eq!(t.to_string(), "apacc rd 00000000 -> AP1 10 BD0");
    }

    #[test]
    fn test_select_read_ignored() {
        let mut chain = Chain::new();
        chain.update_ir(ir(ArmInstruction::DPACC));
        let t = chain.update_dr(scan(0x0200_00F0, 0x08, true), 36).unwrap();
        assert_eq!(t.direction, Direction::Read);
        assert_eq!(chain.select(), Select::default());
    }

    #[test]
    fn test_apbank_masked() {
        assert_eq!(Select::from_word(0xFF00_00FF), Select { apsel: 0xFF, apbank: 0xF0 });
    }

    #[test]
    fn test_abort() {
        let mut chain = Chain::new();
        chain.update_ir(ir(ArmInstruction::ABORT));
        let t = chain.update_dr(scan(0x1E, 0x00, false), 36).unwrap();
        assert_eq!(t.kind, Kind::Abort);
        assert_eq!(t.to_string(), "abort wr 0000001e -> DP  00 ABORT");
    }

    #[test]
    fn test_fpga_not_bypassed() {
        let mut chain = Chain::new();
        chain.update_ir((u8::from(ArmInstruction::DPACC) as u64) << FPGA_IR_LEN | 0x09);
        for &data in &[0u64, 0x1_0000_0108, u64::MAX] {
            assert!(chain.update_dr(data, 36).is_none());
        }
        assert_eq!(chain.select(), Select::default());
    }

    #[test]
    fn test_other_instructions_ignored() {
        let mut chain = Chain::new();
        assert!(chain.update_dr(scan(0x1234, 0x04, false), 36).is_none());
        chain.update_ir(ir(ArmInstruction::IDCODE));
        assert!(chain.update_dr(scan(0x1234, 0x04, false), 36).is_none());
    }

    #[test]
    fn test_short_scan_only_for_dap_instructions() {
        let mut chain = Chain::new();
        assert!(chain.update_dr(0, 1).is_none());
        chain.update_ir(ir(ArmInstruction::IDCODE));
        assert!(chain.update_dr(0x1234_5677 << 1, 33).is_none());
        assert_eq!(chain.short_scans(), 0);

        chain.update_ir(ir(ArmInstruction::APACC));
        assert!(chain.update_dr(scan(0x55, 0x0C, true), 12).is_some());
        assert!(chain.update_dr(scan(0x55, 0x0C, true), 36).is_some());
        assert_eq!(chain.short_scans(), 1);
    }

    #[test]
    fn test_register_names() {
        assert_eq!(dp_register_name(0x0C), "RDBUFF");
        assert_eq!(dp_register_name(0x10), "XXX");
        assert_eq!(ap_register_name(0x1C), "BD3");
        assert_eq!(ap_register_name(0xFC), "IDR");
        assert_eq!(ap_register_name(0x08), "XXX");
    }
}
