// Copyright 2026 Adam Greig
// Licensed under the Apache-2.0 and MIT licenses.

//! mpssedap
//!
//! Offline decoder for captured FTDI MPSSE JTAG command streams, which
//! replays the stream through a simulated ARM DAP + FPGA scan chain and
//! reports the DAP transactions it performed.

#[macro_use]
pub mod bitvec;

pub mod input;
pub mod mpsse;
pub mod stimulus;
pub mod jtag;
pub mod dap;

use std::{fmt, io::Write};
use thiserror::Error;
use crate::mpsse::{Commands, Error as MpsseError};
use crate::input::Error as InputError;
use crate::stimulus::{StimulusBuffer, DEFAULT_CAPACITY};
use crate::jtag::{TapController, Update};
use crate::dap::Chain;

#[derive(Error, Debug)]
pub enum Error {
    #[error("MPSSE decode error")]
    Mpsse(#[from] MpsseError),
    #[error("Input error")]
    Input(#[from] InputError),
    #[error("Error writing trace")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Options for a decode run.
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Print each MPSSE command as it is decoded.
    pub trace_mpsse: bool,
    /// Print every TAP state and register update.
    pub trace_jtag: bool,
    /// Maximum number of input bytes and of generated clocks.
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { trace_mpsse: false, trace_jtag: false, capacity: DEFAULT_CAPACITY }
    }
}

/// Counters reported at the end of a run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub input_bytes: usize,
    pub opcodes: usize,
    pub clocks: usize,
    pub idle_cycles: usize,
    pub transactions: usize,
    /// DAP scans shorter than the bypass bit plus a 35-bit DAP scan.
    pub short_scans: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} bytes, {} opcodes, {} clocks, {} idle cycles, {} transactions",
               self.input_bytes, self.opcodes, self.clocks, self.idle_cycles, self.transactions)?;
        if self.short_scans > 0 {
            write!(f, " ({} short DAP scans)", self.short_scans)?;
        }
        Ok(())
    }
}

/// A single decode run over one captured command stream.
///
/// Decoding happens in two phases: all MPSSE commands are converted to
/// stimulus first, and only then is the stimulus replayed through the
/// TAP controller and DAP decoder.
pub struct Session {
    config: Config,
    stimulus: StimulusBuffer,
    tap: TapController,
    chain: Chain,
    summary: Summary,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Session {
            config,
            stimulus: StimulusBuffer::new(config.capacity),
            tap: TapController::new(),
            chain: Chain::new(),
            summary: Summary::default(),
        }
    }

    /// Decode `data` and simulate the result, writing traces to `out`.
    ///
    /// Trace lines already written when an error occurs are left in `out`.
    /// If the command stream stops at a bad or truncated command, the
    /// clocks decoded before it are still simulated before the error is
    /// returned. A stimulus overflow aborts before any simulation.
    /// The counters gathered so far remain available from `summary`.
    pub fn run<W: Write>(&mut self, data: &[u8], out: &mut W) -> Result<Summary> {
        match self.decode(data, out) {
            Ok(()) => (),
            Err(Error::Mpsse(e @ MpsseError::UnsupportedOpcode { .. })) |
            Err(Error::Mpsse(e @ MpsseError::TruncatedCommand { .. })) => {
                log::error!("{}; simulating the {} clocks decoded so far", e, self.summary.clocks);
                self.simulate(out)?;
                return Err(e.into());
            },
            Err(e) => return Err(e),
        }
        self.simulate(out)?;
        Ok(self.summary)
    }

    /// Counters for the run so far.
    pub fn summary(&self) -> Summary {
        self.summary
    }

    /// Convert MPSSE commands to stimulus.
    fn decode<W: Write>(&mut self, data: &[u8], out: &mut W) -> Result<()> {
        log::debug!("Decoding {} bytes of MPSSE commands", data.len());
        self.summary.input_bytes = data.len();
        let result = self.decode_commands(data, out);
        self.summary.clocks = self.stimulus.len();
        log::debug!("Generated {} clocks from {} opcodes", self.summary.clocks, self.summary.opcodes);
        result
    }

    fn decode_commands<W: Write>(&mut self, data: &[u8], out: &mut W) -> Result<()> {
        for decoded in Commands::new(data) {
            let decoded = decoded?;
            if self.config.trace_mpsse {
                writeln!(out, "{}", decoded)?;
            }
            decoded.command.stimulate(&mut self.stimulus)?;
            self.summary.opcodes += 1;
        }
        Ok(())
    }

    /// Replay the stimulus through the TAP controller and DAP decoder.
    fn simulate<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let trace = self.config.trace_jtag;
        for &event in self.stimulus.events() {
            let state = self.tap.state();
            if let Some(update) = self.tap.step(event) {
                if trace {
                    writeln!(out, "jtag: {}", update)?;
                }
                let transaction = match update {
                    Update::IR(reg) => {
                        self.chain.update_ir(reg.data());
                        None
                    },
                    Update::DR(reg) => self.chain.update_dr(reg.data(), reg.len()),
                };
                if let Some(transaction) = transaction {
                    writeln!(out, "{}", transaction)?;
                    self.summary.transactions += 1;
                }
            }
            if trace {
                writeln!(out, "jtag: state = {}", state)?;
            }
        }
        self.summary.idle_cycles = self.tap.idle_cycles();
        self.summary.short_scans = self.chain.short_scans();
        log::debug!("Simulation finished in state {}", self.tap.state());
        Ok(())
    }
}

/// Decode a captured MPSSE command stream with the given configuration.
pub fn decode<W: Write>(config: Config, data: &[u8], out: &mut W) -> Result<Summary> {
    Session::new(config).run(data, out)
}
