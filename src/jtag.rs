//! Simulation of an IEEE 1149.1 TAP controller driven by recorded stimulus.

use std::fmt;
use crate::stimulus::Stimulus;

/// TAP controller states, with SVF-style names.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::upper_case_acronyms)]
pub enum TapState {
    RESET,
    IDLE,
    DRSELECT,
    DRCAPTURE,
    DRSHIFT,
    DREXIT1,
    DRPAUSE,
    DREXIT2,
    DRUPDATE,
    IRSELECT,
    IRCAPTURE,
    IRSHIFT,
    IREXIT1,
    IRPAUSE,
    IREXIT2,
    IRUPDATE,
}

impl TapState {
    pub const ALL: [TapState; 16] = [
        TapState::RESET, TapState::IDLE,
        TapState::DRSELECT, TapState::DRCAPTURE, TapState::DRSHIFT, TapState::DREXIT1,
        TapState::DRPAUSE, TapState::DREXIT2, TapState::DRUPDATE,
        TapState::IRSELECT, TapState::IRCAPTURE, TapState::IRSHIFT, TapState::IREXIT1,
        TapState::IRPAUSE, TapState::IREXIT2, TapState::IRUPDATE,
    ];

    /// The state entered on the next TCK rising edge with the given TMS.
    pub fn next(self, tms: bool) -> TapState {
        use TapState::*;
        match (self, tms) {
            (RESET,     false) => IDLE,
            (RESET,     true)  => RESET,
            (IDLE,      false) => IDLE,
            (IDLE,      true)  => DRSELECT,
            (DRSELECT,  false) => DRCAPTURE,
            (DRSELECT,  true)  => IRSELECT,
            (DRCAPTURE, false) => DRSHIFT,
            (DRCAPTURE, true)  => DREXIT1,
            (DRSHIFT,   false) => DRSHIFT,
            (DRSHIFT,   true)  => DREXIT1,
            (DREXIT1,   false) => DRPAUSE,
            (DREXIT1,   true)  => DRUPDATE,
            (DRPAUSE,   false) => DRPAUSE,
            (DRPAUSE,   true)  => DREXIT2,
            (DREXIT2,   false) => DRSHIFT,
            (DREXIT2,   true)  => DRUPDATE,
            (DRUPDATE,  false) => IDLE,
            (DRUPDATE,  true)  => DRSELECT,
            (IRSELECT,  false) => IRCAPTURE,
            (IRSELECT,  true)  => RESET,
            (IRCAPTURE, false) => IRSHIFT,
            (IRCAPTURE, true)  => IREXIT1,
            (IRSHIFT,   false) => IRSHIFT,
            (IRSHIFT,   true)  => IREXIT1,
            (IREXIT1,   false) => IRPAUSE,
            (IREXIT1,   true)  => IRUPDATE,
            (IRPAUSE,   false) => IRPAUSE,
            (IRPAUSE,   true)  => IREXIT2,
            (IREXIT2,   false) => IRSHIFT,
            (IREXIT2,   true)  => IRUPDATE,
            (IRUPDATE,  false) => IDLE,
            (IRUPDATE,  true)  => DRSELECT,
        }
    }
}

impl fmt::Display for TapState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Contents of a DR or IR shift register.
///
/// Holds the most recent 64 bits shifted in. Until 64 bits have been
/// shifted the first bit is bit 0; after that the register slides
/// right, with new bits entering at bit 63.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShiftRegister {
    data: u64,
    len: usize,
}

impl ShiftRegister {
    pub fn clear(&mut self) {
        *self = ShiftRegister::default();
    }

    pub fn shift(&mut self, bit: bool) {
        if self.len < 64 {
            self.data |= (bit as u64) << self.len;
        } else {
            self.data = (self.data >> 1) | ((bit as u64) << 63);
        }
        self.len += 1;
    }

    pub fn data(&self) -> u64 {
        self.data
    }

    /// Total number of bits shifted since the last capture.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A register update produced when the TAP leaves an UPDATE state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Update {
    IR(ShiftRegister),
    DR(ShiftRegister),
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (name, reg) = match self {
            Update::IR(reg) => ("IR", reg),
            Update::DR(reg) => ("DR", reg),
        };
        write!(f, "{:4} -> {} {:016x}", reg.len(), name, reg.data())
    }
}

pub struct TapController {
    state: TapState,
    shift: ShiftRegister,
    idle_cycles: usize,
}

impl TapController {
    pub fn new() -> Self {
        TapController {
            state: TapState::RESET,
            shift: ShiftRegister::default(),
            idle_cycles: 0,
        }
    }

    /// Apply one clock of stimulus.
    ///
    /// The action of the current state is carried out before moving to
    /// the next state selected by TMS, so an update is reported on the
    /// clock which leaves DRUPDATE or IRUPDATE.
    pub fn step(&mut self, stimulus: Stimulus) -> Option<Update> {
        let update = match self.state {
            TapState::IDLE => {
                self.idle_cycles += 1;
                None
            },
            TapState::DRCAPTURE | TapState::IRCAPTURE => {
                self.shift.clear();
                None
            },
            TapState::DRSHIFT | TapState::IRSHIFT => {
                self.shift.shift(stimulus.tdi);
                None
            },
            TapState::DRUPDATE => Some(Update::DR(self.shift)),
            TapState::IRUPDATE => Some(Update::IR(self.shift)),
            _ => None,
        };
        self.state = self.state.next(stimulus.tms);
        update
    }

    pub fn state(&self) -> TapState {
        self.state
    }

    /// Number of clocks spent in Run-Test/Idle.
    pub fn idle_cycles(&self) -> usize {
        self.idle_cycles
    }
}

impl Default for TapController {
    fn default() -> Self {
        TapController::new()
    }
}
