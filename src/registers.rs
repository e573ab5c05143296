/*
Copyright 2020 Anish Jewalikar

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! General-purpose registers, the index register, timers, the program
//! counter, and the RPL flag scratchpad.

#[cfg(feature = "savestates")]
use serde::{Deserialize, Serialize};

use crate::memory::PROGRAM_START;

/// The sixteen general-purpose registers, the index register, the program
/// counter, the delay/sound timers, and the RPL flag slots.
///
/// RPL flags are the one piece of state that survives
/// [`crate::Interpreter::load`] — they persist for the lifetime of the
/// interpreter instance.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "savestates", derive(Serialize, Deserialize))]
pub struct RegisterFile {
    /// V0..VF general-purpose registers. VF doubles as a flag register.
    pub v: [u8; 16],
    /// The 16-bit index register, `I`.
    pub i: u16,
    /// Program counter. Initialized to `0x200` and kept even in normal flow.
    pub pc: u16,
    /// Delay timer; decremented by the scheduler at 1/9th step rate.
    pub delay: u8,
    /// Sound timer; decremented alongside `delay`. A host plays audio while
    /// this is non-zero.
    pub sound: u8,
    /// SUPER-CHIP RPL flag scratchpad, preserved across [`Self::reset`].
    rpl: [u8; 16],
}

impl RegisterFile {
    /// A freshly reset register file: `PC = 0x200`, everything else zero.
    /// RPL flags start zeroed too (this only happens at construction, not on
    /// reset).
    pub fn new() -> Self {
        Self {
            v: [0; 16],
            i: 0,
            pc: PROGRAM_START as u16,
            delay: 0,
            sound: 0,
            rpl: [0; 16],
        }
    }

    /// Reset everything except the RPL flags.
    pub fn reset(&mut self) {
        self.v = [0; 16];
        self.i = 0;
        self.pc = PROGRAM_START as u16;
        self.delay = 0;
        self.sound = 0;
    }

    /// Read an RPL flag slot.
    pub fn rpl(&self, index: usize) -> u8 {
        self.rpl[index]
    }

    /// Write all RPL flag slots up to (and including) `x`, from `v[0..=x]`.
    pub fn store_rpl(&mut self, up_to: usize) {
        self.rpl[..=up_to].copy_from_slice(&self.v[..=up_to]);
    }

    /// Load `v[0..=x]` from RPL flag slots.
    pub fn load_rpl(&mut self, up_to: usize) {
        self.v[..=up_to].copy_from_slice(&self.rpl[..=up_to]);
    }

    /// Advance the delay and sound timers by one tick each, if non-zero.
    pub fn tick_timers(&mut self) {
        if self.delay > 0 {
            self.delay -= 1;
        }
        if self.sound > 0 {
            self.sound -= 1;
        }
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_preserves_rpl() {
        let mut regs = RegisterFile::new();
        regs.v[0] = 0x11;
        regs.v[1] = 0x22;
        regs.store_rpl(1);
        regs.reset();
        assert_eq!(regs.rpl(0), 0x11);
        assert_eq!(regs.rpl(1), 0x22);
        assert_eq!(regs.v, [0; 16]);
        assert_eq!(regs.pc, PROGRAM_START as u16);
    }

    #[test]
    fn rpl_round_trip() {
        let mut regs = RegisterFile::new();
        regs.v[0..=3].copy_from_slice(&[1, 2, 3, 4]);
        regs.store_rpl(3);
        regs.v = [0; 16];
        regs.load_rpl(3);
        assert_eq!(&regs.v[0..=3], &[1, 2, 3, 4]);
    }

    #[test]
    fn timers_are_monotonic_non_increasing() {
        let mut regs = RegisterFile::new();
        regs.delay = 2;
        regs.sound = 1;
        regs.tick_timers();
        assert_eq!((regs.delay, regs.sound), (1, 0));
        regs.tick_timers();
        assert_eq!((regs.delay, regs.sound), (0, 0));
        regs.tick_timers();
        assert_eq!((regs.delay, regs.sound), (0, 0));
    }
}
