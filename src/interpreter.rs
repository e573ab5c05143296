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

//! The `Interpreter`: opcode dispatch glued to [`crate::memory`],
//! [`crate::registers`], [`crate::framebuffer`] and [`crate::keyboard`], plus
//! the loader and the host-facing control surface.

use rand::{rngs::OsRng, Rng, RngCore};
#[cfg(feature = "savestates")]
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, LoadError};
use crate::framebuffer::{double_upper_nibble, Framebuffer, Rgba};
use crate::instruction::Instruction;
use crate::keyboard::Keyboard;
use crate::memory::{CallStack, Memory, MEM_SIZE};
use crate::registers::RegisterFile;
use crate::scheduler::{Poll, Scheduler};

/// What a decoded opcode does to the program counter once it has run.
enum PcControl {
    /// Advance by 2, the default for every opcode that doesn't say otherwise.
    Advance,
    /// A skip opcode: advance by 2, then by a further 2 (or 4, if the word
    /// being skipped is the XO-CHIP long-load marker `0xF000`).
    Skip,
    /// Set PC to an absolute address (jump, call, return, long-load).
    Retarget(u16),
    /// Leave PC exactly where it was: the guarded no-ops (call-stack
    /// overflow, `BNNN` overflow) and `FX0A`'s two "re-execute this
    /// instruction" phases.
    Freeze,
}

/// The CHIP-8/SUPER-CHIP/XO-CHIP interpreter.
///
/// Owns every piece of machine state (memory, registers, framebuffer,
/// keyboard, call stack) plus the [`Scheduler`] that drives it at a virtual
/// instruction rate, and a pluggable entropy source for `CXNN`.
pub struct Interpreter {
    memory: Memory,
    stack: CallStack,
    regs: RegisterFile,
    framebuffer: Framebuffer,
    keyboard: Keyboard,
    scheduler: Scheduler,
    rng: Box<dyn RngCore + Send>,
    high_resolution: bool,
    /// Set by `00FD`. Distinct from the scheduler's own pause/resume/step
    /// controls: this one models the ROM halting itself, not the host
    /// pausing playback.
    halted: bool,
    last_unknown_opcode: Option<u16>,
}

impl Interpreter {
    /// A freshly constructed interpreter: zeroed state, font tables loaded,
    /// `OsRng` as the entropy source for `CXNN`, scheduler paused.
    pub fn new() -> Self {
        Self::with_rng(Box::new(OsRng))
    }

    /// Like [`Self::new`], but with an explicit entropy source for `CXNN` —
    /// a seeded PRNG makes opcode-sequence tests deterministic.
    pub fn with_rng(rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            memory: Memory::new(),
            stack: CallStack::new(),
            regs: RegisterFile::new(),
            framebuffer: Framebuffer::new(),
            keyboard: Keyboard::new(),
            scheduler: Scheduler::default(),
            rng,
            high_resolution: false,
            halted: false,
            last_unknown_opcode: None,
        }
    }

    /// Reset all state except the RPL flag slots, then copy `image` into the
    /// program area (truncated, not rejected, per the loader's contract).
    pub fn load(&mut self, image: &[u8]) -> Result<(), LoadError> {
        self.memory.reset();
        self.stack.reset();
        self.regs.reset();
        self.framebuffer.reset();
        self.high_resolution = false;
        self.halted = false;
        self.last_unknown_opcode = None;

        let truncated = image.len() > crate::memory::MAX_PROGRAM_LEN;
        self.memory.load_program(image);
        log::debug!(
            "loaded {} byte image{}",
            image.len().min(crate::memory::MAX_PROGRAM_LEN),
            if truncated { " (truncated)" } else { "" }
        );

        Ok(())
    }

    /// One fetch-decode-execute cycle. Returns the fetched opcode, or `None`
    /// if the interpreter is halted (`00FD`).
    pub fn step(&mut self) -> Option<u16> {
        if self.halted {
            return None;
        }

        let pc = self.regs.pc;
        let raw = self.memory.fetch_word(pc);
        let inst = Instruction::new(raw);

        let control = self.execute(inst);

        self.regs.pc = match control {
            PcControl::Advance => pc.wrapping_add(2),
            PcControl::Skip => {
                let next = pc.wrapping_add(2);
                let skipped = self.memory.fetch_word(next);
                let skip_len: u16 = if skipped == 0xF000 { 8 } else { 4 };
                pc.wrapping_add(skip_len)
            }
            PcControl::Retarget(addr) => addr,
            PcControl::Freeze => pc,
        };

        Some(raw)
    }

    /// Drive the scheduler forward to `now_ms`, executing as many steps as
    /// the virtual clock has accumulated and ticking timers every 9th step.
    pub fn tick(&mut self, now_ms: f64) {
        loop {
            match self.scheduler.poll(now_ms, self.halted) {
                Poll::Run { tick_timers } => {
                    self.step();
                    if tick_timers {
                        self.regs.tick_timers();
                    }
                }
                Poll::Idle => break,
            }
        }
    }

    /// Pause the scheduler (host-driven; independent of `00FD`).
    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    /// Resume free-running execution.
    pub fn resume(&mut self) {
        self.scheduler.resume();
    }

    /// Execute exactly one more step on the next [`Self::tick`], then pause.
    pub fn step_once(&mut self) {
        self.scheduler.step_once();
    }

    /// Change the scheduler's virtual instruction period, in milliseconds.
    pub fn set_period_ms(&mut self, period_ms: f64) {
        self.scheduler.set_period_ms(period_ms);
    }

    /// Replace one palette entry and recompose the framebuffer.
    pub fn set_palette(&mut self, index: usize, rgba: Rgba) {
        self.framebuffer.set_palette(index, rgba);
    }

    /// Set key `index`'s down/up state, polled by `EX9E`/`EXA1`/`FX0A`.
    pub fn set_key(&mut self, index: usize, down: bool) {
        self.keyboard.set_key(index, down);
    }

    /// The composed 128x64 RGBA8 output buffer.
    pub fn framebuffer(&self) -> &[Rgba; crate::framebuffer::WIDTH * crate::framebuffer::HEIGHT] {
        self.framebuffer.pixels()
    }

    /// Is the sound timer non-zero? The only audio-relevant signal this
    /// crate exposes — actually producing sound is a host concern.
    pub fn sound_active(&self) -> bool {
        self.regs.sound > 0
    }

    /// Has the interpreter halted itself (`00FD`, or an empty-stack `RET`)?
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Is `high_resolution` (128x64 logical) mode active?
    pub fn is_high_resolution(&self) -> bool {
        self.high_resolution
    }

    /// Current plane-select mask (`0..=3`).
    pub fn plane_select(&self) -> u8 {
        self.framebuffer.plane_select()
    }

    /// The last opcode the decoder failed to recognize, if any, for host
    /// diagnostics. An unknown opcode is a logged no-op, never fatal.
    pub fn last_unknown_opcode(&self) -> Option<u16> {
        self.last_unknown_opcode
    }

    /// Current value of register `index`.
    pub fn register(&self, index: usize) -> u8 {
        self.regs.v[index]
    }

    /// Current program counter.
    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    /// Current index register.
    pub fn index(&self) -> u16 {
        self.regs.i
    }

    /// Snapshot every piece of machine state that defines future behavior —
    /// memory, call stack, registers, framebuffer planes/palette,
    /// plane-select mask, keyboard (including the `FX0A` latch),
    /// resolution flag, halt flag, and the scheduler's virtual-time cursor.
    ///
    /// The entropy source is excluded: `CXNN`'s `RngCore` is not
    /// serializable by design (it is a host-supplied capability, not part of
    /// the emulated machine's own state), so a restored interpreter keeps
    /// whichever RNG it already had.
    #[cfg(feature = "savestates")]
    pub fn save_state(&self) -> SaveState {
        SaveState {
            memory: self.memory.clone(),
            stack: self.stack.clone(),
            regs: self.regs.clone(),
            framebuffer: self.framebuffer.clone(),
            keyboard: self.keyboard.clone(),
            scheduler: self.scheduler.clone(),
            high_resolution: self.high_resolution,
            halted: self.halted,
        }
    }

    /// Restore machine state previously captured by [`Self::save_state`].
    /// The entropy source and any pending `last_unknown_opcode` diagnostic
    /// are left as they were.
    #[cfg(feature = "savestates")]
    pub fn restore_state(&mut self, state: SaveState) {
        self.memory = state.memory;
        self.stack = state.stack;
        self.regs = state.regs;
        self.framebuffer = state.framebuffer;
        self.keyboard = state.keyboard;
        self.scheduler = state.scheduler;
        self.high_resolution = state.high_resolution;
        self.halted = state.halted;
    }

    fn execute(&mut self, inst: Instruction) -> PcControl {
        match inst.high_nibble() {
            0x0 => self.execute_0(inst),
            0x1 => PcControl::Retarget(inst.nnn()),
            0x2 => self.op_call(inst.nnn()),
            0x3 => self.skip_if(self.regs.v[inst.x()] == inst.nn()),
            0x4 => self.skip_if(self.regs.v[inst.x()] != inst.nn()),
            0x5 => self.execute_5(inst),
            0x6 => {
                self.regs.v[inst.x()] = inst.nn();
                PcControl::Advance
            }
            0x7 => {
                let x = inst.x();
                self.regs.v[x] = self.regs.v[x].wrapping_add(inst.nn());
                PcControl::Advance
            }
            0x8 => self.execute_8(inst),
            0x9 => self.skip_if(self.regs.v[inst.x()] != self.regs.v[inst.y()]),
            0xA => {
                self.regs.i = inst.nnn();
                PcControl::Advance
            }
            0xB => self.op_bnnn(inst.nnn()),
            0xC => {
                let byte: u8 = self.rng.gen();
                self.regs.v[inst.x()] = byte & inst.nn();
                PcControl::Advance
            }
            0xD => self.op_draw(inst),
            0xE => self.execute_e(inst),
            0xF => self.execute_f(inst),
            _ => self.unknown(inst),
        }
    }

    fn skip_if(&self, cond: bool) -> PcControl {
        if cond {
            PcControl::Skip
        } else {
            PcControl::Advance
        }
    }

    fn unknown(&mut self, inst: Instruction) -> PcControl {
        let err = DecodeError::UnknownOpcode(inst.raw());
        log::warn!("{err}, treating as a no-op");
        self.last_unknown_opcode = Some(inst.raw());
        PcControl::Advance
    }

    fn op_call(&mut self, nnn: u16) -> PcControl {
        if self.stack.sp() < 16 {
            self.stack.push(self.regs.pc.wrapping_add(2));
            PcControl::Retarget(nnn)
        } else {
            // Known quirk, preserved for ROM compatibility: call-stack
            // overflow freezes PC instead of advancing.
            PcControl::Freeze
        }
    }

    fn op_bnnn(&mut self, nnn: u16) -> PcControl {
        let sum = nnn as u32 + self.regs.v[0] as u32;
        if sum > MEM_SIZE as u32 {
            PcControl::Freeze
        } else {
            PcControl::Retarget(sum as u16)
        }
    }

    /// `00..` family: scrolls, clear, return, halt, resolution toggles, and
    /// the SUPER-CHIP 4-pixel scrolls.
    fn execute_0(&mut self, inst: Instruction) -> PcControl {
        if inst.y() == 0xC {
            self.framebuffer.scroll_down(inst.n());
            return PcControl::Advance;
        }
        if inst.y() == 0xD {
            self.framebuffer.scroll_up(inst.n());
            return PcControl::Advance;
        }

        match inst.raw() {
            0x00E0 => {
                self.framebuffer.clear_both();
                PcControl::Advance
            }
            0x00EE => match self.stack.pop() {
                Some(addr) => PcControl::Retarget(addr),
                None => {
                    // Empty-stack RET: halt and log rather than
                    // underflowing SP.
                    self.halted = true;
                    PcControl::Freeze
                }
            },
            0x00FB => {
                self.framebuffer.scroll_right4();
                PcControl::Advance
            }
            0x00FC => {
                self.framebuffer.scroll_left4();
                PcControl::Advance
            }
            0x00FD => {
                self.halted = true;
                PcControl::Advance
            }
            0x00FE => {
                self.high_resolution = false;
                PcControl::Advance
            }
            0x00FF => {
                self.high_resolution = true;
                PcControl::Advance
            }
            _ => self.unknown(inst),
        }
    }

    /// `5XY0`/`5XY2`/`5XY3`: register-pair skip plus the XO-CHIP inclusive
    /// register-range save/load.
    fn execute_5(&mut self, inst: Instruction) -> PcControl {
        match inst.n() {
            0x0 => self.skip_if(self.regs.v[inst.x()] == self.regs.v[inst.y()]),
            0x2 => {
                self.range_copy(inst, true);
                PcControl::Advance
            }
            0x3 => {
                self.range_copy(inst, false);
                PcControl::Advance
            }
            _ => self.unknown(inst),
        }
    }

    /// Shared body of `5XY2` (`store`) / `5XY3` (`!store`). The range bound
    /// is the *values* held in VX/VY, not the opcode's X/Y nibbles — both
    /// must be under 16 and VY must exceed VX.
    fn range_copy(&mut self, inst: Instruction, store: bool) {
        let lo = self.regs.v[inst.x()];
        let hi = self.regs.v[inst.y()];
        if hi <= lo || lo >= 16 || hi >= 16 {
            return;
        }
        for idx in lo..=hi {
            let addr = self.regs.i.wrapping_add(idx as u16);
            if store {
                self.memory.write(addr, self.regs.v[idx as usize]);
            } else {
                self.regs.v[idx as usize] = self.memory.read(addr);
            }
        }
    }

    /// `8XY?` ALU family.
    fn execute_8(&mut self, inst: Instruction) -> PcControl {
        let (x, y) = (inst.x(), inst.y());
        match inst.n() {
            0x0 => self.regs.v[x] = self.regs.v[y],
            0x1 => self.regs.v[x] |= self.regs.v[y],
            0x2 => self.regs.v[x] &= self.regs.v[y],
            0x3 => self.regs.v[x] ^= self.regs.v[y],
            0x4 => {
                let old = self.regs.v[x];
                let new = old.wrapping_add(self.regs.v[y]);
                self.regs.v[x] = new;
                self.regs.v[0xF] = if new < old { 1 } else { 0 };
            }
            0x5 => {
                let old = self.regs.v[x];
                let new = old.wrapping_sub(self.regs.v[y]);
                self.regs.v[x] = new;
                self.regs.v[0xF] = if new <= old { 1 } else { 0 };
            }
            0x6 => {
                let src = self.regs.v[y];
                self.regs.v[x] = src >> 1;
                self.regs.v[0xF] = src & 0x01;
            }
            0x7 => {
                let vy = self.regs.v[y];
                let new = vy.wrapping_sub(self.regs.v[x]);
                self.regs.v[x] = new;
                self.regs.v[0xF] = if new <= vy { 1 } else { 0 };
            }
            0xE => {
                let src = self.regs.v[y];
                self.regs.v[x] = src << 1;
                self.regs.v[0xF] = (src & 0x80) >> 7;
            }
            _ => return self.unknown(inst),
        }
        PcControl::Advance
    }

    /// `EX9E`/`EXA1`: key-down skips.
    fn execute_e(&mut self, inst: Instruction) -> PcControl {
        let key = self.regs.v[inst.x()] as usize % 16;
        match inst.nn() {
            0x9E => self.skip_if(self.keyboard.is_down(key)),
            0xA1 => self.skip_if(!self.keyboard.is_down(key)),
            _ => self.unknown(inst),
        }
    }

    /// `FX??` family: long-load, plane select, timers, I arithmetic, font
    /// pointers, BCD, register/RPL range transfers, wait-for-key.
    fn execute_f(&mut self, inst: Instruction) -> PcControl {
        if inst.nn() == 0x00 {
            if inst.x() != 0 {
                return self.unknown(inst);
            }
            // F000: the XO-CHIP long-load. PC skips past both the F000
            // word and the 16-bit address operand that follows it.
            let addr_pc = self.regs.pc.wrapping_add(2);
            self.regs.i = self.memory.fetch_word(addr_pc);
            return PcControl::Retarget(self.regs.pc.wrapping_add(4));
        }

        let x = inst.x();
        match inst.nn() {
            0x01 => {
                self.framebuffer.set_plane_select(x as u8);
                PcControl::Advance
            }
            0x07 => {
                self.regs.v[x] = self.regs.delay;
                PcControl::Advance
            }
            0x0A => self.op_wait_for_key(x),
            0x15 => {
                self.regs.delay = self.regs.v[x];
                PcControl::Advance
            }
            0x18 => {
                self.regs.sound = self.regs.v[x];
                PcControl::Advance
            }
            0x1E => {
                self.regs.i = self.regs.i.wrapping_add(self.regs.v[x] as u16);
                PcControl::Advance
            }
            0x29 => {
                let digit = self.regs.v[x];
                self.regs.i = 5 * (digit % 16) as u16;
                PcControl::Advance
            }
            0x30 => {
                let digit = self.regs.v[x];
                self.regs.i = 0x50 + 10 * (digit % 10) as u16;
                PcControl::Advance
            }
            0x33 => {
                if self.regs.i < 0xFFFE {
                    let value = self.regs.v[x];
                    let i = self.regs.i;
                    self.memory.write(i, value / 100);
                    self.memory.write(i.wrapping_add(1), (value / 10) % 10);
                    self.memory.write(i.wrapping_add(2), value % 10);
                } else {
                    log::warn!("FX33 with I >= 0xFFFE, ignoring (would write past addressable memory)");
                }
                PcControl::Advance
            }
            0x55 => {
                for idx in 0..=x {
                    let addr = self.regs.i.wrapping_add(idx as u16);
                    self.memory.write(addr, self.regs.v[idx]);
                }
                self.regs.i = self.regs.i.wrapping_add(x as u16 + 1);
                PcControl::Advance
            }
            0x65 => {
                for idx in 0..=x {
                    let addr = self.regs.i.wrapping_add(idx as u16);
                    self.regs.v[idx] = self.memory.read(addr);
                }
                self.regs.i = self.regs.i.wrapping_add(x as u16 + 1);
                PcControl::Advance
            }
            0x75 => {
                self.regs.store_rpl(x);
                PcControl::Advance
            }
            0x85 => {
                self.regs.load_rpl(x);
                PcControl::Advance
            }
            _ => self.unknown(inst),
        }
    }

    /// `FX0A`'s two-phase latch. Phase 1 scans every key without
    /// short-circuiting (so of several simultaneously-held keys the
    /// highest index wins, matching [`Keyboard::highest_down`]) and, on a
    /// hit, latches phase 2 — but in *both* the hit and no-hit cases PC does
    /// not advance (the original reaches its shared epilogue only by a path
    /// this opcode never takes). Phase 2 holds PC until every key is up,
    /// then clears the latch and advances once.
    fn op_wait_for_key(&mut self, x: usize) -> PcControl {
        if !self.keyboard.is_waiting_on_release() {
            if let Some(key) = self.keyboard.highest_down() {
                self.regs.v[x] = key;
                self.keyboard.latch_waiting_on_release();
            }
            PcControl::Freeze
        } else if self.keyboard.any_down() {
            PcControl::Freeze
        } else {
            self.keyboard.clear_waiting_on_release();
            PcControl::Advance
        }
    }

    /// `DXYN`: build the selected planes' sprite bytes (doubling them for
    /// low-resolution mode) and XOR-blit each into the framebuffer.
    fn op_draw(&mut self, inst: Instruction) -> PcControl {
        let (x, y) = (inst.x(), inst.y());
        let mut n = inst.n();
        if n == 0 {
            n = 16;
        }

        let vx = self.regs.v[x];
        let vy = self.regs.v[y];
        self.regs.v[0xF] = 0;

        let bytes_per_plane = if n == 16 { 32 } else { n as usize };
        let mut collided = false;
        let mut plane_offset = 0usize;

        for plane in 0..2 {
            if self.framebuffer.plane_select() & (1 << plane) == 0 {
                continue;
            }

            let base = self
                .regs
                .i
                .wrapping_add((plane_offset * bytes_per_plane) as u16);
            let source: Vec<u8> = (0..bytes_per_plane)
                .map(|i| self.memory.read(base.wrapping_add(i as u16)))
                .collect();

            let hit = if self.high_resolution {
                if n == 16 {
                    self.framebuffer.blit(plane, &source, vx, vy, 2, 16)
                } else {
                    self.framebuffer.blit(plane, &source, vx, vy, 1, n as usize)
                }
            } else if n == 16 {
                let doubled = double_rows(&source, 2, 16);
                self.framebuffer
                    .blit(plane, &doubled, vx.wrapping_mul(2), vy.wrapping_mul(2), 4, 32)
            } else {
                let doubled = double_rows(&source, 1, n as usize);
                self.framebuffer.blit(
                    plane,
                    &doubled,
                    vx.wrapping_mul(2),
                    vy.wrapping_mul(2),
                    2,
                    2 * n as usize,
                )
            };

            collided |= hit;
            plane_offset += 1;
        }

        if collided {
            self.regs.v[0xF] = 1;
        }
        PcControl::Advance
    }
}

/// Expand `rows` source rows (`row_width_bytes` bytes each) into doubled
/// rows: each source row produces one output row twice the width (every
/// input bit occupies two adjacent output bits), appearing twice in a row
/// (vertical doubling), for low-resolution sprite draws.
fn double_rows(source: &[u8], row_width_bytes: usize, rows: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(source.len() * 4);
    for row in 0..rows {
        let mut doubled_row = Vec::with_capacity(row_width_bytes * 2);
        for col in 0..row_width_bytes {
            let byte = source[row * row_width_bytes + col];
            doubled_row.push(double_upper_nibble(byte));
            doubled_row.push(double_upper_nibble(byte << 4));
        }
        out.extend_from_slice(&doubled_row);
        out.extend_from_slice(&doubled_row);
    }
    out
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// A serializable snapshot of everything [`Interpreter::save_state`] captures.
///
/// Opaque to callers beyond (de)serializing it: pass it to
/// [`Interpreter::restore_state`] to roll a running interpreter back to the
/// point it was captured.
#[cfg(feature = "savestates")]
#[derive(Serialize, Deserialize)]
pub struct SaveState {
    memory: Memory,
    stack: CallStack,
    regs: RegisterFile,
    framebuffer: Framebuffer,
    keyboard: Keyboard,
    scheduler: Scheduler,
    high_resolution: bool,
    halted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::{rngs::SmallRng, SeedableRng};

    fn interp() -> Interpreter {
        let mut i = Interpreter::with_rng(Box::new(StepRng::new(0, 1)));
        i.load(&[]).unwrap();
        i
    }

    /// Memory stores each instruction word byte-swapped relative to the
    /// conventional big-endian mnemonic (see [`crate::memory::Memory::fetch_word`]):
    /// this is just `word.to_le_bytes()`.
    fn asm(words: &[u16]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn reset_after_load() {
        let i = interp();
        assert_eq!(i.pc(), 0x200);
        assert_eq!(i.index(), 0);
        assert_eq!(i.plane_select(), 1);
        assert!(!i.is_high_resolution());
        assert!(!i.is_halted());
        for r in 0..16 {
            assert_eq!(i.register(r), 0);
        }
    }

    /// `3X00` skip landing on a `0xF000` long-load must be skipped
    /// atomically: a plain skip advances PC by 4 total, but skipping over
    /// the 4-byte long-load (its `F000` word plus the 16-bit address
    /// operand that follows) advances PC by 8 total, landing at `0x208`
    /// for this byte layout.
    #[test]
    fn skip_over_long_load_is_atomic() {
        let mut i = interp();
        i.load(&asm(&[0x3000, 0xF000, 0xA200, 0x0000])).unwrap();
        i.step();
        assert_eq!(i.pc(), 0x208);
    }

    #[test]
    fn add_sets_carry_on_overflow_and_wraps() {
        let mut i = interp();
        i.load(&asm(&[0x60FF, 0x6101, 0x8014])).unwrap();
        i.step();
        i.step();
        i.step();
        assert_eq!(i.register(0), 0x00);
        assert_eq!(i.register(0xF), 1);
    }

    #[test]
    fn shift_quirk_reads_vy_not_vx() {
        let mut i = interp();
        i.load(&asm(&[0x6000, 0x61A5, 0x8016])).unwrap();
        i.step();
        i.step();
        i.step();
        assert_eq!(i.register(0), 0x52);
        assert_eq!(i.register(0xF), 1);
    }

    #[test]
    fn wait_for_key_press_and_release() {
        let mut i = interp();
        i.load(&asm(&[0xF00A])).unwrap();
        i.step();
        assert_eq!(i.pc(), 0x200, "no key down: PC does not advance");

        i.set_key(5, true);
        i.step();
        assert_eq!(i.register(0), 5);
        assert_eq!(i.pc(), 0x200, "key found: enters phase 2 without advancing");

        i.step();
        assert_eq!(i.pc(), 0x200, "key still held: PC frozen");

        i.set_key(5, false);
        i.step();
        assert_eq!(i.pc(), 0x202, "all keys released: PC advances once");
    }

    #[test]
    fn call_stack_overflow_freezes_pc() {
        let mut i = interp();
        // CALL 0x200 always jumps back to itself; 17 executions fill the
        // 16-slot stack and the 17th must freeze instead of pushing.
        i.load(&asm(&[0x2200])).unwrap();
        for _ in 0..16 {
            i.step();
        }
        let pc_before = i.pc();
        i.step();
        assert_eq!(i.pc(), pc_before, "17th CALL overflows and freezes PC");
    }

    #[test]
    fn bnnn_jumps_to_nnn_plus_v0() {
        let mut i = interp();
        i.load(&asm(&[0x6005, 0xB300])).unwrap();
        i.step();
        i.step();
        assert_eq!(i.pc(), 0x305);
    }

    #[test]
    fn return_with_empty_stack_halts() {
        let mut i = interp();
        i.load(&asm(&[0x00EE])).unwrap();
        i.step();
        assert!(i.is_halted());
    }

    #[test]
    #[cfg(feature = "savestates")]
    fn save_state_round_trips_and_excludes_rng() {
        let mut i = interp();
        i.load(&asm(&[0x60FF, 0x6101, 0x8014])).unwrap();
        i.step();
        i.step();
        i.step();
        let snapshot = i.save_state();

        let mut restored = Interpreter::with_rng(Box::new(StepRng::new(0, 1)));
        restored.load(&asm(&[0x00E0])).unwrap();
        restored.restore_state(snapshot);

        assert_eq!(restored.register(0), i.register(0));
        assert_eq!(restored.register(0xF), i.register(0xF));
        assert_eq!(restored.pc(), i.pc());
    }

    #[test]
    fn range_copy_round_trips() {
        let mut i = interp();
        // I = 0x300, V1 = 2, V2 = 5 (the range bounds, left untouched since
        // 5123 re-reads them), V3 = 0xAA, V4 = 0xBB, V5 = 0xCC. 5122 stores
        // V[2..=5] at mem[0x302..=0x305]; clear V3..V5, then 5123 loads them
        // back from the same range.
        i.load(&asm(&[
            0xA300, 0x6102, 0x6205, 0x63AA, 0x64BB, 0x65CC, 0x5122, 0x6300, 0x6400, 0x6500,
            0x5123,
        ]))
        .unwrap();
        for _ in 0..11 {
            i.step();
        }
        assert_eq!(i.register(2), 5);
        assert_eq!(i.register(3), 0xAA);
        assert_eq!(i.register(4), 0xBB);
        assert_eq!(i.register(5), 0xCC);
    }

    #[test]
    fn cxnn_masks_a_seeded_rng_byte() {
        // A seeded SmallRng (rather than the StepRng the other tests use)
        // demonstrates that CXNN works with any RngCore, not just a
        // constant-stepping mock, and that the result is always `byte & NN`.
        let mut i = Interpreter::with_rng(Box::new(SmallRng::seed_from_u64(42)));
        i.load(&asm(&[0xC00F, 0xC1F0])).unwrap();
        i.step();
        i.step();
        assert_eq!(i.register(0) & !0x0F, 0, "C00F masks to the low nibble");
        assert_eq!(i.register(1) & !0xF0, 0, "C1F0 masks to the high nibble");
    }

    #[test]
    fn unknown_opcode_is_logged_noop() {
        let mut i = interp();
        i.load(&asm(&[0x5001])).unwrap();
        i.step();
        assert_eq!(i.last_unknown_opcode(), Some(0x5001));
        assert_eq!(i.pc(), 0x202);
    }

    #[test]
    fn fx55_fx65_round_trip_and_advance_i_twice() {
        let mut i = interp();
        // F255 stores V0..V2 at mem[0x300..=0x302] and leaves I at 0x303;
        // reset I to 0x300 before clearing the registers and loading them
        // back, so F265 reads from where F255 actually wrote.
        i.load(&asm(&[
            0x6011, 0x6122, 0x6233, 0xA300, 0xF255, 0x6000, 0x6100, 0x6200, 0xA300, 0xF265,
        ]))
        .unwrap();
        for _ in 0..10 {
            i.step();
        }
        assert_eq!(i.register(0), 0x11);
        assert_eq!(i.register(1), 0x22);
        assert_eq!(i.register(2), 0x33);
        assert_eq!(i.index(), 0x303);
    }
}
