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

//! The 16-key input vector and the `FX0A` wait-for-release latch.

#[cfg(feature = "savestates")]
use serde::{Deserialize, Serialize};

/// 16 polled boolean keys, indexed `0x0..0xF`.
///
/// Also carries the two-phase latch `FX0A` needs to implement
/// "press-and-release" semantics: phase 1 waits for any key to
/// go down, phase 2 waits for every key to come back up.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "savestates", derive(Serialize, Deserialize))]
pub struct Keyboard {
    keys: [bool; 16],
    /// Set once `FX0A` has latched a key in phase 1; cleared once all keys
    /// are released again.
    waiting_on_release: bool,
}

impl Keyboard {
    /// All keys up, latch cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all keys to up. Does not affect the wait-on-release latch: key
    /// state is a host-input concern independent from in-flight `FX0A`
    /// state.
    pub fn reset(&mut self) {
        self.keys = [false; 16];
    }

    /// Set key `index`'s down/up state.
    pub fn set_key(&mut self, index: usize, down: bool) {
        self.keys[index] = down;
    }

    /// Is key `index` currently down?
    pub fn is_down(&self, index: usize) -> bool {
        self.keys[index]
    }

    /// Are any keys currently down?
    pub fn any_down(&self) -> bool {
        self.keys.iter().any(|&k| k)
    }

    /// Index of the highest-indexed key currently down, if any.
    ///
    /// Scans low to high without short-circuiting, so of several
    /// simultaneously-held keys the highest index wins.
    pub fn highest_down(&self) -> Option<u8> {
        let mut found = None;
        for (i, &down) in self.keys.iter().enumerate() {
            if down {
                found = Some(i as u8);
            }
        }
        found
    }

    /// Is `FX0A` currently in phase 2 (waiting for release)?
    pub fn is_waiting_on_release(&self) -> bool {
        self.waiting_on_release
    }

    /// Enter phase 2.
    pub fn latch_waiting_on_release(&mut self) {
        self.waiting_on_release = true;
    }

    /// Clear phase 2 (all keys released).
    pub fn clear_waiting_on_release(&mut self) {
        self.waiting_on_release = false;
    }
}
