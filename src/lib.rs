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

//! A bit-exact CHIP-8, SUPER-CHIP and XO-CHIP interpreter backend.
//!
//! [`Interpreter`] owns every piece of machine state — memory, registers,
//! framebuffer, keyboard, call stack — and a [`Scheduler`] that drives it at
//! a configurable virtual instruction rate. A host is responsible for the
//! things this crate deliberately stays out of: loading ROM bytes from
//! disk, turning `sound_active()` into actual audio, presenting
//! `framebuffer()` in a window, and feeding in real wall-clock time and key
//! events.
//!
//! ```rust
//! use ferrous_core::Interpreter;
//!
//! let mut chip8 = Interpreter::new();
//! chip8.load(&[0x60, 0x05]).unwrap();
//! chip8.resume();
//! chip8.tick(1000.0 / 60.0);
//! ```

mod error;
mod font;
mod framebuffer;
mod instruction;
mod interpreter;
mod keyboard;
mod memory;
mod registers;
mod scheduler;

pub use error::{DecodeError, LoadError};
pub use framebuffer::{Rgba, HEIGHT, WIDTH};
pub use interpreter::Interpreter;
#[cfg(feature = "savestates")]
pub use interpreter::SaveState;
