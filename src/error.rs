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

//! Diagnostic error types.
//!
//! None of these are fatal to the interpreter: image length is
//! clamped rather than rejected, and unknown opcodes are logged and treated
//! as a no-op. They exist so a host can surface "this ROM is doing something
//! unusual" without the core panicking or aborting a step.

use thiserror::Error;

/// Returned by [`crate::Interpreter::load`].
///
/// Currently has no variant that is ever constructed — an oversized image is
/// silently truncated, not rejected — but the `Result` return type is kept so
/// a future stricter loading mode has somewhere to report through without
/// breaking the public API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The image could not fit even after truncation to the maximum program
    /// area size. Not currently reachable: [`crate::Interpreter::load`]
    /// always truncates instead.
    #[error("program image of {len} bytes exceeds the {max} byte program area")]
    TooLarge {
        /// Length of the rejected image, in bytes.
        len: usize,
        /// Maximum permitted image length, in bytes.
        max: usize,
    },
}

/// Recorded (not returned) when [`crate::Interpreter::step`] encounters an
/// opcode with no defined meaning. The interpreter advances past it as a
/// no-op; the last such opcode is retrievable via
/// [`crate::Interpreter::last_unknown_opcode`] for host-side diagnostics.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// No opcode handler matched the given 16-bit word.
    #[error("unrecognized opcode {0:#06X}")]
    UnknownOpcode(u16),
}
