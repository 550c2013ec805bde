//! VM error type
//!
//! Every runtime failure is terminal for the current run. Errors raised
//! while an instruction is executing carry their origin: the enclosing
//! function id, the program counter of the faulting instruction, and the
//! instruction's rendered text.

use std::fmt;

/// A terminal runtime error.
#[derive(Debug)]
pub struct VMError {
    message: String,
    origin: Option<Origin>,
}

#[derive(Debug)]
struct Origin {
    function_id: String,
    pc: usize,
    instruction: String,
}

impl VMError {
    /// An error with no instruction context (e.g. a missing `main`).
    pub fn new(message: impl Into<String>) -> Self {
        VMError {
            message: message.into(),
            origin: None,
        }
    }

    /// An error raised by the instruction at `pc` in `function_id`.
    pub fn at(
        message: impl Into<String>,
        function_id: &str,
        pc: usize,
        instruction: &crate::instr::Instruction,
    ) -> Self {
        VMError {
            message: message.into(),
            origin: Some(Origin {
                function_id: function_id.to_string(),
                pc,
                instruction: instruction.to_string(),
            }),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for VMError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Some(origin) => write!(
                f,
                "{} (in {} at {}: {})",
                self.message, origin.function_id, origin.pc, origin.instruction
            ),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for VMError {}
