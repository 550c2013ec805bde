//! Opal Virtual Machine
//!
//! A stack machine that executes frame templates produced by the Opal
//! compiler. Each frame template is the static compilation of one function:
//! its mangled id, declared parameter count, and a linear instruction list.
//! The VM owns a call stack of activation frames and a process-wide heap of
//! structs and arrays keyed by object id.

pub mod error;
pub mod frame;
pub mod instr;
pub mod io;
pub mod value;
pub mod vm;

pub use error::VMError;
pub use frame::{VMFrame, VMFrameTemplate};
pub use instr::Instruction;
pub use io::{CaptureIo, StdIo, VmIo};
pub use value::Value;
pub use vm::VM;
