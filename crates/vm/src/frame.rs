//! Frame templates and activation frames
//!
//! A `VMFrameTemplate` is the static, shareable compilation of one function.
//! A `VMFrame` is a runtime activation of a template with its own program
//! counter, operand stack, and variable slots. Templates are shared between
//! the VM's registry and live frames via `Rc`, so recursive calls reuse one
//! compiled body.

use crate::instr::Instruction;
use crate::value::Value;
use std::rc::Rc;

/// The compiled form of one function, keyed by its mangled id.
#[derive(Debug, Clone, PartialEq)]
pub struct VMFrameTemplate {
    /// Mangled function id (`main`, `add_int_int`, ...).
    pub function_id: String,
    /// Number of declared parameters; the caller pops this many arguments.
    pub arg_count: usize,
    pub instructions: Vec<Instruction>,
}

impl VMFrameTemplate {
    pub fn new(function_id: impl Into<String>, arg_count: usize) -> Self {
        VMFrameTemplate {
            function_id: function_id.into(),
            arg_count,
            instructions: Vec::new(),
        }
    }
}

/// A runtime activation of a frame template.
#[derive(Debug)]
pub struct VMFrame {
    pub template: Rc<VMFrameTemplate>,
    /// Index of the next instruction to execute.
    pub pc: usize,
    pub operand_stack: Vec<Value>,
    /// Variable slots addressed by dense indices assigned at code
    /// generation time.
    pub variables: Vec<Value>,
}

impl VMFrame {
    pub fn new(template: Rc<VMFrameTemplate>) -> Self {
        VMFrame {
            template,
            pc: 0,
            operand_stack: Vec::new(),
            variables: Vec::new(),
        }
    }
}
