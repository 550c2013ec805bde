//! The Opal virtual machine
//!
//! Executes frame templates via a call stack of activation frames. The VM
//! owns the struct heap, the array heap, and the object id allocator; two VM
//! instances share nothing. The interpretation loop is a single hot path:
//! fetch the instruction at the current program counter, bump the counter,
//! dispatch.

use crate::error::VMError;
use crate::frame::{VMFrame, VMFrameTemplate};
use crate::instr::Instruction;
use crate::io::{StdIo, VmIo};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

pub struct VM {
    /// object id -> field name -> value
    struct_heap: HashMap<u64, HashMap<String, Value>>,
    /// object id -> elements
    array_heap: HashMap<u64, Vec<Value>>,
    /// Monotonic allocator; ids are never reused.
    next_obj_id: u64,
    /// mangled function id -> compiled template
    frame_templates: HashMap<String, Rc<VMFrameTemplate>>,
    call_stack: Vec<VMFrame>,
    io: Box<dyn VmIo>,
}

impl VM {
    pub fn new() -> Self {
        VM::with_io(Box::new(StdIo))
    }

    pub fn with_io(io: Box<dyn VmIo>) -> Self {
        VM {
            struct_heap: HashMap::new(),
            array_heap: HashMap::new(),
            next_obj_id: 1,
            frame_templates: HashMap::new(),
            call_stack: Vec::new(),
            io,
        }
    }

    /// Register a compiled function. A later template with the same id
    /// replaces the earlier one.
    pub fn add_frame_template(&mut self, template: VMFrameTemplate) {
        self.frame_templates
            .insert(template.function_id.clone(), Rc::new(template));
    }

    /// Instantiate `main` and interpret until the call stack drains.
    pub fn run(&mut self) -> Result<(), VMError> {
        let main = self
            .frame_templates
            .get("main")
            .cloned()
            .ok_or_else(|| VMError::new("no 'main' frame template"))?;
        self.call_stack.push(VMFrame::new(main));
        self.interpret()
    }

    fn interpret(&mut self) -> Result<(), VMError> {
        loop {
            let Some(frame) = self.call_stack.last_mut() else {
                return Ok(());
            };
            if frame.pc >= frame.template.instructions.len() {
                return Ok(());
            }
            let template = Rc::clone(&frame.template);
            let pc = frame.pc;
            frame.pc += 1;
            let instr = &template.instructions[pc];
            trace!(function = %template.function_id, pc, %instr, "step");
            let fail = |msg: &str| VMError::at(msg, &template.function_id, pc, instr);

            match instr {
                //----------------------------------------------------------
                // Literals and variables
                //----------------------------------------------------------
                Instruction::Push(value) => frame.operand_stack.push(value.clone()),

                Instruction::Pop => {
                    frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                }

                Instruction::Dup => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    frame.operand_stack.push(value.clone());
                    frame.operand_stack.push(value);
                }

                Instruction::Store(k) => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let k = *k;
                    if k == frame.variables.len() {
                        frame.variables.push(value);
                    } else if k < frame.variables.len() {
                        frame.variables[k] = value;
                    } else {
                        // A declaration skipped at runtime by a branch left a
                        // gap; fill it with nulls so slot indices stay dense.
                        frame.variables.resize(k, Value::Null);
                        frame.variables.push(value);
                    }
                }

                Instruction::Load(k) => {
                    let value = frame
                        .variables
                        .get(*k)
                        .cloned()
                        .ok_or_else(|| fail("load from unset variable slot"))?;
                    frame.operand_stack.push(value);
                }

                //----------------------------------------------------------
                // Arithmetic, logic, comparison
                //----------------------------------------------------------
                Instruction::Add
                | Instruction::Sub
                | Instruction::Mul
                | Instruction::Div
                | Instruction::And
                | Instruction::Or
                | Instruction::CmpLt
                | Instruction::CmpLe
                | Instruction::CmpEq
                | Instruction::CmpNe => {
                    let x = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let y = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let result = binary_op(instr, &y, &x).map_err(|msg| fail(&msg))?;
                    frame.operand_stack.push(result);
                }

                Instruction::Not => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    match value {
                        Value::Bool(b) => frame.operand_stack.push(Value::Bool(!b)),
                        other => {
                            return Err(fail(&format!(
                                "NOT on non-bool operand ({})",
                                other.type_name()
                            )));
                        }
                    }
                }

                //----------------------------------------------------------
                // Branching
                //----------------------------------------------------------
                Instruction::Jmp(target) => frame.pc = *target,

                Instruction::JmpF(target) => {
                    let condition = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    match condition {
                        Value::Bool(false) => frame.pc = *target,
                        Value::Bool(true) => {}
                        other => {
                            return Err(fail(&format!(
                                "branch on non-bool operand ({})",
                                other.type_name()
                            )));
                        }
                    }
                }

                Instruction::Nop => {}

                //----------------------------------------------------------
                // Functions
                //----------------------------------------------------------
                Instruction::Call(id) => {
                    let target = self
                        .frame_templates
                        .get(id)
                        .cloned()
                        .ok_or_else(|| fail(&format!("call to undefined function '{}'", id)))?;
                    let mut callee = VMFrame::new(target);
                    // Arguments are popped in reverse; the callee's prologue
                    // stores them back in declared order.
                    for _ in 0..callee.template.arg_count {
                        let value = frame
                            .operand_stack
                            .pop()
                            .ok_or_else(|| fail("empty operand stack"))?;
                        callee.operand_stack.push(value);
                    }
                    self.call_stack.push(callee);
                }

                Instruction::Ret => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    self.call_stack.pop();
                    if let Some(caller) = self.call_stack.last_mut() {
                        caller.operand_stack.push(value);
                    }
                }

                //----------------------------------------------------------
                // Built-in I/O and conversion
                //----------------------------------------------------------
                Instruction::Write => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    self.io.write(&value.to_string());
                }

                Instruction::Read => {
                    let line = self
                        .io
                        .read_line()
                        .ok_or_else(|| fail("unexpected end of input"))?;
                    frame.operand_stack.push(Value::Str(line.trim().to_string()));
                }

                Instruction::Len => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let length = match value {
                        Value::Str(s) => s.chars().count() as i64,
                        Value::Obj(id) => match self.array_heap.get(&id) {
                            Some(elements) => elements.len() as i64,
                            None => return Err(fail("length of a non-array object")),
                        },
                        other => {
                            return Err(fail(&format!(
                                "invalid operand for length ({})",
                                other.type_name()
                            )));
                        }
                    };
                    frame.operand_stack.push(Value::Int(length));
                }

                Instruction::GetC => {
                    let text = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let index = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    match (index, text) {
                        (Value::Int(i), Value::Str(s)) => {
                            let ch = usize::try_from(i)
                                .ok()
                                .and_then(|i| s.chars().nth(i))
                                .ok_or_else(|| fail("string index out of bounds"))?;
                            frame.operand_stack.push(Value::Str(ch.to_string()));
                        }
                        (index, text) => {
                            return Err(fail(&format!(
                                "invalid operands for get ({} and {})",
                                index.type_name(),
                                text.type_name()
                            )));
                        }
                    }
                }

                Instruction::ToInt => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let result = match value {
                        Value::Int(n) => n,
                        Value::Double(d) => d as i64,
                        Value::Str(s) => s.trim().parse::<i64>().map_err(|_| {
                            fail(&format!("cannot convert \"{}\" to int", s))
                        })?,
                        other => {
                            return Err(fail(&format!(
                                "invalid operand for int conversion ({})",
                                other.type_name()
                            )));
                        }
                    };
                    frame.operand_stack.push(Value::Int(result));
                }

                Instruction::ToDbl => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let result = match value {
                        Value::Int(n) => n as f64,
                        Value::Double(d) => d,
                        Value::Str(s) => s.trim().parse::<f64>().map_err(|_| {
                            fail(&format!("cannot convert \"{}\" to double", s))
                        })?,
                        other => {
                            return Err(fail(&format!(
                                "invalid operand for double conversion ({})",
                                other.type_name()
                            )));
                        }
                    };
                    frame.operand_stack.push(Value::Double(result));
                }

                Instruction::ToStr => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    if value.is_null() {
                        return Err(fail("invalid operand for string conversion (null)"));
                    }
                    frame.operand_stack.push(Value::Str(value.to_string()));
                }

                //----------------------------------------------------------
                // Heap
                //----------------------------------------------------------
                Instruction::AllocS => {
                    let oid = self.next_obj_id;
                    self.next_obj_id += 1;
                    self.struct_heap.insert(oid, HashMap::new());
                    frame.operand_stack.push(Value::Obj(oid));
                }

                Instruction::SetF(field) => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let target = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    match target {
                        Value::Obj(id) => {
                            let fields = self
                                .struct_heap
                                .get_mut(&id)
                                .ok_or_else(|| fail("set field on a non-struct object"))?;
                            fields.insert(field.clone(), value);
                        }
                        Value::Null => return Err(fail("null dereference")),
                        other => {
                            return Err(fail(&format!(
                                "set field on a non-struct operand ({})",
                                other.type_name()
                            )));
                        }
                    }
                }

                Instruction::GetF(field) => {
                    let target = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    match target {
                        Value::Obj(id) => {
                            let value = self
                                .struct_heap
                                .get(&id)
                                .ok_or_else(|| fail("get field on a non-struct object"))?
                                .get(field)
                                .cloned()
                                .ok_or_else(|| {
                                    fail(&format!("field '{}' does not exist", field))
                                })?;
                            frame.operand_stack.push(value);
                        }
                        Value::Null => return Err(fail("null dereference")),
                        other => {
                            return Err(fail(&format!(
                                "get field on a non-struct operand ({})",
                                other.type_name()
                            )));
                        }
                    }
                }

                Instruction::AllocA => {
                    let length = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let length = match length {
                        Value::Int(n) if n >= 0 => n as usize,
                        Value::Int(_) => return Err(fail("negative array size")),
                        other => {
                            return Err(fail(&format!(
                                "invalid array size ({})",
                                other.type_name()
                            )));
                        }
                    };
                    let oid = self.next_obj_id;
                    self.next_obj_id += 1;
                    self.array_heap.insert(oid, vec![Value::Null; length]);
                    frame.operand_stack.push(Value::Obj(oid));
                }

                Instruction::SetI => {
                    let value = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let index = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let target = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    match (target, index) {
                        (Value::Obj(id), Value::Int(i)) => {
                            let elements = self
                                .array_heap
                                .get_mut(&id)
                                .ok_or_else(|| fail("index into a non-array object"))?;
                            let slot = usize::try_from(i)
                                .ok()
                                .filter(|&i| i < elements.len())
                                .ok_or_else(|| fail("array index out of bounds"))?;
                            elements[slot] = value;
                        }
                        (Value::Null, _) => return Err(fail("null dereference")),
                        (target, index) => {
                            return Err(fail(&format!(
                                "invalid operands for array store ({} and {})",
                                target.type_name(),
                                index.type_name()
                            )));
                        }
                    }
                }

                Instruction::GetI => {
                    let index = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    let target = frame
                        .operand_stack
                        .pop()
                        .ok_or_else(|| fail("empty operand stack"))?;
                    match (target, index) {
                        (Value::Obj(id), Value::Int(i)) => {
                            let elements = self
                                .array_heap
                                .get(&id)
                                .ok_or_else(|| fail("index into a non-array object"))?;
                            let value = usize::try_from(i)
                                .ok()
                                .and_then(|i| elements.get(i))
                                .cloned()
                                .ok_or_else(|| fail("array index out of bounds"))?;
                            frame.operand_stack.push(value);
                        }
                        (Value::Null, _) => return Err(fail("null dereference")),
                        (target, index) => {
                            return Err(fail(&format!(
                                "invalid operands for array load ({} and {})",
                                target.type_name(),
                                index.type_name()
                            )));
                        }
                    }
                }
            }
        }
    }
}

impl Default for VM {
    fn default() -> Self {
        VM::new()
    }
}

/// Indexed instruction dump of every registered template, ordered by
/// function id.
impl fmt::Display for VM {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.frame_templates.keys().collect();
        ids.sort();
        for id in ids {
            let template = &self.frame_templates[id];
            writeln!(f, "Frame {}", id)?;
            for (i, instr) in template.instructions.iter().enumerate() {
                writeln!(f, "  {}: {}", i, instr)?;
            }
        }
        Ok(())
    }
}

/// Apply a two-operand instruction to `y` (pushed first) and `x` (top of
/// stack). Both operands must have the same dynamic type; equality
/// additionally tolerates null on either side.
fn binary_op(instr: &Instruction, y: &Value, x: &Value) -> Result<Value, String> {
    use Instruction::*;
    use Value::*;

    let mismatch = || {
        format!(
            "operand type mismatch ({} and {})",
            y.type_name(),
            x.type_name()
        )
    };

    match instr {
        Add => match (y, x) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_add(*b))),
            (Double(a), Double(b)) => Ok(Double(a + b)),
            (Str(a), Str(b)) => Ok(Str(format!("{}{}", a, b))),
            _ => Err(mismatch()),
        },
        Sub => match (y, x) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_sub(*b))),
            (Double(a), Double(b)) => Ok(Double(a - b)),
            _ => Err(mismatch()),
        },
        Mul => match (y, x) {
            (Int(a), Int(b)) => Ok(Int(a.wrapping_mul(*b))),
            (Double(a), Double(b)) => Ok(Double(a * b)),
            _ => Err(mismatch()),
        },
        Div => match (y, x) {
            (Int(_), Int(0)) => Err("division by zero".to_string()),
            (Int(a), Int(b)) => Ok(Int(floored_div(*a, *b))),
            (Double(_), Double(b)) if *b == 0.0 => Err("division by zero".to_string()),
            (Double(a), Double(b)) => Ok(Double(a / b)),
            _ => Err(mismatch()),
        },
        And => match (y, x) {
            (Bool(a), Bool(b)) => Ok(Bool(*a && *b)),
            _ => Err(mismatch()),
        },
        Or => match (y, x) {
            (Bool(a), Bool(b)) => Ok(Bool(*a || *b)),
            _ => Err(mismatch()),
        },
        CmpLt => match (y, x) {
            (Int(a), Int(b)) => Ok(Bool(a < b)),
            (Double(a), Double(b)) => Ok(Bool(a < b)),
            (Str(a), Str(b)) => Ok(Bool(a < b)),
            _ => Err(mismatch()),
        },
        CmpLe => match (y, x) {
            (Int(a), Int(b)) => Ok(Bool(a <= b)),
            (Double(a), Double(b)) => Ok(Bool(a <= b)),
            (Str(a), Str(b)) => Ok(Bool(a <= b)),
            _ => Err(mismatch()),
        },
        CmpEq | CmpNe => {
            // Equality is the one comparison null participates in: two
            // nulls are equal, null never equals a non-null value.
            if !y.is_null() && !x.is_null() && !y.same_type(x) {
                return Err(mismatch());
            }
            let equal = y == x;
            Ok(Bool(if matches!(instr, CmpEq) { equal } else { !equal }))
        }
        _ => Err(format!("'{}' is not a binary operation", instr)),
    }
}

/// Integer division rounding toward negative infinity.
fn floored_div(y: i64, x: i64) -> i64 {
    let quotient = y.wrapping_div(x);
    if y.wrapping_rem(x) != 0 && (y < 0) != (x < 0) {
        quotient - 1
    } else {
        quotient
    }
}
