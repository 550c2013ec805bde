//! Pluggable VM I/O
//!
//! `WRITE` and `READ` go through the `VmIo` trait so programs can run
//! against real standard streams or against buffers in tests. `StdIo` is
//! the production implementation; `CaptureIo` collects output and serves
//! scripted input lines through a shared handle, so a test can keep a clone
//! and inspect the output after the VM has consumed the other.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::rc::Rc;

/// The VM's view of the outside world.
pub trait VmIo {
    /// Write text to program output without a trailing newline.
    fn write(&mut self, text: &str);

    /// Read one line from program input, without the line terminator.
    /// Returns `None` at end of input.
    fn read_line(&mut self) -> Option<String>;
}

/// Standard input/output.
#[derive(Debug, Default)]
pub struct StdIo;

impl VmIo for StdIo {
    fn write(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        // A failed write to stdout is not recoverable from inside a program.
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Some(line)
            }
        }
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    output: String,
    input: VecDeque<String>,
}

/// Buffered I/O for tests: output accumulates in a string, input is served
/// from a queue of pre-loaded lines. Cloning shares the underlying buffers.
#[derive(Debug, Clone, Default)]
pub struct CaptureIo {
    state: Rc<RefCell<CaptureState>>,
}

impl CaptureIo {
    pub fn new() -> Self {
        CaptureIo::default()
    }

    /// Pre-load lines to be returned by successive `READ`s.
    pub fn with_input(lines: &[&str]) -> Self {
        CaptureIo {
            state: Rc::new(RefCell::new(CaptureState {
                output: String::new(),
                input: lines.iter().map(|s| s.to_string()).collect(),
            })),
        }
    }

    /// Everything the program has written so far.
    pub fn output(&self) -> String {
        self.state.borrow().output.clone()
    }
}

impl VmIo for CaptureIo {
    fn write(&mut self, text: &str) {
        self.state.borrow_mut().output.push_str(text);
    }

    fn read_line(&mut self) -> Option<String> {
        self.state.borrow_mut().input.pop_front()
    }
}
