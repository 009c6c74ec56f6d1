//! Execution contexts
//!
//! An execution is a user-visible coroutine handle bound to an entry
//! function. It owns a frame stack (top = current), the I/O registers used
//! for parameter and return-value exchange, a raised-exception slot, and
//! the yielded/completed/aborted status flags. The host drives it through
//! [`Execution::run`]; `YIELD` is the only in-script suspension point.

pub(crate) mod frame;
pub(crate) mod opcodes;

use crate::error::{VmError, VmResult};
use crate::function::Function;
use crate::native::NativeCallArgs;
use crate::vm::{StandardException, Vm, VmState};
use self::frame::Frame;
use self::opcodes::{ScriptFault, StepOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use xenon_core::{Value, XString};

/// Number of general-purpose registers per frame.
pub const GP_REGISTER_COUNT: usize = 128;

/// Number of I/O (parameter exchange) registers per execution context.
pub const IO_REGISTER_COUNT: usize = 8;

/// Maximum depth of a frame's value stack.
pub const FRAME_STACK_CAPACITY: usize = 512;

/// How [`Execution::run`] drives the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Execute until the context yields, completes, aborts, or raises.
    Continuous,
    /// Execute exactly one instruction.
    SingleStep,
}

/// Severity of a raised exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Traverses guarded blocks and may be caught.
    Normal,
    /// Bypasses all handlers; the context becomes raised immediately.
    Fatal,
}

/// One entry of a resolved frame stack, top first.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Signature of the frame's function.
    pub signature: Arc<XString>,
    /// Whether the frame belongs to a native call.
    pub is_native: bool,
    /// Bytecode offset of the frame's current instruction.
    pub bytecode_offset: u32,
}

pub(crate) struct ExecState {
    pub(crate) frames: Vec<Frame>,
    pub(crate) io_registers: [Value; IO_REGISTER_COUNT],
    pub(crate) exception: Option<Value>,
    pub(crate) yielded: bool,
    pub(crate) completed: bool,
    pub(crate) aborted: bool,
}

pub(crate) struct ExecShared {
    pub(crate) state: Mutex<ExecState>,
    pub(crate) abort_requested: AtomicBool,
}

/// A coroutine-style execution context bound to an entry function.
pub struct Execution {
    vm: Arc<VmState>,
    shared: Arc<ExecShared>,
    id: u64,
}

impl Execution {
    /// Create an execution with one frame for the entry function. GP and
    /// I/O registers start null; locals come from the function's prototype
    /// table.
    pub fn create(vm: &Vm, entry: &Arc<Function>) -> VmResult<Execution> {
        let entry_frame = Frame::new_script(entry).ok_or_else(|| {
            VmError::InvalidArg(format!(
                "entry function is not a script function: {}",
                entry.signature()
            ))
        })?;

        let state = ExecState {
            frames: vec![entry_frame],
            io_registers: [Value::Null; IO_REGISTER_COUNT],
            exception: None,
            yielded: false,
            completed: false,
            aborted: false,
        };
        let shared = Arc::new(ExecShared {
            state: Mutex::new(state),
            abort_requested: AtomicBool::new(false),
        });

        let id = vm
            .state
            .next_execution_id
            .fetch_add(1, Ordering::Relaxed);
        vm.state.executions.lock().insert(id, Arc::clone(&shared));

        Ok(Execution {
            vm: Arc::clone(&vm.state),
            shared,
            id,
        })
    }

    /// Drive the interpreter. Returns when the context yields, completes,
    /// aborts, surfaces an exception, or (in single-step mode) after one
    /// instruction. The GC read lock is held for each executed instruction
    /// and released around native callbacks.
    pub fn run(&self, mode: RunMode) -> VmResult<()> {
        {
            let _shared = self.vm.gc_lock.read();
            let mut st = self.shared.state.lock();
            if st.completed || st.aborted || st.exception.is_some() {
                return Ok(());
            }
            st.yielded = false;
        }

        loop {
            let pending_native = {
                let _shared = self.vm.gc_lock.read();
                let mut st = self.shared.state.lock();

                // Abort is checked between instructions; the flag is set by
                // the host, possibly from another thread.
                if self.shared.abort_requested.load(Ordering::Acquire) {
                    st.aborted = true;
                    return Ok(());
                }

                match opcodes::execute_instruction(&self.vm, &mut st) {
                    Ok(StepOutcome::Normal) => None,
                    Ok(StepOutcome::Native(function)) => Some(function),
                    Err(fault) => {
                        raise_fault(&self.vm, &mut st, fault);
                        None
                    }
                }
            };

            if let Some(function) = pending_native {
                self.invoke_native(&function);
            }

            {
                let _shared = self.vm.gc_lock.read();
                let st = self.shared.state.lock();
                if st.yielded || st.completed || st.aborted || st.exception.is_some() {
                    return Ok(());
                }
            }

            if mode == RunMode::SingleStep {
                return Ok(());
            }
        }
    }

    /// Invoke a native callback with the GC read lock released, then merge
    /// its results back into the context.
    fn invoke_native(&self, function: &Arc<Function>) {
        // Copy the I/O registers out; the callback works on the scratch
        // copy while the collector is free to run. The originals stay in
        // the context, keeping the argument values rooted.
        let mut io = { self.shared.state.lock().io_registers };
        let callback = function.native_callback();

        let mut args = NativeCallArgs {
            state: &self.vm,
            io: &mut io,
            raised: None,
        };
        match callback {
            Some(callback) => callback(&mut args),
            None => args.raise_standard(
                StandardException::RuntimeError,
                Severity::Fatal,
                &format!("native function has no binding: {}", function.signature()),
            ),
        }
        let raised = args.raised.take();

        let _shared = self.vm.gc_lock.read();
        let mut st = self.shared.state.lock();
        st.io_registers = io;
        {
            let mut heap = self.vm.heap.lock();
            for value in st.io_registers {
                heap.attach_value(value);
            }
        }

        match raised {
            Some((value, severity)) => raise(&self.vm, &mut st, value, severity),
            None => {
                // No exception: pop the native call's dummy frame.
                st.frames.pop();
            }
        }
    }

    /// Request cancellation. The current instruction completes, then the
    /// next `run` iteration observes the flag and marks the context aborted.
    pub fn abort(&self) {
        self.shared.abort_requested.store(true, Ordering::Release);
    }

    /// Whether the context is suspended at a `YIELD`.
    pub fn is_yielded(&self) -> bool {
        self.shared.state.lock().yielded
    }

    /// Whether the context finished by returning from its entry function.
    pub fn is_completed(&self) -> bool {
        self.shared.state.lock().completed
    }

    /// Whether the context was aborted.
    pub fn is_aborted(&self) -> bool {
        self.shared.state.lock().aborted
    }

    /// Whether an unhandled exception surfaced.
    pub fn has_exception(&self) -> bool {
        self.shared.state.lock().exception.is_some()
    }

    /// The surfaced exception value, if any.
    pub fn exception_value(&self) -> Option<Value> {
        self.shared.state.lock().exception
    }

    /// Read an I/O register.
    pub fn get_io_register(&self, index: usize) -> VmResult<Value> {
        if index >= IO_REGISTER_COUNT {
            return Err(VmError::IndexOutOfRange {
                index,
                limit: IO_REGISTER_COUNT,
            });
        }
        Ok(self.shared.state.lock().io_registers[index])
    }

    /// Write an I/O register. The stored value becomes rooted by the
    /// context.
    pub fn set_io_register(&self, index: usize, value: Value) -> VmResult<()> {
        if index >= IO_REGISTER_COUNT {
            return Err(VmError::IndexOutOfRange {
                index,
                limit: IO_REGISTER_COUNT,
            });
        }
        let _shared = self.vm.gc_lock.read();
        self.shared.state.lock().io_registers[index] = value;
        self.vm.heap.lock().attach_value(value);
        Ok(())
    }

    /// Depth of the current frame's value stack.
    pub fn value_stack_depth(&self) -> usize {
        self.shared
            .state
            .lock()
            .frames
            .last()
            .map(|frame| frame.stack.len())
            .unwrap_or(0)
    }

    /// Number of frames on the frame stack.
    pub fn frame_depth(&self) -> usize {
        self.shared.state.lock().frames.len()
    }

    /// Walk the frame stack from top to bottom, handing the callback one
    /// [`FrameInfo`] per frame.
    pub fn resolve_frame_stack(&self, mut callback: impl FnMut(&FrameInfo)) {
        let st = self.shared.state.lock();
        for frame in st.frames.iter().rev() {
            let info = FrameInfo {
                signature: Arc::clone(frame.function.signature()),
                is_native: frame.function.is_native(),
                bytecode_offset: frame.decoder.op_offset as u32,
            };
            callback(&info);
        }
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        self.vm.executions.lock().remove(&self.id);
    }
}

/// Raise an exception value on an execution context.
///
/// Normal severity walks the current function's guarded blocks for the
/// current PC, scanning handlers in declaration order; on a match the
/// decoder jumps to the handler offset, the value is pushed onto the
/// handling frame's stack, and the exception clears. A frame with no match
/// is popped and the raise re-enters the caller. Fatal severity bypasses
/// every handler and surfaces immediately, retaining the frame stack for
/// host inspection.
pub(crate) fn raise(vm: &VmState, st: &mut ExecState, value: Value, severity: Severity) {
    let type_name: Option<Arc<XString>> = match value.gc_ref() {
        Some(r) if value.is_object() => vm
            .heap
            .lock()
            .object(r)
            .map(|instance| Arc::clone(instance.schema().type_name())),
        _ => None,
    };

    if severity == Severity::Fatal {
        vm.heap.lock().attach_value(value);
        st.exception = Some(value);
        return;
    }

    loop {
        let Some(current) = st.frames.last_mut() else {
            // The frame stack emptied without a match; surface the value.
            vm.heap.lock().attach_value(value);
            st.exception = Some(value);
            return;
        };

        let pc = current.decoder.op_offset as u32;
        for block in current.function.guarded_blocks_cloned() {
            if !block.contains(pc) {
                continue;
            }
            for handler in &block.handlers {
                let matched = match (&handler.type_name, &type_name) {
                    (None, _) => true,
                    (Some(expected), Some(actual)) => expected == actual,
                    (Some(_), None) => false,
                };
                if !matched {
                    continue;
                }
                // Matched: jump to the handler with the value on the stack.
                current.decoder.set_offset(handler.handler_offset as usize);
                if current.push(value).is_ok() {
                    vm.heap.lock().attach_value(value);
                }
                return;
            }
        }

        st.frames.pop();
    }
}

pub(crate) fn raise_fault(vm: &VmState, st: &mut ExecState, fault: ScriptFault) {
    let value = vm.make_standard_exception(fault.kind, &fault.message, true);
    raise(vm, st, value, fault.severity);
}
