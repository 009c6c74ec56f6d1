//! Opcode handlers
//!
//! One instruction per call: the run loop fetches the opcode byte through
//! the current frame's decoder and dispatches here. Script-visible failures
//! are reported as [`ScriptFault`]s, which the run loop converts into raised
//! standard exceptions; operand type mismatches are fatal because they
//! indicate corrupt bytecode.

use crate::error::VmError;
use crate::exec::frame::Frame;
use crate::exec::{ExecState, Severity, IO_REGISTER_COUNT};
use crate::function::Function;
use crate::vm::{StandardException, VmState};
use std::sync::Arc;
use xenon_bytecode::Opcode;
use xenon_core::{Value, XString};

/// A script-level failure produced by an opcode handler.
pub(crate) struct ScriptFault {
    pub severity: Severity,
    pub kind: StandardException,
    pub message: String,
}

impl ScriptFault {
    fn fatal_runtime(message: String) -> Self {
        Self {
            severity: Severity::Fatal,
            kind: StandardException::RuntimeError,
            message,
        }
    }

    fn fatal_type(message: String) -> Self {
        Self {
            severity: Severity::Fatal,
            kind: StandardException::TypeError,
            message,
        }
    }

    fn runtime(message: String) -> Self {
        Self {
            severity: Severity::Normal,
            kind: StandardException::RuntimeError,
            message,
        }
    }
}

impl From<VmError> for ScriptFault {
    fn from(error: VmError) -> Self {
        ScriptFault::fatal_runtime(format!("failed to decode instruction: {error}"))
    }
}

/// Result of executing one instruction.
pub(crate) enum StepOutcome {
    /// Execution continues normally.
    Normal,
    /// A native function was called; its dummy frame is pushed and the run
    /// loop must invoke the callback with the GC read lock released.
    Native(Arc<Function>),
}

fn current_frame<'a>(st: &'a ExecState) -> Result<&'a Frame, ScriptFault> {
    st.frames
        .last()
        .ok_or_else(|| ScriptFault::fatal_runtime("no active frame".to_owned()))
}

fn current_frame_mut<'a>(st: &'a mut ExecState) -> Result<&'a mut Frame, ScriptFault> {
    st.frames
        .last_mut()
        .ok_or_else(|| ScriptFault::fatal_runtime("no active frame".to_owned()))
}

fn read_u32(st: &mut ExecState) -> Result<u32, ScriptFault> {
    Ok(current_frame_mut(st)?.decoder.read_u32()?)
}

fn read_i32(st: &mut ExecState) -> Result<i32, ScriptFault> {
    Ok(current_frame_mut(st)?.decoder.read_i32()?)
}

fn constant_value(st: &ExecState, index: u32) -> Result<Value, ScriptFault> {
    let frame = current_frame(st)?;
    let parts = frame
        .function
        .script()
        .ok_or_else(|| ScriptFault::fatal_runtime("current frame is not a script frame".to_owned()))?;
    parts
        .constants
        .get(index as usize)
        .copied()
        .ok_or_else(|| {
            ScriptFault::fatal_runtime(format!("failed to retrieve constant value: c({index})"))
        })
}

fn constant_string(
    vm: &VmState,
    st: &ExecState,
    index: u32,
) -> Result<Arc<XString>, ScriptFault> {
    let value = constant_value(st, index)?;
    if !value.is_string() {
        return Err(ScriptFault::fatal_type(format!(
            "type mismatch; expected string: c({index})"
        )));
    }
    vm.string_content(value).ok_or_else(|| {
        ScriptFault::fatal_runtime(format!("failed to retrieve constant value: c({index})"))
    })
}

fn get_register(st: &ExecState, index: u32) -> Result<Value, ScriptFault> {
    current_frame(st)?.get_register(index).map_err(|_| {
        ScriptFault::fatal_runtime(format!("failed to retrieve general-purpose register: r({index})"))
    })
}

fn set_register(
    vm: &VmState,
    st: &mut ExecState,
    index: u32,
    value: Value,
) -> Result<(), ScriptFault> {
    current_frame_mut(st)?.set_register(index, value).map_err(|_| {
        ScriptFault::fatal_runtime(format!("failed to set general-purpose register: r({index})"))
    })?;
    vm.heap.lock().attach_value(value);
    Ok(())
}

fn check_io_index(index: u32) -> Result<usize, ScriptFault> {
    let index = index as usize;
    if index >= IO_REGISTER_COUNT {
        return Err(ScriptFault::fatal_runtime(format!(
            "failed to retrieve i/o register: p({index})"
        )));
    }
    Ok(index)
}

/// Execute one instruction of the current frame.
pub(crate) fn execute_instruction(
    vm: &VmState,
    st: &mut ExecState,
) -> Result<StepOutcome, ScriptFault> {
    let opcode = {
        let frame = current_frame_mut(st)?;
        frame.decoder.begin_instruction();
        let byte = frame.decoder.read_u8()?;
        Opcode::from_u8(byte)
            .ok_or_else(|| ScriptFault::fatal_runtime(format!("invalid opcode: {byte:#04x}")))?
    };

    match opcode {
        Opcode::Nop => Ok(StepOutcome::Normal),

        Opcode::Return => {
            st.frames.pop();
            if st.frames.is_empty() {
                // The entry point was popped; execution is complete.
                st.completed = true;
            }
            Ok(StepOutcome::Normal)
        }

        Opcode::Yield => {
            st.yielded = true;
            Ok(StepOutcome::Normal)
        }

        Opcode::Call => op_call(vm, st),
        Opcode::LoadConstant => op_load_constant(vm, st),
        Opcode::LoadGlobal => op_load_global(vm, st),
        Opcode::LoadLocal => op_load_local(vm, st),
        Opcode::LoadParam => op_load_param(vm, st),
        Opcode::StoreGlobal => op_store_global(vm, st),
        Opcode::StoreLocal => op_store_local(vm, st),
        Opcode::StoreParam => op_store_param(vm, st),
        Opcode::PullGlobal => op_pull_global(vm, st),
        Opcode::Push => op_push(vm, st),
        Opcode::Pop => op_pop(vm, st),
        Opcode::InitObject => op_init_object(vm, st),
        Opcode::Branch => op_branch(st),
        Opcode::BranchIfTrue => op_branch_conditional(st, true),
        Opcode::BranchIfFalse => op_branch_conditional(st, false),
    }
}

fn op_call(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let constant_index = read_u32(st)?;
    let signature = constant_string(vm, st, constant_index)?;

    let function = vm
        .functions
        .read()
        .get(&signature)
        .cloned()
        .ok_or_else(|| ScriptFault::runtime(format!("failed to find function: {signature}")))?;

    if function.is_native() {
        // A dummy frame is pushed even for native functions so the frame
        // stack resolves through them if the callback raises.
        st.frames.push(Frame::new_native(&function));
        Ok(StepOutcome::Native(function))
    } else {
        let frame = Frame::new_script(&function).ok_or_else(|| {
            ScriptFault::fatal_runtime(format!("failed to create frame: {signature}"))
        })?;
        st.frames.push(frame);
        Ok(StepOutcome::Normal)
    }
}

fn op_load_constant(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let constant_index = read_u32(st)?;
    let value = constant_value(st, constant_index)?;
    set_register(vm, st, register_index, value)?;
    Ok(StepOutcome::Normal)
}

fn op_load_global(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let constant_index = read_u32(st)?;
    let name = constant_string(vm, st, constant_index)?;

    let value = vm.globals.read().get(&name).copied().ok_or_else(|| {
        ScriptFault::fatal_runtime(format!("failed to retrieve global variable: {name}"))
    })?;
    set_register(vm, st, register_index, value)?;
    Ok(StepOutcome::Normal)
}

fn op_load_local(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let constant_index = read_u32(st)?;
    let name = constant_string(vm, st, constant_index)?;

    let value = current_frame(st)?
        .locals
        .get(&name)
        .copied()
        .ok_or_else(|| {
            ScriptFault::fatal_runtime(format!("failed to retrieve local variable: {name}"))
        })?;
    set_register(vm, st, register_index, value)?;
    Ok(StepOutcome::Normal)
}

fn op_load_param(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let io_index = check_io_index(read_u32(st)?)?;

    let value = st.io_registers[io_index];
    set_register(vm, st, register_index, value)?;
    // The I/O register is cleared on consumption.
    st.io_registers[io_index] = Value::Null;
    Ok(StepOutcome::Normal)
}

fn op_store_global(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let constant_index = read_u32(st)?;
    let register_index = read_u32(st)?;
    let name = constant_string(vm, st, constant_index)?;
    let value = get_register(st, register_index)?;

    {
        let mut globals = vm.globals.write();
        let slot = globals.get_mut(&name).ok_or_else(|| {
            ScriptFault::fatal_runtime(format!("failed to retrieve global variable: {name}"))
        })?;
        *slot = value;
    }
    vm.heap.lock().attach_value(value);
    Ok(StepOutcome::Normal)
}

fn op_store_local(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let constant_index = read_u32(st)?;
    let register_index = read_u32(st)?;
    let name = constant_string(vm, st, constant_index)?;
    let value = get_register(st, register_index)?;

    let frame = current_frame_mut(st)?;
    let slot = frame.locals.get_mut(&name).ok_or_else(|| {
        ScriptFault::fatal_runtime(format!("failed to retrieve local variable: {name}"))
    })?;
    *slot = value;
    vm.heap.lock().attach_value(value);
    Ok(StepOutcome::Normal)
}

fn op_store_param(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let io_index = check_io_index(read_u32(st)?)?;
    let register_index = read_u32(st)?;
    let value = get_register(st, register_index)?;

    st.io_registers[io_index] = value;
    vm.heap.lock().attach_value(value);
    Ok(StepOutcome::Normal)
}

fn op_pull_global(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let constant_index = read_u32(st)?;
    let name = constant_string(vm, st, constant_index)?;

    let value = vm.globals.read().get(&name).copied().ok_or_else(|| {
        ScriptFault::fatal_runtime(format!("failed to retrieve global variable: {name}"))
    })?;
    set_register(vm, st, register_index, value)?;

    // Clear the variable after the pull.
    if let Some(slot) = vm.globals.write().get_mut(&name) {
        *slot = Value::Null;
    }
    Ok(StepOutcome::Normal)
}

fn op_push(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let value = get_register(st, register_index)?;

    current_frame_mut(st)?
        .push(value)
        .map_err(|_| ScriptFault::fatal_runtime("frame stack overflow".to_owned()))?;
    vm.heap.lock().attach_value(value);
    Ok(StepOutcome::Normal)
}

fn op_pop(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let value = current_frame_mut(st)?
        .pop()
        .ok_or_else(|| ScriptFault::fatal_runtime("frame stack underflow".to_owned()))?;
    set_register(vm, st, register_index, value)?;
    Ok(StepOutcome::Normal)
}

fn op_init_object(vm: &VmState, st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let constant_index = read_u32(st)?;
    let type_name = constant_string(vm, st, constant_index)?;

    let schema = vm
        .schemas
        .read()
        .get(&type_name)
        .cloned()
        .ok_or_else(|| {
            ScriptFault::fatal_runtime(format!("failed to find object schema: type={type_name}"))
        })?;
    let value = vm.alloc_object(&schema);
    set_register(vm, st, register_index, value)?;
    Ok(StepOutcome::Normal)
}

fn branch_to(st: &mut ExecState, relative: i32) -> Result<StepOutcome, ScriptFault> {
    let frame = current_frame_mut(st)?;
    let parts = frame
        .function
        .script()
        .ok_or_else(|| ScriptFault::fatal_runtime("current frame is not a script frame".to_owned()))?;
    let (start, end) = (parts.offset_start as i64, parts.offset_end as i64);

    let target = frame.decoder.op_offset as i64 + i64::from(relative);
    if target < start || target >= end {
        return Err(ScriptFault::fatal_runtime(format!(
            "branch target out of range: {target:#x}"
        )));
    }
    frame.decoder.set_offset(target as usize);
    Ok(StepOutcome::Normal)
}

fn op_branch(st: &mut ExecState) -> Result<StepOutcome, ScriptFault> {
    let relative = read_i32(st)?;
    branch_to(st, relative)
}

fn op_branch_conditional(st: &mut ExecState, expected: bool) -> Result<StepOutcome, ScriptFault> {
    let register_index = read_u32(st)?;
    let relative = read_i32(st)?;

    let value = get_register(st, register_index)?;
    if !value.is_bool() {
        return Err(ScriptFault::fatal_type(format!(
            "type mismatch; expected bool: r({register_index})"
        )));
    }
    if value.get_bool() == expected {
        return branch_to(st, relative);
    }
    Ok(StepOutcome::Normal)
}
