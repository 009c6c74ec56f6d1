//! Activation frames and the instruction decoder

use crate::error::{VmError, VmResult};
use crate::exec::{FRAME_STACK_CAPACITY, GP_REGISTER_COUNT};
use crate::function::Function;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use xenon_bytecode::ByteOrder;
use xenon_core::{Value, XString};

/// Reads opcode bytes and operands from a code buffer in the owning
/// program's byte order.
pub(crate) struct Decoder {
    code: Arc<[u8]>,
    byte_order: ByteOrder,
    ip: usize,
    /// Offset of the instruction currently being executed; guarded-block
    /// matching and PC-relative branches use this as the PC.
    pub(crate) op_offset: usize,
}

impl Decoder {
    pub(crate) fn new(code: Arc<[u8]>, byte_order: ByteOrder, start: usize) -> Self {
        Self {
            code,
            byte_order,
            ip: start,
            op_offset: start,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            code: Arc::new([]),
            byte_order: ByteOrder::native(),
            ip: 0,
            op_offset: 0,
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.ip
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.ip = offset;
    }

    pub(crate) fn begin_instruction(&mut self) {
        self.op_offset = self.ip;
    }

    pub(crate) fn read_u8(&mut self) -> VmResult<u8> {
        let byte = *self.code.get(self.ip).ok_or(VmError::StreamEnd)?;
        self.ip += 1;
        Ok(byte)
    }

    pub(crate) fn read_u32(&mut self) -> VmResult<u32> {
        let end = self.ip + 4;
        let bytes: [u8; 4] = self
            .code
            .get(self.ip..end)
            .ok_or(VmError::StreamEnd)?
            .try_into()
            .expect("slice of length 4");
        self.ip = end;
        Ok(match self.byte_order {
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
        })
    }

    pub(crate) fn read_i32(&mut self) -> VmResult<i32> {
        Ok(self.read_u32()? as i32)
    }
}

/// Activation record for one in-flight call.
///
/// Script frames carry a bounded value stack, the fixed general-purpose
/// register file, and locals deep-copied from the function's prototype
/// table. Native calls push a dummy frame with no execution state so the
/// frame stack still resolves through them.
pub(crate) struct Frame {
    pub(crate) function: Arc<Function>,
    pub(crate) stack: Vec<Value>,
    pub(crate) registers: Vec<Value>,
    pub(crate) locals: FxHashMap<Arc<XString>, Value>,
    pub(crate) decoder: Decoder,
}

impl Frame {
    /// Build a frame for a script function. Returns `None` for native and
    /// built-in functions.
    pub(crate) fn new_script(function: &Arc<Function>) -> Option<Frame> {
        let parts = function.script()?;

        let mut locals = FxHashMap::default();
        for (name, value) in parts.locals {
            locals.insert(Arc::clone(name), *value);
        }

        Some(Frame {
            function: Arc::clone(function),
            stack: Vec::new(),
            registers: vec![Value::Null; GP_REGISTER_COUNT],
            locals,
            decoder: Decoder::new(
                Arc::clone(parts.code),
                parts.byte_order,
                parts.offset_start as usize,
            ),
        })
    }

    /// Build the dummy frame pushed for a native call.
    pub(crate) fn new_native(function: &Arc<Function>) -> Frame {
        Frame {
            function: Arc::clone(function),
            stack: Vec::new(),
            registers: Vec::new(),
            locals: FxHashMap::default(),
            decoder: Decoder::empty(),
        }
    }

    pub(crate) fn get_register(&self, index: u32) -> VmResult<Value> {
        self.registers
            .get(index as usize)
            .copied()
            .ok_or(VmError::IndexOutOfRange {
                index: index as usize,
                limit: self.registers.len(),
            })
    }

    pub(crate) fn set_register(&mut self, index: u32, value: Value) -> VmResult<()> {
        let limit = self.registers.len();
        let slot = self
            .registers
            .get_mut(index as usize)
            .ok_or(VmError::IndexOutOfRange {
                index: index as usize,
                limit,
            })?;
        *slot = value;
        Ok(())
    }

    pub(crate) fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= FRAME_STACK_CAPACITY {
            return Err(VmError::IndexOutOfRange {
                index: self.stack.len(),
                limit: FRAME_STACK_CAPACITY,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }
}
