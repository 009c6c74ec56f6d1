//! Bytecode disassembler
//!
//! Walks a script function's bytecode range and hands the callback one
//! rendered line per instruction, with constant operands previewed from the
//! owning program's constant table.

use crate::error::{VmError, VmResult};
use crate::exec::frame::Decoder;
use crate::function::Function;
use crate::vm::Vm;
use std::sync::Arc;
use xenon_bytecode::Opcode;
use xenon_core::Value;

impl Vm {
    /// Disassemble a script function, invoking `callback` with each
    /// instruction's bytecode offset and rendered text. Fails with
    /// `InvalidArg` for native and built-in functions.
    pub fn disassemble_function(
        &self,
        function: &Arc<Function>,
        callback: &mut dyn FnMut(usize, &str),
    ) -> VmResult<()> {
        let parts = function.script().ok_or_else(|| {
            VmError::InvalidArg(format!(
                "cannot disassemble a native function: {}",
                function.signature()
            ))
        })?;

        let constants = Arc::clone(parts.constants);
        let end = parts.offset_end as usize;
        let mut decoder = Decoder::new(
            Arc::clone(parts.code),
            parts.byte_order,
            parts.offset_start as usize,
        );

        while decoder.offset() < end {
            let offset = decoder.offset();
            decoder.begin_instruction();

            let byte = decoder.read_u8()?;
            let opcode = Opcode::from_u8(byte).ok_or_else(|| {
                VmError::Mismatch(format!("invalid opcode {byte:#04x} at offset {offset:#x}"))
            })?;

            let line = match opcode {
                Opcode::Nop | Opcode::Return | Opcode::Yield => opcode.mnemonic().to_owned(),

                Opcode::Call => {
                    let c = decoder.read_u32()?;
                    format!("{} c{} {}", opcode.mnemonic(), c, self.preview(&constants, c))
                }

                Opcode::LoadConstant
                | Opcode::LoadGlobal
                | Opcode::LoadLocal
                | Opcode::PullGlobal
                | Opcode::InitObject => {
                    let r = decoder.read_u32()?;
                    let c = decoder.read_u32()?;
                    format!(
                        "{} r{}, c{} {}",
                        opcode.mnemonic(),
                        r,
                        c,
                        self.preview(&constants, c)
                    )
                }

                Opcode::LoadParam => {
                    let r = decoder.read_u32()?;
                    let p = decoder.read_u32()?;
                    format!("{} r{}, p{}", opcode.mnemonic(), r, p)
                }

                Opcode::StoreGlobal | Opcode::StoreLocal => {
                    let c = decoder.read_u32()?;
                    let r = decoder.read_u32()?;
                    format!(
                        "{} c{}, r{} {}",
                        opcode.mnemonic(),
                        c,
                        r,
                        self.preview(&constants, c)
                    )
                }

                Opcode::StoreParam => {
                    let p = decoder.read_u32()?;
                    let r = decoder.read_u32()?;
                    format!("{} p{}, r{}", opcode.mnemonic(), p, r)
                }

                Opcode::Push | Opcode::Pop => {
                    let r = decoder.read_u32()?;
                    format!("{} r{}", opcode.mnemonic(), r)
                }

                Opcode::Branch => {
                    let relative = decoder.read_i32()?;
                    format!("{} {relative:+}", opcode.mnemonic())
                }

                Opcode::BranchIfTrue | Opcode::BranchIfFalse => {
                    let r = decoder.read_u32()?;
                    let relative = decoder.read_i32()?;
                    format!("{} r{}, {relative:+}", opcode.mnemonic(), r)
                }
            };

            callback(offset, &line);
        }

        Ok(())
    }

    fn preview(&self, constants: &[Value], index: u32) -> String {
        match constants.get(index as usize) {
            None => "<invalid constant>".to_owned(),
            Some(Value::String(r)) => self
                .state
                .heap
                .lock()
                .string(*r)
                .map(|s| format!("{:?}", s.as_str()))
                .unwrap_or_else(|| "<released string>".to_owned()),
            Some(value) => value.to_string(),
        }
    }
}
