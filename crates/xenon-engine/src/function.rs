//! Function descriptors
//!
//! A function is identified by its canonical signature string and is one of
//! three kinds: script (a bytecode range in a program's code buffer), native
//! (body supplied by the host at runtime), or built-in (installed by the VM
//! at creation).

use crate::error::{VmError, VmResult};
use crate::native::NativeCallArgs;
use parking_lot::RwLock;
use std::sync::Arc;
use xenon_bytecode::ByteOrder;
use xenon_core::{Value, XString};

/// Callback type for native and built-in function bodies.
pub type NativeFn = Arc<dyn Fn(&mut NativeCallArgs<'_>) + Send + Sync>;

/// A single exception handler within a guarded block.
#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    /// Exception schema type name to match, or `None` to catch any type.
    pub type_name: Option<Arc<XString>>,
    /// Bytecode offset execution jumps to on a match.
    pub handler_offset: u32,
}

/// A protected bytecode range with its ordered handler list.
#[derive(Debug, Clone)]
pub struct GuardedBlock {
    /// Protected range start, inclusive.
    pub offset_start: u32,
    /// Protected range end, exclusive.
    pub offset_end: u32,
    /// Handlers, scanned in declaration order.
    pub handlers: Vec<ExceptionHandler>,
}

impl GuardedBlock {
    /// Whether the block protects the given bytecode offset.
    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.offset_start && offset < self.offset_end
    }
}

pub(crate) struct ScriptParts<'a> {
    pub code: &'a Arc<[u8]>,
    pub byte_order: ByteOrder,
    pub offset_start: u32,
    pub offset_end: u32,
    pub constants: &'a Arc<Vec<Value>>,
    pub locals: &'a [(Arc<XString>, Value)],
}

enum FunctionKind {
    Script {
        code: Arc<[u8]>,
        byte_order: ByteOrder,
        offset_start: u32,
        offset_end: u32,
        constants: Arc<Vec<Value>>,
        locals: Vec<(Arc<XString>, Value)>,
        guarded_blocks: RwLock<Vec<GuardedBlock>>,
    },
    Native {
        binding: RwLock<Option<NativeFn>>,
    },
    Builtin {
        callback: NativeFn,
    },
}

/// A callable routine registered with the VM.
pub struct Function {
    signature: Arc<XString>,
    num_params: u16,
    num_returns: u16,
    program_name: Option<Arc<XString>>,
    kind: FunctionKind,
}

impl Function {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_script(
        signature: Arc<XString>,
        program_name: Option<Arc<XString>>,
        code: Arc<[u8]>,
        byte_order: ByteOrder,
        offset_start: u32,
        offset_end: u32,
        constants: Arc<Vec<Value>>,
        locals: Vec<(Arc<XString>, Value)>,
        num_params: u16,
        num_returns: u16,
    ) -> Self {
        Self {
            signature,
            num_params,
            num_returns,
            program_name,
            kind: FunctionKind::Script {
                code,
                byte_order,
                offset_start,
                offset_end,
                constants,
                locals,
                guarded_blocks: RwLock::new(Vec::new()),
            },
        }
    }

    pub(crate) fn new_native(
        signature: Arc<XString>,
        program_name: Option<Arc<XString>>,
        num_params: u16,
        num_returns: u16,
    ) -> Self {
        Self {
            signature,
            num_params,
            num_returns,
            program_name,
            kind: FunctionKind::Native {
                binding: RwLock::new(None),
            },
        }
    }

    pub(crate) fn new_builtin(
        signature: Arc<XString>,
        callback: NativeFn,
        num_params: u16,
        num_returns: u16,
    ) -> Self {
        Self {
            signature,
            num_params,
            num_returns,
            program_name: None,
            kind: FunctionKind::Builtin { callback },
        }
    }

    /// The canonical signature string.
    pub fn signature(&self) -> &Arc<XString> {
        &self.signature
    }

    /// Number of parameters.
    pub fn num_params(&self) -> u16 {
        self.num_params
    }

    /// Number of return values.
    pub fn num_returns(&self) -> u16 {
        self.num_returns
    }

    /// Name of the owning program, if any. Built-ins have none.
    pub fn program_name(&self) -> Option<&Arc<XString>> {
        self.program_name.as_ref()
    }

    /// Whether the body is native code (host-bound or built-in).
    pub fn is_native(&self) -> bool {
        !matches!(self.kind, FunctionKind::Script { .. })
    }

    /// The bytecode range of a script function.
    pub fn bytecode_range(&self) -> Option<(u32, u32)> {
        match &self.kind {
            FunctionKind::Script {
                offset_start,
                offset_end,
                ..
            } => Some((*offset_start, *offset_end)),
            _ => None,
        }
    }

    /// Supply the body of a native function. Fails with `InvalidType` for
    /// script and built-in functions.
    pub fn set_native_binding(&self, callback: NativeFn) -> VmResult<()> {
        match &self.kind {
            FunctionKind::Native { binding } => {
                *binding.write() = Some(callback);
                Ok(())
            }
            _ => Err(VmError::InvalidType(format!(
                "function is not native: {}",
                self.signature
            ))),
        }
    }

    /// Whether a native function has been given a body.
    pub fn has_native_binding(&self) -> bool {
        match &self.kind {
            FunctionKind::Native { binding } => binding.read().is_some(),
            FunctionKind::Builtin { .. } => true,
            FunctionKind::Script { .. } => false,
        }
    }

    /// Attach a guarded block to a script function. Blocks are scanned in
    /// the order they were attached.
    pub fn add_guarded_block(&self, block: GuardedBlock) -> VmResult<()> {
        match &self.kind {
            FunctionKind::Script { guarded_blocks, .. } => {
                guarded_blocks.write().push(block);
                Ok(())
            }
            _ => Err(VmError::InvalidType(format!(
                "cannot guard a native function: {}",
                self.signature
            ))),
        }
    }

    pub(crate) fn guarded_blocks_cloned(&self) -> Vec<GuardedBlock> {
        match &self.kind {
            FunctionKind::Script { guarded_blocks, .. } => guarded_blocks.read().clone(),
            _ => Vec::new(),
        }
    }

    pub(crate) fn native_callback(&self) -> Option<NativeFn> {
        match &self.kind {
            FunctionKind::Native { binding } => binding.read().clone(),
            FunctionKind::Builtin { callback } => Some(Arc::clone(callback)),
            FunctionKind::Script { .. } => None,
        }
    }

    pub(crate) fn script(&self) -> Option<ScriptParts<'_>> {
        match &self.kind {
            FunctionKind::Script {
                code,
                byte_order,
                offset_start,
                offset_end,
                constants,
                locals,
                ..
            } => Some(ScriptParts {
                code,
                byte_order: *byte_order,
                offset_start: *offset_start,
                offset_end: *offset_end,
                constants,
                locals,
            }),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("signature", &self.signature)
            .field("num_params", &self.num_params)
            .field("num_returns", &self.num_returns)
            .field("is_native", &self.is_native())
            .finish()
    }
}
