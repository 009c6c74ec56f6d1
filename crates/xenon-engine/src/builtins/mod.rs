//! Built-in operations
//!
//! Native callbacks registered at VM creation under fixed signatures:
//! arithmetic per primitive type, casts between every primitive pair,
//! string concatenation, and array length. Scripts reach them through
//! `CALL` on the signature constant, exchanging operands via the I/O
//! registers.

mod arithmetic;
mod cast;
mod misc;

use crate::function::{Function, NativeFn};
use crate::native::NativeCallArgs;
use crate::vm::VmState;
use std::sync::Arc;

pub(crate) struct Registry<'a> {
    state: &'a Arc<VmState>,
}

impl Registry<'_> {
    pub(crate) fn add(
        &self,
        signature: &str,
        num_params: u16,
        num_returns: u16,
        callback: impl Fn(&mut NativeCallArgs<'_>) + Send + Sync + 'static,
    ) {
        let signature = self.state.intern(signature);
        let callback: NativeFn = Arc::new(callback);
        let function = Arc::new(Function::new_builtin(
            Arc::clone(&signature),
            callback,
            num_params,
            num_returns,
        ));
        self.state.functions.write().insert(signature, function);
    }
}

pub(crate) fn install(state: &Arc<VmState>) {
    let registry = Registry { state };
    arithmetic::install(&registry);
    cast::install(&registry);
    misc::install(&registry);
}
