//! VM facade
//!
//! Process-wide container for the registries, the GC state, and the GC
//! thread. Lock discipline: the coordination lock `gc_lock` is held shared
//! by the interpreter for each executed instruction and exclusively by the
//! GC step and the program loader. Heap mutations go through the `heap`
//! mutex. Any path that locks both an execution context and the heap must
//! hold `gc_lock` (shared suffices); the GC step is the only path allowed to
//! lock the heap before an execution context, which it does under the
//! exclusive lock.

mod embedded;

pub use embedded::{StandardException, EXCEPTION_TYPE_PREFIX};
pub(crate) use embedded::MESSAGE_MEMBER_INDEX;

use crate::error::{VmError, VmResult};
use crate::exec::ExecShared;
use crate::function::Function;
use crate::program::Program;
use crate::report::{DependencyFn, MessageFn, MessageKind, Report};
use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use xenon_core::{
    Collector, GcHeap, GcObject, GcStats, Marker, ObjectInstance, ObjectSchema, StringTable,
    Value, XString, DEFAULT_MAX_ITERATIONS,
};

/// Milliseconds between GC thread wakeups.
const GC_WAIT_TIME_MS: u64 = 50;

/// Configuration for [`Vm::create`].
#[derive(Clone)]
pub struct VmInit {
    /// Host message callback.
    pub on_message: Option<MessageFn>,
    /// Minimum message level reported to the host.
    pub report_level: MessageKind,
    /// Host callback invoked for each unresolved dependency after a load.
    pub on_dependency_request: Option<DependencyFn>,
    /// Work budget of one GC step; zero means unbounded steps.
    pub gc_max_iteration_count: usize,
}

impl Default for VmInit {
    fn default() -> Self {
        Self {
            on_message: None,
            report_level: MessageKind::Warning,
            on_dependency_request: None,
            gc_max_iteration_count: DEFAULT_MAX_ITERATIONS,
        }
    }
}

pub(crate) struct VmState {
    pub(crate) report: Report,
    pub(crate) on_dependency_request: Option<DependencyFn>,
    pub(crate) strings: StringTable,

    pub(crate) gc_lock: RwLock<()>,
    pub(crate) heap: Mutex<GcHeap>,
    pub(crate) collector: Mutex<Collector>,

    pub(crate) programs: RwLock<FxHashMap<Arc<XString>, Arc<Program>>>,
    pub(crate) functions: RwLock<FxHashMap<Arc<XString>, Arc<Function>>>,
    pub(crate) globals: RwLock<FxHashMap<Arc<XString>, Value>>,
    pub(crate) schemas: RwLock<FxHashMap<Arc<XString>, Arc<ObjectSchema>>>,
    pub(crate) embedded_exceptions: Vec<(StandardException, Arc<ObjectSchema>)>,

    pub(crate) executions: Mutex<FxHashMap<u64, Arc<ExecShared>>>,
    pub(crate) next_execution_id: AtomicU64,

    shutting_down: AtomicBool,
    gc_signal_lock: Mutex<()>,
    gc_signal: Condvar,
}

impl VmState {
    pub(crate) fn intern(&self, text: &str) -> Arc<XString> {
        self.strings.intern(text)
    }

    pub(crate) fn embedded_schema(&self, kind: StandardException) -> &Arc<ObjectSchema> {
        &self
            .embedded_exceptions
            .iter()
            .find(|(k, _)| *k == kind)
            .expect("embedded exception schemas are installed at creation")
            .1
    }

    /// Allocate a string value. The new value is auto-marked until attached.
    pub(crate) fn alloc_string(&self, text: &str) -> Value {
        let interned = self.strings.intern(text);
        Value::String(self.heap.lock().alloc(GcObject::Str(interned)))
    }

    /// Allocate an array of nulls. Auto-marked until attached.
    pub(crate) fn alloc_array(&self, length: usize) -> Value {
        Value::Array(
            self.heap
                .lock()
                .alloc(GcObject::Array(vec![Value::Null; length])),
        )
    }

    /// Allocate an object instance. Auto-marked until attached.
    pub(crate) fn alloc_object(&self, schema: &Arc<ObjectSchema>) -> Value {
        Value::Object(
            self.heap
                .lock()
                .alloc(GcObject::Object(ObjectInstance::new(Arc::clone(schema)))),
        )
    }

    /// Read the content of a string value.
    pub(crate) fn string_content(&self, value: Value) -> Option<Arc<XString>> {
        let r = value.gc_ref()?;
        self.heap.lock().string(r).cloned()
    }

    /// Build a standard exception instance with `_message` set. The message
    /// string is owned by the instance; the instance itself stays auto-marked
    /// when `keep_auto_mark` is set, which callers use to keep the value
    /// rooted until it is attached to an execution context.
    pub(crate) fn make_standard_exception(
        &self,
        kind: StandardException,
        message: &str,
        keep_auto_mark: bool,
    ) -> Value {
        let schema = Arc::clone(self.embedded_schema(kind));
        let interned = self.strings.intern(message);

        let mut heap = self.heap.lock();
        let message_ref = heap.alloc(GcObject::Str(interned));
        heap.set_auto_mark(message_ref, false);

        let mut instance = ObjectInstance::new(schema);
        instance.set_member(MESSAGE_MEMBER_INDEX, Value::String(message_ref));
        let object_ref = heap.alloc(GcObject::Object(instance));
        if !keep_auto_mark {
            heap.set_auto_mark(object_ref, false);
        }
        Value::Object(object_ref)
    }

    /// Enumerate every root into the marker: registered globals, program
    /// constants, and the live state of every execution context. Auto-marked
    /// objects are handled by the collector itself.
    ///
    /// Called from the collector while the heap mutex is held; must not
    /// re-lock the heap.
    pub(crate) fn trace_roots(&self, marker: &mut Marker<'_>) {
        for value in self.globals.read().values() {
            marker.mark_value(*value);
        }

        for program in self.programs.read().values() {
            for value in program.constants.iter() {
                marker.mark_value(*value);
            }
        }

        let executions: Vec<Arc<ExecShared>> =
            self.executions.lock().values().cloned().collect();
        for execution in executions {
            let state = execution.state.lock();
            for value in state.io_registers {
                marker.mark_value(value);
            }
            if let Some(value) = state.exception {
                marker.mark_value(value);
            }
            for frame in &state.frames {
                for value in &frame.stack {
                    marker.mark_value(*value);
                }
                for value in &frame.registers {
                    marker.mark_value(*value);
                }
                for value in frame.locals.values() {
                    marker.mark_value(*value);
                }
            }
        }
    }

    fn gc_thread_main(state: Arc<VmState>) {
        // Wake on an interval, run one bounded step under the exclusive
        // lock, and otherwise stay out of the interpreter's way.
        loop {
            {
                let mut guard = state.gc_signal_lock.lock();
                state
                    .gc_signal
                    .wait_for(&mut guard, Duration::from_millis(GC_WAIT_TIME_MS));
            }
            if state.shutting_down.load(Ordering::Acquire) {
                break;
            }

            let _exclusive = state.gc_lock.write();
            let mut heap = state.heap.lock();
            let mut collector = state.collector.lock();
            collector.step(&mut heap, &mut |marker| state.trace_roots(marker));
        }
    }
}

/// The virtual machine handle.
///
/// Dropping the handle flags shutdown, joins the GC thread, and releases the
/// registries.
pub struct Vm {
    pub(crate) state: Arc<VmState>,
    gc_thread: Option<JoinHandle<()>>,
}

impl Vm {
    /// Create a VM: install the built-in functions and the embedded
    /// exception schemas, then start the GC thread.
    pub fn create(init: VmInit) -> Vm {
        let strings = StringTable::new();
        let embedded_exceptions = embedded::build_embedded_schemas(&strings);

        let state = Arc::new(VmState {
            report: Report::new(init.on_message, init.report_level),
            on_dependency_request: init.on_dependency_request,
            strings,
            gc_lock: RwLock::new(()),
            heap: Mutex::new(GcHeap::new()),
            collector: Mutex::new(Collector::new(init.gc_max_iteration_count)),
            programs: RwLock::new(FxHashMap::default()),
            functions: RwLock::new(FxHashMap::default()),
            globals: RwLock::new(FxHashMap::default()),
            schemas: RwLock::new(FxHashMap::default()),
            embedded_exceptions,
            executions: Mutex::new(FxHashMap::default()),
            next_execution_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            gc_signal_lock: Mutex::new(()),
            gc_signal: Condvar::new(),
        });

        crate::builtins::install(&state);

        let thread_state = Arc::clone(&state);
        let gc_thread = std::thread::Builder::new()
            .name("xenon-gc".to_owned())
            .spawn(move || VmState::gc_thread_main(thread_state))
            .expect("spawn GC thread");

        Vm {
            state,
            gc_thread: Some(gc_thread),
        }
    }

    /// Intern a string in the VM string table. Guarded-block handler type
    /// names and registry keys are interned strings.
    pub fn intern_string(&self, text: &str) -> Arc<XString> {
        self.state.intern(text)
    }

    /// Look up a loaded program by name.
    pub fn get_program(&self, name: &str) -> VmResult<Arc<Program>> {
        let key = self.state.intern(name);
        self.state
            .programs
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| VmError::KeyDoesNotExist(name.to_owned()))
    }

    /// Every loaded program, in no particular order.
    pub fn programs(&self) -> Vec<Arc<Program>> {
        self.state.programs.read().values().cloned().collect()
    }

    /// Look up a function by signature.
    pub fn get_function(&self, signature: &str) -> VmResult<Arc<Function>> {
        let key = self.state.intern(signature);
        self.state
            .functions
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| VmError::KeyDoesNotExist(signature.to_owned()))
    }

    /// Read a global variable.
    pub fn get_global(&self, name: &str) -> VmResult<Value> {
        let key = self.state.intern(name);
        self.state
            .globals
            .read()
            .get(&key)
            .copied()
            .ok_or_else(|| VmError::KeyDoesNotExist(name.to_owned()))
    }

    /// Overwrite an existing global variable.
    pub fn set_global(&self, name: &str, value: Value) -> VmResult<()> {
        let key = self.state.intern(name);
        {
            let mut globals = self.state.globals.write();
            let slot = globals
                .get_mut(&key)
                .ok_or_else(|| VmError::KeyDoesNotExist(name.to_owned()))?;
            *slot = value;
        }
        self.state.heap.lock().attach_value(value);
        Ok(())
    }

    /// Look up a registered object schema by type name.
    pub fn get_object_schema(&self, type_name: &str) -> VmResult<Arc<ObjectSchema>> {
        let key = self.state.intern(type_name);
        self.state
            .schemas
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| VmError::KeyDoesNotExist(type_name.to_owned()))
    }

    /// Create a string value. The value is auto-marked until attached to a
    /// durable root.
    pub fn create_string(&self, text: &str) -> Value {
        self.state.alloc_string(text)
    }

    /// Create an array value of the given length, filled with nulls.
    pub fn create_array(&self, length: usize) -> Value {
        self.state.alloc_array(length)
    }

    /// Create an object instance of a schema.
    pub fn create_object(&self, schema: &Arc<ObjectSchema>) -> Value {
        self.state.alloc_object(schema)
    }

    /// Shallow copy: primitives copy by value, composites alias the referent.
    pub fn copy_value(&self, value: Value) -> Value {
        value
    }

    /// Release the caller's root on a value by clearing its auto-mark flag.
    pub fn abandon(&self, value: Value) {
        if let Some(r) = value.gc_ref() {
            self.state.heap.lock().set_auto_mark(r, false);
        }
    }

    /// Toggle the auto-mark (auto-root) flag of a composite value.
    pub fn set_auto_mark(&self, value: Value, auto_mark: bool) {
        if let Some(r) = value.gc_ref() {
            self.state.heap.lock().set_auto_mark(r, auto_mark);
        }
    }

    /// Read the content of a string value.
    pub fn string_content(&self, value: Value) -> Option<Arc<XString>> {
        self.state.string_content(value)
    }

    /// Length of an array value.
    pub fn array_length(&self, value: Value) -> Option<usize> {
        let r = value.gc_ref()?;
        self.state.heap.lock().array(r).map(Vec::len)
    }

    /// Read an array element.
    pub fn array_get(&self, value: Value, index: usize) -> VmResult<Value> {
        let r = value
            .gc_ref()
            .ok_or_else(|| VmError::InvalidType("value is not an array".to_owned()))?;
        let heap = self.state.heap.lock();
        let array = heap
            .array(r)
            .ok_or_else(|| VmError::InvalidType("value is not an array".to_owned()))?;
        array.get(index).copied().ok_or(VmError::IndexOutOfRange {
            index,
            limit: array.len(),
        })
    }

    /// Write an array element. The stored value becomes rooted by the array.
    pub fn array_set(&self, value: Value, index: usize, element: Value) -> VmResult<()> {
        let r = value
            .gc_ref()
            .ok_or_else(|| VmError::InvalidType("value is not an array".to_owned()))?;
        let mut heap = self.state.heap.lock();
        let array = heap
            .array_mut(r)
            .ok_or_else(|| VmError::InvalidType("value is not an array".to_owned()))?;
        let limit = array.len();
        let slot = array
            .get_mut(index)
            .ok_or(VmError::IndexOutOfRange { index, limit })?;
        *slot = element;
        heap.attach_value(element);
        Ok(())
    }

    /// Read an object member by binding index.
    pub fn object_member(&self, value: Value, index: u32) -> VmResult<Value> {
        let r = value
            .gc_ref()
            .ok_or_else(|| VmError::InvalidType("value is not an object".to_owned()))?;
        let heap = self.state.heap.lock();
        let instance = heap
            .object(r)
            .ok_or_else(|| VmError::InvalidType("value is not an object".to_owned()))?;
        instance.member(index).ok_or(VmError::IndexOutOfRange {
            index: index as usize,
            limit: instance.members().len(),
        })
    }

    /// Write an object member by binding index.
    pub fn set_object_member(&self, value: Value, index: u32, member: Value) -> VmResult<()> {
        let r = value
            .gc_ref()
            .ok_or_else(|| VmError::InvalidType("value is not an object".to_owned()))?;
        let mut heap = self.state.heap.lock();
        let instance = heap
            .object_mut(r)
            .ok_or_else(|| VmError::InvalidType("value is not an object".to_owned()))?;
        let limit = instance.members().len();
        if !instance.set_member(index, member) {
            return Err(VmError::IndexOutOfRange {
                index: index as usize,
                limit,
            });
        }
        heap.attach_value(member);
        Ok(())
    }

    /// The schema of an object value.
    pub fn object_schema_of(&self, value: Value) -> Option<Arc<ObjectSchema>> {
        let r = value.gc_ref()?;
        self.state.heap.lock().object(r).map(|o| Arc::clone(o.schema()))
    }

    /// Allocate an instance of a standard exception schema with `_message`
    /// set. Returned with auto-mark cleared; callers typically raise it
    /// immediately, which roots it on the raising execution.
    pub fn create_standard_exception(&self, kind: StandardException, message: &str) -> Value {
        self.state.make_standard_exception(kind, message, false)
    }

    /// Run garbage collection to a cycle boundary. Blocks script execution
    /// for the duration.
    pub fn collect_garbage(&self) {
        let state = Arc::clone(&self.state);
        let _exclusive = self.state.gc_lock.write();
        let mut heap = self.state.heap.lock();
        let mut collector = self.state.collector.lock();
        collector.collect_full(&mut heap, &mut |marker| state.trace_roots(marker));
    }

    /// Number of live GC-tracked objects.
    pub fn live_object_count(&self) -> usize {
        self.state.heap.lock().live_count()
    }

    /// Collector statistics.
    pub fn gc_stats(&self) -> GcStats {
        self.state.collector.lock().stats()
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        self.state.shutting_down.store(true, Ordering::Release);
        self.state.gc_signal.notify_all();
        if let Some(handle) = self.gc_thread.take() {
            if handle.join().is_err() {
                self.state
                    .report
                    .error("garbage collection thread exited abnormally");
            }
        }
    }
}
