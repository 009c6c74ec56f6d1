//! Guarded-block exception handling: handler matching at the raising PC,
//! frame unwinding into callers, catch-all handlers, and the fatal-severity
//! bypass.

use xenon_bytecode::{ByteOrder, BytecodeWriter, ProgramWriter};
use xenon_core::Value;
use xenon_engine::{
    ExceptionHandler, Execution, GuardedBlock, RunMode, Vm, VmInit,
};

const DIV_INT32: &str = "int32 Xenon.Builtin.DivInt32(int32, int32)";
const DIVIDE_BY_ZERO: &str = "Xenon.System.Exception.DivideByZeroError";
const RUNTIME_ERROR: &str = "Xenon.System.Exception.RuntimeError";

fn vm() -> Vm {
    Vm::create(VmInit::default())
}

/// Main body: a guarded divide that traps, then a handler block that pops
/// the caught exception into r0 and exports it through p2.
///
/// Layout (offsets):
///   0  CALL div          <- protected
///   5  RETURN            <- end of protected range
///   6  POP r0            <- handler target
///   11 STORE_PARAM p2, r0
///   20 RETURN
fn guarded_divide_program() -> (ProgramWriter, u32, u32) {
    let mut writer = ProgramWriter::new();
    let c_div = writer.add_constant_string(DIV_INT32);

    let mut body = BytecodeWriter::new(ByteOrder::LittleEndian);
    body.emit_call(c_div);
    let protected_end = body.offset() as u32;
    body.emit_return();
    let handler_offset = body.offset() as u32;
    body.emit_pop(0);
    body.emit_store_param(2, 0);
    body.emit_return();

    writer
        .add_function("void Program.Main()", &body.into_bytes(), 0, 0)
        .unwrap();
    (writer, protected_end, handler_offset)
}

#[test]
fn test_matching_handler_catches() {
    let (writer, protected_end, handler_offset) = guarded_divide_program();
    let vm = vm();
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    let main = vm.get_function("void Program.Main()").unwrap();
    main.add_guarded_block(GuardedBlock {
        offset_start: 0,
        offset_end: protected_end,
        handlers: vec![ExceptionHandler {
            type_name: Some(vm.intern_string(DIVIDE_BY_ZERO)),
            handler_offset,
        }],
    })
    .unwrap();

    let exec = Execution::create(&vm, &main).unwrap();
    exec.set_io_register(0, Value::Int32(10)).unwrap();
    exec.set_io_register(1, Value::Int32(0)).unwrap();
    exec.run(RunMode::Continuous).unwrap();

    // Caught: the exception flag clears and the handler ran to completion.
    assert!(!exec.has_exception());
    assert!(exec.is_completed());

    let caught = exec.get_io_register(2).unwrap();
    let schema = vm.object_schema_of(caught).unwrap();
    assert_eq!(schema.type_name().as_str(), DIVIDE_BY_ZERO);
}

#[test]
fn test_non_matching_handler_does_not_catch() {
    let (writer, protected_end, handler_offset) = guarded_divide_program();
    let vm = vm();
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    let main = vm.get_function("void Program.Main()").unwrap();
    main.add_guarded_block(GuardedBlock {
        offset_start: 0,
        offset_end: protected_end,
        handlers: vec![ExceptionHandler {
            type_name: Some(vm.intern_string(RUNTIME_ERROR)),
            handler_offset,
        }],
    })
    .unwrap();

    let exec = Execution::create(&vm, &main).unwrap();
    exec.set_io_register(0, Value::Int32(10)).unwrap();
    exec.set_io_register(1, Value::Int32(0)).unwrap();
    exec.run(RunMode::Continuous).unwrap();

    // The only frame had no matching handler; the raise surfaced.
    assert!(exec.has_exception());
    assert!(!exec.is_completed());
    let value = exec.exception_value().unwrap();
    let schema = vm.object_schema_of(value).unwrap();
    assert_eq!(schema.type_name().as_str(), DIVIDE_BY_ZERO);
}

#[test]
fn test_catch_all_handler() {
    let (writer, protected_end, handler_offset) = guarded_divide_program();
    let vm = vm();
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    let main = vm.get_function("void Program.Main()").unwrap();
    main.add_guarded_block(GuardedBlock {
        offset_start: 0,
        offset_end: protected_end,
        handlers: vec![ExceptionHandler {
            type_name: None,
            handler_offset,
        }],
    })
    .unwrap();

    let exec = Execution::create(&vm, &main).unwrap();
    exec.set_io_register(0, Value::Int32(1)).unwrap();
    exec.set_io_register(1, Value::Int32(0)).unwrap();
    exec.run(RunMode::Continuous).unwrap();

    assert!(!exec.has_exception());
    assert!(exec.is_completed());
}

#[test]
fn test_handlers_scan_in_declaration_order() {
    let (writer, protected_end, handler_offset) = guarded_divide_program();
    let vm = vm();
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    // A non-matching handler first, then the matching one.
    let main = vm.get_function("void Program.Main()").unwrap();
    main.add_guarded_block(GuardedBlock {
        offset_start: 0,
        offset_end: protected_end,
        handlers: vec![
            ExceptionHandler {
                type_name: Some(vm.intern_string(RUNTIME_ERROR)),
                handler_offset: 0, // would re-enter the divide if taken
            },
            ExceptionHandler {
                type_name: Some(vm.intern_string(DIVIDE_BY_ZERO)),
                handler_offset,
            },
        ],
    })
    .unwrap();

    let exec = Execution::create(&vm, &main).unwrap();
    exec.set_io_register(0, Value::Int32(1)).unwrap();
    exec.set_io_register(1, Value::Int32(0)).unwrap();
    exec.run(RunMode::Continuous).unwrap();

    assert!(exec.is_completed());
    assert!(!exec.has_exception());
}

#[test]
fn test_unwinding_pops_to_caller() {
    // Main guards its call to Sub with a catch-all; Sub performs the
    // failing divide with no handlers of its own.
    let mut writer = ProgramWriter::new();
    let c_div = writer.add_constant_string(DIV_INT32);
    let c_sub = writer.add_constant_string("void Program.Sub()");
    let c_flag = writer.add_constant_int32(77);

    let mut main_body = BytecodeWriter::new(ByteOrder::LittleEndian);
    main_body.emit_call(c_sub);
    let main_protected_end = main_body.offset() as u32;
    main_body.emit_return();
    let main_handler = main_body.offset() as u32;
    main_body.emit_pop(0);
    main_body.emit_load_constant(1, c_flag);
    main_body.emit_store_param(3, 1);
    main_body.emit_return();
    writer
        .add_function("void Program.Main()", &main_body.into_bytes(), 0, 0)
        .unwrap();

    let mut sub_body = BytecodeWriter::new(ByteOrder::LittleEndian);
    sub_body.emit_call(c_div);
    sub_body.emit_return();
    writer
        .add_function("void Program.Sub()", &sub_body.into_bytes(), 0, 0)
        .unwrap();

    let vm = vm();
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    let main = vm.get_function("void Program.Main()").unwrap();
    main.add_guarded_block(GuardedBlock {
        offset_start: 0,
        offset_end: main_protected_end,
        handlers: vec![ExceptionHandler {
            type_name: None,
            handler_offset: main_handler,
        }],
    })
    .unwrap();

    let exec = Execution::create(&vm, &main).unwrap();
    exec.set_io_register(0, Value::Int32(10)).unwrap();
    exec.set_io_register(1, Value::Int32(0)).unwrap();
    exec.run(RunMode::Continuous).unwrap();

    // Sub's frame was popped and Main's handler observed the raise.
    assert!(!exec.has_exception());
    assert!(exec.is_completed());
    assert_eq!(exec.get_io_register(3).unwrap(), Value::Int32(77));
}

#[test]
fn test_fatal_exception_bypasses_handlers() {
    // A LOAD_GLOBAL of an unregistered name raises a fatal RuntimeError,
    // which must ignore even a catch-all handler.
    let mut writer = ProgramWriter::new();
    let c_name = writer.add_constant_string("no.such.global");

    let mut body = BytecodeWriter::new(ByteOrder::LittleEndian);
    body.emit_load_global(0, c_name);
    let protected_end = body.offset() as u32;
    body.emit_return();
    let handler_offset = body.offset() as u32;
    body.emit_return();
    writer
        .add_function("void Program.Main()", &body.into_bytes(), 0, 0)
        .unwrap();

    let vm = vm();
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    let main = vm.get_function("void Program.Main()").unwrap();
    main.add_guarded_block(GuardedBlock {
        offset_start: 0,
        offset_end: protected_end,
        handlers: vec![ExceptionHandler {
            type_name: None,
            handler_offset,
        }],
    })
    .unwrap();

    let exec = Execution::create(&vm, &main).unwrap();
    exec.run(RunMode::Continuous).unwrap();

    assert!(exec.has_exception());
    assert!(!exec.is_completed());

    let value = exec.exception_value().unwrap();
    let schema = vm.object_schema_of(value).unwrap();
    assert_eq!(schema.type_name().as_str(), RUNTIME_ERROR);

    // The frame stack is retained for host inspection after a fatal raise.
    let mut frames = 0;
    exec.resolve_frame_stack(|_| frames += 1);
    assert_eq!(frames, 1);
}

#[test]
fn test_type_error_on_corrupt_operand() {
    // CALL through a non-string constant is corrupt bytecode: a fatal
    // TypeError that no handler may catch.
    let mut writer = ProgramWriter::new();
    let c_int = writer.add_constant_int32(5);

    let mut body = BytecodeWriter::new(ByteOrder::LittleEndian);
    body.emit_call(c_int);
    let protected_end = body.offset() as u32;
    body.emit_return();
    let handler_offset = body.offset() as u32;
    body.emit_return();
    writer
        .add_function("void Program.Main()", &body.into_bytes(), 0, 0)
        .unwrap();

    let vm = vm();
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    let main = vm.get_function("void Program.Main()").unwrap();
    main.add_guarded_block(GuardedBlock {
        offset_start: 0,
        offset_end: protected_end,
        handlers: vec![ExceptionHandler {
            type_name: None,
            handler_offset,
        }],
    })
    .unwrap();

    let exec = Execution::create(&vm, &main).unwrap();
    exec.run(RunMode::Continuous).unwrap();

    assert!(exec.has_exception());
    let value = exec.exception_value().unwrap();
    let schema = vm.object_schema_of(value).unwrap();
    assert_eq!(
        schema.type_name().as_str(),
        "Xenon.System.Exception.TypeError"
    );
}

#[test]
fn test_create_standard_exception() {
    let vm = vm();
    let value = vm.create_standard_exception(
        xenon_engine::StandardException::RuntimeError,
        "something broke",
    );

    let schema = vm.object_schema_of(value).unwrap();
    assert_eq!(schema.type_name().as_str(), RUNTIME_ERROR);

    let message = vm.object_member(value, 0).unwrap();
    assert_eq!(
        vm.string_content(message).unwrap().as_str(),
        "something broke"
    );
}
