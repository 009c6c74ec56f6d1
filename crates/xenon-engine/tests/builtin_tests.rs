//! Built-in operation tests: arithmetic, casts, string concatenation, and
//! array length, each driven through `CALL` on the built-in's signature.

use xenon_bytecode::{ByteOrder, BytecodeWriter, ProgramWriter};
use xenon_core::Value;
use xenon_engine::{Execution, RunMode, Vm, VmInit};

/// Build a program whose main body just calls one built-in and returns.
fn call_builtin_vm(signature: &str) -> (Vm, Execution) {
    let mut writer = ProgramWriter::new();
    let c_signature = writer.add_constant_string(signature);

    let mut body = BytecodeWriter::new(ByteOrder::LittleEndian);
    body.emit_call(c_signature);
    body.emit_return();
    writer
        .add_function("void Program.Main()", &body.into_bytes(), 0, 0)
        .unwrap();

    let vm = Vm::create(VmInit::default());
    vm.load_program("test", &writer.serialize(ByteOrder::LittleEndian))
        .unwrap();

    let entry = vm.get_function("void Program.Main()").unwrap();
    let exec = Execution::create(&vm, &entry).unwrap();
    (vm, exec)
}

#[test]
fn test_add_string() {
    let (vm, exec) = call_builtin_vm("string Xenon.Builtin.AddString(string, string)");
    exec.set_io_register(0, vm.create_string("this is ")).unwrap();
    exec.set_io_register(1, vm.create_string("a test string"))
        .unwrap();

    exec.run(RunMode::Continuous).unwrap();
    assert!(exec.is_completed());
    assert!(!exec.has_exception());

    let result = exec.get_io_register(0).unwrap();
    assert_eq!(
        vm.string_content(result).unwrap().as_str(),
        "this is a test string"
    );
}

#[test]
fn test_add_int32() {
    let (_vm, exec) = call_builtin_vm("int32 Xenon.Builtin.AddInt32(int32, int32)");
    exec.set_io_register(0, Value::Int32(40)).unwrap();
    exec.set_io_register(1, Value::Int32(2)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Int32(42));
}

#[test]
fn test_integer_arithmetic_wraps() {
    let (_vm, exec) = call_builtin_vm("int8 Xenon.Builtin.AddInt8(int8, int8)");
    exec.set_io_register(0, Value::Int8(127)).unwrap();
    exec.set_io_register(1, Value::Int8(1)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Int8(-128));

    let (_vm, exec) = call_builtin_vm("uint16 Xenon.Builtin.MulUint16(uint16, uint16)");
    exec.set_io_register(0, Value::Uint16(0x8000)).unwrap();
    exec.set_io_register(1, Value::Uint16(2)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Uint16(0));
}

#[test]
fn test_float_arithmetic() {
    let (_vm, exec) = call_builtin_vm("float64 Xenon.Builtin.MulFloat64(float64, float64)");
    exec.set_io_register(0, Value::Float64(1.5)).unwrap();
    exec.set_io_register(1, Value::Float64(4.0)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Float64(6.0));
}

#[test]
fn test_divide_by_zero_int32() {
    let (vm, exec) = call_builtin_vm("int32 Xenon.Builtin.DivInt32(int32, int32)");
    exec.set_io_register(0, Value::Int32(10)).unwrap();
    exec.set_io_register(1, Value::Int32(0)).unwrap();

    exec.run(RunMode::Continuous).unwrap();
    assert!(exec.has_exception());
    assert!(!exec.is_completed());

    let value = exec.exception_value().unwrap();
    let schema = vm.object_schema_of(value).unwrap();
    assert_eq!(
        schema.type_name().as_str(),
        "Xenon.System.Exception.DivideByZeroError"
    );

    let message = vm.object_member(value, 0).unwrap();
    assert_eq!(
        vm.string_content(message).unwrap().as_str(),
        "Divide-by-zero error (int32)"
    );

    // The left operand's I/O register is untouched by the failed divide.
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Int32(10));
}

#[test]
fn test_divide_by_zero_every_numeric_type() {
    let cases = [
        ("int8 Xenon.Builtin.DivInt8(int8, int8)", Value::Int8(1), Value::Int8(0), "int8"),
        ("int16 Xenon.Builtin.DivInt16(int16, int16)", Value::Int16(1), Value::Int16(0), "int16"),
        ("int64 Xenon.Builtin.DivInt64(int64, int64)", Value::Int64(1), Value::Int64(0), "int64"),
        ("uint8 Xenon.Builtin.DivUint8(uint8, uint8)", Value::Uint8(1), Value::Uint8(0), "uint8"),
        ("uint32 Xenon.Builtin.DivUint32(uint32, uint32)", Value::Uint32(1), Value::Uint32(0), "uint32"),
        ("uint64 Xenon.Builtin.DivUint64(uint64, uint64)", Value::Uint64(1), Value::Uint64(0), "uint64"),
        ("float32 Xenon.Builtin.DivFloat32(float32, float32)", Value::Float32(1.0), Value::Float32(0.0), "float32"),
        ("float64 Xenon.Builtin.DivFloat64(float64, float64)", Value::Float64(1.0), Value::Float64(0.0), "float64"),
    ];

    for (signature, left, right, label) in cases {
        let (vm, exec) = call_builtin_vm(signature);
        exec.set_io_register(0, left).unwrap();
        exec.set_io_register(1, right).unwrap();
        exec.run(RunMode::Continuous).unwrap();

        assert!(exec.has_exception(), "no exception for {label}");
        let value = exec.exception_value().unwrap();
        let message = vm.object_member(value, 0).unwrap();
        assert_eq!(
            vm.string_content(message).unwrap().as_str(),
            format!("Divide-by-zero error ({label})")
        );
    }
}

#[test]
fn test_integer_division() {
    let (_vm, exec) = call_builtin_vm("int32 Xenon.Builtin.DivInt32(int32, int32)");
    exec.set_io_register(0, Value::Int32(10)).unwrap();
    exec.set_io_register(1, Value::Int32(3)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert!(!exec.has_exception());
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Int32(3));
}

#[test]
fn test_cast_uint64_to_bool() {
    let (_vm, exec) = call_builtin_vm("bool Xenon.Builtin.CastUint64ToBool(uint64)");
    exec.set_io_register(0, Value::Uint64(0)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Bool(false));

    let (_vm, exec) = call_builtin_vm("bool Xenon.Builtin.CastUint64ToBool(uint64)");
    exec.set_io_register(0, Value::Uint64(7)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Bool(true));
}

#[test]
fn test_cast_narrowing_truncates() {
    let (_vm, exec) = call_builtin_vm("int8 Xenon.Builtin.CastInt32ToInt8(int32)");
    exec.set_io_register(0, Value::Int32(0x1FF)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Int8(-1));
}

#[test]
fn test_cast_float_to_int() {
    let (_vm, exec) = call_builtin_vm("int32 Xenon.Builtin.CastFloat64ToInt32(float64)");
    exec.set_io_register(0, Value::Float64(3.9)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Int32(3));
}

#[test]
fn test_cast_bool_to_float() {
    let (_vm, exec) = call_builtin_vm("float32 Xenon.Builtin.CastBoolToFloat32(bool)");
    exec.set_io_register(0, Value::Bool(true)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Float32(1.0));
}

#[test]
fn test_length_array() {
    let (vm, exec) = call_builtin_vm("int64 Xenon.Builtin.LengthArray(array)");
    exec.set_io_register(0, vm.create_array(5)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Int64(5));
}

#[test]
fn test_bool_arithmetic() {
    let (_vm, exec) = call_builtin_vm("bool Xenon.Builtin.AddBool(bool, bool)");
    exec.set_io_register(0, Value::Bool(true)).unwrap();
    exec.set_io_register(1, Value::Bool(true)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert_eq!(exec.get_io_register(0).unwrap(), Value::Bool(true));

    let (_vm, exec) = call_builtin_vm("bool Xenon.Builtin.DivBool(bool, bool)");
    exec.set_io_register(0, Value::Bool(true)).unwrap();
    exec.set_io_register(1, Value::Bool(false)).unwrap();
    exec.run(RunMode::Continuous).unwrap();
    assert!(exec.has_exception());
}
