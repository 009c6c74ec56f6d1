//! Program image round-trip tests: serialize with the builder, decode with
//! the format reader, compare tables bit-for-bit in both byte orders.

use xenon_bytecode::{
    ByteOrder, BytecodeWriter, Constant, ProgramImage, ProgramWriter, FILE_VERSION, MAGIC,
};
use xenon_core::ValueType;

fn demo_writer(byte_order: ByteOrder) -> (ProgramWriter, Vec<u8>) {
    let mut writer = ProgramWriter::new();

    let c_int = writer.add_constant_int32(123);
    let c_str = writer.add_constant_string("this is ");
    let c_global_name = writer.add_constant_string("globalTestVar");
    writer.add_global("globalTestVar", c_str).unwrap();
    writer.add_dependency("xenon.stdlib");

    writer.add_object_type("Demo.Pair").unwrap();
    writer
        .add_object_member("Demo.Pair", "left", ValueType::Int32)
        .unwrap();
    writer
        .add_object_member("Demo.Pair", "right", ValueType::Int32)
        .unwrap();

    let mut body = BytecodeWriter::new(byte_order);
    body.emit_load_constant(0, c_int);
    body.emit_load_global(1, c_global_name);
    body.emit_return();
    let body = body.into_bytes();

    writer
        .add_function("void Program.Main()", &body, 0, 0)
        .unwrap();
    writer
        .add_local_variable("void Program.Main()", "localTestVar", c_int)
        .unwrap();
    writer
        .add_native_function("void Program.PrintString(string)", 1, 0)
        .unwrap();

    (writer, body)
}

#[test]
fn test_header_fields() {
    let (writer, _) = demo_writer(ByteOrder::LittleEndian);
    let bytes = writer.serialize(ByteOrder::LittleEndian);

    assert_eq!(&bytes[..5], &MAGIC);
    assert_eq!(bytes[5], 0); // reserved
    assert_eq!(bytes[6], 0); // little-endian flag
    assert_eq!(u16::from_le_bytes([bytes[7], bytes[8]]), FILE_VERSION);
}

#[test]
fn test_round_trip_little_endian() {
    let (writer, body) = demo_writer(ByteOrder::LittleEndian);
    let bytes = writer.serialize(ByteOrder::LittleEndian);
    let image = ProgramImage::decode(&bytes).unwrap();

    assert_eq!(image.byte_order, ByteOrder::LittleEndian);
    assert_eq!(image.dependencies, vec!["xenon.stdlib".to_owned()]);

    assert_eq!(image.constants[0], Constant::Null);
    assert_eq!(image.constants[1], Constant::Bool(false));
    assert_eq!(image.constants[2], Constant::Bool(true));
    assert!(image
        .constants
        .contains(&Constant::String("this is ".to_owned())));
    assert!(image.constants.contains(&Constant::Int32(123)));

    assert_eq!(image.globals.len(), 1);
    assert_eq!(image.globals[0].0, "globalTestVar");

    assert_eq!(image.object_types.len(), 1);
    let pair = &image.object_types[0];
    assert_eq!(pair.name, "Demo.Pair");
    assert_eq!(pair.members[0], ("left".to_owned(), ValueType::Int32));
    assert_eq!(pair.members[1], ("right".to_owned(), ValueType::Int32));

    assert_eq!(image.functions.len(), 2);
    let main = image
        .functions
        .iter()
        .find(|f| f.signature == "void Program.Main()")
        .unwrap();
    assert!(!main.is_native);
    assert_eq!(main.offset_start, 0);
    assert_eq!(main.offset_end as usize, body.len());
    assert_eq!(main.locals.len(), 1);
    assert_eq!(main.locals[0].0, "localTestVar");

    let native = image
        .functions
        .iter()
        .find(|f| f.signature == "void Program.PrintString(string)")
        .unwrap();
    assert!(native.is_native);
    assert_eq!(native.num_params, 1);

    // The function body bytes survive unchanged.
    assert_eq!(
        &image.bytecode[main.offset_start as usize..main.offset_end as usize],
        &body[..]
    );
}

#[test]
fn test_round_trip_big_endian() {
    let (writer, body) = demo_writer(ByteOrder::BigEndian);
    let bytes = writer.serialize(ByteOrder::BigEndian);
    assert_eq!(bytes[6], 1); // big-endian flag

    let image = ProgramImage::decode(&bytes).unwrap();
    assert_eq!(image.byte_order, ByteOrder::BigEndian);
    assert!(image.constants.contains(&Constant::Int32(123)));

    let main = image
        .functions
        .iter()
        .find(|f| f.signature == "void Program.Main()")
        .unwrap();
    assert_eq!(
        &image.bytecode[main.offset_start as usize..main.offset_end as usize],
        &body[..]
    );
}

#[test]
fn test_function_bodies_are_64_byte_aligned() {
    let mut writer = ProgramWriter::new();
    writer.add_function("void A()", &[0x01], 0, 0).unwrap();
    writer.add_function("void B()", &[0x00, 0x01], 0, 0).unwrap();
    let bytes = writer.serialize(ByteOrder::LittleEndian);
    let image = ProgramImage::decode(&bytes).unwrap();

    let b = image
        .functions
        .iter()
        .find(|f| f.signature == "void B()")
        .unwrap();
    assert_eq!(b.offset_start % 64, 0);
    assert!(b.offset_start >= 64);
    assert_eq!(image.bytecode.len() % 64, 0);
}

#[test]
fn test_float_bit_patterns_survive() {
    let mut writer = ProgramWriter::new();
    writer.add_constant_float32(-0.0);
    writer.add_constant_float64(f64::from_bits(0x7FF8_0000_0000_1234)); // NaN payload
    let bytes = writer.serialize(ByteOrder::BigEndian);
    let image = ProgramImage::decode(&bytes).unwrap();

    let has_neg_zero = image
        .constants
        .iter()
        .any(|c| matches!(c, Constant::Float32(f) if f.to_bits() == (-0.0f32).to_bits()));
    assert!(has_neg_zero);

    let has_nan_payload = image
        .constants
        .iter()
        .any(|c| matches!(c, Constant::Float64(f) if f.to_bits() == 0x7FF8_0000_0000_1234));
    assert!(has_nan_payload);
}
