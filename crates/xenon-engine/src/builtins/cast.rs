//! Cast built-ins
//!
//! One conversion per ordered pair of primitive types. Numeric narrowing
//! truncates; float-to-integer conversion saturates at the target's range;
//! anything-to-bool compares against zero.

use super::Registry;
use xenon_core::Value;

macro_rules! casts_from {
    ($registry:expr, $from_label:literal, $from_camel:literal, $get:ident =>
        $( ($to_label:literal, $to_camel:literal, $conv:expr) ),+ $(,)?) => {{
        $(
            $registry.add(
                concat!(
                    $to_label, " Xenon.Builtin.Cast", $from_camel, "To", $to_camel,
                    "(", $from_label, ")"
                ),
                1,
                1,
                |args| {
                    let param = args.io_register(0).$get();
                    args.set_io_register(0, ($conv)(param));
                },
            );
        )+
    }};
}

pub(crate) fn install(registry: &Registry<'_>) {
    casts_from!(registry, "bool", "Bool", get_bool =>
        ("int8", "Int8", |v: bool| Value::Int8(v as i8)),
        ("int16", "Int16", |v: bool| Value::Int16(v as i16)),
        ("int32", "Int32", |v: bool| Value::Int32(v as i32)),
        ("int64", "Int64", |v: bool| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: bool| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: bool| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: bool| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: bool| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: bool| Value::Float32(u8::from(v) as f32)),
        ("float64", "Float64", |v: bool| Value::Float64(u8::from(v) as f64)),
    );

    casts_from!(registry, "int8", "Int8", get_int8 =>
        ("bool", "Bool", |v: i8| Value::Bool(v != 0)),
        ("int16", "Int16", |v: i8| Value::Int16(v as i16)),
        ("int32", "Int32", |v: i8| Value::Int32(v as i32)),
        ("int64", "Int64", |v: i8| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: i8| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: i8| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: i8| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: i8| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: i8| Value::Float32(v as f32)),
        ("float64", "Float64", |v: i8| Value::Float64(v as f64)),
    );

    casts_from!(registry, "int16", "Int16", get_int16 =>
        ("bool", "Bool", |v: i16| Value::Bool(v != 0)),
        ("int8", "Int8", |v: i16| Value::Int8(v as i8)),
        ("int32", "Int32", |v: i16| Value::Int32(v as i32)),
        ("int64", "Int64", |v: i16| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: i16| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: i16| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: i16| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: i16| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: i16| Value::Float32(v as f32)),
        ("float64", "Float64", |v: i16| Value::Float64(v as f64)),
    );

    casts_from!(registry, "int32", "Int32", get_int32 =>
        ("bool", "Bool", |v: i32| Value::Bool(v != 0)),
        ("int8", "Int8", |v: i32| Value::Int8(v as i8)),
        ("int16", "Int16", |v: i32| Value::Int16(v as i16)),
        ("int64", "Int64", |v: i32| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: i32| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: i32| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: i32| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: i32| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: i32| Value::Float32(v as f32)),
        ("float64", "Float64", |v: i32| Value::Float64(v as f64)),
    );

    casts_from!(registry, "int64", "Int64", get_int64 =>
        ("bool", "Bool", |v: i64| Value::Bool(v != 0)),
        ("int8", "Int8", |v: i64| Value::Int8(v as i8)),
        ("int16", "Int16", |v: i64| Value::Int16(v as i16)),
        ("int32", "Int32", |v: i64| Value::Int32(v as i32)),
        ("uint8", "Uint8", |v: i64| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: i64| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: i64| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: i64| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: i64| Value::Float32(v as f32)),
        ("float64", "Float64", |v: i64| Value::Float64(v as f64)),
    );

    casts_from!(registry, "uint8", "Uint8", get_uint8 =>
        ("bool", "Bool", |v: u8| Value::Bool(v != 0)),
        ("int8", "Int8", |v: u8| Value::Int8(v as i8)),
        ("int16", "Int16", |v: u8| Value::Int16(v as i16)),
        ("int32", "Int32", |v: u8| Value::Int32(v as i32)),
        ("int64", "Int64", |v: u8| Value::Int64(v as i64)),
        ("uint16", "Uint16", |v: u8| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: u8| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: u8| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: u8| Value::Float32(v as f32)),
        ("float64", "Float64", |v: u8| Value::Float64(v as f64)),
    );

    casts_from!(registry, "uint16", "Uint16", get_uint16 =>
        ("bool", "Bool", |v: u16| Value::Bool(v != 0)),
        ("int8", "Int8", |v: u16| Value::Int8(v as i8)),
        ("int16", "Int16", |v: u16| Value::Int16(v as i16)),
        ("int32", "Int32", |v: u16| Value::Int32(v as i32)),
        ("int64", "Int64", |v: u16| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: u16| Value::Uint8(v as u8)),
        ("uint32", "Uint32", |v: u16| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: u16| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: u16| Value::Float32(v as f32)),
        ("float64", "Float64", |v: u16| Value::Float64(v as f64)),
    );

    casts_from!(registry, "uint32", "Uint32", get_uint32 =>
        ("bool", "Bool", |v: u32| Value::Bool(v != 0)),
        ("int8", "Int8", |v: u32| Value::Int8(v as i8)),
        ("int16", "Int16", |v: u32| Value::Int16(v as i16)),
        ("int32", "Int32", |v: u32| Value::Int32(v as i32)),
        ("int64", "Int64", |v: u32| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: u32| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: u32| Value::Uint16(v as u16)),
        ("uint64", "Uint64", |v: u32| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: u32| Value::Float32(v as f32)),
        ("float64", "Float64", |v: u32| Value::Float64(v as f64)),
    );

    casts_from!(registry, "uint64", "Uint64", get_uint64 =>
        ("bool", "Bool", |v: u64| Value::Bool(v != 0)),
        ("int8", "Int8", |v: u64| Value::Int8(v as i8)),
        ("int16", "Int16", |v: u64| Value::Int16(v as i16)),
        ("int32", "Int32", |v: u64| Value::Int32(v as i32)),
        ("int64", "Int64", |v: u64| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: u64| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: u64| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: u64| Value::Uint32(v as u32)),
        ("float32", "Float32", |v: u64| Value::Float32(v as f32)),
        ("float64", "Float64", |v: u64| Value::Float64(v as f64)),
    );

    casts_from!(registry, "float32", "Float32", get_float32 =>
        ("bool", "Bool", |v: f32| Value::Bool(v != 0.0)),
        ("int8", "Int8", |v: f32| Value::Int8(v as i8)),
        ("int16", "Int16", |v: f32| Value::Int16(v as i16)),
        ("int32", "Int32", |v: f32| Value::Int32(v as i32)),
        ("int64", "Int64", |v: f32| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: f32| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: f32| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: f32| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: f32| Value::Uint64(v as u64)),
        ("float64", "Float64", |v: f32| Value::Float64(v as f64)),
    );

    casts_from!(registry, "float64", "Float64", get_float64 =>
        ("bool", "Bool", |v: f64| Value::Bool(v != 0.0)),
        ("int8", "Int8", |v: f64| Value::Int8(v as i8)),
        ("int16", "Int16", |v: f64| Value::Int16(v as i16)),
        ("int32", "Int32", |v: f64| Value::Int32(v as i32)),
        ("int64", "Int64", |v: f64| Value::Int64(v as i64)),
        ("uint8", "Uint8", |v: f64| Value::Uint8(v as u8)),
        ("uint16", "Uint16", |v: f64| Value::Uint16(v as u16)),
        ("uint32", "Uint32", |v: f64| Value::Uint32(v as u32)),
        ("uint64", "Uint64", |v: f64| Value::Uint64(v as u64)),
        ("float32", "Float32", |v: f64| Value::Float32(v as f32)),
    );
}
