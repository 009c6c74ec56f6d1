//! Arithmetic built-ins
//!
//! Integer arithmetic wraps; floats follow IEEE-754. Division by zero on
//! any variant raises `DivideByZeroError` and leaves I/O register 0
//! untouched.

use super::Registry;
use crate::exec::Severity;
use crate::vm::StandardException;
use xenon_core::Value;

macro_rules! int_arithmetic {
    ($registry:expr, $label:literal, $camel:literal, $get:ident, $variant:ident) => {{
        $registry.add(
            concat!($label, " Xenon.Builtin.Add", $camel, "(", $label, ", ", $label, ")"),
            2,
            1,
            |args| {
                let left = args.io_register(0).$get();
                let right = args.io_register(1).$get();
                args.set_io_register(0, Value::$variant(left.wrapping_add(right)));
            },
        );
        $registry.add(
            concat!($label, " Xenon.Builtin.Sub", $camel, "(", $label, ", ", $label, ")"),
            2,
            1,
            |args| {
                let left = args.io_register(0).$get();
                let right = args.io_register(1).$get();
                args.set_io_register(0, Value::$variant(left.wrapping_sub(right)));
            },
        );
        $registry.add(
            concat!($label, " Xenon.Builtin.Mul", $camel, "(", $label, ", ", $label, ")"),
            2,
            1,
            |args| {
                let left = args.io_register(0).$get();
                let right = args.io_register(1).$get();
                args.set_io_register(0, Value::$variant(left.wrapping_mul(right)));
            },
        );
        $registry.add(
            concat!($label, " Xenon.Builtin.Div", $camel, "(", $label, ", ", $label, ")"),
            2,
            1,
            |args| {
                let left = args.io_register(0).$get();
                let right = args.io_register(1).$get();
                if right == 0 {
                    args.raise_standard(
                        StandardException::DivideByZeroError,
                        Severity::Normal,
                        concat!("Divide-by-zero error (", $label, ")"),
                    );
                } else {
                    args.set_io_register(0, Value::$variant(left.wrapping_div(right)));
                }
            },
        );
    }};
}

macro_rules! float_arithmetic {
    ($registry:expr, $label:literal, $camel:literal, $get:ident, $variant:ident) => {{
        $registry.add(
            concat!($label, " Xenon.Builtin.Add", $camel, "(", $label, ", ", $label, ")"),
            2,
            1,
            |args| {
                let left = args.io_register(0).$get();
                let right = args.io_register(1).$get();
                args.set_io_register(0, Value::$variant(left + right));
            },
        );
        $registry.add(
            concat!($label, " Xenon.Builtin.Sub", $camel, "(", $label, ", ", $label, ")"),
            2,
            1,
            |args| {
                let left = args.io_register(0).$get();
                let right = args.io_register(1).$get();
                args.set_io_register(0, Value::$variant(left - right));
            },
        );
        $registry.add(
            concat!($label, " Xenon.Builtin.Mul", $camel, "(", $label, ", ", $label, ")"),
            2,
            1,
            |args| {
                let left = args.io_register(0).$get();
                let right = args.io_register(1).$get();
                args.set_io_register(0, Value::$variant(left * right));
            },
        );
        $registry.add(
            concat!($label, " Xenon.Builtin.Div", $camel, "(", $label, ", ", $label, ")"),
            2,
            1,
            |args| {
                let left = args.io_register(0).$get();
                let right = args.io_register(1).$get();
                if right == 0.0 {
                    args.raise_standard(
                        StandardException::DivideByZeroError,
                        Severity::Normal,
                        concat!("Divide-by-zero error (", $label, ")"),
                    );
                } else {
                    args.set_io_register(0, Value::$variant(left / right));
                }
            },
        );
    }};
}

pub(crate) fn install(registry: &Registry<'_>) {
    // Bool arithmetic operates on the 0/1 encoding.
    registry.add("bool Xenon.Builtin.AddBool(bool, bool)", 2, 1, |args| {
        let left = u8::from(args.io_register(0).get_bool());
        let right = u8::from(args.io_register(1).get_bool());
        args.set_io_register(0, Value::Bool(left.wrapping_add(right) != 0));
    });
    registry.add("bool Xenon.Builtin.SubBool(bool, bool)", 2, 1, |args| {
        let left = u8::from(args.io_register(0).get_bool());
        let right = u8::from(args.io_register(1).get_bool());
        args.set_io_register(0, Value::Bool(left.wrapping_sub(right) != 0));
    });
    registry.add("bool Xenon.Builtin.MulBool(bool, bool)", 2, 1, |args| {
        let left = args.io_register(0).get_bool();
        let right = args.io_register(1).get_bool();
        args.set_io_register(0, Value::Bool(left && right));
    });
    registry.add("bool Xenon.Builtin.DivBool(bool, bool)", 2, 1, |args| {
        let left = args.io_register(0).get_bool();
        let right = args.io_register(1).get_bool();
        if !right {
            args.raise_standard(
                StandardException::DivideByZeroError,
                Severity::Normal,
                "Divide-by-zero error (bool)",
            );
        } else {
            args.set_io_register(0, Value::Bool(left));
        }
    });

    int_arithmetic!(registry, "int8", "Int8", get_int8, Int8);
    int_arithmetic!(registry, "int16", "Int16", get_int16, Int16);
    int_arithmetic!(registry, "int32", "Int32", get_int32, Int32);
    int_arithmetic!(registry, "int64", "Int64", get_int64, Int64);
    int_arithmetic!(registry, "uint8", "Uint8", get_uint8, Uint8);
    int_arithmetic!(registry, "uint16", "Uint16", get_uint16, Uint16);
    int_arithmetic!(registry, "uint32", "Uint32", get_uint32, Uint32);
    int_arithmetic!(registry, "uint64", "Uint64", get_uint64, Uint64);

    float_arithmetic!(registry, "float32", "Float32", get_float32, Float32);
    float_arithmetic!(registry, "float64", "Float64", get_float64, Float64);
}
