//! Built-in function catalog
//!
//! Built-ins are identified by mangled id, the same identity user functions
//! get, so overload resolution needs no special path: `print(5)` resolves to
//! `print_int`, `length("ab")` to `length_string`. The `length_<T>array`
//! family grows by one id per declared struct; the analyzer reserves those
//! ids so user code cannot redefine them.

use crate::ast::DataType;
use opal_vm::Instruction;

/// The base type names of the language.
pub const BASE_TYPES: [&str; 4] = ["int", "double", "bool", "string"];

/// Mangled ids of the fixed built-in functions (the `length` family is
/// handled separately because it grows with declared structs).
pub const BUILT_INS: [&str; 12] = [
    "print_string",
    "print_int",
    "print_double",
    "print_bool",
    "input",
    "itos_int",
    "itod_int",
    "dtos_double",
    "dtoi_double",
    "stoi_string",
    "stod_string",
    "get_int_string",
];

/// `length` ids available before any struct is declared.
pub const BASE_LENGTH_IDS: [&str; 5] = [
    "length_string",
    "length_intarray",
    "length_doublearray",
    "length_boolarray",
    "length_stringarray",
];

/// The reserved `length` id for an array of the given struct type.
pub fn struct_length_id(struct_name: &str) -> String {
    format!("length_{}array", struct_name)
}

/// Result type name of a fixed built-in, or `None` when the id is not one.
/// `print_*` returns `void`, the conversions return their target type.
pub fn builtin_result_type(id: &str) -> Option<&'static str> {
    let name = match id {
        "print_string" | "print_int" | "print_double" | "print_bool" => "void",
        "input" | "itos_int" | "dtos_double" | "get_int_string" => "string",
        "itod_int" | "stod_string" => "double",
        "dtoi_double" | "stoi_string" => "int",
        _ => return None,
    };
    Some(name)
}

/// The single VM instruction a fixed built-in call compiles to, or `None`
/// when the id is not a fixed built-in.
pub fn builtin_instruction(id: &str) -> Option<Instruction> {
    let instruction = match id {
        "print_string" | "print_int" | "print_double" | "print_bool" => Instruction::Write,
        "input" => Instruction::Read,
        "itos_int" | "dtos_double" => Instruction::ToStr,
        "itod_int" | "stod_string" => Instruction::ToDbl,
        "stoi_string" | "dtoi_double" => Instruction::ToInt,
        "get_int_string" => Instruction::GetC,
        _ => return None,
    };
    Some(instruction)
}

/// True when the given type is one of the non-array base types.
pub fn is_base_type(data_type: &DataType) -> bool {
    !data_type.is_array && BASE_TYPES.contains(&data_type.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_length_id() {
        assert_eq!(struct_length_id("Point"), "length_Pointarray");
    }

    #[test]
    fn test_result_types() {
        assert_eq!(builtin_result_type("print_int"), Some("void"));
        assert_eq!(builtin_result_type("input"), Some("string"));
        assert_eq!(builtin_result_type("stoi_string"), Some("int"));
        assert_eq!(builtin_result_type("itod_int"), Some("double"));
        assert_eq!(builtin_result_type("length_string"), None);
        assert_eq!(builtin_result_type("main"), None);
    }

    #[test]
    fn test_instructions() {
        assert_eq!(builtin_instruction("print_bool"), Some(Instruction::Write));
        assert_eq!(builtin_instruction("dtos_double"), Some(Instruction::ToStr));
        assert_eq!(builtin_instruction("get_int_string"), Some(Instruction::GetC));
        assert_eq!(builtin_instruction("length_intarray"), None);
    }
}
