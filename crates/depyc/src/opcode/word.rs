//! 3.6–3.10 word-aligned opcode table: every instruction is exactly two
//! bytes (opcode, arg); no inline caches yet.

use super::{OpCategory::*, OpMeta};

macro_rules! op {
    ($byte:expr, $mnemonic:expr, $has_arg:expr, $category:expr) => {
        ($byte, OpMeta { mnemonic: $mnemonic, has_arg: $has_arg, category: $category, cache_entries: 0 })
    };
}

pub const TABLE: &[(u8, OpMeta)] = &[
    op!(1, "POP_TOP", false, StackManip),
    op!(2, "ROT_TWO", false, StackManip),
    op!(3, "ROT_THREE", false, StackManip),
    op!(4, "DUP_TOP", false, StackManip),
    op!(5, "DUP_TOP_TWO", false, StackManip),
    op!(6, "ROT_FOUR", false, StackManip),
    op!(9, "NOP", false, Other),
    op!(10, "UNARY_NOT", false, Unary),
    op!(11, "UNARY_NEGATIVE", false, Unary),
    op!(12, "UNARY_INVERT", false, Unary),
    op!(19, "BINARY_POWER", false, Arithmetic),
    op!(20, "BINARY_MULTIPLY", false, Arithmetic),
    op!(22, "BINARY_MODULO", false, Arithmetic),
    op!(23, "BINARY_ADD", false, Arithmetic),
    op!(24, "BINARY_SUBTRACT", false, Arithmetic),
    op!(25, "BINARY_SUBSCR", false, Arithmetic),
    op!(55, "INPLACE_ADD", false, Arithmetic),
    op!(60, "STORE_SUBSCR", false, Store),
    op!(68, "GET_ITER", false, Iteration),
    op!(75, "PRINT_EXPR", false, Other),
    op!(83, "RETURN_VALUE", false, BlockTerminator),
    op!(85, "POP_BLOCK", false, BlockSetup),
    op!(87, "POP_EXCEPT", false, ExceptionHandling),
    op!(89, "END_FINALLY", false, BlockTerminator),
    op!(90, "STORE_NAME", true, Store),
    op!(91, "DELETE_NAME", true, Other),
    op!(92, "UNPACK_SEQUENCE", true, Build),
    op!(93, "FOR_ITER", true, Iteration),
    op!(95, "STORE_ATTR", true, Store),
    op!(97, "STORE_GLOBAL", true, Store),
    op!(100, "LOAD_CONST", true, Load),
    op!(101, "LOAD_NAME", true, Load),
    op!(102, "BUILD_TUPLE", true, Build),
    op!(103, "BUILD_LIST", true, Build),
    op!(104, "BUILD_SET", true, Build),
    op!(105, "BUILD_MAP", true, Build),
    op!(106, "LOAD_ATTR", true, Load),
    op!(107, "COMPARE_OP", true, Compare),
    op!(108, "IMPORT_NAME", true, Other),
    op!(109, "IMPORT_FROM", true, Other),
    op!(110, "JUMP_FORWARD", true, Jump),
    op!(111, "JUMP_IF_FALSE_OR_POP", true, Jump),
    op!(112, "JUMP_IF_TRUE_OR_POP", true, Jump),
    op!(113, "JUMP_ABSOLUTE", true, Jump),
    op!(114, "POP_JUMP_IF_FALSE", true, Jump),
    op!(115, "POP_JUMP_IF_TRUE", true, Jump),
    op!(116, "LOAD_GLOBAL", true, Load),
    op!(120, "SETUP_FINALLY", true, BlockSetup),
    op!(124, "LOAD_FAST", true, Load),
    op!(125, "STORE_FAST", true, Store),
    op!(126, "DELETE_FAST", true, Other),
    op!(130, "RAISE_VARARGS", true, BlockTerminator),
    op!(131, "CALL_FUNCTION", true, Call),
    op!(132, "MAKE_FUNCTION", true, Other),
    op!(133, "BUILD_SLICE", true, Build),
    op!(135, "LOAD_CLOSURE", true, Load),
    op!(136, "LOAD_DEREF", true, Load),
    op!(137, "STORE_DEREF", true, Store),
    op!(141, "CALL_FUNCTION_KW", true, Call),
    op!(142, "CALL_FUNCTION_EX", true, Call),
    op!(143, "SETUP_WITH", true, BlockSetup),
    op!(145, "LIST_APPEND", true, Build),
    op!(146, "SET_ADD", true, Build),
    op!(147, "MAP_ADD", true, Build),
    op!(151, "GET_AITER", false, Iteration),
    op!(155, "BUILD_STRING", true, Build),
    op!(156, "BUILD_CONST_KEY_MAP", true, Build),
    op!(161, "LIST_EXTEND", true, Build),
    op!(162, "SET_UPDATE", true, Build),
    op!(163, "DICT_MERGE", true, Build),
    op!(164, "DICT_UPDATE", true, Build),
    op!(165, "WITH_CLEANUP_START", false, ExceptionHandling),
    op!(166, "WITH_CLEANUP_FINISH", false, ExceptionHandling),
    op!(167, "SETUP_EXCEPT", true, BlockSetup),
    op!(172, "JUMP_BACKWARD", true, JumpBackward),
    op!(255, "EXTENDED_ARG", true, Other),
];
