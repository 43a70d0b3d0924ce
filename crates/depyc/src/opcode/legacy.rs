//! Pre-3.6 "tall" opcode table: opcodes below [`super::LEGACY_HAVE_ARGUMENT`]
//! are a single byte; at or above it they carry a 2-byte little-endian
//! argument (decoded in `decode.rs`).

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
    op!(9, "NOP", false, Other),
    op!(10, "UNARY_NOT", false, Unary),
    op!(11, "UNARY_NEGATIVE", false, Unary),
    op!(12, "UNARY_INVERT", false, Unary),
    op!(25, "BINARY_SUBSCR", false, Arithmetic),
    op!(60, "STORE_SUBSCR", false, Store),
    op!(70, "PRINT_ITEM", false, Other),
    op!(71, "PRINT_NEWLINE", false, Other),
    op!(80, "BREAK_LOOP", false, BlockTerminator),
    op!(83, "RETURN_VALUE", false, BlockTerminator),
    op!(85, "POP_BLOCK", false, BlockSetup),
    op!(87, "END_FINALLY", false, BlockTerminator),
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
    op!(104, "BUILD_MAP", true, Build),
    op!(105, "LOAD_ATTR", true, Load),
    op!(106, "COMPARE_OP", true, Compare),
    op!(108, "IMPORT_NAME", true, Other),
    op!(110, "JUMP_FORWARD", true, Jump),
    op!(111, "JUMP_IF_FALSE_OR_POP", true, Jump),
    op!(112, "JUMP_IF_TRUE_OR_POP", true, Jump),
    op!(113, "JUMP_ABSOLUTE", true, Jump),
    op!(114, "POP_JUMP_IF_FALSE", true, Jump),
    op!(115, "POP_JUMP_IF_TRUE", true, Jump),
    op!(116, "LOAD_GLOBAL", true, Load),
    op!(120, "SETUP_LOOP", true, BlockSetup),
    op!(121, "SETUP_EXCEPT", true, BlockSetup),
    op!(122, "SETUP_FINALLY", true, BlockSetup),
    op!(124, "LOAD_FAST", true, Load),
    op!(125, "STORE_FAST", true, Store),
    op!(126, "DELETE_FAST", true, Other),
    op!(131, "CALL_FUNCTION", true, Call),
    op!(132, "MAKE_FUNCTION", true, Other),
    op!(143, "SETUP_WITH", true, BlockSetup),
    op!(145, "LIST_APPEND", true, Build),
    op!(146, "SET_ADD", true, Build),
    op!(147, "MAP_ADD", true, Build),
    // Retained verbatim per spec §9 open question: legacy EXEC_STMT keeps
    // its print-style statement shape rather than a Python-3 translation.
    op!(160, "EXEC_STMT", false, Other),
    op!(255, "EXTENDED_ARG", true, Other),
];
