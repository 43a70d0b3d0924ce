//! 3.11+ opcode table: word-aligned, with per-instruction inline cache
//! slots (`cache_entries`, zero-filled, consumed but never emitted by the
//! decoder) and a per-code exception table replacing block-setup opcodes.

use super::{OpCategory::*, OpMeta};

macro_rules! op {
    ($byte:expr, $mnemonic:expr, $has_arg:expr, $category:expr) => {
        op!($byte, $mnemonic, $has_arg, $category, 0)
    };
    ($byte:expr, $mnemonic:expr, $has_arg:expr, $category:expr, $caches:expr) => {
        ($byte, OpMeta { mnemonic: $mnemonic, has_arg: $has_arg, category: $category, cache_entries: $caches })
    };
}

pub const TABLE: &[(u8, OpMeta)] = &[
    op!(1, "POP_TOP", false, StackManip),
    op!(2, "PUSH_NULL", false, StackManip),
    op!(9, "NOP", false, Other),
    op!(11, "UNARY_NEGATIVE", false, Unary),
    op!(12, "UNARY_NOT", false, Unary),
    op!(15, "UNARY_INVERT", false, Unary),
    op!(25, "BINARY_SUBSCR", false, Arithmetic),
    op!(31, "GET_LEN", false, Other),
    op!(32, "MATCH_MAPPING", false, Other),
    op!(33, "MATCH_SEQUENCE", false, Other),
    op!(34, "MATCH_KEYS", false, Other),
    op!(48, "COPY", true, StackManip),
    op!(49, "BINARY_OP", true, Arithmetic, 1),
    op!(50, "SWAP", true, StackManip),
    op!(59, "TO_BOOL", false, Compare, 3),
    op!(60, "STORE_SUBSCR", false, Store),
    op!(68, "GET_ITER", false, Iteration),
    op!(83, "RETURN_VALUE", false, BlockTerminator),
    op!(87, "POP_EXCEPT", false, ExceptionHandling),
    op!(89, "RETURN_CONST", true, BlockTerminator),
    op!(90, "STORE_NAME", true, Store),
    op!(92, "UNPACK_SEQUENCE", true, Build, 1),
    op!(93, "FOR_ITER", true, Iteration, 1),
    op!(95, "STORE_ATTR", true, Store, 4),
    op!(97, "STORE_GLOBAL", true, Store),
    op!(100, "LOAD_CONST", true, Load),
    op!(101, "LOAD_NAME", true, Load),
    op!(102, "BUILD_TUPLE", true, Build),
    op!(103, "BUILD_LIST", true, Build),
    op!(104, "BUILD_SET", true, Build),
    op!(105, "BUILD_MAP", true, Build),
    op!(106, "LOAD_ATTR", true, Load, 4),
    op!(107, "COMPARE_OP", true, Compare, 2),
    op!(108, "IMPORT_NAME", true, Other),
    op!(109, "IMPORT_FROM", true, Other),
    op!(110, "JUMP_FORWARD", true, Jump),
    op!(111, "JUMP_IF_FALSE_OR_POP", true, Jump),
    op!(112, "JUMP_IF_TRUE_OR_POP", true, Jump),
    op!(114, "POP_JUMP_FORWARD_IF_FALSE", true, Jump),
    op!(115, "POP_JUMP_FORWARD_IF_TRUE", true, Jump),
    op!(116, "LOAD_GLOBAL", true, Load, 5),
    op!(117, "IS_OP", true, Compare),
    op!(118, "CONTAINS_OP", true, Compare),
    op!(119, "RERAISE", true, BlockTerminator),
    op!(121, "COPY_FREE_VARS", true, Other),
    op!(122, "RESUME", true, Other),
    op!(124, "LOAD_FAST", true, Load),
    op!(125, "STORE_FAST", true, Store),
    op!(126, "DELETE_FAST", true, Other),
    op!(127, "MATCH_CLASS", true, Other),
    op!(130, "RAISE_VARARGS", true, BlockTerminator),
    op!(131, "GET_AWAITABLE", true, Other),
    op!(132, "MAKE_FUNCTION", true, Other),
    op!(133, "BUILD_SLICE", true, Build),
    op!(135, "LOAD_CLOSURE", true, Load),
    op!(136, "LOAD_DEREF", true, Load),
    op!(137, "STORE_DEREF", true, Store),
    op!(141, "KW_NAMES", true, Call),
    op!(142, "CALL_FUNCTION_EX", true, Call),
    op!(151, "GET_AITER", false, Iteration),
    op!(155, "BUILD_STRING", true, Build),
    op!(156, "BUILD_CONST_KEY_MAP", true, Build),
    op!(161, "LIST_EXTEND", true, Build),
    op!(162, "SET_UPDATE", true, Build),
    op!(163, "DICT_MERGE", true, Build),
    op!(164, "DICT_UPDATE", true, Build),
    op!(166, "CALL", true, Call, 4),
    op!(167, "PRECALL", true, Call, 1),
    op!(168, "BEFORE_WITH", false, BlockSetup),
    op!(169, "WITH_EXCEPT_START", false, ExceptionHandling),
    op!(172, "JUMP_BACKWARD", true, JumpBackward),
    op!(175, "STORE_FAST_STORE_FAST", true, Store),
    op!(176, "STORE_FAST_LOAD_FAST", true, Store),
    op!(177, "LOAD_FAST_LOAD_FAST", true, Load),
    op!(178, "POP_JUMP_IF_TRUE", true, Jump),
    op!(179, "POP_JUMP_IF_FALSE", true, Jump),
    op!(237, "CACHE", false, CacheOnly),
    op!(255, "EXTENDED_ARG", true, Other),
];
