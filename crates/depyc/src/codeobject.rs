//! The code-object container (§6 external interface) and its `CO_*` flags.
//!
//! Grounded on the teacher's `Code` struct (`bytecode.rs::code`): the same
//! breadth of fields (bytecode blob, constants, a line/location table, an
//! exception table, declared stack size) plus the additional argument-count
//! and name fields this spec's §6 lists that the teacher's VM-focused
//! `Code` did not need.

use bitflags::bitflags;

use crate::exctable::ExceptionEntry;
use crate::value::ConstValue;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct CodeFlags: u32 {
        const VARARGS = 0x04;
        const VARKEYWORDS = 0x08;
        const GENERATOR = 0x20;
        const COROUTINE = 0x80;
        const ASYNC_GENERATOR = 0x200;
        /// `CO_FUTURE_ANNOTATIONS`: set on every code object compiled from a
        /// module with `from __future__ import annotations` in effect.
        const FUTURE_ANNOTATIONS = 0x10_0000;
    }
}

/// One `(byte_offset, source_line)` breakpoint decoded from `lnotab`
/// (pre-3.10) or `linetable` (3.10+). Not required for correctness (§6);
/// backs trace-sink JSONL line annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntry {
    pub start_offset: usize,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineTable {
    entries: Vec<LineEntry>,
}

impl LineTable {
    #[must_use]
    pub fn new(entries: Vec<LineEntry>) -> Self {
        Self { entries }
    }

    /// The source line active at `offset`, by the last entry starting at or
    /// before it.
    #[must_use]
    pub fn line_for_offset(&self, offset: usize) -> Option<u32> {
        self.entries.iter().rev().find(|e| e.start_offset <= offset).and_then(|e| e.line)
    }

    /// Decodes the pre-3.10 `lnotab` format: pairs of `(byte_delta,
    /// line_delta)`, both stored as `i8`-wrapping `u8`s, accumulated from
    /// `firstlineno`.
    #[must_use]
    pub fn decode_lnotab(lnotab: &[u8], firstlineno: u32) -> Self {
        let mut entries = vec![LineEntry { start_offset: 0, line: Some(firstlineno) }];
        let mut offset = 0i64;
        let mut line = i64::from(firstlineno);
        for pair in lnotab.chunks(2) {
            if pair.len() < 2 {
                break;
            }
            offset += i64::from(pair[0]);
            line += i64::from(pair[1] as i8);
            entries.push(LineEntry { start_offset: offset.max(0) as usize, line: Some(line.max(0) as u32) });
        }
        Self { entries }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeObject {
    pub argcount: u32,
    pub posonlyargcount: u32,
    pub kwonlyargcount: u32,
    pub flags: CodeFlags,
    pub stacksize: u32,
    pub firstlineno: u32,
    pub bytecode: Vec<u8>,
    pub constants: Vec<ConstValue>,
    pub names: Vec<String>,
    pub varnames: Vec<String>,
    pub freevars: Vec<String>,
    pub cellvars: Vec<String>,
    pub linetable: Vec<u8>,
    pub exceptiontable: Vec<u8>,
    pub name: String,
    pub qualname: String,
}

impl CodeObject {
    #[must_use]
    pub fn varname(&self, slot: usize) -> Option<&str> {
        self.varnames.get(slot).map(String::as_str)
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// `freevars` and `cellvars` share one operand space (`LOAD_DEREF`
    /// indexes cellvars first, then freevars) in the CPython convention
    /// this crate follows.
    #[must_use]
    pub fn freevar_or_cellvar(&self, index: usize) -> Option<&str> {
        self.cellvars.get(index).or_else(|| self.freevars.get(index - self.cellvars.len().min(index))).map(String::as_str)
    }

    #[must_use]
    pub fn decode_exception_table(&self) -> Result<Vec<ExceptionEntry>, crate::error::DecompileError> {
        if self.exceptiontable.is_empty() {
            return Ok(Vec::new());
        }
        crate::exctable::decode(&self.exceptiontable)
    }

    #[must_use]
    pub fn is_generator(&self) -> bool {
        self.flags.contains(CodeFlags::GENERATOR)
    }

    #[must_use]
    pub fn is_coroutine(&self) -> bool {
        self.flags.contains(CodeFlags::COROUTINE)
    }

    #[must_use]
    pub fn is_async_generator(&self) -> bool {
        self.flags.contains(CodeFlags::ASYNC_GENERATOR)
    }

    #[must_use]
    pub fn has_varargs(&self) -> bool {
        self.flags.contains(CodeFlags::VARARGS)
    }

    #[must_use]
    pub fn has_varkeywords(&self) -> bool {
        self.flags.contains(CodeFlags::VARKEYWORDS)
    }

    #[must_use]
    pub fn has_future_annotations(&self) -> bool {
        self.flags.contains(CodeFlags::FUTURE_ANNOTATIONS)
    }

    /// Nested code objects referenced from `constants`, in declaration order.
    pub fn nested_code_objects(&self) -> impl Iterator<Item = &CodeObject> {
        self.constants.iter().filter_map(ConstValue::as_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_code() -> CodeObject {
        CodeObject {
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            flags: CodeFlags::empty(),
            stacksize: 0,
            firstlineno: 1,
            bytecode: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            varnames: Vec::new(),
            freevars: Vec::new(),
            cellvars: Vec::new(),
            linetable: Vec::new(),
            exceptiontable: Vec::new(),
            name: "<module>".into(),
            qualname: "<module>".into(),
        }
    }

    #[test]
    fn flags_decode_generator_and_coroutine_independently() {
        let mut code = empty_code();
        code.flags = CodeFlags::GENERATOR;
        assert!(code.is_generator());
        assert!(!code.is_coroutine());
    }

    #[test]
    fn future_annotations_flag_is_independent_of_generator() {
        let mut code = empty_code();
        code.flags = CodeFlags::GENERATOR | CodeFlags::FUTURE_ANNOTATIONS;
        assert!(code.has_future_annotations());
        assert!(code.is_generator());

        code.flags = CodeFlags::GENERATOR;
        assert!(!code.has_future_annotations());
    }

    #[test]
    fn lnotab_accumulates_from_firstlineno() {
        let table = LineTable::decode_lnotab(&[2, 1, 4, 1], 10);
        assert_eq!(table.line_for_offset(0), Some(10));
        assert_eq!(table.line_for_offset(2), Some(11));
        assert_eq!(table.line_for_offset(6), Some(12));
    }

    #[test]
    fn empty_exception_table_decodes_to_no_entries() {
        let code = empty_code();
        assert_eq!(code.decode_exception_table().unwrap().len(), 0);
    }
}
