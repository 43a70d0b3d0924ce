#![doc = include_str!("../../../README.md")]

pub mod arena;
pub mod ast;
pub mod cfg;
pub mod codeobject;
pub mod decode;
pub mod decompile;
pub mod dominators;
pub mod error;
pub mod exctable;
pub mod marshal;
pub mod opcode;
pub mod printer;
pub mod recognize;
pub mod simulate;
pub mod stack;
pub mod trace;
pub mod value;
pub mod version;

pub use crate::{
    ast::{Expr, Stmt},
    codeobject::{CodeFlags, CodeObject},
    decompile::decompile_code,
    error::{DecompileError, Result},
    marshal::{read_pyc, PycModule},
    printer::print_module,
    trace::TraceSink,
    version::PyVersion,
};

/// Decodes a `.pyc` file's bytes and decompiles its top-level code object
/// (or a nested one, when `focus` names a dotted path) straight to Python
/// source text. The convenience entry point the CLI calls (§6).
pub fn decompile_pyc(bytes: &[u8], focus: Option<&str>, trace: &mut TraceSink) -> Result<String> {
    let module = read_pyc(bytes)?;
    let (arena, stmts, future_annotations) = decompile_code(&module.code, module.version, trace, focus)?;
    Ok(print_module(&arena, &stmts, future_annotations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompile_pyc_rejects_a_bad_header() {
        let mut sink = TraceSink::null();
        let err = decompile_pyc(&[0u8; 16], None, &mut sink).unwrap_err();
        assert!(matches!(err, DecompileError::TruncatedBytecode { .. }));
    }
}
