//! The `.pyc` container reader (§6 external collaborator).
//!
//! Validates the four-byte magic/`\r\n` header against a table of known
//! magic numbers (grounded on the version table in
//! `prestist-add-determinism`'s `handlers/pyc.rs`) and decodes the marshal
//! stream that follows into a [`CodeObject`] tree. Marshal is CPython's own
//! serialization format: a type-tagged byte stream with an optional
//! back-reference table (the top bit of the type byte, `FLAG_REF`).

use crate::codeobject::{CodeFlags, CodeObject};
use crate::error::DecompileError;
use crate::value::ConstValue;
use crate::version::PyVersion;

const FLAG_REF: u8 = 0x80;

/// `(magic_le_u16, version)` — representative entries spanning the
/// versions this crate's opcode tables support. Real CPython's table is
/// longer; unlisted magics fail closed rather than guessing.
const MAGIC_TABLE: &[(u16, PyVersion)] = &[
    (3394, PyVersion::new(2, 7)),
    (3379, PyVersion::new(3, 6)),
    (3393, PyVersion::new(3, 7)),
    (3413, PyVersion::new(3, 8)),
    (3425, PyVersion::new(3, 9)),
    (3439, PyVersion::new(3, 10)),
    (3495, PyVersion::new(3, 11)),
    (3531, PyVersion::new(3, 12)),
    (3571, PyVersion::new(3, 13)),
];

#[derive(Debug, Clone)]
pub struct PycModule {
    pub version: PyVersion,
    pub code: CodeObject,
}

/// Reads a full `.pyc` file: header + marshalled code object.
pub fn read_pyc(bytes: &[u8]) -> Result<PycModule, DecompileError> {
    if bytes.len() < 16 {
        return Err(DecompileError::TruncatedBytecode { offset: 0 });
    }
    let version = validate_header(&bytes[0..4])?;
    tracing::trace!(?version, total_bytes = bytes.len(), "validated .pyc header");
    // Bytes [4..16) are the bit-field/hash/mtime/size header; not consumed
    // by the core, which treats only the code object tree as input.
    let mut reader = MarshalReader { bytes: &bytes[16..], pos: 0, refs: Vec::new() };
    let value = reader.read_object()?;
    let code = value_to_code(value)?;
    Ok(PycModule { version, code })
}

fn validate_header(header: &[u8]) -> Result<PyVersion, DecompileError> {
    if header[2..4] != [0x0d, 0x0a] {
        return Err(DecompileError::TruncatedBytecode { offset: 2 });
    }
    let magic = u16::from(header[0]) | (u16::from(header[1]) << 8);
    MAGIC_TABLE
        .iter()
        .find(|(m, _)| *m == magic)
        .map(|(_, v)| *v)
        .ok_or(DecompileError::Unsupported { offset: 0, reason: format!("unrecognized .pyc magic number {magic}") })
}

fn value_to_code(value: MarshalValue) -> Result<CodeObject, DecompileError> {
    match value {
        MarshalValue::Code(code) => Ok(*code),
        other => Err(DecompileError::Unsupported { offset: 0, reason: format!("expected a code object, found {other:?}") }),
    }
}

/// The raw decoded shape of a marshal object, before being folded into
/// [`ConstValue`]/[`CodeObject`].
#[derive(Debug, Clone)]
enum MarshalValue {
    None,
    Bool(bool),
    Ellipsis,
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<MarshalValue>),
    Code(Box<CodeObject>),
}

impl From<MarshalValue> for ConstValue {
    fn from(value: MarshalValue) -> Self {
        match value {
            MarshalValue::None => ConstValue::None,
            MarshalValue::Bool(b) => ConstValue::Bool(b),
            MarshalValue::Ellipsis => ConstValue::Ellipsis,
            MarshalValue::Int(i) => ConstValue::Int(i),
            MarshalValue::Float(f) => ConstValue::Float(f),
            MarshalValue::Str(s) => ConstValue::Str(s),
            MarshalValue::Bytes(b) => ConstValue::Bytes(b),
            MarshalValue::Tuple(items) => ConstValue::Tuple(items.into_iter().map(ConstValue::from).collect()),
            MarshalValue::Code(code) => ConstValue::Code(code),
        }
    }
}

struct MarshalReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    refs: Vec<MarshalValue>,
}

impl<'a> MarshalReader<'a> {
    fn byte(&mut self) -> Result<u8, DecompileError> {
        let b = *self.bytes.get(self.pos).ok_or(DecompileError::TruncatedBytecode { offset: self.pos })?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecompileError> {
        let slice = self.bytes.get(self.pos..self.pos + n).ok_or(DecompileError::TruncatedBytecode { offset: self.pos })?;
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, DecompileError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, DecompileError> {
        Ok(self.u32()? as i32)
    }

    fn f64(&mut self) -> Result<f64, DecompileError> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes(b.try_into().unwrap()))
    }

    fn read_object(&mut self) -> Result<MarshalValue, DecompileError> {
        let tag = self.byte()?;
        let has_ref = tag & FLAG_REF != 0;
        let kind = tag & !FLAG_REF;
        let value = self.read_by_kind(kind)?;
        if has_ref {
            self.refs.push(value.clone());
        }
        Ok(value)
    }

    fn read_by_kind(&mut self, kind: u8) -> Result<MarshalValue, DecompileError> {
        match kind {
            b'N' => Ok(MarshalValue::None),
            b'T' => Ok(MarshalValue::Bool(true)),
            b'F' => Ok(MarshalValue::Bool(false)),
            b'.' => Ok(MarshalValue::Ellipsis),
            b'i' => Ok(MarshalValue::Int(i64::from(self.i32()?))),
            b'l' => self.read_long(),
            b'g' => Ok(MarshalValue::Float(self.f64()?)),
            b's' | b'u' | b't' => self.read_bytes_or_str(kind),
            b'a' | b'A' => self.read_short_ascii(),
            b'(' => self.read_tuple_with_count(|r| Ok(r.u32()? as usize)),
            b')' => self.read_tuple_with_count(|r| Ok(usize::from(r.byte()?))),
            b'c' => self.read_code(),
            b'r' => {
                let index = self.u32()? as usize;
                self.refs.get(index).cloned().ok_or(DecompileError::InvalidExceptionTable {
                    reason: format!("marshal backreference {index} out of range"),
                })
            }
            other => {
                Err(DecompileError::Unsupported { offset: self.pos, reason: format!("unsupported marshal type tag {other:#04x}") })
            }
        }
    }

    fn read_long(&mut self) -> Result<MarshalValue, DecompileError> {
        let ndigits = self.i32()?;
        let count = ndigits.unsigned_abs() as usize;
        let mut value: i64 = 0;
        for i in 0..count {
            let digit = i64::from(self.u32()? as u16);
            value = value.saturating_add(digit << (15 * i));
        }
        if ndigits < 0 {
            value = -value;
        }
        Ok(MarshalValue::Int(value))
    }

    fn read_bytes_or_str(&mut self, kind: u8) -> Result<MarshalValue, DecompileError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?.to_vec();
        if kind == b's' {
            Ok(MarshalValue::Bytes(bytes))
        } else {
            Ok(MarshalValue::Str(String::from_utf8_lossy(&bytes).into_owned()))
        }
    }

    fn read_short_ascii(&mut self) -> Result<MarshalValue, DecompileError> {
        let len = usize::from(self.byte()?);
        let bytes = self.take(len)?.to_vec();
        Ok(MarshalValue::Str(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn read_tuple_with_count(&mut self, count_reader: impl FnOnce(&mut Self) -> Result<usize, DecompileError>) -> Result<MarshalValue, DecompileError> {
        let count = count_reader(self)?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.read_object()?);
        }
        Ok(MarshalValue::Tuple(items))
    }

    fn read_code(&mut self) -> Result<MarshalValue, DecompileError> {
        let argcount = self.u32()?;
        let posonlyargcount = self.u32()?;
        let kwonlyargcount = self.u32()?;
        let flags = CodeFlags::from_bits_truncate(self.u32()?);
        let stacksize = self.u32()?;
        let firstlineno = self.u32()?;
        let bytecode = self.read_bytes_field()?;
        let constants = self.read_str_tuple_as_const()?;
        let names = self.read_str_vec()?;
        let varnames = self.read_str_vec()?;
        let freevars = self.read_str_vec()?;
        let cellvars = self.read_str_vec()?;
        let linetable = self.read_bytes_field()?;
        let exceptiontable = self.read_bytes_field()?;
        let name = self.read_str_scalar()?;
        let qualname = self.read_str_scalar()?;
        Ok(MarshalValue::Code(Box::new(CodeObject {
            argcount,
            posonlyargcount,
            kwonlyargcount,
            flags,
            stacksize,
            firstlineno,
            bytecode,
            constants,
            names,
            varnames,
            freevars,
            cellvars,
            linetable,
            exceptiontable,
            name,
            qualname,
        })))
    }

    fn read_bytes_field(&mut self) -> Result<Vec<u8>, DecompileError> {
        match self.read_object()? {
            MarshalValue::Bytes(b) => Ok(b),
            MarshalValue::Str(s) => Ok(s.into_bytes()),
            MarshalValue::None => Ok(Vec::new()),
            other => Err(DecompileError::Unsupported { offset: self.pos, reason: format!("expected bytes, found {other:?}") }),
        }
    }

    fn read_str_scalar(&mut self) -> Result<String, DecompileError> {
        match self.read_object()? {
            MarshalValue::Str(s) => Ok(s),
            other => Err(DecompileError::Unsupported { offset: self.pos, reason: format!("expected a string, found {other:?}") }),
        }
    }

    fn read_str_vec(&mut self) -> Result<Vec<String>, DecompileError> {
        match self.read_object()? {
            MarshalValue::Tuple(items) => items
                .into_iter()
                .map(|v| match v {
                    MarshalValue::Str(s) => Ok(s),
                    other => Err(DecompileError::Unsupported { offset: self.pos, reason: format!("expected string in tuple, found {other:?}") }),
                })
                .collect(),
            other => Err(DecompileError::Unsupported { offset: self.pos, reason: format!("expected a tuple, found {other:?}") }),
        }
    }

    fn read_str_tuple_as_const(&mut self) -> Result<Vec<ConstValue>, DecompileError> {
        match self.read_object()? {
            MarshalValue::Tuple(items) => Ok(items.into_iter().map(ConstValue::from).collect()),
            other => Err(DecompileError::Unsupported { offset: self.pos, reason: format!("expected a tuple, found {other:?}") }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_header_missing_crlf_marker() {
        let mut bytes = vec![0u8; 16];
        bytes[0] = 0x0b; // 3.11 magic low byte
        bytes[1] = 0x0d;
        bytes[2] = 0x00; // wrong: should be 0x0d
        bytes[3] = 0x0a;
        assert!(validate_header(&bytes[0..4]).is_err());
    }

    #[test]
    fn unknown_magic_is_unsupported() {
        let mut bytes = vec![0u8; 4];
        bytes[0] = 0xff;
        bytes[1] = 0xff;
        bytes[2] = 0x0d;
        bytes[3] = 0x0a;
        assert!(matches!(validate_header(&bytes), Err(DecompileError::Unsupported { .. })));
    }

    #[test]
    fn none_and_bool_round_trip() {
        let mut reader = MarshalReader { bytes: &[b'N'], pos: 0, refs: Vec::new() };
        assert!(matches!(reader.read_object().unwrap(), MarshalValue::None));
    }
}
