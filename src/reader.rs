//! Sequential big-endian reader over class file bytes and the structural
//! error type shared by everything that decodes them.
use std::error::Error;
use std::fmt;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};

/// Structural failure while decoding class file bytes. Always fatal for
/// the class being loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The buffer ended before the declared length was consumed.
    UnexpectedEof { offset: usize, wanted: usize },
    /// The file did not start with `0xCAFEBABE`.
    InvalidMagic(u32),
    /// A constant pool entry used a tag byte we do not support.
    UnsupportedConstantTag { tag: u8, offset: usize },
    /// A constant pool index was zero or past the end of the pool.
    BadPoolIndex(u16),
    /// A constant pool entry had a different variant than the referencing
    /// structure requires.
    UnexpectedConstant { index: u16, expected: &'static str },
    /// A Utf8 entry held bytes that are not valid UTF-8.
    InvalidUtf8 { offset: usize },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnexpectedEof { offset, wanted } => write!(
                f,
                "unexpected end of class file at byte {offset}, wanted {wanted} more"
            ),
            Self::InvalidMagic(magic) => {
                write!(f, "invalid magic bytes {magic:#010x}, expected 0xcafebabe")
            }
            Self::UnsupportedConstantTag { tag, offset } => {
                write!(f, "unsupported constant kind {tag} at byte {offset}")
            }
            Self::BadPoolIndex(index) => {
                write!(f, "constant pool index {index} out of bounds")
            }
            Self::UnexpectedConstant { index, expected } => {
                write!(f, "constant pool entry {index} is not a {expected}")
            }
            Self::InvalidUtf8 { offset } => {
                write!(f, "invalid UTF-8 in constant pool entry at byte {offset}")
            }
        }
    }
}

impl Error for ParseError {}

/// Position-tracked reader over a fixed byte buffer. Every read consumes
/// exactly the requested width or fails with `UnexpectedEof`.
pub struct ByteReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    /// Current offset from the start of the buffer.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    fn eof(&self, wanted: usize) -> ParseError {
        ParseError::UnexpectedEof {
            offset: self.position(),
            wanted,
        }
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        self.cursor.read_u8().map_err(|_| self.eof(1))
    }

    pub fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.cursor.read_u16::<BigEndian>().map_err(|_| self.eof(2))
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.cursor.read_u32::<BigEndian>().map_err(|_| self.eof(4))
    }

    pub fn read_i32(&mut self) -> Result<i32, ParseError> {
        self.cursor.read_i32::<BigEndian>().map_err(|_| self.eof(4))
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, ParseError> {
        let start = self.position();
        let buf = *self.cursor.get_ref();
        if start + n > buf.len() {
            return Err(self.eof(n));
        }
        self.cursor.set_position((start + n) as u64);
        Ok(buf[start..start + n].to_vec())
    }
}
