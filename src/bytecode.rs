//! Opcode mnemonics for the supported JVM instruction subset.
use std::convert::TryFrom;

/// Supported opcodes. An unsupported byte is reported as-is so the
/// runtime can fail with context instead of guessing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OPCode {
    AConstNull,
    IconstM1,
    Iconst0,
    Iconst1,
    Iconst2,
    Iconst3,
    Iconst4,
    Iconst5,
    BiPush,
    Ldc,
    ILoad,
    ALoad,
    ILoad0,
    ILoad1,
    ILoad2,
    ILoad3,
    ALoad0,
    ALoad1,
    ALoad2,
    ALoad3,
    IStore,
    AStore,
    IStore0,
    IStore1,
    IStore2,
    IStore3,
    AStore0,
    AStore1,
    AStore2,
    AStore3,
    Dup,
    IAdd,
    ISub,
    IAnd,
    IfEq,
    Goto,
    TableSwitch,
    IReturn,
    AReturn,
    Return,
    GetStatic,
    GetField,
    PutField,
    InvokeVirtual,
    InvokeSpecial,
    InvokeStatic,
    New,
    CheckCast,
    IfNonNull,
}

impl TryFrom<u8> for OPCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, u8> {
        match byte {
            0x01 => Ok(Self::AConstNull),
            0x02 => Ok(Self::IconstM1),
            0x03 => Ok(Self::Iconst0),
            0x04 => Ok(Self::Iconst1),
            0x05 => Ok(Self::Iconst2),
            0x06 => Ok(Self::Iconst3),
            0x07 => Ok(Self::Iconst4),
            0x08 => Ok(Self::Iconst5),
            0x10 => Ok(Self::BiPush),
            0x12 => Ok(Self::Ldc),
            0x15 => Ok(Self::ILoad),
            0x19 => Ok(Self::ALoad),
            0x1a => Ok(Self::ILoad0),
            0x1b => Ok(Self::ILoad1),
            0x1c => Ok(Self::ILoad2),
            0x1d => Ok(Self::ILoad3),
            0x2a => Ok(Self::ALoad0),
            0x2b => Ok(Self::ALoad1),
            0x2c => Ok(Self::ALoad2),
            0x2d => Ok(Self::ALoad3),
            0x36 => Ok(Self::IStore),
            0x3a => Ok(Self::AStore),
            0x3b => Ok(Self::IStore0),
            0x3c => Ok(Self::IStore1),
            0x3d => Ok(Self::IStore2),
            0x3e => Ok(Self::IStore3),
            0x4b => Ok(Self::AStore0),
            0x4c => Ok(Self::AStore1),
            0x4d => Ok(Self::AStore2),
            0x4e => Ok(Self::AStore3),
            0x59 => Ok(Self::Dup),
            0x60 => Ok(Self::IAdd),
            0x64 => Ok(Self::ISub),
            0x7e => Ok(Self::IAnd),
            0x99 => Ok(Self::IfEq),
            0xa7 => Ok(Self::Goto),
            0xaa => Ok(Self::TableSwitch),
            0xac => Ok(Self::IReturn),
            0xb0 => Ok(Self::AReturn),
            0xb1 => Ok(Self::Return),
            0xb2 => Ok(Self::GetStatic),
            0xb4 => Ok(Self::GetField),
            0xb5 => Ok(Self::PutField),
            0xb6 => Ok(Self::InvokeVirtual),
            0xb7 => Ok(Self::InvokeSpecial),
            0xb8 => Ok(Self::InvokeStatic),
            0xbb => Ok(Self::New),
            0xc0 => Ok(Self::CheckCast),
            0xc7 => Ok(Self::IfNonNull),
            byte => Err(byte),
        }
    }
}
