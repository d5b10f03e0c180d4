//! Lightweight implementation of a parser and decoder for JVM bytecode
//! class files.
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::reader::{ByteReader, ParseError};

/// Class name that terminates every superclass walk.
pub const OBJECT_CLASS: &str = "java/lang/Object";

const ACC_STATIC: u16 = 0x0008;

/// Constant pool entry. Tags follow the class file format; later entries
/// reference earlier ones by 1-based pool index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CPInfo {
    /// Tag 1.
    ConstantUtf8 { bytes: String },
    /// Tag 3.
    ConstantInteger { value: i32 },
    /// Tag 5. Stored as raw halves, never computed on.
    ConstantLong { hi: i32, lo: i32 },
    /// Tag 7.
    ConstantClass { name_index: u16 },
    /// Tag 8.
    ConstantString { string_index: u16 },
    /// Tag 9.
    ConstantFieldRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    /// Tag 10.
    ConstantMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    /// Tag 11.
    ConstantInterfaceMethodRef {
        class_index: u16,
        name_and_type_index: u16,
    },
    /// Tag 12.
    ConstantNameAndType {
        name_index: u16,
        descriptor_index: u16,
    },
}

/// Attribute payload, keyed by its decoded name. Only `Code` is
/// interpreted further; everything else is carried opaquely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeInfo {
    Code {
        max_stack: u16,
        max_locals: u16,
        code: Vec<u8>,
    },
    Other {
        info: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: HashMap<String, AttributeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: HashMap<String, AttributeInfo>,
}

impl MethodInfo {
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    /// The parsed `Code` attribute, if this method has a body.
    pub fn code(&self) -> Option<(u16, u16, &[u8])> {
        match self.attributes.get("Code") {
            Some(AttributeInfo::Code {
                max_stack,
                max_locals,
                code,
            }) => Some((*max_stack, *max_locals, code.as_slice())),
            _ => None,
        }
    }
}

/// Parsed class file: header, constant pool and the field, method and
/// attribute tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JVMClassFile {
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: Vec<CPInfo>,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: HashMap<String, AttributeInfo>,
}

impl JVMClassFile {
    /// Resolve a 1-based constant pool index.
    pub fn constant(&self, index: u16) -> Result<&CPInfo, ParseError> {
        if index == 0 {
            return Err(ParseError::BadPoolIndex(index));
        }
        self.constant_pool
            .get(index as usize - 1)
            .ok_or(ParseError::BadPoolIndex(index))
    }

    /// Resolve an index that must name a Utf8 entry.
    pub fn utf8(&self, index: u16) -> Result<&str, ParseError> {
        match self.constant(index)? {
            CPInfo::ConstantUtf8 { bytes } => Ok(bytes),
            _ => Err(ParseError::UnexpectedConstant {
                index,
                expected: "Utf8",
            }),
        }
    }

    /// Resolve an index that must name a Class entry, through to its name.
    pub fn class_name(&self, index: u16) -> Result<&str, ParseError> {
        match self.constant(index)? {
            CPInfo::ConstantClass { name_index } => self.utf8(*name_index),
            _ => Err(ParseError::UnexpectedConstant {
                index,
                expected: "Class",
            }),
        }
    }

    pub fn this_class_name(&self) -> Result<&str, ParseError> {
        self.class_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Result<&str, ParseError> {
        self.class_name(self.super_class)
    }

    fn name_and_type(&self, index: u16) -> Result<(&str, &str), ParseError> {
        match self.constant(index)? {
            CPInfo::ConstantNameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(ParseError::UnexpectedConstant {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a FieldRef to `(class name, field name)`.
    pub fn field_ref(&self, index: u16) -> Result<(&str, &str), ParseError> {
        match self.constant(index)? {
            CPInfo::ConstantFieldRef {
                class_index,
                name_and_type_index,
            } => {
                let (name, _descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok((self.class_name(*class_index)?, name))
            }
            _ => Err(ParseError::UnexpectedConstant {
                index,
                expected: "FieldRef",
            }),
        }
    }

    /// Resolve a MethodRef or InterfaceMethodRef to
    /// `(class name, method name, descriptor)`.
    pub fn method_ref(&self, index: u16) -> Result<(&str, &str, &str), ParseError> {
        match self.constant(index)? {
            CPInfo::ConstantMethodRef {
                class_index,
                name_and_type_index,
            }
            | CPInfo::ConstantInterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                Ok((self.class_name(*class_index)?, name, descriptor))
            }
            _ => Err(ParseError::UnexpectedConstant {
                index,
                expected: "MethodRef",
            }),
        }
    }

    pub fn method_name(&self, method: &MethodInfo) -> Result<&str, ParseError> {
        self.utf8(method.name_index)
    }

    pub fn method_descriptor(&self, method: &MethodInfo) -> Result<&str, ParseError> {
        self.utf8(method.descriptor_index)
    }

    /// Names of every field declared by this class, in declaration order.
    pub fn field_names(&self) -> Result<Vec<String>, ParseError> {
        self.fields
            .iter()
            .map(|field| self.utf8(field.name_index).map(str::to_owned))
            .collect()
    }
}

/// Parser for the class file binary layout. Reads are strictly
/// sequential; every length-prefixed run is consumed exactly.
pub struct JVMParser;

impl JVMParser {
    pub fn parse(bytes: &[u8]) -> Result<JVMClassFile, ParseError> {
        let mut reader = ByteReader::new(bytes);

        let magic = reader.read_u32()?;
        if magic != 0xcafe_babe {
            return Err(ParseError::InvalidMagic(magic));
        }
        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;

        // The pool count field stores the true entry count plus one.
        let constant_pool_count = reader.read_u16()?.saturating_sub(1);
        let mut constant_pool = Vec::with_capacity(constant_pool_count as usize);
        for _ in 0..constant_pool_count {
            constant_pool.push(Self::parse_constant(&mut reader)?);
        }

        let access_flags = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;

        let interfaces_count = reader.read_u16()?;
        let mut interfaces = Vec::with_capacity(interfaces_count as usize);
        for _ in 0..interfaces_count {
            interfaces.push(reader.read_u16()?);
        }

        let fields_count = reader.read_u16()?;
        let mut fields = Vec::with_capacity(fields_count as usize);
        for _ in 0..fields_count {
            let (access_flags, name_index, descriptor_index, attributes) =
                Self::parse_member(&mut reader, &constant_pool)?;
            fields.push(FieldInfo {
                access_flags,
                name_index,
                descriptor_index,
                attributes,
            });
        }

        let methods_count = reader.read_u16()?;
        let mut methods = Vec::with_capacity(methods_count as usize);
        for _ in 0..methods_count {
            let (access_flags, name_index, descriptor_index, attributes) =
                Self::parse_member(&mut reader, &constant_pool)?;
            methods.push(MethodInfo {
                access_flags,
                name_index,
                descriptor_index,
                attributes,
            });
        }

        let attributes = Self::parse_attributes(&mut reader, &constant_pool)?;

        Ok(JVMClassFile {
            magic,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn parse_constant(reader: &mut ByteReader) -> Result<CPInfo, ParseError> {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        match tag {
            1 => {
                let length = reader.read_u16()? as usize;
                let raw = reader.read_bytes(length)?;
                let bytes =
                    String::from_utf8(raw).map_err(|_| ParseError::InvalidUtf8 { offset })?;
                Ok(CPInfo::ConstantUtf8 { bytes })
            }
            3 => Ok(CPInfo::ConstantInteger {
                value: reader.read_i32()?,
            }),
            5 => Ok(CPInfo::ConstantLong {
                hi: reader.read_i32()?,
                lo: reader.read_i32()?,
            }),
            7 => Ok(CPInfo::ConstantClass {
                name_index: reader.read_u16()?,
            }),
            8 => Ok(CPInfo::ConstantString {
                string_index: reader.read_u16()?,
            }),
            9 => Ok(CPInfo::ConstantFieldRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            }),
            10 => Ok(CPInfo::ConstantMethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            }),
            11 => Ok(CPInfo::ConstantInterfaceMethodRef {
                class_index: reader.read_u16()?,
                name_and_type_index: reader.read_u16()?,
            }),
            12 => Ok(CPInfo::ConstantNameAndType {
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
            }),
            tag => Err(ParseError::UnsupportedConstantTag { tag, offset }),
        }
    }

    // Fields and methods share one record layout.
    fn parse_member(
        reader: &mut ByteReader,
        constant_pool: &[CPInfo],
    ) -> Result<(u16, u16, u16, HashMap<String, AttributeInfo>), ParseError> {
        let access_flags = reader.read_u16()?;
        let name_index = reader.read_u16()?;
        let descriptor_index = reader.read_u16()?;
        let attributes = Self::parse_attributes(reader, constant_pool)?;
        Ok((access_flags, name_index, descriptor_index, attributes))
    }

    fn parse_attributes(
        reader: &mut ByteReader,
        constant_pool: &[CPInfo],
    ) -> Result<HashMap<String, AttributeInfo>, ParseError> {
        let count = reader.read_u16()?;
        let mut attributes = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let name_index = reader.read_u16()?;
            if name_index == 0 {
                return Err(ParseError::BadPoolIndex(name_index));
            }
            let name = match constant_pool.get(name_index as usize - 1) {
                Some(CPInfo::ConstantUtf8 { bytes }) => bytes.clone(),
                Some(_) => {
                    return Err(ParseError::UnexpectedConstant {
                        index: name_index,
                        expected: "Utf8",
                    })
                }
                None => return Err(ParseError::BadPoolIndex(name_index)),
            };
            let length = reader.read_u32()? as usize;
            let info = reader.read_bytes(length)?;
            // Attributes are located by decoded name, not by position.
            let attribute = if name == "Code" {
                Self::parse_code(&info)?
            } else {
                AttributeInfo::Other { info }
            };
            attributes.insert(name, attribute);
        }
        Ok(attributes)
    }

    fn parse_code(info: &[u8]) -> Result<AttributeInfo, ParseError> {
        let mut reader = ByteReader::new(info);
        let max_stack = reader.read_u16()?;
        let max_locals = reader.read_u16()?;
        let code_length = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_length)?;
        // The exception table and nested attributes that follow are opaque.
        Ok(AttributeInfo::Code {
            max_stack,
            max_locals,
            code,
        })
    }
}

/// Read a class file from disk into a byte buffer.
pub fn read_class_file(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Assembler {
        bytes: Vec<u8>,
    }

    impl Assembler {
        fn new() -> Self {
            Self { bytes: Vec::new() }
        }
        fn u8(&mut self, value: u8) -> &mut Self {
            self.bytes.push(value);
            self
        }
        fn u16(&mut self, value: u16) -> &mut Self {
            self.bytes.extend_from_slice(&value.to_be_bytes());
            self
        }
        fn u32(&mut self, value: u32) -> &mut Self {
            self.bytes.extend_from_slice(&value.to_be_bytes());
            self
        }
        fn utf8(&mut self, text: &str) -> &mut Self {
            self.u8(1).u16(text.len() as u16);
            self.bytes.extend_from_slice(text.as_bytes());
            self
        }
    }

    /// A minimal but complete class, `class Greeter { void greet() {} }`,
    /// with one pool entry of every supported kind.
    fn greeter_class_bytes() -> Vec<u8> {
        let mut asm = Assembler::new();
        asm.u32(0xcafe_babe).u16(0).u16(52);
        asm.u16(14 + 1); // pool count is stored as true count + 1
        asm.utf8("Greeter"); // 1
        asm.u8(7).u16(1); // 2 Class -> 1
        asm.utf8(OBJECT_CLASS); // 3
        asm.u8(7).u16(3); // 4 Class -> 3
        asm.utf8("greet"); // 5
        asm.utf8("()V"); // 6
        asm.utf8("Code"); // 7
        asm.u8(3).u32(42i32 as u32); // 8 Integer
        asm.u8(5).u32(0).u32(1); // 9 Long hi=0 lo=1
        asm.u8(8).u16(1); // 10 String -> 1
        asm.u8(12).u16(5).u16(6); // 11 NameAndType greet ()V
        asm.u8(11).u16(4).u16(11); // 12 InterfaceMethodRef
        asm.u8(9).u16(2).u16(11); // 13 FieldRef
        asm.u8(10).u16(2).u16(11); // 14 MethodRef
        asm.u16(0x0021); // access flags
        asm.u16(2).u16(4); // this, super
        asm.u16(0); // interfaces
        asm.u16(0); // fields
        asm.u16(1); // methods
        asm.u16(0x0001).u16(5).u16(6); // greet
        asm.u16(1); // one attribute
        asm.u16(7).u32(13); // "Code", payload length
        asm.u16(1).u16(1); // max_stack, max_locals
        asm.u32(1).u8(0xb1); // code: return
        asm.u16(0).u16(0); // exception table, nested attributes
        asm.u16(0); // class attributes
        asm.bytes
    }

    #[test]
    fn parses_header_and_names() {
        let class_file = JVMParser::parse(&greeter_class_bytes()).unwrap();
        assert_eq!(class_file.magic, 0xcafe_babe);
        assert_eq!(class_file.major_version, 52);
        assert_eq!(class_file.constant_pool.len(), 14);
        assert_eq!(class_file.this_class_name().unwrap(), "Greeter");
        assert_eq!(class_file.super_class_name().unwrap(), OBJECT_CLASS);
    }

    #[test]
    fn decodes_every_pool_variant() {
        let class_file = JVMParser::parse(&greeter_class_bytes()).unwrap();
        assert_eq!(
            class_file.constant(8).unwrap(),
            &CPInfo::ConstantInteger { value: 42 }
        );
        assert_eq!(
            class_file.constant(9).unwrap(),
            &CPInfo::ConstantLong { hi: 0, lo: 1 }
        );
        assert_eq!(
            class_file.constant(10).unwrap(),
            &CPInfo::ConstantString { string_index: 1 }
        );
        let method_ref = class_file.method_ref(14).unwrap();
        assert_eq!(method_ref, ("Greeter", "greet", "()V"));
        let interface_ref = class_file.method_ref(12).unwrap();
        assert_eq!(interface_ref, (OBJECT_CLASS, "greet", "()V"));
        let field_ref = class_file.field_ref(13).unwrap();
        assert_eq!(field_ref, ("Greeter", "greet"));
    }

    #[test]
    fn finds_code_by_attribute_name() {
        let class_file = JVMParser::parse(&greeter_class_bytes()).unwrap();
        let method = &class_file.methods[0];
        assert_eq!(class_file.method_name(method).unwrap(), "greet");
        assert!(!method.is_static());
        let (max_stack, max_locals, code) = method.code().unwrap();
        assert_eq!((max_stack, max_locals), (1, 1));
        assert_eq!(code, &[0xb1]);
    }

    #[test]
    fn parsing_twice_yields_equal_pools() {
        let bytes = greeter_class_bytes();
        let first = JVMParser::parse(&bytes).unwrap();
        let second = JVMParser::parse(&bytes).unwrap();
        assert_eq!(first.constant_pool, second.constant_pool);
        assert_eq!(first, second);
    }

    #[test]
    fn truncated_input_is_fatal() {
        let bytes = greeter_class_bytes();
        let err = JVMParser::parse(&bytes[..bytes.len() - 6]).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn unknown_pool_tag_is_fatal() {
        let mut asm = Assembler::new();
        asm.u32(0xcafe_babe).u16(0).u16(52);
        asm.u16(2); // one entry
        asm.u8(99); // unsupported tag
        let err = JVMParser::parse(&asm.bytes).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnsupportedConstantTag {
                tag: 99,
                offset: 10
            }
        );
    }

    #[test]
    fn index_zero_is_never_valid() {
        let class_file = JVMParser::parse(&greeter_class_bytes()).unwrap();
        assert_eq!(
            class_file.constant(0).unwrap_err(),
            ParseError::BadPoolIndex(0)
        );
    }
}
