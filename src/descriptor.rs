//! Method descriptor decoding.
//!
//! A descriptor has the shape `(<args>)<return>`. The interpreter only
//! needs the ordered argument kinds, because that is how many operand
//! stack values an invoke consumes; the return type character after the
//! closing parenthesis is ignored.
use std::error::Error;
use std::fmt;

use regex::Regex;

/// Argument kind decoded from a method descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    IntArray,
    Object(String),
    ObjectArray(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// The descriptor did not have a parenthesized argument list.
    Malformed(String),
    /// A character outside the supported grammar.
    UnexpectedChar { descriptor: String, found: char },
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Malformed(descriptor) => {
                write!(f, "malformed method descriptor {descriptor:?}")
            }
            Self::UnexpectedChar { descriptor, found } => {
                write!(
                    f,
                    "unexpected descriptor character {found:?} in {descriptor:?}"
                )
            }
        }
    }
}

impl Error for DescriptorError {}

/// Decode the ordered argument kinds of a method descriptor.
///
/// Grammar: `I` is a primitive integer, `[` makes the next element an
/// array kind, and `L<binary-class-name>;` is an object reference
/// consumed up to and including the `;`. Array-of-object and bare-object
/// forms share the same terminator rule, so the scan keeps explicit
/// in-array / in-object flags.
pub fn argument_kinds(descriptor: &str) -> Result<Vec<ArgKind>, DescriptorError> {
    let re = Regex::new(r"^\(([^\)]*)\)").unwrap();
    let caps = re
        .captures(descriptor)
        .ok_or_else(|| DescriptorError::Malformed(descriptor.to_owned()))?;
    let args = caps.get(1).map_or("", |m| m.as_str());

    let mut kinds = Vec::new();
    let mut in_array = false;
    let mut in_object = false;
    let mut object_name = String::new();
    for c in args.chars() {
        if in_object {
            if c == ';' {
                let name = std::mem::take(&mut object_name);
                kinds.push(if in_array {
                    ArgKind::ObjectArray(name)
                } else {
                    ArgKind::Object(name)
                });
                in_array = false;
                in_object = false;
            } else {
                object_name.push(c);
            }
            continue;
        }
        match c {
            'I' => {
                kinds.push(if in_array {
                    ArgKind::IntArray
                } else {
                    ArgKind::Int
                });
                in_array = false;
            }
            '[' => in_array = true,
            'L' => in_object = true,
            found => {
                return Err(DescriptorError::UnexpectedChar {
                    descriptor: descriptor.to_owned(),
                    found,
                })
            }
        }
    }
    if in_array || in_object {
        return Err(DescriptorError::Malformed(descriptor.to_owned()));
    }
    Ok(kinds)
}
