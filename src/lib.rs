//! Lightweight implementation of a parser and interpreter for JVM bytecode
//! class files.
//!
//! The crate is split the way the data flows: `reader` decodes raw
//! big-endian bytes, `jvm` materializes class files and their constant
//! pools, `loader` keeps a name-indexed registry with superclass-aware
//! method resolution, and `runtime` executes method frames against an
//! operand stack and a simple object heap.

pub mod bytecode;
pub mod descriptor;
pub mod jvm;
pub mod loader;
pub mod reader;
pub mod runtime;
