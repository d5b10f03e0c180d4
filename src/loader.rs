//! Name-indexed registry of parsed class files with superclass-aware
//! method resolution.
//!
//! The registry is built once from a fixed set of inputs before
//! execution begins and is read-only afterwards; there is no dynamic
//! class loading.
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::rc::Rc;

use crate::jvm::{JVMClassFile, JVMParser, MethodInfo, OBJECT_CLASS};
use crate::reader::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// Structural failure while parsing a class supplied to `load`.
    Parse { class: String, source: ParseError },
    /// The provider's expected name and the parsed class name disagree.
    NameMismatch { expected: String, found: String },
    /// Two inputs declared the same class name.
    DuplicateClass(String),
    /// A class name was not found in the closed-world registry.
    UnknownClass(String),
    /// A superclass cycle; the walk would never terminate.
    CyclicSuperclassChain(String),
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Parse { class, source } => {
                write!(f, "failed to parse class {class}: {source}")
            }
            Self::NameMismatch { expected, found } => {
                write!(f, "expected class {expected} but file declares {found}")
            }
            Self::DuplicateClass(name) => write!(f, "class {name} registered twice"),
            Self::UnknownClass(name) => write!(f, "unknown class {name}"),
            Self::CyclicSuperclassChain(name) => {
                write!(f, "superclass chain of {name} contains a cycle")
            }
        }
    }
}

impl Error for LoaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Mapping from fully qualified class name to parsed class file. Owns
/// every class for the lifetime of the run.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, Rc<JVMClassFile>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register every `(expected name, bytes)` pair from a
    /// class source provider.
    pub fn load<I>(sources: I) -> Result<Self, LoaderError>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut registry = Self::new();
        for (expected, bytes) in sources {
            let class_file = JVMParser::parse(&bytes).map_err(|source| LoaderError::Parse {
                class: expected.clone(),
                source,
            })?;
            let found = class_file
                .this_class_name()
                .map_err(|source| LoaderError::Parse {
                    class: expected.clone(),
                    source,
                })?;
            if found != expected {
                return Err(LoaderError::NameMismatch {
                    expected,
                    found: found.to_owned(),
                });
            }
            registry.register(class_file)?;
        }
        Ok(registry)
    }

    /// Register a parsed class under its own declared name.
    pub fn register(&mut self, class_file: JVMClassFile) -> Result<(), LoaderError> {
        let name = class_file
            .this_class_name()
            .map_err(|source| LoaderError::Parse {
                class: String::from("<unnamed>"),
                source,
            })?
            .to_owned();
        if self.classes.contains_key(&name) {
            return Err(LoaderError::DuplicateClass(name));
        }
        self.classes.insert(name, Rc::new(class_file));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Rc<JVMClassFile>> {
        self.classes.get(name)
    }

    /// Collect every method matching `method_name` and `descriptor`
    /// exactly, walking the superclass chain upward from `class_name`.
    ///
    /// The result is ordered from the starting class up; index 0, if
    /// present, is the most-derived match. The walk stops at the root
    /// object class and never descends into subclasses. Any other
    /// unregistered superclass is fatal: the registry is closed-world.
    pub fn resolve_method(
        &self,
        class_name: &str,
        method_name: &str,
        descriptor: &str,
    ) -> Result<Vec<(Rc<JVMClassFile>, MethodInfo)>, LoaderError> {
        let mut matches = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = class_name.to_owned();
        loop {
            if !visited.insert(current.clone()) {
                return Err(LoaderError::CyclicSuperclassChain(class_name.to_owned()));
            }
            let class_file = self
                .lookup(&current)
                .ok_or_else(|| LoaderError::UnknownClass(current.clone()))?;
            for method in &class_file.methods {
                let name_matches = class_file
                    .method_name(method)
                    .map(|name| name == method_name)
                    .unwrap_or(false);
                let descriptor_matches = class_file
                    .method_descriptor(method)
                    .map(|d| d == descriptor)
                    .unwrap_or(false);
                if name_matches && descriptor_matches {
                    matches.push((Rc::clone(class_file), method.clone()));
                }
            }
            if current == OBJECT_CLASS {
                break;
            }
            let super_name = class_file.super_class_name().map_err(|source| {
                LoaderError::Parse {
                    class: current.clone(),
                    source,
                }
            })?;
            if super_name == OBJECT_CLASS {
                break;
            }
            current = super_name.to_owned();
        }
        Ok(matches)
    }
}
