//! Transaction builder for jail_set/jail_get calls
//!
//! A [`Transaction`] is the ordered, name-unique list of bindings handed to
//! one kernel call. It owns every buffer it allocates and drops them all in
//! [`Transaction::release`], which also runs on drop.

use super::codec;
use super::registry::{self, Descriptor, ParamType};
use super::types::{FromParam, ParamValue};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Whether the kernel reads a binding, or only writes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Filled by the kernel on return
    OutputOnly,
    /// Carries a value in, may be overwritten on return
    InputOutput,
}

/// One named value in a transaction
#[derive(Debug)]
pub struct Binding {
    desc: &'static Descriptor,
    direction: Direction,
    value: Vec<u8>,
    raw: bool,
}

impl Binding {
    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    pub fn kind(&self) -> ParamType {
        self.desc.kind
    }

    pub fn descriptor(&self) -> &'static Descriptor {
        self.desc
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Set on every input binding: the bytes are the literal value and must
    /// not go through any textual import on the kernel side.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Current contents, truncated to the length reported by the kernel
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Buffer the kernel bridge writes response data into
    pub fn buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.value
    }
}

/// Ordered set of parameter bindings for a single kernel call
#[derive(Debug, Default)]
pub struct Transaction {
    bindings: Vec<Binding>,
    index: HashMap<&'static str, usize>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, binding: Binding) -> Result<()> {
        let name = binding.name();
        if self.index.contains_key(name) {
            return Err(Error::DuplicateBinding(name.to_string()));
        }

        self.index.insert(name, self.bindings.len());
        self.bindings.push(binding);
        Ok(())
    }

    /// Register a parameter for output capture
    pub fn bind_output(&mut self, name: &str) -> Result<()> {
        let desc = registry::descriptor(name)?;
        self.push(Binding {
            desc,
            direction: Direction::OutputOnly,
            value: vec![0; desc.capacity],
            raw: false,
        })
    }

    /// Register several parameters for output capture, in order
    pub fn bind_outputs(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            self.bind_output(name)?;
        }
        Ok(())
    }

    /// Encode a value and bind it as an input
    pub fn bind_input(&mut self, name: &str, value: impl Into<ParamValue>) -> Result<()> {
        let desc = registry::descriptor(name)?;
        if self.index.contains_key(desc.name) {
            return Err(Error::DuplicateBinding(name.to_string()));
        }

        let value = codec::encode(desc, &value.into())?;
        self.push(Binding {
            desc,
            direction: Direction::InputOutput,
            value,
            raw: true,
        })
    }

    /// Decode the returned bytes of a bound parameter
    pub fn grab<T: FromParam>(&self, name: &str) -> Result<T> {
        let binding = self.binding(name).ok_or_else(|| {
            Error::UnknownParameter(format!("{} (not bound in this transaction)", name))
        })?;

        let value = codec::decode(binding.desc, &binding.value)?;
        T::from_param(binding.desc, value)
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.index.get(name).map(|&i| &self.bindings[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut [Binding] {
        &mut self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every buffer this transaction allocated
    ///
    /// Safe to call more than once.
    pub fn release(&mut self) {
        self.bindings.clear();
        self.index.clear();
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.release();
    }
}
