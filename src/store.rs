//! Named variable storage.
//!
//! Values live in a slot arena owned by the store. The name index only ever
//! holds [`ValueHandle`]s into that arena, so releasing a value and dropping
//! the index are independent of each other.

use crate::error::{Error, Result};
use crate::index::Tree;
use crate::types::Value;
use tracing::debug;

/// Non-owning reference to a value held by a [`VarStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueHandle(usize);

#[derive(Debug, Default)]
pub struct VarStore {
    slots: Vec<Option<Value>>,
    index: Tree<String, ValueHandle>,
    live: usize,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a variable holding a zeroed value of `type_name`.
    ///
    /// A name whose value was released is bound to a fresh value in its old
    /// slot; a name with a live value is rejected.
    pub fn define(&mut self, name: &str, type_name: &str) -> Result<ValueHandle> {
        let value = Value::new(type_name)?;

        if let Some(handle) = self.lookup(name) {
            let slot = &mut self.slots[handle.0];
            if slot.is_some() {
                return Err(Error::DuplicateKey(name.to_string()));
            }
            *slot = Some(value);
            self.live += 1;
            debug!("Redefined variable '{}' as {}", name, type_name);
            return Ok(handle);
        }

        let handle = ValueHandle(self.slots.len());
        self.index
            .insert(name.to_string(), handle)
            .map_err(|dup| Error::DuplicateKey(dup.key))?;
        self.slots.push(Some(value));
        self.live += 1;

        debug!("Defined variable '{}' as {}", name, type_name);
        Ok(handle)
    }

    /// Resolve a name to its handle
    pub fn lookup(&self, name: &str) -> Option<ValueHandle> {
        self.index.find_by(|key| name.cmp(key.as_str())).copied()
    }

    pub fn get(&self, handle: ValueHandle) -> Result<&Value> {
        self.slots
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidHandle)
    }

    pub fn get_mut(&mut self, handle: ValueHandle) -> Result<&mut Value> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidHandle)
    }

    /// Destroy the value behind `handle`.
    ///
    /// The name stays indexed and resolves to a vacant slot until it is
    /// defined again.
    pub fn release(&mut self, handle: ValueHandle) -> Result<()> {
        let slot = self.slots.get_mut(handle.0).ok_or(Error::InvalidHandle)?;
        slot.take().ok_or(Error::InvalidHandle)?;
        self.live -= 1;
        Ok(())
    }

    /// Look up a variable by name and render its value
    pub fn format(&self, name: &str) -> Result<String> {
        let handle = self
            .lookup(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
        self.get(handle)?.format()
    }

    /// Names with a live value, in index order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.index
            .iter()
            .filter(move |(_, handle)| matches!(self.slots.get(handle.0), Some(Some(_))))
            .map(|(name, _)| name.as_str())
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
