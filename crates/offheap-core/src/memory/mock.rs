//! Test doubles for module enumeration and scannable memory

use super::process::{LoadedModule, ModuleEnumerator};
use crate::error::Result;

/// Fixed module list standing in for the process module table
#[derive(Debug, Clone, Default)]
pub struct MockModules {
    modules: Vec<LoadedModule>,
}

impl MockModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, name: &str, base_address: usize, size: usize) -> Self {
        self.modules.push(LoadedModule {
            name: name.to_string(),
            base_address,
            size,
        });
        self
    }
}

impl ModuleEnumerator for MockModules {
    fn modules(&self) -> Result<Vec<LoadedModule>> {
        Ok(self.modules.clone())
    }
}

/// Builder for fabricated code images
#[derive(Debug, Clone)]
pub struct MockImageBuilder {
    bytes: Vec<u8>,
}

impl MockImageBuilder {
    /// Image of `size` bytes filled with `int3` padding
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0xCC; size],
        }
    }

    pub fn fill(mut self, value: u8) -> Self {
        self.bytes.fill(value);
        self
    }

    pub fn write(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}
