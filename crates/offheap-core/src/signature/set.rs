use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::pattern::BytePattern;
use crate::error::Result;

/// CPU architecture a pattern was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Arch {
    #[strum(serialize = "x86")]
    #[serde(rename = "x86")]
    X86,
    #[strum(to_string = "x86_64", serialize = "x64")]
    #[serde(rename = "x86_64", alias = "x64")]
    X86_64,
    #[strum(to_string = "aarch64", serialize = "arm64")]
    #[serde(rename = "aarch64", alias = "arm64")]
    Aarch64,
    /// Applies to every architecture
    #[strum(serialize = "any")]
    #[serde(rename = "any")]
    Any,
}

impl Arch {
    /// Architecture of this build
    pub fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else {
            Arch::Any
        }
    }

    /// Whether a pattern tagged `self` should be tried on `target`
    pub fn applies_to(self, target: Arch) -> bool {
        self == Arch::Any || target == Arch::Any || self == target
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineSignature {
    /// Short name of the build variant this pattern was taken from
    pub label: String,
    pub arch: Arch,
    pub pattern: BytePattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineEntry {
    pub name: String,
    /// Tried in listed order
    pub signatures: Vec<RoutineSignature>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSet {
    pub version: String,
    pub entries: Vec<RoutineEntry>,
}

impl PatternSet {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, name: &str) -> Option<&RoutineEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Append a signature to the entry for `name`, creating it if needed
    pub fn push(&mut self, name: &str, signature: RoutineSignature) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.signatures.push(signature),
            None => self.entries.push(RoutineEntry {
                name: name.to_string(),
                signatures: vec![signature],
            }),
        }
    }

    /// Builder-style [`PatternSet::push`]
    pub fn with(mut self, name: &str, label: &str, arch: Arch, pattern: BytePattern) -> Self {
        self.push(
            name,
            RoutineSignature {
                label: label.to_string(),
                arch,
                pattern,
            },
        );
        self
    }

    /// Signatures for `name` that apply to `arch`, in priority order
    pub fn candidates<'a>(
        &'a self,
        name: &str,
        arch: Arch,
    ) -> Option<impl Iterator<Item = &'a RoutineSignature> + 'a> {
        let entry = self.entry(name)?;
        Some(
            entry
                .signatures
                .iter()
                .filter(move |signature| signature.arch.applies_to(arch)),
        )
    }

    pub fn routine_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }
}

pub fn load_patterns<P: AsRef<Path>>(path: P) -> Result<PatternSet> {
    let content = fs::read_to_string(&path)?;
    let data = serde_json::from_str(&content)?;
    Ok(data)
}

pub fn save_patterns<P: AsRef<Path>>(path: P, patterns: &PatternSet) -> Result<()> {
    let content = serde_json::to_string_pretty(patterns)?;
    fs::write(path, content)?;
    Ok(())
}
