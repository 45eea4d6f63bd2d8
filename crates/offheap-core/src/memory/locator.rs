//! Locates the managed runtime's core code module in the current process.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::process::{LoadedModule, ModuleEnumerator, ProcessModules};
use super::region::MemoryRegion;
use crate::error::{Error, Result};

/// Module names of the runtime's core library across runtime flavours
pub const DEFAULT_RUNTIME_MODULES: &[&str] = &[
    "clr.dll",
    "coreclr.dll",
    "libcoreclr.so",
    "libcoreclr.dylib",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Allow-list of module names, compared case-insensitively
    pub candidates: Vec<String>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_RUNTIME_MODULES
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl LocatorConfig {
    pub fn with_candidates<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, module_name: &str) -> bool {
        self.candidates
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(module_name))
    }
}

pub struct ModuleLocator<E: ModuleEnumerator = ProcessModules> {
    enumerator: E,
    config: LocatorConfig,
}

impl ModuleLocator<ProcessModules> {
    /// Locator over the current process with the default candidate list
    pub fn new() -> Self {
        Self::with_enumerator(ProcessModules, LocatorConfig::default())
    }
}

impl Default for ModuleLocator<ProcessModules> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ModuleEnumerator> ModuleLocator<E> {
    pub fn with_enumerator(enumerator: E, config: LocatorConfig) -> Self {
        Self { enumerator, config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Find the first loaded module whose name is on the allow-list
    pub fn find_module(&self) -> Result<LoadedModule> {
        let modules = self.enumerator.modules()?;
        debug!("Enumerated {} loaded modules", modules.len());

        modules
            .into_iter()
            .find(|module| self.config.matches(&module.name))
            .ok_or_else(|| Error::ModuleNotFound {
                candidates: self.config.candidates.clone(),
            })
    }

    /// Locate the runtime module and describe its in-memory image.
    ///
    /// The returned region is `'static`: the runtime's core module is never
    /// unloaded while the process runs.
    pub fn locate(&self) -> Result<MemoryRegion<'static>> {
        let module = self.find_module()?;
        info!(
            "Found runtime module {} (base: {:#x}, size: {:#x})",
            module.name, module.base_address, module.size
        );
        // SAFETY: enumerators only report spans that are readable while the module is loaded.
        Ok(unsafe { MemoryRegion::from_raw_parts(module.base_address as *const u8, module.size) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mock::MockModules;
    #[cfg(target_os = "linux")]
    use crate::signature::{BytePattern, scan};

    #[test]
    fn test_finds_candidate_case_insensitively() {
        let modules = MockModules::new()
            .module("ntdll.dll", 0x7ff0_0000_0000, 0x1000)
            .module("CoreCLR.dll", 0x7ff1_0000_0000, 0x4000);
        let locator = ModuleLocator::with_enumerator(modules, LocatorConfig::default());

        let module = locator.find_module().unwrap();
        assert_eq!(module.name, "CoreCLR.dll");
        assert_eq!(module.base_address, 0x7ff1_0000_0000);
        assert_eq!(module.size, 0x4000);
    }

    #[test]
    fn test_first_listed_module_wins() {
        let modules = MockModules::new()
            .module("clr.dll", 0x1000_0000, 0x2000)
            .module("coreclr.dll", 0x2000_0000, 0x2000);
        let locator = ModuleLocator::with_enumerator(modules, LocatorConfig::default());
        assert_eq!(locator.find_module().unwrap().name, "clr.dll");
    }

    #[test]
    fn test_missing_module_is_fatal() {
        let modules = MockModules::new().module("kernel32.dll", 0x1000, 0x1000);
        let locator = ModuleLocator::with_enumerator(modules, LocatorConfig::default());

        let err = locator.locate().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, Error::ModuleNotFound { ref candidates } if candidates.len() == 4));
    }

    #[test]
    fn test_custom_candidates() {
        let modules = MockModules::new().module("libmonosgen-2.0.so", 0x4000, 0x800);
        let config = LocatorConfig::with_candidates(["libmonosgen-2.0.so"]);
        let locator = ModuleLocator::with_enumerator(modules, config);
        assert_eq!(locator.find_module().unwrap().base_address, 0x4000);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_located_region_is_scannable() {
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().into_owned();
        let locator =
            ModuleLocator::with_enumerator(ProcessModules, LocatorConfig::with_candidates([name]));

        let region = locator.locate().unwrap();
        assert!(!region.is_empty());

        // Walks every byte of the code span.
        let pattern: BytePattern = "DE AD BE EF ?? 0B AD F0 0D ?? FE ED FA CE".parse().unwrap();
        let _ = scan(&region, &pattern);
    }
}
