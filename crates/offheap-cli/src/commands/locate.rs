//! Locate command implementation.
//!
//! Finds the runtime's core module in this process and resolves a routine
//! in it. Only useful when the runtime is loaded into the same process, for
//! example when the tool is injected or hosted.

use anyhow::Result;
use offheap_core::{
    LocatorConfig, ModuleLocator, ProcessModules, SignatureScanner, builtin_patterns,
    runtime_scanner,
};

/// Run the locate command
pub fn run(routine: &str, modules: &[String]) -> Result<()> {
    let result = if modules.is_empty() {
        runtime_scanner()?.find_routine(routine)?
    } else {
        let locator =
            ModuleLocator::with_enumerator(ProcessModules, LocatorConfig::with_candidates(modules));
        let region = locator.locate()?;
        SignatureScanner::new(region, builtin_patterns()?).find_routine(routine)?
    };

    println!("{} = 0x{:X}", routine, result.address);
    println!("  module offset: 0x{:X}", result.offset);
    println!("  signature:     {}", result.label);

    Ok(())
}
