//! Modules command implementation.
//!
//! Lists every module mapped into the current process and marks the ones
//! the runtime locator would accept.

use anyhow::Result;
use offheap_core::{LocatorConfig, ModuleEnumerator, ProcessModules};

/// Run the modules command
pub fn run(filter: Option<&str>) -> Result<()> {
    let config = LocatorConfig::default();
    let filter = filter.map(str::to_ascii_lowercase);

    let modules = ProcessModules.modules()?;
    let shown: Vec<_> = modules
        .iter()
        .filter(|m| {
            filter
                .as_deref()
                .is_none_or(|f| m.name.to_ascii_lowercase().contains(f))
        })
        .collect();

    println!("{} module(s) loaded, {} shown:", modules.len(), shown.len());
    println!();
    println!("{:<18} {:<10} Name", "Base", "Size");
    for module in shown {
        let marker = if config.matches(&module.name) {
            "  [runtime]"
        } else {
            ""
        };
        println!(
            "0x{:<16X} 0x{:<8X} {}{}",
            module.base_address, module.size, module.name, marker
        );
    }

    Ok(())
}
