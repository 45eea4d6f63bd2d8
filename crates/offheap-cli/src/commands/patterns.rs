//! Patterns command implementation.

use std::path::Path;

use anyhow::Result;
use offheap_core::{builtin_patterns, save_patterns};

/// Run the patterns command
pub fn run(output: Option<&Path>) -> Result<()> {
    let patterns = builtin_patterns()?;

    if let Some(path) = output {
        save_patterns(path, &patterns)?;
        println!("Pattern set {} written to {}", patterns.version, path.display());
        return Ok(());
    }

    println!("Pattern set {}", patterns.version);
    for entry in &patterns.entries {
        println!();
        println!("{}:", entry.name);
        for (i, signature) in entry.signatures.iter().enumerate() {
            println!(
                "  {}. {} [{}] {} bytes, {} wildcard(s)",
                i + 1,
                signature.label,
                signature.arch,
                signature.pattern.len(),
                signature.pattern.wildcard_count()
            );
            println!("     {}", signature.pattern);
        }
    }

    Ok(())
}
