//! Scan command implementation.
//!
//! Runs the signature scanner over a module image read from disk. Offsets
//! are file offsets, which only equal in-memory offsets for images that are
//! mapped flat.

use std::path::Path;

use anyhow::{Context, Result, bail};
use offheap_core::{Arch, MemoryRegion, SignatureScanner};
use tracing::debug;

use super::{hexdump, pattern_set};

/// Run the scan command
pub fn run(file: &Path, routine: &str, patterns: Option<&Path>, arch: Option<Arch>) -> Result<()> {
    let image =
        std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    if image.is_empty() {
        bail!("{} is empty", file.display());
    }

    let patterns = pattern_set(patterns)?;
    let arch = arch.unwrap_or_else(Arch::current);
    debug!("Using pattern set {} for {}", patterns.version, arch);
    let scanner = SignatureScanner::with_arch(MemoryRegion::from_slice(&image), patterns, arch);

    println!(
        "Scanning {} ({} bytes) for {} [{}]",
        file.display(),
        image.len(),
        routine,
        arch
    );

    let result = scanner.find_routine(routine)?;
    println!();
    println!("Found at offset 0x{:X} via {}", result.offset, result.label);
    println!("Pattern: {}", result.pattern);
    println!();

    let bytes = &image[result.offset..result.offset + result.pattern.len()];
    hexdump(result.offset, bytes);

    Ok(())
}
