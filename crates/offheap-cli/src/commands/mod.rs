//! CLI command implementations.

pub mod layout;
pub mod locate;
pub mod modules;
pub mod patterns;
pub mod scan;

use std::path::Path;

use anyhow::{Context, Result};
use offheap_core::{PatternSet, builtin_patterns, load_patterns};

/// Load a pattern set from `path`, or the builtin set when no path is given
pub fn pattern_set(path: Option<&Path>) -> Result<PatternSet> {
    match path {
        Some(path) => load_patterns(path)
            .with_context(|| format!("Failed to load patterns from {}", path.display())),
        None => Ok(builtin_patterns()?),
    }
}

/// Print `bytes` in hexdump format, labelling rows from `start`
pub fn hexdump(start: usize, bytes: &[u8]) {
    for line in hexdump_lines(start, bytes) {
        println!("{}", line);
    }
}

fn hexdump_lines(start: usize, bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("0x{:04X}:", start + i * 16);
            for (j, byte) in chunk.iter().enumerate() {
                if j == 8 {
                    line.push(' ');
                }
                line.push_str(&format!(" {:02X}", byte));
            }
            line
        })
        .collect()
}
