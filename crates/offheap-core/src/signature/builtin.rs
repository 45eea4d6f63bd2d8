//! Compiled-in pattern set
//!
//! Each entry is the opening instruction sequence of a runtime helper, with
//! operand bytes that move between builds (TLS slots, field offsets, branch
//! displacements) wildcarded.

use super::pattern::BytePattern;
use super::set::{Arch, PatternSet};
use crate::error::Result;

pub const BUILTIN_VERSION: &str = "builtin-1";

/// Fast-path allocation helper used by JIT-compiled code for small objects
pub const TRIAL_ALLOC_FAST: &str = "JIT_TrialAllocSFastMP_InlineGetThread";

/// (routine, label, arch, pattern), in priority order per routine
const BUILTIN_SIGNATURES: &[(&str, &str, Arch, &str)] = &[
    (
        TRIAL_ALLOC_FAST,
        "x64-inline-getthread",
        Arch::X86_64,
        // mov edx,[rcx+4]; mov r11,gs:[tls]; mov r10,[r11+lim]; mov rax,[r11+ptr];
        // add rdx,rax; cmp rdx,r10; ja fail; mov [r11+ptr],rdx; mov [rax],rcx; ret
        "8B 51 04 65 4C 8B 1C 25 ?? ?? ?? ?? 4D 8B 53 ?? 49 8B 43 ?? \
         48 03 D0 49 3B D2 77 ?? 49 89 53 ?? 48 89 08 C3",
    ),
    (
        TRIAL_ALLOC_FAST,
        "x64-tls-index",
        Arch::X86_64,
        // Same body, thread block fetched through the TLS index instead of gs:
        "8B 51 04 4C 8B 1D ?? ?? ?? ?? 65 48 8B 04 25 58 00 00 00 \
         4E 8B 1C D8 4D 8B 53 ?? 49 8B 43 ?? 48 03 D0 49 3B D2 77 ??",
    ),
    (
        TRIAL_ALLOC_FAST,
        "x86-inline-getthread",
        Arch::X86,
        // mov eax,[ecx+4]; push edx; mov edx,fs:[tls]; add eax,[edx+ptr];
        // cmp eax,[edx+lim]; ja fail; mov [edx+ptr],eax; sub eax,[ecx+4];
        // mov [eax],ecx; pop edx; ret
        "8B 41 04 52 64 8B 15 ?? ?? ?? ?? 03 42 ?? 3B 42 ?? 77 ?? \
         89 42 ?? 2B 41 04 89 08 5A C3",
    ),
];

/// Pattern set shipped with the library
pub fn builtin_patterns() -> Result<PatternSet> {
    let mut set = PatternSet::new(BUILTIN_VERSION);
    for (routine, label, arch, pattern) in BUILTIN_SIGNATURES {
        let pattern: BytePattern = pattern.parse()?;
        set = set.with(routine, label, *arch, pattern);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_parse() {
        let set = builtin_patterns().unwrap();
        assert_eq!(set.version, BUILTIN_VERSION);

        let entry = set.entry(TRIAL_ALLOC_FAST).unwrap();
        assert_eq!(entry.signatures.len(), 3);
        // x64 variants are listed before x86
        assert_eq!(entry.signatures[0].arch, Arch::X86_64);
        assert_eq!(entry.signatures[2].arch, Arch::X86);
        assert!(entry.signatures.iter().all(|s| s.pattern.anchor() == Some((0, 0x8B))));
    }

    #[test]
    fn test_builtin_x64_pattern_shape() {
        let set = builtin_patterns().unwrap();
        let first = &set.entry(TRIAL_ALLOC_FAST).unwrap().signatures[0];
        assert_eq!(first.pattern.len(), 36);
        assert_eq!(first.pattern.wildcard_count(), 8);
    }
}
