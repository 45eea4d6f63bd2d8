//! Signature scanner over a module image

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::{debug, info, warn};

use super::builtin::builtin_patterns;
use super::pattern::BytePattern;
use super::set::{Arch, PatternSet};
use crate::error::{Error, Result};
use crate::memory::{MemoryRegion, ModuleLocator};

/// A resolved routine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub address: usize,
    /// Offset of `address` from the region base
    pub offset: usize,
    /// Label of the signature that matched
    pub label: String,
    pub pattern: BytePattern,
}

/// Find the lowest offset in `region` where `pattern` matches.
///
/// Only start offsets `0..=size - pattern.len()` are considered, so no byte
/// past the end of the region is read.
pub fn scan(region: &MemoryRegion<'_>, pattern: &BytePattern) -> Option<usize> {
    let haystack = region.as_bytes();
    let len = pattern.len();
    if len == 0 || haystack.len() < len {
        return None;
    }
    let last = haystack.len() - len;

    let Some((anchor, value)) = pattern.anchor() else {
        return Some(0);
    };

    // Only offsets whose anchor byte matches can match the whole pattern
    memchr::memchr_iter(value, &haystack[anchor..=last + anchor])
        .find(|&start| pattern.matches(&haystack[start..start + len]))
}

type CacheSlot = Arc<Mutex<Option<ScanResult>>>;

pub struct SignatureScanner<'a> {
    region: MemoryRegion<'a>,
    patterns: PatternSet,
    arch: Arch,
    cache: Mutex<HashMap<String, CacheSlot>>,
    scans: AtomicUsize,
}

impl<'a> SignatureScanner<'a> {
    /// Scanner trying the patterns for the architecture of this build
    pub fn new(region: MemoryRegion<'a>, patterns: PatternSet) -> Self {
        Self::with_arch(region, patterns, Arch::current())
    }

    pub fn with_arch(region: MemoryRegion<'a>, patterns: PatternSet, arch: Arch) -> Self {
        Self {
            region,
            patterns,
            arch,
            cache: Mutex::new(HashMap::new()),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn region(&self) -> &MemoryRegion<'a> {
        &self.region
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Number of single-pattern scans performed so far
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    /// Previously resolved result for `name`, without scanning
    pub fn cached(&self, name: &str) -> Option<ScanResult> {
        let slot = self.lock_cache().get(&cache_key(name)).cloned()?;
        let result = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
        result
    }

    /// Resolve a named routine, scanning at most once per name.
    ///
    /// Concurrent callers for the same name wait for the scan in flight and
    /// observe its result. Misses are not cached.
    pub fn find_routine(&self, name: &str) -> Result<ScanResult> {
        let candidates = self
            .patterns
            .candidates(name, self.arch)
            .ok_or_else(|| Error::UnknownRoutine(name.to_string()))?;

        let slot = self.lock_cache().entry(cache_key(name)).or_default().clone();
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(result) = cached.as_ref() {
            debug!("{}: cached at {:#x}", name, result.address);
            return Ok(result.clone());
        }

        let mut tried = 0;
        for signature in candidates {
            tried += 1;
            self.scans.fetch_add(1, Ordering::Relaxed);

            let Some(offset) = scan(&self.region, &signature.pattern) else {
                debug!(
                    "{}: signature {} ({}) did not match",
                    name, signature.label, signature.pattern
                );
                continue;
            };

            let result = ScanResult {
                address: self.region.base_address() + offset,
                offset,
                label: signature.label.clone(),
                pattern: signature.pattern.clone(),
            };
            info!(
                "{}: found at {:#x} (offset {:#x}, signature: {})",
                name, result.address, offset, signature.label
            );
            *cached = Some(result.clone());
            return Ok(result);
        }

        warn!(
            "{}: no signature matched ({} tried for {})",
            name, tried, self.arch
        );
        Err(Error::RoutineNotFound {
            name: name.to_string(),
            tried,
        })
    }

    /// Address of a named routine
    pub fn find_address(&self, name: &str) -> Result<usize> {
        self.find_routine(name).map(|result| result.address)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheSlot>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SignatureScanner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureScanner")
            .field("region", &self.region)
            .field("arch", &self.arch)
            .field("patterns", &self.patterns.version)
            .field("scans", &self.scan_count())
            .finish()
    }
}

fn cache_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

static RUNTIME_SCANNER: OnceLock<SignatureScanner<'static>> = OnceLock::new();

/// Process-wide scanner over the runtime's core module with the builtin
/// pattern set.
///
/// The module is located on first use. A failed location is returned as a
/// fatal error and retried on the next call.
pub fn runtime_scanner() -> Result<&'static SignatureScanner<'static>> {
    if let Some(scanner) = RUNTIME_SCANNER.get() {
        return Ok(scanner);
    }

    let region = ModuleLocator::new().locate()?;
    let scanner = SignatureScanner::new(region, builtin_patterns()?);
    Ok(RUNTIME_SCANNER.get_or_init(|| scanner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockImageBuilder;

    const TARGET: [u8; 6] = [0x48, 0x11, 0x8B, 0x22, 0x33, 0xC3];

    fn target_set() -> PatternSet {
        PatternSet::new("test").with(
            "target",
            "generic",
            Arch::Any,
            "48 ?? 8B ?? ?? C3".parse().unwrap(),
        )
    }

    fn naive_scan(haystack: &[u8], pattern: &BytePattern) -> Option<usize> {
        if haystack.len() < pattern.len() {
            return None;
        }
        (0..=haystack.len() - pattern.len())
            .find(|&i| pattern.matches(&haystack[i..i + pattern.len()]))
    }

    #[test]
    fn test_first_match_wins() {
        let image = MockImageBuilder::new(64 * 1024)
            .write(4096, &TARGET)
            .build();
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), target_set());
        assert_eq!(scanner.find_routine("target").unwrap().offset, 4096);

        let image = MockImageBuilder::new(64 * 1024)
            .write(4096, &TARGET)
            .write(8192, &[0x48, 0xAA, 0x8B, 0xBB, 0xCC, 0xC3])
            .build();
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), target_set());
        let result = scanner.find_routine("target").unwrap();
        assert_eq!(result.offset, 4096);
        assert_eq!(result.address, image.as_ptr() as usize + 4096);
        assert_eq!(result.label, "generic");

        let image = MockImageBuilder::new(64 * 1024).build();
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), target_set());
        let err = scanner.find_routine("target").unwrap_err();
        assert!(matches!(err, Error::RoutineNotFound { tried: 1, .. }));
    }

    #[test]
    fn test_cache_is_idempotent() {
        let image = MockImageBuilder::new(64 * 1024)
            .write(4096, &TARGET)
            .build();
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), target_set());

        assert!(scanner.cached("target").is_none());
        let first = scanner.find_routine("target").unwrap();
        assert_eq!(scanner.scan_count(), 1);

        let second = scanner.find_routine("TARGET").unwrap();
        assert_eq!(first, second);
        assert_eq!(scanner.scan_count(), 1);
        assert_eq!(scanner.cached("target"), Some(first));
    }

    #[test]
    fn test_misses_are_not_cached() {
        let image = MockImageBuilder::new(4096).build();
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), target_set());

        assert!(scanner.find_routine("target").is_err());
        assert!(scanner.find_routine("target").is_err());
        assert_eq!(scanner.scan_count(), 2);
        assert!(scanner.cached("target").is_none());
    }

    #[test]
    fn test_unknown_routine_is_distinct() {
        let image = MockImageBuilder::new(4096).build();
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), target_set());

        let err = scanner.find_routine("does_not_exist").unwrap_err();
        assert!(matches!(err, Error::UnknownRoutine(_)));
        assert_eq!(scanner.scan_count(), 0);
    }

    #[test]
    fn test_unknown_routines_leave_no_cache_slot() {
        let image = MockImageBuilder::new(4096).build();
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), target_set());

        for i in 0..16 {
            assert!(scanner.find_routine(&format!("missing_{}", i)).is_err());
        }
        assert!(scanner.lock_cache().is_empty());
        assert!(scanner.cached("missing_0").is_none());
    }

    #[test]
    fn test_debug_shows_arch_and_pattern_version() {
        let image = MockImageBuilder::new(64).build();
        let scanner =
            SignatureScanner::with_arch(MemoryRegion::from_slice(&image), target_set(), Arch::X86);

        let text = format!("{:?}", scanner);
        assert!(text.contains("SignatureScanner"));
        assert!(text.contains("X86"));
        assert!(text.contains("\"test\""));
    }

    #[test]
    fn test_patterns_tried_in_listed_order() {
        let image = MockImageBuilder::new(1024)
            .write(100, &[0xAA, 0xBB])
            .write(500, &[0x11, 0x22])
            .build();
        let set = PatternSet::new("test")
            .with("r", "late", Arch::Any, "11 22".parse().unwrap())
            .with("r", "early", Arch::Any, "AA BB".parse().unwrap());
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), set);

        let result = scanner.find_routine("r").unwrap();
        assert_eq!(result.label, "late");
        assert_eq!(result.offset, 500);
        assert_eq!(scanner.scan_count(), 1);
    }

    #[test]
    fn test_arch_filter_skips_foreign_patterns() {
        let image = MockImageBuilder::new(1024)
            .write(10, &[0x8B, 0x41, 0x04])
            .write(20, &[0x8B, 0x51, 0x04])
            .build();
        let set = PatternSet::new("test")
            .with("alloc", "x86", Arch::X86, "8B 41 04".parse().unwrap())
            .with("alloc", "x64", Arch::X86_64, "8B 51 04".parse().unwrap());

        let x64 = SignatureScanner::with_arch(MemoryRegion::from_slice(&image), set.clone(), Arch::X86_64);
        assert_eq!(x64.find_routine("alloc").unwrap().label, "x64");

        let x86 = SignatureScanner::with_arch(MemoryRegion::from_slice(&image), set.clone(), Arch::X86);
        assert_eq!(x86.find_routine("alloc").unwrap().label, "x86");

        let arm = SignatureScanner::with_arch(MemoryRegion::from_slice(&image), set, Arch::Aarch64);
        assert!(matches!(
            arm.find_routine("alloc").unwrap_err(),
            Error::RoutineNotFound { tried: 0, .. }
        ));
    }

    #[test]
    fn test_scan_edges() {
        let pattern: BytePattern = "48 ?? C3".parse().unwrap();

        // match flush against the end of the region
        let data = [0x00, 0x00, 0x48, 0x99, 0xC3];
        assert_eq!(scan(&MemoryRegion::from_slice(&data), &pattern), Some(2));

        // truncated match at the end is not reported
        let data = [0x00, 0x00, 0x00, 0x48, 0x99];
        assert_eq!(scan(&MemoryRegion::from_slice(&data), &pattern), None);

        // region shorter than the pattern
        assert_eq!(scan(&MemoryRegion::from_slice(&[0x48]), &pattern), None);
        assert_eq!(scan(&MemoryRegion::from_slice(&[]), &pattern), None);

        // leading wildcards
        let pattern: BytePattern = "?? ?? C3".parse().unwrap();
        assert_eq!(scan(&MemoryRegion::from_slice(&[0xC3, 0x01, 0x02, 0xC3]), &pattern), Some(1));

        let all_wild: BytePattern = "?? ??".parse().unwrap();
        assert_eq!(scan(&MemoryRegion::from_slice(&[0x01, 0x02]), &all_wild), Some(0));
        assert_eq!(scan(&MemoryRegion::from_slice(&[0x01]), &all_wild), None);
    }

    #[test]
    fn test_scan_agrees_with_naive_search() {
        // xorshift so the data is reproducible
        let mut state = 0x2545_F491_4F6C_DD1D_u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let patterns: Vec<BytePattern> = ["01 ?? 02", "?? 03", "00 00", "?? 01 ?? 01 ??", "03"]
            .iter()
            .map(|p| p.parse().unwrap())
            .collect();

        for _ in 0..200 {
            let len = (next() % 64) as usize;
            let data: Vec<u8> = (0..len).map(|_| (next() % 4) as u8).collect();
            let region = MemoryRegion::from_slice(&data);

            for pattern in &patterns {
                assert_eq!(scan(&region, pattern), naive_scan(&data, pattern));
            }
        }
    }

    #[test]
    fn test_concurrent_queries_scan_once() {
        let image = MockImageBuilder::new(256 * 1024)
            .write(200_000, &TARGET)
            .build();
        let scanner = SignatureScanner::new(MemoryRegion::from_slice(&image), target_set());

        let results: Vec<ScanResult> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| scanner.find_routine("target").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|r| r.offset == 200_000));
        assert_eq!(scanner.scan_count(), 1);
    }

    #[test]
    fn test_runtime_scanner_without_runtime_is_fatal() {
        // The test binary never loads the runtime's core module.
        let err = runtime_scanner().unwrap_err();
        assert!(err.is_fatal());
        assert!(RUNTIME_SCANNER.get().is_none());
    }
}
