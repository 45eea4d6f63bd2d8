use crate::error::Result;
#[cfg(any(target_os = "windows", target_os = "linux"))]
use crate::error::Error;

/// A module mapped into the current process.
///
/// `base_address..end_address()` is readable for as long as the module stays
/// loaded. On Linux this is the module's code span, not the whole file image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    pub base_address: usize,
    pub size: usize,
}

impl LoadedModule {
    pub fn end_address(&self) -> usize {
        self.base_address + self.size
    }
}

/// Source of the module list for the current process.
///
/// Every reported span must be readable while its module stays loaded.
pub trait ModuleEnumerator {
    fn modules(&self) -> Result<Vec<LoadedModule>>;
}

/// Enumerates the modules of the running process using the OS facility.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessModules;

impl ModuleEnumerator for ProcessModules {
    #[cfg(target_os = "windows")]
    fn modules(&self) -> Result<Vec<LoadedModule>> {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Diagnostics::ToolHelp::{
            CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW,
            TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
        };

        // SAFETY: a module snapshot of pid 0 (the current process) has no preconditions.
        let snapshot =
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, 0) }
                .map_err(|e| Error::ModuleEnumerationFailed(e.to_string()))?;

        let mut entry = MODULEENTRY32W {
            dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };

        let mut modules = Vec::new();
        // SAFETY: snapshot is a valid module snapshot and entry.dwSize is set.
        let mut next = unsafe { Module32FirstW(snapshot, &mut entry) };
        while next.is_ok() {
            let len = entry
                .szModule
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(entry.szModule.len());
            modules.push(LoadedModule {
                name: String::from_utf16_lossy(&entry.szModule[..len]),
                base_address: entry.modBaseAddr as usize,
                size: entry.modBaseSize as usize,
            });
            // SAFETY: same snapshot and entry as above.
            next = unsafe { Module32NextW(snapshot, &mut entry) };
        }

        // SAFETY: snapshot was returned by CreateToolhelp32Snapshot and is closed once.
        unsafe {
            let _ = CloseHandle(snapshot);
        }

        Ok(modules)
    }

    #[cfg(target_os = "linux")]
    fn modules(&self) -> Result<Vec<LoadedModule>> {
        let maps = std::fs::read_to_string("/proc/self/maps")
            .map_err(|e| Error::ModuleEnumerationFailed(format!("/proc/self/maps: {}", e)))?;
        Ok(parse_proc_maps(&maps))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    fn modules(&self) -> Result<Vec<LoadedModule>> {
        tracing::warn!("Module enumeration is not supported on this platform");
        Ok(Vec::new())
    }
}

/// One line of `/proc/<pid>/maps` backed by a file
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
struct Mapping {
    start: usize,
    end: usize,
    readable: bool,
    executable: bool,
}

/// Parse `/proc/<pid>/maps` into one entry per mapped file.
///
/// A shared object is often mapped with `---p` holes between its segments,
/// so the whole file span is not safe to read. Each file is reported as the
/// first run of adjacent readable mappings that contains executable code,
/// or its first readable run when nothing is executable. Files without a
/// readable mapping are skipped. Entries keep the order of first appearance.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_maps(maps: &str) -> Vec<LoadedModule> {
    let mut files: Vec<(String, Vec<Mapping>)> = Vec::new();

    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let (Some(range), Some(perms)) = (fields.next(), fields.next()) else {
            continue;
        };
        // offset, dev, inode
        let path: Vec<&str> = fields.skip(3).collect();
        if path.is_empty() || !path[0].starts_with('/') {
            continue;
        }
        let path = path.join(" ");

        let Some((start, end)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            usize::from_str_radix(start, 16),
            usize::from_str_radix(end, 16),
        ) else {
            continue;
        };

        let mapping = Mapping {
            start,
            end,
            readable: perms.starts_with('r'),
            executable: perms.as_bytes().get(2) == Some(&b'x'),
        };
        match files.iter_mut().find(|(p, _)| *p == path) {
            Some((_, mappings)) => mappings.push(mapping),
            None => files.push((path, vec![mapping])),
        }
    }

    files
        .into_iter()
        .filter_map(|(path, mut mappings)| {
            mappings.sort_by_key(|m| m.start);
            let (start, end) = readable_span(&mappings)?;
            Some(LoadedModule {
                name: path.rsplit('/').next().unwrap_or(&path).to_string(),
                base_address: start,
                size: end - start,
            })
        })
        .collect()
}

/// Pick the readable run to report for one file's address-sorted mappings
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn readable_span(mappings: &[Mapping]) -> Option<(usize, usize)> {
    let mut runs: Vec<(usize, usize, bool)> = Vec::new();

    for mapping in mappings.iter().filter(|m| m.readable) {
        match runs.last_mut() {
            Some((_, end, executable)) if *end == mapping.start => {
                *end = mapping.end;
                *executable |= mapping.executable;
            }
            _ => runs.push((mapping.start, mapping.end, mapping.executable)),
        }
    }

    runs.iter()
        .find(|(_, _, executable)| *executable)
        .or_else(|| runs.first())
        .map(|&(start, end, _)| (start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "\
55d4c0a00000-55d4c0a02000 r--p 00000000 08:01 131 /usr/bin/dotnet
55d4c0a02000-55d4c0a10000 r-xp 00002000 08:01 131 /usr/bin/dotnet
7f1a20000000-7f1a20021000 rw-p 00000000 00:00 0
7f1a30000000-7f1a30100000 r--p 00000000 08:01 900 /usr/share/dotnet/shared/libcoreclr.so
7f1a30100000-7f1a30500000 r-xp 00100000 08:01 900 /usr/share/dotnet/shared/libcoreclr.so
7f1a30500000-7f1a30520000 rw-p 00500000 08:01 900 /usr/share/dotnet/shared/libcoreclr.so
7ffd10000000-7ffd10021000 rw-p 00000000 00:00 0 [stack]
";

    #[test]
    fn test_parse_proc_maps_coalesces_mappings() {
        let modules = parse_proc_maps(MAPS);
        assert_eq!(modules.len(), 2);

        assert_eq!(modules[0].name, "dotnet");
        assert_eq!(modules[0].base_address, 0x55d4c0a00000);
        assert_eq!(modules[0].size, 0x10000);

        assert_eq!(modules[1].name, "libcoreclr.so");
        assert_eq!(modules[1].base_address, 0x7f1a30000000);
        assert_eq!(modules[1].end_address(), 0x7f1a30520000);
    }

    #[test]
    fn test_parse_proc_maps_skips_protection_gaps() {
        // Segments aligned past the page size leave PROT_NONE holes.
        let maps = "\
7f5a00000000-7f5a00010000 r--p 00000000 08:01 42 /opt/dotnet/libcoreclr.so
7f5a00010000-7f5a00200000 ---p 00010000 08:01 42 /opt/dotnet/libcoreclr.so
7f5a00200000-7f5a00600000 r-xp 00200000 08:01 42 /opt/dotnet/libcoreclr.so
7f5a00600000-7f5a00800000 ---p 00600000 08:01 42 /opt/dotnet/libcoreclr.so
7f5a00800000-7f5a00840000 r--p 00800000 08:01 42 /opt/dotnet/libcoreclr.so
7f5a00840000-7f5a00850000 rw-p 00840000 08:01 42 /opt/dotnet/libcoreclr.so
";
        let modules = parse_proc_maps(maps);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "libcoreclr.so");
        assert_eq!(modules[0].base_address, 0x7f5a00200000);
        assert_eq!(modules[0].end_address(), 0x7f5a00600000);
    }

    #[test]
    fn test_parse_proc_maps_joins_adjacent_readable_segments() {
        let maps = "\
7f5a00000000-7f5a00001000 r--p 00000000 08:01 9 /usr/lib/libdata.so
7f5a00001000-7f5a00002000 rw-p 00001000 08:01 9 /usr/lib/libdata.so
7f5a00002000-7f5a00003000 ---p 00002000 08:01 9 /usr/lib/libdata.so
7f5a00003000-7f5a00004000 r--p 00003000 08:01 9 /usr/lib/libdata.so
7f5b00000000-7f5b00001000 ---p 00000000 08:01 10 /usr/lib/libnone.so
";
        let modules = parse_proc_maps(maps);
        // No executable run: the first readable run is reported.
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "libdata.so");
        assert_eq!(modules[0].base_address, 0x7f5a00000000);
        assert_eq!(modules[0].size, 0x2000);
    }

    #[test]
    fn test_parse_proc_maps_keeps_spaces_in_path() {
        let maps = "7f0000000000-7f0000001000 r-xp 00000000 08:01 7 /opt/my runtime/libcoreclr.so\n";
        let modules = parse_proc_maps(maps);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "libcoreclr.so");
    }

    #[cfg(any(target_os = "windows", target_os = "linux"))]
    #[test]
    fn test_process_modules_lists_something() {
        let modules = ProcessModules.modules().unwrap();
        assert!(!modules.is_empty());
        assert!(modules.iter().all(|m| m.size > 0));
    }
}
