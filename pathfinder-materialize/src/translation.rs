// SPDX-License-Identifier: Apache-2.0

//! Byte-precise original-address-range -> mapped-address-range table (spec
//! §3 "Simulated Filesystem State", §4.7 `RegisterFile`/`UnregisterFile`).

use std::collections::BTreeMap;
use std::path::PathBuf;

/// One live `mmap`ed region: the file it backs, its original (trace-side)
/// address range, and the base address the region was actually mapped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    pub path: PathBuf,
    pub original_start: u64,
    pub len: u64,
    pub mapped_base: usize,
}

impl MappedRegion {
    pub fn original_end(&self) -> u64 {
        self.original_start + self.len
    }

    /// Translates an original-address-space offset into this region's
    /// mapped base address. Caller must have already checked containment.
    pub fn translate(&self, address: u64) -> usize {
        self.mapped_base + (address - self.original_start) as usize
    }
}

/// Maps `RegisterFile` original address ranges to live `mmap` bases, split
/// on partial `UnregisterFile` (spec §3, §4.7).
#[derive(Debug, Default)]
pub struct TranslationTable {
    regions: BTreeMap<u64, MappedRegion>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: PathBuf, original_start: u64, len: u64, mapped_base: usize) {
        self.regions.insert(original_start, MappedRegion { path, original_start, len, mapped_base });
    }

    /// Finds the region containing `address`, if any.
    pub fn locate(&self, address: u64) -> Option<&MappedRegion> {
        self.regions.range(..=address).next_back().filter(|(_, r)| address < r.original_end())
    }

    pub fn translate(&self, address: u64) -> Option<usize> {
        self.locate(address).map(|r| r.translate(address))
    }

    /// Removes `[address, address+len)` from the table, splitting the
    /// owning region if the removal is partial (spec §4.7 `UnregisterFile`).
    /// Returns the `MappedRegion`s that must be `munmap`ped to honor this
    /// unregister: a whole region if fully covered, otherwise a synthetic
    /// region describing just the removed sub-range.
    pub fn unregister(&mut self, address: u64, len: u64) -> Vec<MappedRegion> {
        let end = address + len;
        let Some((&start, _)) = self.regions.range(..=address).next_back().filter(|(_, r)| address < r.original_end()) else {
            return Vec::new();
        };
        let region = match self.regions.remove(&start) {
            Some(r) => r,
            None => return Vec::new(),
        };

        let mut removed = Vec::new();
        if address <= region.original_start && end >= region.original_end() {
            // fully covered
            removed.push(region);
            return removed;
        }

        if region.original_start < address {
            let left_len = address - region.original_start;
            self.regions.insert(
                region.original_start,
                MappedRegion { path: region.path.clone(), original_start: region.original_start, len: left_len, mapped_base: region.mapped_base },
            );
        }
        if end < region.original_end() {
            let right_len = region.original_end() - end;
            self.regions.insert(
                end,
                MappedRegion { path: region.path.clone(), original_start: end, len: right_len, mapped_base: region.translate(end) },
            );
        }
        let removed_start = address.max(region.original_start);
        let removed_end = end.min(region.original_end());
        let removed_mapped_base = region.translate(removed_start);
        removed.push(MappedRegion {
            path: region.path,
            original_start: removed_start,
            len: removed_end - removed_start,
            mapped_base: removed_mapped_base,
        });
        removed
    }

    pub fn regions(&self) -> impl Iterator<Item = &MappedRegion> {
        self.regions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_within_region() {
        let mut t = TranslationTable::new();
        t.register(PathBuf::from("/f"), 0x1000, 0x100, 0x7f0000000000);
        assert_eq!(t.translate(0x1000), Some(0x7f0000000000));
        assert_eq!(t.translate(0x1010), Some(0x7f0000000010));
        assert_eq!(t.translate(0x1100), None);
        assert_eq!(t.translate(0xf00), None);
    }

    #[test]
    fn full_unregister_removes_the_region() {
        let mut t = TranslationTable::new();
        t.register(PathBuf::from("/f"), 0x1000, 0x100, 0x7f0000000000);
        let removed = t.unregister(0x1000, 0x100);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].original_start, 0x1000);
        assert_eq!(t.translate(0x1000), None);
    }

    #[test]
    fn partial_unregister_in_the_middle_splits_into_two_survivors() {
        let mut t = TranslationTable::new();
        t.register(PathBuf::from("/f"), 0x1000, 0x100, 0x7f0000000000);
        let removed = t.unregister(0x1040, 0x10);
        assert_eq!(removed.len(), 1);
        assert_eq!((removed[0].original_start, removed[0].len), (0x1040, 0x10));
        // left survivor
        assert_eq!(t.translate(0x1000), Some(0x7f0000000000));
        assert_eq!(t.translate(0x103f), Some(0x7f000000003f));
        assert_eq!(t.translate(0x1040), None);
        // right survivor, re-based at the correct mapped offset
        assert_eq!(t.translate(0x1050), Some(0x7f0000000050));
        assert_eq!(t.translate(0x10ff), Some(0x7f00000000ff));
    }

    #[test]
    fn partial_unregister_at_the_front_leaves_only_the_tail() {
        let mut t = TranslationTable::new();
        t.register(PathBuf::from("/f"), 0x1000, 0x100, 0x7f0000000000);
        t.unregister(0x1000, 0x40);
        assert_eq!(t.translate(0x1000), None);
        assert_eq!(t.translate(0x1040), Some(0x7f0000000040));
    }
}
