//! Heap layout: one backing allocation subdivided into Eden, two
//! survivor spaces, and Old (spec §4.5).

use crate::config::GcConfig;
use crate::region::{BumpRegion, MemRegion};

pub struct Heap {
    /// Keeps the backing allocation alive; never read directly.
    _block: Box<[u8]>,
    pub eden: BumpRegion,
    pub s0: BumpRegion,
    pub s1: BumpRegion,
    pub old: BumpRegion,
}

impl Heap {
    pub fn new(config: &GcConfig) -> Self {
        let total = config.eden_size + 2 * config.survivor_size + config.old_size;
        let mut block = vec![0u8; total].into_boxed_slice();
        let base = block.as_mut_ptr();

        let eden_region = MemRegion { start: base, end: unsafe { base.add(config.eden_size) } };
        let s0_start = eden_region.end;
        let s0_region = MemRegion { start: s0_start, end: unsafe { s0_start.add(config.survivor_size) } };
        let s1_start = s0_region.end;
        let s1_region = MemRegion { start: s1_start, end: unsafe { s1_start.add(config.survivor_size) } };
        let old_start = s1_region.end;
        let old_region = MemRegion { start: old_start, end: unsafe { old_start.add(config.old_size) } };

        Self {
            _block: block,
            eden: BumpRegion::new(eden_region),
            s0: BumpRegion::new(s0_region),
            s1: BumpRegion::new(s1_region),
            old: BumpRegion::new(old_region),
        }
    }
}
