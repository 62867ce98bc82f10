//! Recording port used by manager and loader tests.

use super::region::{MpuPort, RegionConfig};

/// `MpuPort` double that records what would have reached the hardware.
#[derive(Default)]
pub(crate) struct TestPort {
    pub enabled: bool,
    pub region_writes: usize,
    pub attribute_writes: usize,
    pub enable_toggles: usize,
}

impl MpuPort for TestPort {
    fn write_memory_attributes(&mut self) {
        self.attribute_writes += 1;
    }

    fn write_region(&mut self, _index: usize, _config: Option<&RegionConfig>) {
        self.region_writes += 1;
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enable_toggles += 1;
        }
        self.enabled = enabled;
    }
}
