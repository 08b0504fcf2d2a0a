/// Base of the core-private address window. Addresses in it are not reachable over
/// the NoC and must go through the debug interface.
pub const PRIVATE_MEMORY_BASE: u64 = 0xFFB0_0000;

pub fn is_private_address(addr: u64) -> bool {
    addr & PRIVATE_MEMORY_BASE == PRIVATE_MEMORY_BASE
}

/// A named, contiguous range of core memory (an ELF section to load, for instance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub name: String,
    pub start: u64,
    pub size: u64,
    pub align: u64,
}

impl MemoryRegion {
    pub fn new(name: String, start: u64, size: u64, align: u64) -> Self {
        Self {
            name,
            start,
            size,
            align,
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.start + self.size
    }

    pub fn end(&self) -> u64 {
        self.start + self.size
    }

    pub fn is_word_aligned(&self) -> bool {
        self.start % 4 == 0
    }

    pub fn is_private(&self) -> bool {
        is_private_address(self.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_window() {
        assert!(is_private_address(0xFFB0_0040));
        assert!(is_private_address(0xFFB1_2080));
        assert!(!is_private_address(0x0000_6000));
        let region = MemoryRegion::new(".ldm_data".into(), 0xFFB0_0000, 0x20, 4);
        assert!(region.is_private());
        assert!(region.contains(0xFFB0_001F));
        assert!(!region.contains(region.end()));
    }
}
