//! The boot-info handoff record passed in from the loader. Read-only to the
//! kernel: every field here mirrors what the loader already computed before
//! jumping to `_start`.

use bytemuck::{Pod, Zeroable};

pub const BOOT_INFO_MAGIC: u64 = 0x4149_4F53_424F_4F54;
pub const BOOT_INFO_VERSION: u64 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Framebuffer {
    pub base: u64,
    pub width: u32,
    pub height: u32,
    pub pixels_per_scanline: u32,
    pub bpp: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct MemoryMap {
    pub buffer: u64,
    pub size: u64,
    pub descriptor_size: u64,
    pub descriptor_version: u32,
    _reserved: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct MemorySummary {
    pub total_usable_bytes: u64,
    pub largest_usable_base: u64,
    pub largest_usable_size: u64,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BootDevice {
    pub total_bytes: u64,
    pub block_size: u32,
    pub removable: u8,
    pub label: [u8; 16],
    _reserved: [u8; 3],
}

/// The fixed record the loader hands off at entry. Its layout is explicit
/// and padding-free so a checksum taken over the raw bytes is stable: every
/// implicit gap a `repr(C)` layout would otherwise leave is named and
/// zeroed as a `_reserved` field.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BootInfo {
    pub magic: u64,
    pub version: u64,
    pub kernel_base: u64,
    pub kernel_size: u64,
    pub entry_point: u64,
    pub rsdp_address: u64,
    pub accel_mode: [u8; 4],
    _accel_reserved: [u8; 4],
    pub framebuffer: Framebuffer,
    pub memory_map: MemoryMap,
    pub memory_summary: MemorySummary,
    pub boot_device: BootDevice,
    /// Supplements the handoff with the FS image's physical extent, when
    /// the loader has already located one. Absent iff `fs_image_size == 0`.
    pub fs_image_base: u64,
    pub fs_image_size: u64,
    pub checksum: u32,
    _checksum_reserved: [u8; 4],
}

impl BootInfo {
    /// XORs every 32-bit word of the record together with `checksum`
    /// (and its padding) zeroed out.
    pub fn computed_checksum(&self) -> u32 {
        let mut tmp = *self;
        tmp.checksum = 0;
        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&tmp));
        words.iter().fold(0u32, |acc, w| acc ^ w)
    }

    pub fn is_valid(&self) -> bool {
        self.magic == BOOT_INFO_MAGIC && self.checksum == self.computed_checksum()
    }

    pub fn has_fs_image(&self) -> bool {
        self.fs_image_size != 0
    }
}

/// Reads the `BootInfo` record at `ptr`. The caller is responsible for
/// `ptr` pointing at a live, correctly-aligned record handed off by the
/// loader; `None` is returned only for a failed magic/checksum check, never
/// for a null or misaligned pointer (those are a contract violation, not a
/// recoverable error).
///
/// # Safety
/// `ptr` must point to a valid, initialized `BootInfo` for the lifetime of
/// the returned reference.
pub unsafe fn read_boot_info<'a>(ptr: *const BootInfo) -> Option<&'a BootInfo> {
    let info = unsafe { &*ptr };
    if info.is_valid() { Some(info) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BootInfo {
        let mut info = BootInfo::zeroed();
        info.magic = BOOT_INFO_MAGIC;
        info.version = BOOT_INFO_VERSION;
        info.kernel_base = 0x0010_0000;
        info.kernel_size = 0x0002_0000;
        info.entry_point = 0x0010_0000;
        info.accel_mode = *b"KVM\0";
        info.framebuffer.width = 1280;
        info.framebuffer.height = 720;
        info.boot_device.block_size = 4096;
        info.boot_device.total_bytes = 1024 * 4096;
        info
    }

    #[test]
    fn checksum_round_trips() {
        let mut info = sample();
        info.checksum = info.computed_checksum();
        assert!(info.is_valid());
    }

    #[test]
    fn tampering_invalidates_checksum() {
        let mut info = sample();
        info.checksum = info.computed_checksum();
        info.kernel_size += 1;
        assert!(!info.is_valid());
    }

    #[test]
    fn absent_fs_image_is_zero_sized() {
        let info = sample();
        assert!(!info.has_fs_image());
    }

    #[test]
    fn layout_is_padding_free() {
        assert_eq!(core::mem::size_of::<BootInfo>() % 4, 0);
    }
}
