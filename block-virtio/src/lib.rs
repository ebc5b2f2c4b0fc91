//! Legacy-PCI virtio-block device driver (component D): discovers a
//! virtio-block device over port-I/O PCI configuration space, negotiates a
//! single virtqueue, and submits one three-descriptor request per block
//! read or write.

#![no_std]

extern crate alloc;

mod pci;

use alloc::boxed::Box;

use bytemuck::{Pod, Zeroable};
use x86_64::instructions::port::Port;

use aios_fs::{BlockDevice, FsError, FsResult};

const VIRTIO_VENDOR: u16 = 0x1AF4;
const VIRTIO_DEVICE_BLK: u16 = 0x1001;
const SECTOR_SIZE: u32 = 512;

const QUEUE_SIZE: usize = 8;

const VIRTIO_BLK_T_IN: u32 = 0;
const VIRTIO_BLK_T_OUT: u32 = 1;

const STATUS_ACKNOWLEDGE: u8 = 0x01;
const STATUS_DRIVER: u8 = 0x02;
const STATUS_DRIVER_OK: u8 = 0x04;
const STATUS_FEATURES_OK: u8 = 0x08;

const REG_QUEUE_ADDRESS: u16 = 0x08;
const REG_QUEUE_SIZE: u16 = 0x0C;
const REG_QUEUE_SELECT: u16 = 0x0E;
const REG_QUEUE_NOTIFY: u16 = 0x10;
const REG_DEVICE_STATUS: u16 = 0x12;
const REG_ISR_STATUS: u16 = 0x13;
const REG_DEVICE_CONFIG: u16 = 0x20;

const DESC_F_NEXT: u16 = 1;
const DESC_F_WRITE: u16 = 2;

/// Bounds the used-ring poll; exceeding it is a hard I/O failure, not a
/// retry.
const SPIN_BUDGET: u32 = 1 << 24;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct VirtqDesc {
    addr: u64,
    len: u32,
    flags: u16,
    next: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct VirtqAvail {
    flags: u16,
    idx: u16,
    ring: [u16; QUEUE_SIZE],
    used_event: u16,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct VirtqUsedElem {
    id: u32,
    len: u32,
}

// `VirtqUsedElem` forces 4-byte alignment, which leaves `VirtqUsed` with
// 2 trailing padding bytes after `avail_event`: `Pod`'s derive checks
// `size_of::<T>() == sum of field sizes` and would reject that padding,
// so only `Zeroable` is derived here. Nothing ever calls `bytes_of` or
// `cast_slice` on this struct — only `zeroed()` and plain field access.
#[repr(C)]
#[derive(Clone, Copy, Zeroable)]
struct VirtqUsed {
    flags: u16,
    idx: u16,
    ring: [VirtqUsedElem; QUEUE_SIZE],
    avail_event: u16,
}

/// The descriptor table, available ring and used ring packed into one
/// 4 KiB-aligned region, as the device expects a single physical page
/// frame number for the whole queue.
///
/// Like `VirtqUsed` above, this has internal padding (before `used`, to
/// reach its 4-byte alignment, and again to round the whole struct up
/// to the `align(4096)` page size), so only `Zeroable` is derived; the
/// region is never serialized through `bytemuck`, only written field by
/// field and handed to the device by raw pointer.
#[repr(C, align(4096))]
#[derive(Clone, Copy, Zeroable)]
struct QueueRegion {
    desc: [VirtqDesc; QUEUE_SIZE],
    avail: VirtqAvail,
    used: VirtqUsed,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct VirtioBlkReq {
    kind: u32,
    reserved: u32,
    sector: u64,
}

/// A block device backed by a discovered virtio-block PCI device. Assumes
/// an identity-mapped address space: every pointer handed to the device as
/// a descriptor address is used as-is as the physical address.
///
/// `queue` is heap-allocated rather than inline: its address is programmed
/// into the device's queue-address register exactly once, in
/// `setup_queue`, while `self` is still a local in `discover`. `self` is
/// then moved (returned out of `discover`, moved again into a
/// `Filesystem`); an inline `QueueRegion` would relocate with it and leave
/// the device holding a stale physical frame number. A `Box` only moves
/// the pointer on every subsequent move of `VirtioBlockDevice` — the
/// pointee stays put at the address already handed to the device.
pub struct VirtioBlockDevice {
    iobase: u16,
    queue_size: u16,
    queue: Box<QueueRegion>,
    request: VirtioBlkReq,
    status: u8,
    used_idx: u16,
    capacity_sectors: u64,
    sectors_per_block: u32,
    block_size: u32,
    block_count: u32,
}

impl VirtioBlockDevice {
    /// Discovers the first virtio-block device on the legacy PCI bus and
    /// brings it up to `DRIVER_OK`. `block_size` must be a multiple of the
    /// 512-byte virtio sector.
    pub fn discover(block_size: u32) -> FsResult<Self> {
        if block_size == 0 || block_size % SECTOR_SIZE != 0 {
            return Err(FsError::InvalidArgument);
        }

        let (bus, device, function) =
            pci::find_device(VIRTIO_VENDOR, VIRTIO_DEVICE_BLK).ok_or(FsError::IoFailure)?;

        let bar0 = pci::read32(bus, device, function, 0x10);
        let iobase = (bar0 & !0x3) as u16;

        let mut command = pci::read16(bus, device, function, 0x04);
        command |= (1 << 0) | (1 << 2); // I/O space decode + bus master
        pci::write16(bus, device, function, 0x04, command);

        let mut dev = Self {
            iobase,
            queue_size: 0,
            queue: Box::new(QueueRegion::zeroed()),
            request: VirtioBlkReq::zeroed(),
            status: 0,
            used_idx: 0,
            capacity_sectors: 0,
            sectors_per_block: block_size / SECTOR_SIZE,
            block_size,
            block_count: 0,
        };

        dev.write_status(0);
        dev.write_status(STATUS_ACKNOWLEDGE);
        dev.write_status(STATUS_ACKNOWLEDGE | STATUS_DRIVER);
        dev.write_status(dev.read_status() | STATUS_FEATURES_OK);
        if dev.read_status() & STATUS_FEATURES_OK == 0 {
            return Err(FsError::IoFailure);
        }

        dev.setup_queue()?;

        dev.capacity_sectors = dev.read_capacity();
        dev.block_count = (dev.capacity_sectors / dev.sectors_per_block as u64) as u32;

        dev.write_status(dev.read_status() | STATUS_DRIVER_OK);
        Ok(dev)
    }

    fn port_read8(&self, offset: u16) -> u8 {
        let mut port: Port<u8> = Port::new(self.iobase + offset);
        unsafe { port.read() }
    }

    fn port_write8(&self, offset: u16, value: u8) {
        let mut port: Port<u8> = Port::new(self.iobase + offset);
        unsafe { port.write(value) }
    }

    fn port_read16(&self, offset: u16) -> u16 {
        let mut port: Port<u16> = Port::new(self.iobase + offset);
        unsafe { port.read() }
    }

    fn port_write16(&self, offset: u16, value: u16) {
        let mut port: Port<u16> = Port::new(self.iobase + offset);
        unsafe { port.write(value) }
    }

    fn port_read32(&self, offset: u16) -> u32 {
        let mut port: Port<u32> = Port::new(self.iobase + offset);
        unsafe { port.read() }
    }

    fn port_write32(&self, offset: u16, value: u32) {
        let mut port: Port<u32> = Port::new(self.iobase + offset);
        unsafe { port.write(value) }
    }

    fn write_status(&self, status: u8) {
        self.port_write8(REG_DEVICE_STATUS, status);
    }

    fn read_status(&self) -> u8 {
        self.port_read8(REG_DEVICE_STATUS)
    }

    fn read_isr(&self) -> u8 {
        self.port_read8(REG_ISR_STATUS)
    }

    fn read_capacity(&self) -> u64 {
        let low = self.port_read32(REG_DEVICE_CONFIG) as u64;
        let high = self.port_read32(REG_DEVICE_CONFIG + 4) as u64;
        (high << 32) | low
    }

    fn setup_queue(&mut self) -> FsResult<()> {
        self.port_write16(REG_QUEUE_SELECT, 0);
        let mut qsz = self.port_read16(REG_QUEUE_SIZE);
        if qsz == 0 {
            return Err(FsError::IoFailure);
        }
        if qsz as usize > QUEUE_SIZE {
            qsz = QUEUE_SIZE as u16;
        }
        self.queue_size = qsz;

        // Address of the boxed `QueueRegion` itself, not of the `Box`
        // pointer field — the latter moves with `self`, the former is a
        // stable heap allocation.
        let phys = core::ptr::addr_of!(*self.queue) as usize;
        self.port_write32(REG_QUEUE_ADDRESS, (phys >> 12) as u32);
        Ok(())
    }

    fn submit(&mut self, kind: u32, sector: u64, buf_ptr: *mut u8, buf_len: usize, device_writes: bool) -> FsResult<()> {
        self.request = VirtioBlkReq {
            kind,
            reserved: 0,
            sector,
        };
        self.status = 0xFF;

        let req_addr = core::ptr::addr_of!(self.request) as u64;
        let status_addr = core::ptr::addr_of!(self.status) as u64;

        self.queue.desc[0] = VirtqDesc {
            addr: req_addr,
            len: core::mem::size_of::<VirtioBlkReq>() as u32,
            flags: DESC_F_NEXT,
            next: 1,
        };
        self.queue.desc[1] = VirtqDesc {
            addr: buf_ptr as u64,
            len: buf_len as u32,
            flags: DESC_F_NEXT | if device_writes { DESC_F_WRITE } else { 0 },
            next: 2,
        };
        self.queue.desc[2] = VirtqDesc {
            addr: status_addr,
            len: 1,
            flags: DESC_F_WRITE,
            next: 0,
        };

        let ring_idx = (self.queue.avail.idx % self.queue_size) as usize;
        self.queue.avail.ring[ring_idx] = 0;
        self.queue.avail.idx = self.queue.avail.idx.wrapping_add(1);
        self.port_write16(REG_QUEUE_NOTIFY, 0);

        let mut spin = 0u32;
        while self.queue.used.idx == self.used_idx {
            if self.read_isr() & 0x1 != 0 {
                break;
            }
            spin += 1;
            if spin >= SPIN_BUDGET {
                return Err(FsError::IoFailure);
            }
            core::hint::spin_loop();
        }
        self.used_idx = self.queue.used.idx;

        if self.status != 0 {
            return Err(FsError::IoFailure);
        }
        Ok(())
    }
}

impl BlockDevice for VirtioBlockDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn read(&mut self, block: u32, buf: &mut [u8]) -> FsResult<()> {
        self.check_bounds(block, buf.len())?;
        let lba = block as u64 * self.sectors_per_block as u64;
        let ptr = buf.as_mut_ptr();
        let len = buf.len();
        self.submit(VIRTIO_BLK_T_IN, lba, ptr, len, true)
    }

    fn write(&mut self, block: u32, buf: &[u8]) -> FsResult<()> {
        self.check_bounds(block, buf.len())?;
        let lba = block as u64 * self.sectors_per_block as u64;
        let ptr = buf.as_ptr() as *mut u8;
        let len = buf.len();
        self.submit(VIRTIO_BLK_T_OUT, lba, ptr, len, false)
    }
}
