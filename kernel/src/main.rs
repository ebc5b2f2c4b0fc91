#![no_std]
#![no_main]

use core::arch::asm;

use limine::BaseRevision;

use aios_fs::{Filesystem, RamDisk};
use terminal::log;

mod boot_info;
mod heap;

/// Sets the base revision to the latest revision supported by the crate.
#[used]
#[link_section = ".requests"]
static BASE_REVISION: BaseRevision = BaseRevision::new();

const RAM_DISK_BLOCKS: u32 = 1024;
const RAM_DISK_BLOCK_SIZE: u32 = 4096;
const RAM_DISK_INODES: u32 = 256;

#[unsafe(no_mangle)]
unsafe extern "C" fn _start() -> ! {
    assert!(BASE_REVISION.is_supported());

    unsafe {
        terminal::port_dbg::init_serial();
    }
    heap::init();

    log!("AIOS kernel booting");
    run();

    hcf();
}

fn run() {
    if let Ok(virtio) = aios_block_virtio::VirtioBlockDevice::discover(RAM_DISK_BLOCK_SIZE) {
        log!("virtio-block device found");
        match Filesystem::mount(virtio) {
            Ok(mut fs) => {
                report(&mut fs);
                return;
            }
            Err(_) => log!("virtio disk has no valid filesystem; falling back to a RAM disk"),
        }
    } else {
        log!("no virtio-block device found; using a RAM disk");
    }

    let ram = RamDisk::new(RAM_DISK_BLOCK_SIZE, RAM_DISK_BLOCKS);
    match Filesystem::format(ram, RAM_DISK_INODES) {
        Ok(mut fs) => report(&mut fs),
        Err(_) => log!("failed to format the RAM disk"),
    }
}

fn report<D: aios_fs::BlockDevice>(fs: &mut Filesystem<D>) {
    let root = fs.root_inode();
    match fs.list_dir(root, "/") {
        Ok(entries) => log!("root directory has {} entries", entries.len()),
        Err(_) => log!("failed to list the root directory"),
    }
}

#[cfg(not(test))]
#[panic_handler]
fn rust_panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe {
        asm!("int 0");
    }
    hcf();
}

fn hcf() -> ! {
    unsafe {
        asm!("cli");
        loop {
            asm!("hlt");
        }
    }
}
