//! Bump-pointer allocator: a fixed-size static buffer, a cursor that only
//! moves forward, `dealloc` a no-op. All filesystem-internal allocations
//! (scratch block buffers, bitmap buffers, dirent arrays) go through this
//! allocator; scratch-buffer lifetimes never outlive a single public
//! operation, so leaking on free costs nothing in practice.

use core::alloc::{GlobalAlloc, Layout};

use spin::Mutex;

const HEAP_SIZE: usize = 8 * 1024 * 1024;

static mut HEAP_MEMORY: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

struct BumpState {
    next: usize,
    end: usize,
}

pub struct BumpAllocator {
    state: Mutex<Option<BumpState>>,
}

impl BumpAllocator {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Must be called exactly once, before any allocation, with the static
    /// heap's address range.
    ///
    /// # Safety
    /// `start` must point at `size` bytes of memory exclusively owned by
    /// the allocator for the remainder of the kernel's lifetime.
    pub unsafe fn init(&self, start: usize, size: usize) {
        *self.state.lock() = Some(BumpState {
            next: start,
            end: start + size,
        });
    }
}

fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

unsafe impl GlobalAlloc for BumpAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut guard = self.state.lock();
        let Some(state) = guard.as_mut() else {
            return core::ptr::null_mut();
        };

        let start = align_up(state.next, layout.align());
        let Some(end) = start.checked_add(layout.size()) else {
            return core::ptr::null_mut();
        };
        if end > state.end {
            return core::ptr::null_mut();
        }

        state.next = end;
        start as *mut u8
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
}

#[global_allocator]
static ALLOCATOR: BumpAllocator = BumpAllocator::new();

/// Points the global allocator at the kernel's static heap buffer. Called
/// once from `_start` before any `alloc`-dependent code runs.
pub fn init() {
    let start = core::ptr::addr_of_mut!(HEAP_MEMORY) as usize;
    unsafe {
        ALLOCATOR.init(start, HEAP_SIZE);
    }
}
