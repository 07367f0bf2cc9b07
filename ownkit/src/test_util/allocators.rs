// Allocators for tests, shared between unit and integration tests.
// The including module provides AllocError, Allocator, Global and
// HandleAlloc

use std::{alloc::Layout, cell::Cell, ptr::NonNull, rc::Rc};

use super::{AllocError, Allocator, Global, HandleAlloc};

// Global allocator wrapper which tracks number of live allocations
#[derive(Clone, Default)]
pub struct CountingAlloc(Rc<Cell<isize>>);

impl CountingAlloc {
  pub fn live(&self) -> isize {
    self.0.get()
  }
}

// SAFETY: Forwards everything to Global
unsafe impl Allocator for CountingAlloc {
  fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
    let ptr = Global.allocate(layout)?;
    self.0.set(self.0.get() + 1);
    Ok(ptr)
  }

  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    self.0.set(self.0.get() - 1);
    // SAFETY: Caller upholds Allocator::deallocate contract
    unsafe { Global.deallocate(ptr, layout) };
  }
}

impl HandleAlloc for CountingAlloc {}

// Allocator which always fails
#[derive(Clone, Copy, Default)]
pub struct FailingAlloc;

// SAFETY: Never hands out memory
unsafe impl Allocator for FailingAlloc {
  fn allocate(&self, _layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
    Err(AllocError)
  }

  unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
    unreachable!("FailingAlloc never allocates");
  }
}

impl HandleAlloc for FailingAlloc {}
