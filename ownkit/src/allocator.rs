use std::{alloc::{handle_alloc_error, Layout}, ptr::{self, NonNull}};

use allocator_api2::alloc::{AllocError, Allocator, Global};

// An allocator suitable for allocating objects
// and control blocks for the handles
pub trait HandleAlloc: Allocator + Clone + 'static {
}

impl HandleAlloc for Global {}

// Allocates storage for 'value' and moves it in
// Zero sized values never touch the allocator
pub(crate) fn try_alloc_value<T, A: HandleAlloc>(alloc: &A, value: T) -> Result<NonNull<T>, AllocError> {
  let layout = Layout::new::<T>();
  let ptr = if layout.size() == 0 {
    NonNull::dangling()
  } else {
    alloc.allocate(layout)?.cast::<T>()
  };

  // SAFETY: Either storage fit for Layout::new::<T>() from the
  // allocator or a dangling aligned pointer for ZST
  unsafe { ptr.as_ptr().write(value) };
  Ok(ptr)
}

// Same as try_alloc_value but failure to allocate is fatal
pub(crate) fn alloc_value<T, A: HandleAlloc>(alloc: &A, value: T) -> NonNull<T> {
  match try_alloc_value(alloc, value) {
    Ok(ptr) => ptr,
    Err(AllocError) => handle_alloc_error(Layout::new::<T>())
  }
}

// Drops the value in place and gives its storage back to 'alloc'
//
// SAFETY: Caller ensures 'ptr' came from try_alloc_value with same
// allocator (or one which is equivalent through Clone), that the value
// was not dropped yet and nothing is going to use 'ptr' afterwards
pub(crate) unsafe fn destroy_value<T: ?Sized, A: HandleAlloc>(alloc: &A, ptr: NonNull<T>) {
  // SAFETY: Caller ensured value is still alive
  let layout = Layout::for_value(unsafe { ptr.as_ref() });

  // SAFETY: Caller ensured nothing else going to drop it
  unsafe { ptr::drop_in_place(ptr.as_ptr()) };

  if layout.size() == 0 {
    return;
  }

  // SAFETY: Storage was allocated by same allocator with 'layout'
  // as the layout of unsized value is layout of original sized value
  unsafe { alloc.deallocate(ptr.cast::<u8>(), layout) };
}
