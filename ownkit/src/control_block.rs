// Bookkeeping shared by every Shared and Weak handle which
// descends from one allocation
//
// Object and block are two separate allocations. The object
// goes away when strong count reaches zero, the block goes
// away when weak count reaches zero. Strong owners collectively
// hold one weak reference so the block always outlives the
// object's destructor

use std::{alloc::Layout, any::Any, cell::Cell, mem::ManuallyDrop, process, ptr::{self, NonNull}};

use allocator_api2::alloc::AllocError;
use log::trace;

use crate::allocator::{self, HandleAlloc};

pub(crate) struct ControlBlock<A: HandleAlloc> {
  strong: Cell<usize>,
  weak: Cell<usize>,

  // Type erased pointer to the object as it was allocated,
  // None once the object has been destroyed
  object: Cell<Option<NonNull<dyn Any>>>,

  // Allocator for both the object and this block, taken out
  // manually when the block frees itself
  alloc: ManuallyDrop<A>
}

fn increment(count: &Cell<usize>) {
  // Wrapping around would let an object die under a live owner
  let Some(next) = count.get().checked_add(1) else {
    process::abort();
  };
  count.set(next);
}

impl<A: HandleAlloc> ControlBlock<A> {
  // Creates a block with count of one owning 'object'. On failure
  // the object is untouched and still belongs to the caller
  pub fn try_new(object: NonNull<dyn Any>, alloc: &A) -> Result<NonNull<Self>, AllocError> {
    let storage = alloc.allocate(Layout::new::<Self>())?.cast::<Self>();
    let block = Self {
      strong: Cell::new(1),
      weak: Cell::new(1),
      object: Cell::new(Some(object)),
      alloc: ManuallyDrop::new(alloc.clone())
    };

    // SAFETY: Storage was just allocated with layout of Self
    unsafe { storage.as_ptr().write(block) };
    trace!("Created control block {storage:p} for object {object:p}");
    Ok(storage)
  }

  pub fn strong(&self) -> usize {
    self.strong.get()
  }

  // Number of weak handles observing, excluding the reference
  // collectively held by strong owners (already given up once
  // strong count is zero)
  pub fn weak(&self) -> usize {
    if self.strong.get() > 0 {
      self.weak.get() - 1
    } else {
      self.weak.get()
    }
  }

  pub fn object(&self) -> Option<NonNull<dyn Any>> {
    self.object.get()
  }

  pub fn alloc(&self) -> &A {
    &self.alloc
  }

  // Caller must already be (or be derived from) a strong owner
  pub fn acquire_strong(&self) {
    debug_assert!(self.strong.get() > 0, "Reviving destroyed object");
    increment(&self.strong);
  }

  pub fn acquire_weak(&self) {
    increment(&self.weak);
  }

  // Gives up one strong reference, destroying the object
  // if it was the last one
  //
  // SAFETY: Caller ensures 'this' is valid and that the caller
  // owned one strong reference which it won't use anymore
  pub unsafe fn release_strong(this: NonNull<Self>) {
    // SAFETY: Caller ensured 'this' is valid
    let block = unsafe { this.as_ref() };
    let strong = block.strong.get() - 1;
    block.strong.set(strong);
    if strong != 0 {
      return;
    }

    // Detach first so anything the destructor does through
    // weak handles observes the object as gone, and give up the
    // owners' weak reference so weak count is exact in there too.
    // The block may be freed right here, so keep the allocator
    let object = block.object.take();
    let alloc = block.alloc().clone();

    // SAFETY: Strong owners held that one weak reference
    unsafe { Self::release_weak(this) };

    if let Some(object) = object {
      trace!("Destroying object {object:p} of control block {this:p}");
      // SAFETY: Count reached zero so this was the last owner
      // and the object was allocated by the block's allocator
      unsafe { allocator::destroy_value(&alloc, object) };
    }
  }

  // Gives up one weak reference, freeing the block itself
  // if it was the last one
  //
  // SAFETY: Caller ensures 'this' is valid and that the caller
  // owned one weak reference which it won't use anymore
  pub unsafe fn release_weak(this: NonNull<Self>) {
    // SAFETY: Caller ensured 'this' is valid
    let block = unsafe { this.as_ref() };
    let weak = block.weak.get() - 1;
    block.weak.set(weak);
    if weak != 0 {
      return;
    }

    debug_assert!(block.object.get().is_none(), "Freeing control block of live object");
    trace!("Freeing control block {this:p}");

    // SAFETY: Nobody else references the block anymore, allocator
    // is moved out exactly once right before the storage is gone
    let alloc = unsafe { ManuallyDrop::into_inner(ptr::read(&block.alloc)) };

    // SAFETY: Block was allocated by this allocator with this layout
    unsafe { alloc.deallocate(this.cast::<u8>(), Layout::new::<Self>()) };
  }
}
