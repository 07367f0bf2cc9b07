use std::{fmt, ptr::NonNull};

use allocator_api2::alloc::Global;

use crate::{allocator::HandleAlloc, control_block::ControlBlock, error::HandleError, shared::{BlockRef, Shared}};

// Non owning observer of an object owned by Shared handles
//
// Holds a weak reference on the control block (never on the
// object) so the block stays valid for as long as the observer
// exists, even after the object itself is gone
pub struct Weak<T: ?Sized, A: HandleAlloc = Global> {
  inner: Option<BlockRef<T, A>>
}

impl<T: ?Sized, A: HandleAlloc> Weak<T, A> {
  // Observer of nothing, lock() always gives empty handle
  pub const fn new() -> Self {
    Self {
      inner: None
    }
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_none()
  }

  // Whether lock() would give empty handle
  pub fn is_expired(&self) -> bool {
    self.strong_count() == 0
  }

  pub fn strong_count(&self) -> usize {
    self.inner.as_ref().map_or(0, |inner| inner.block().strong())
  }

  pub fn weak_count(&self) -> usize {
    self.inner.as_ref().map_or(0, |inner| inner.block().weak())
  }

  // Temporary owner of the object if anyone still owns it
  pub fn try_lock(&self) -> Result<Shared<T, A>, HandleError> {
    let inner = self.inner.as_ref().ok_or(HandleError::NullTarget)?;
    let block = inner.block();
    if block.strong() == 0 {
      return Err(HandleError::Expired);
    }

    block.acquire_strong();
    Ok(Shared::from_inner(*inner))
  }

  pub fn lock(&self) -> Shared<T, A> {
    self.try_lock().unwrap_or_default()
  }

  pub fn ptr_eq(&self, other: &Self) -> bool {
    match (&self.inner, &other.inner) {
      (Some(this), Some(other)) => this.same_as(other),
      (None, None) => true,
      _ => false
    }
  }

  // Address the observer points at, may dangle once expired
  pub fn as_ptr(&self) -> Option<NonNull<T>> {
    self.inner.as_ref().map(|inner| inner.target)
  }
}

impl<T: ?Sized, A: HandleAlloc> From<&Shared<T, A>> for Weak<T, A> {
  fn from(shared: &Shared<T, A>) -> Self {
    let Some(inner) = Shared::inner(shared) else {
      return Self::new();
    };

    inner.block().acquire_weak();
    Self {
      inner: Some(*inner)
    }
  }
}

impl<T: ?Sized, A: HandleAlloc> Clone for Weak<T, A> {
  fn clone(&self) -> Self {
    if let Some(inner) = &self.inner {
      inner.block().acquire_weak();
    }

    Self {
      inner: self.inner
    }
  }
}

impl<T: ?Sized, A: HandleAlloc> Drop for Weak<T, A> {
  fn drop(&mut self) {
    if let Some(inner) = self.inner.take() {
      // SAFETY: This handle owned one weak reference
      unsafe { ControlBlock::release_weak(inner.block) };
    }
  }
}

impl<T: ?Sized, A: HandleAlloc> Default for Weak<T, A> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: ?Sized, A: HandleAlloc> fmt::Debug for Weak<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("(Weak)")
  }
}
