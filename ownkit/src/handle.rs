use sealed::sealed;

use crate::{allocator::HandleAlloc, exclusive::Exclusive, shared::Shared, static_slot::StaticSlot, weak::Weak};

// Uniform "absent value" check over every handle kind
// NOTE: This type is considered to be part of public API
#[sealed]
pub trait Nullable {
  fn is_null(&self) -> bool;
}

#[sealed]
impl<T: ?Sized, A: HandleAlloc> Nullable for Shared<T, A> {
  fn is_null(&self) -> bool {
    Shared::is_empty(self)
  }
}

#[sealed]
impl<T: ?Sized, A: HandleAlloc> Nullable for Exclusive<T, A> {
  fn is_null(&self) -> bool {
    Exclusive::is_empty(self)
  }
}

// Expired observer is as good as absent, it can't produce
// anything anymore
#[sealed]
impl<T: ?Sized, A: HandleAlloc> Nullable for Weak<T, A> {
  fn is_null(&self) -> bool {
    self.is_expired()
  }
}

#[sealed]
impl<T, A: HandleAlloc> Nullable for StaticSlot<T, A> {
  fn is_null(&self) -> bool {
    StaticSlot::is_null(self)
  }
}
