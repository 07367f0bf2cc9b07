use std::{any::Any, fmt, marker::PhantomData, mem::ManuallyDrop, ops::{Deref, DerefMut}, ptr::{self, NonNull}};

use allocator_api2::alloc::{AllocError, Global};

use crate::{allocator::{self, HandleAlloc}, error::HandleError, shared::Shared};

/// Sole owner of a heap object.
///
/// Ownership moves but is never duplicated, so there is no
/// `Clone` and copying is rejected by the compiler:
///
/// ```compile_fail
/// use ownkit::Exclusive;
///
/// let first = Exclusive::new(1_u32);
/// let second: Exclusive<u32> = first.clone();
/// ```
///
/// Like [`Shared`](crate::Shared) the handle may be empty and its
/// operations are associated functions.
pub struct Exclusive<T: ?Sized, A: HandleAlloc = Global> {
  target: Option<NonNull<T>>,
  alloc: A,
  _phantom: PhantomData<T>
}

// SAFETY: Owns the T just like Box<T, A> does
unsafe impl<T: ?Sized + Send, A: HandleAlloc + Send> Send for Exclusive<T, A> {}
// SAFETY: Shared access only hands out &T
unsafe impl<T: ?Sized + Sync, A: HandleAlloc + Sync> Sync for Exclusive<T, A> {}

impl<T> Exclusive<T, Global> {
  pub fn new(value: T) -> Self {
    Self::new_in(value, Global)
  }

  pub fn try_new(value: T) -> Result<Self, HandleError> {
    Self::try_new_in(value, Global)
  }
}

impl<T: ?Sized> Exclusive<T, Global> {
  pub const fn empty() -> Self {
    Self {
      target: None,
      alloc: Global,
      _phantom: PhantomData
    }
  }
}

impl<T, A: HandleAlloc> Exclusive<T, A> {
  pub fn new_in(value: T, alloc: A) -> Self {
    Self {
      target: Some(allocator::alloc_value(&alloc, value)),
      alloc,
      _phantom: PhantomData
    }
  }

  pub fn try_new_in(value: T, alloc: A) -> Result<Self, HandleError> {
    let target = allocator::try_alloc_value(&alloc, value)
      .map_err(|AllocError| HandleError::alloc_failed::<T>())?;
    Ok(Self {
      target: Some(target),
      alloc,
      _phantom: PhantomData
    })
  }

  // Destroys current object (if any) and owns 'value' afterwards
  pub fn reset_with(this: &mut Self, value: T) {
    let fresh = allocator::alloc_value(&this.alloc, value);
    Self::reset(this);
    this.target = Some(fresh);
  }
}

impl<T: ?Sized, A: HandleAlloc> Exclusive<T, A> {
  pub fn empty_in(alloc: A) -> Self {
    Self {
      target: None,
      alloc,
      _phantom: PhantomData
    }
  }

  // Takes ownership of object previously given up by release()
  // or into_raw_with_allocator()
  //
  // SAFETY: Caller ensures 'ptr' points to whole live object allocated
  // by 'alloc' (or equivalent) which nothing else owns, typed as the
  // allocated type or an unsized form of it (never a part of it)
  pub unsafe fn from_raw_in(ptr: NonNull<T>, alloc: A) -> Self {
    Self {
      target: Some(ptr),
      alloc,
      _phantom: PhantomData
    }
  }

  pub fn into_raw_with_allocator(this: Self) -> (Option<NonNull<T>>, A) {
    let mut this = ManuallyDrop::new(this);
    let target = this.target.take();
    // SAFETY: 'this' is never dropped so allocator is moved out once
    let alloc = unsafe { ptr::read(&this.alloc) };
    (target, alloc)
  }

  pub fn allocator(this: &Self) -> &A {
    &this.alloc
  }

  pub fn is_empty(this: &Self) -> bool {
    this.target.is_none()
  }

  pub fn get(this: &Self) -> Option<&T> {
    // SAFETY: Object is owned by 'this' and alive
    this.target.map(|target| unsafe { target.as_ref() })
  }

  pub fn get_mut(this: &mut Self) -> Option<&mut T> {
    // SAFETY: Object is exclusively owned by 'this' and &mut
    // on 'this' means nobody else borrows it
    this.target.map(|mut target| unsafe { target.as_mut() })
  }

  pub fn try_get(this: &Self) -> Result<&T, HandleError> {
    Self::get(this).ok_or(HandleError::NullTarget)
  }

  pub fn try_get_mut(this: &mut Self) -> Result<&mut T, HandleError> {
    Self::get_mut(this).ok_or(HandleError::NullTarget)
  }

  // Gives up ownership without destroying the object, the
  // caller is responsible for it afterwards
  #[must_use = "losing the pointer leaks the object"]
  pub fn release(this: &mut Self) -> Option<NonNull<T>> {
    this.target.take()
  }

  pub fn reset(this: &mut Self) {
    if let Some(target) = this.target.take() {
      // SAFETY: Owned by 'this' and now detached from it
      unsafe { allocator::destroy_value(&this.alloc, target) };
    }
  }

  // Moves ownership out leaving the handle empty
  pub fn take(this: &mut Self) -> Self {
    Self {
      target: this.target.take(),
      alloc: this.alloc.clone(),
      _phantom: PhantomData
    }
  }
}

impl<T: Any, A: HandleAlloc> Exclusive<T, A> {
  pub fn into_shared(this: Self) -> Shared<T, A> {
    Shared::from_exclusive(this)
  }
}

/// Re-types an [`Exclusive`] through an unsizing coercion, typically
/// into a trait object.
///
/// This is not a pointer cast: only a coercion the compiler accepts on
/// raw pointers can change the type, so the handle always keeps
/// owning (and later destroys) the whole object.
///
/// ```
/// use std::fmt::Debug;
/// use ownkit::{coerce_exclusive, Exclusive};
///
/// let number = Exclusive::new(5_u32);
/// let debug = coerce_exclusive!(number => dyn Debug);
/// assert_eq!(format!("{debug:?}"), "5");
/// ```
///
/// Views which are not the whole object (a field, even of a
/// `#[repr(transparent)]` wrapper) are rejected at compile time:
///
/// ```compile_fail
/// use ownkit::{coerce_exclusive, Exclusive};
///
/// #[repr(transparent)]
/// struct Meters {
///   value: u32
/// }
///
/// let meters = Exclusive::new(Meters { value: 3 });
/// let value = coerce_exclusive!(meters => u32);
/// ```
#[macro_export]
macro_rules! coerce_exclusive {
  ( $handle:expr => $target:ty $(,)? ) => ({
    let (target, alloc) = $crate::Exclusive::into_raw_with_allocator($handle);
    match target {
      Some(target) => {
        // Coercion site, not a cast
        let ptr: *mut $target = target.as_ptr();
        // SAFETY: 'ptr' came from non null pointer to whole object
        // owned by the handle, allocated by 'alloc'
        unsafe { $crate::Exclusive::from_raw_in(::core::ptr::NonNull::new_unchecked(ptr), alloc) }
      },
      None => $crate::Exclusive::<$target, _>::empty_in(alloc)
    }
  });
  ( $handle:expr $(,)? ) => {
    $crate::coerce_exclusive!($handle => _)
  };
}

impl<T: ?Sized, A: HandleAlloc> Drop for Exclusive<T, A> {
  fn drop(&mut self) {
    Self::reset(self);
  }
}

impl<T: ?Sized, A: HandleAlloc + Default> Default for Exclusive<T, A> {
  fn default() -> Self {
    Self::empty_in(A::default())
  }
}

impl<T> From<T> for Exclusive<T, Global> {
  fn from(value: T) -> Self {
    Self::new(value)
  }
}

impl<T: ?Sized, A: HandleAlloc> Deref for Exclusive<T, A> {
  type Target = T;

  fn deref(&self) -> &Self::Target {
    match Self::try_get(self) {
      Ok(target) => target,
      Err(err) => panic!("{err}")
    }
  }
}

impl<T: ?Sized, A: HandleAlloc> DerefMut for Exclusive<T, A> {
  fn deref_mut(&mut self) -> &mut Self::Target {
    match Self::try_get_mut(self) {
      Ok(target) => target,
      Err(err) => panic!("{err}")
    }
  }
}

impl<T: ?Sized + fmt::Debug, A: HandleAlloc> fmt::Debug for Exclusive<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match Self::get(self) {
      Some(target) => fmt::Debug::fmt(target, f),
      None => f.write_str("(empty)")
    }
  }
}
