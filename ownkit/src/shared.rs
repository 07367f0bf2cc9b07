use std::{alloc::{handle_alloc_error, Layout}, any::{type_name, Any}, fmt, marker::PhantomData, mem, ops::Deref, ptr::{self, NonNull}};

use allocator_api2::alloc::{AllocError, Global};

use crate::{allocator::{self, HandleAlloc}, control_block::ControlBlock, error::HandleError, exclusive::Exclusive, weak::Weak};

// A typed view into an object together with the block
// governing its lifetime
//
// Only ever stored inside a handle which holds a strong
// or weak reference to 'block', so 'block' is always valid
pub(crate) struct BlockRef<T: ?Sized, A: HandleAlloc> {
  pub target: NonNull<T>,
  pub block: NonNull<ControlBlock<A>>
}

impl<T: ?Sized, A: HandleAlloc> Clone for BlockRef<T, A> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T: ?Sized, A: HandleAlloc> Copy for BlockRef<T, A> {}

impl<T: ?Sized, A: HandleAlloc> BlockRef<T, A> {
  pub fn block(&self) -> &ControlBlock<A> {
    // SAFETY: Owning handle keeps the block alive
    unsafe { self.block.as_ref() }
  }

  pub fn same_as(&self, other: &Self) -> bool {
    self.block == other.block && ptr::addr_eq(self.target.as_ptr(), other.target.as_ptr())
  }
}

// Reference counted co-owner of a heap object
//
// Copying a handle (Clone) adds an owner, dropping removes
// one and the last owner to go destroys the object. A handle
// may be empty, which is the uniform "nothing here" value.
//
// Operations are associated functions (Shared::retype(&handle))
// so they never shadow methods of T reached through Deref.
//
// Counts are plain non atomic integers so handles are
// neither Send nor Sync.
pub struct Shared<T: ?Sized, A: HandleAlloc = Global> {
  inner: Option<BlockRef<T, A>>,
  _phantom: PhantomData<T>
}

impl<T: Any> Shared<T, Global> {
  pub fn new(value: T) -> Self {
    Self::new_in(value, Global)
  }

  pub fn try_new(value: T) -> Result<Self, HandleError> {
    Self::try_new_in(value, Global)
  }
}

impl<T: Any, A: HandleAlloc> Shared<T, A> {
  pub fn new_in(value: T, alloc: A) -> Self {
    let object = allocator::alloc_value(&alloc, value);
    // SAFETY: 'object' was just allocated by 'alloc'
    unsafe { Self::adopt(object, &alloc) }
  }

  pub fn try_new_in(value: T, alloc: A) -> Result<Self, HandleError> {
    let object = allocator::try_alloc_value(&alloc, value)
      .map_err(|AllocError| HandleError::alloc_failed::<T>())?;
    // SAFETY: 'object' was just allocated by 'alloc'
    unsafe { Self::try_adopt(object, &alloc) }
  }

  // Moves exclusively owned object under shared ownership,
  // the object itself stays where it is
  pub fn from_exclusive(exclusive: Exclusive<T, A>) -> Self {
    let (object, alloc) = Exclusive::into_raw_with_allocator(exclusive);
    match object {
      // SAFETY: Exclusive handed over the ownership of the object
      // which was allocated by 'alloc'
      Some(object) => unsafe { Self::adopt(object, &alloc) },
      None => Self::empty()
    }
  }

  // Releases current ownership and takes ownership of a new
  // value with fresh control block. The value goes into the
  // allocator of the current block, or A::default() when empty
  pub fn reset_with(this: &mut Self, value: T) where A: Default {
    let alloc = match this.inner.as_ref() {
      Some(inner) => inner.block().alloc().clone(),
      None => A::default()
    };
    Self::reset_with_in(this, value, alloc);
  }

  pub fn reset_with_in(this: &mut Self, value: T, alloc: A) {
    let fresh = Self::new_in(value, alloc);
    *this = fresh;
  }

  // SAFETY: Caller ensures 'object' is live, allocated by 'alloc'
  // and gives up its ownership
  unsafe fn try_adopt(object: NonNull<T>, alloc: &A) -> Result<Self, HandleError> {
    match ControlBlock::try_new(object, alloc) {
      Ok(block) => Ok(Self::from_inner(BlockRef {
        target: object,
        block
      })),
      Err(AllocError) => {
        // SAFETY: Nothing else owns the object
        unsafe { allocator::destroy_value(alloc, object) };
        Err(HandleError::alloc_failed::<ControlBlock<A>>())
      }
    }
  }

  // SAFETY: Same as try_adopt
  unsafe fn adopt(object: NonNull<T>, alloc: &A) -> Self {
    // SAFETY: Caller upholds try_adopt's contract
    match unsafe { Self::try_adopt(object, alloc) } {
      Ok(shared) => shared,
      Err(_) => handle_alloc_error(Layout::new::<ControlBlock<A>>())
    }
  }
}

impl<T: ?Sized, A: HandleAlloc> Shared<T, A> {
  pub const fn empty() -> Self {
    Self {
      inner: None,
      _phantom: PhantomData
    }
  }

  // Caller must have already accounted one strong
  // reference for the new handle
  pub(crate) fn from_inner(inner: BlockRef<T, A>) -> Self {
    Self {
      inner: Some(inner),
      _phantom: PhantomData
    }
  }

  pub(crate) fn inner(this: &Self) -> Option<&BlockRef<T, A>> {
    this.inner.as_ref()
  }

  pub fn is_empty(this: &Self) -> bool {
    this.inner.is_none()
  }

  pub fn get(this: &Self) -> Option<&T> {
    // SAFETY: Strong reference held by 'this' keeps target alive
    this.inner.as_ref().map(|inner| unsafe { inner.target.as_ref() })
  }

  pub fn try_get(this: &Self) -> Result<&T, HandleError> {
    Self::get(this).ok_or(HandleError::NullTarget)
  }

  pub fn strong_count(this: &Self) -> usize {
    this.inner.as_ref().map_or(0, |inner| inner.block().strong())
  }

  pub fn weak_count(this: &Self) -> usize {
    this.inner.as_ref().map_or(0, |inner| inner.block().weak())
  }

  // Both handles view the same address through same control block
  // (two empty handles are equal as well)
  pub fn ptr_eq(this: &Self, other: &Self) -> bool {
    match (&this.inner, &other.inner) {
      (Some(this), Some(other)) => this.same_as(other),
      (None, None) => true,
      _ => false
    }
  }

  // Both handles share the same ownership accounting, no matter
  // which part or type of the object they view
  pub fn shares_owner<U: ?Sized>(this: &Self, other: &Shared<U, A>) -> bool {
    match (&this.inner, &other.inner) {
      (Some(this), Some(other)) => this.block == other.block,
      _ => false
    }
  }

  pub fn downgrade(this: &Self) -> Weak<T, A> {
    Weak::from(this)
  }

  // Moves ownership out leaving the handle empty
  pub fn take(this: &mut Self) -> Self {
    Self {
      inner: this.inner.take(),
      _phantom: PhantomData
    }
  }

  pub fn reset(this: &mut Self) {
    drop(Self::take(this));
  }

  pub fn swap(this: &mut Self, other: &mut Self) {
    mem::swap(&mut this.inner, &mut other.inner);
  }

  // View the object as a 'U', sharing the ownership with 'this'.
  // Failure is reported as TypeMismatch while empty handle reports
  // NullTarget
  pub fn try_retype<U: Any>(this: &Self) -> Result<Shared<U, A>, HandleError> {
    let inner = this.inner.as_ref().ok_or(HandleError::NullTarget)?;
    let block = inner.block();
    let object = block.object().ok_or(HandleError::NullTarget)?;

    // SAFETY: Object is alive as 'this' holds strong reference
    if !unsafe { object.as_ref() }.is::<U>() {
      return Err(HandleError::TypeMismatch {
        expected: type_name::<U>()
      });
    }

    block.acquire_strong();
    Ok(Shared::from_inner(BlockRef {
      target: object.cast::<U>(),
      block: inner.block
    }))
  }

  // Same as try_retype but gives empty handle on any failure
  pub fn retype<U: Any>(this: &Self) -> Shared<U, A> {
    Self::try_retype(this).unwrap_or_default()
  }

  // Capability query: 'query' picks a view of the object (a trait
  // object, a field, ...) and the new handle shares ownership of the
  // whole object. Gives empty handle if 'this' is empty or 'query'
  // declines
  pub fn project<U: ?Sized>(this: &Self, query: impl FnOnce(&T) -> Option<&U>) -> Shared<U, A> {
    let Some(inner) = this.inner.as_ref() else {
      return Shared::empty();
    };

    // SAFETY: Strong reference held by 'this' keeps target alive
    // and the returned view borrows from it
    let Some(view) = query(unsafe { inner.target.as_ref() }) else {
      return Shared::empty();
    };

    inner.block().acquire_strong();
    Shared::from_inner(BlockRef {
      target: NonNull::from(view),
      block: inner.block
    })
  }
}

impl<T: ?Sized, A: HandleAlloc> Clone for Shared<T, A> {
  fn clone(&self) -> Self {
    match self.inner {
      Some(inner) => {
        inner.block().acquire_strong();
        Self::from_inner(inner)
      }
      None => Self::empty()
    }
  }

  fn clone_from(&mut self, source: &Self) {
    // Already the same, releasing first could destroy
    // the object if count is low enough
    if Self::ptr_eq(self, source) {
      return;
    }

    *self = source.clone();
  }
}

impl<T: ?Sized, A: HandleAlloc> Drop for Shared<T, A> {
  fn drop(&mut self) {
    if let Some(inner) = self.inner.take() {
      // SAFETY: This handle owned one strong reference
      unsafe { ControlBlock::release_strong(inner.block) };
    }
  }
}

impl<T: ?Sized, A: HandleAlloc> Default for Shared<T, A> {
  fn default() -> Self {
    Self::empty()
  }
}

impl<T: ?Sized, A: HandleAlloc> Deref for Shared<T, A> {
  type Target = T;

  fn deref(&self) -> &Self::Target {
    match Self::try_get(self) {
      Ok(target) => target,
      Err(err) => panic!("{err}")
    }
  }
}

impl<T: ?Sized + fmt::Debug, A: HandleAlloc> fmt::Debug for Shared<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match Self::get(self) {
      Some(target) => fmt::Debug::fmt(target, f),
      None => f.write_str("(empty)")
    }
  }
}

impl<T: Any, A: HandleAlloc> From<Exclusive<T, A>> for Shared<T, A> {
  fn from(exclusive: Exclusive<T, A>) -> Self {
    Self::from_exclusive(exclusive)
  }
}

#[cfg(test)]
mod tests {
  use std::fmt::Debug;

  use crate::test_util::{CountingAlloc, DropCounter, FailingAlloc, Probe};

  use super::*;

  trait Named {
    fn name(&self) -> &str;
  }

  struct Sprite {
    name: String,
    _probe: Probe
  }

  impl Named for Sprite {
    fn name(&self) -> &str {
      &self.name
    }
  }

  #[test]
  fn copies_share_one_destruction() {
    let drops = DropCounter::default();
    let a = Shared::new(drops.probe());
    let b = a.clone();
    assert_eq!(Shared::strong_count(&a), 2);
    drop(a);
    assert_eq!(drops.count(), 0);
    assert_eq!(Shared::strong_count(&b), 1);
    drop(b);
    assert_eq!(drops.count(), 1);
  }

  #[test]
  fn take_empties_source_without_count_change() {
    let drops = DropCounter::default();
    let mut a = Shared::new(drops.probe_with_id(7));
    let b = Shared::take(&mut a);
    assert!(Shared::is_empty(&a));
    assert_eq!(Shared::strong_count(&b), 1);
    assert_eq!(b.id, 7);
    assert_eq!(Shared::try_get(&a).unwrap_err(), HandleError::NullTarget);
  }

  #[test]
  fn clone_from_same_object_is_noop() {
    let drops = DropCounter::default();
    let mut a = Shared::new(drops.probe());
    let b = a.clone();
    a.clone_from(&b);
    assert_eq!(Shared::strong_count(&a), 2);
    assert_eq!(drops.count(), 0);
  }

  #[test]
  fn clone_from_other_object_releases_old() {
    let drops = DropCounter::default();
    let mut a = Shared::new(drops.probe_with_id(1));
    let b = Shared::new(drops.probe_with_id(2));
    a.clone_from(&b);
    assert_eq!(drops.count(), 1);
    assert_eq!(a.id, 2);
    assert_eq!(Shared::strong_count(&b), 2);
  }

  #[test]
  fn reset_and_reset_with() {
    let drops = DropCounter::default();
    let mut a = Shared::new(drops.probe_with_id(1));
    let keep = a.clone();
    Shared::reset_with(&mut a, drops.probe_with_id(2));
    assert_eq!(drops.count(), 0);
    assert_eq!(a.id, 2);
    assert!(!Shared::shares_owner(&a, &keep));

    drop(keep);
    assert_eq!(drops.count(), 1);
    Shared::reset(&mut a);
    assert!(Shared::is_empty(&a));
    assert_eq!(drops.count(), 2);
  }

  #[test]
  fn reset_with_stays_in_current_allocator() {
    let alloc = CountingAlloc::default();
    let mut a = Shared::new_in(String::from("first"), alloc.clone());
    Shared::reset_with(&mut a, String::from("second"));
    assert_eq!(&*a, "second");
    assert_eq!(alloc.live(), 2);

    let other = CountingAlloc::default();
    Shared::reset_with_in(&mut a, String::from("third"), other.clone());
    assert_eq!(alloc.live(), 0);
    assert_eq!(other.live(), 2);
  }

  #[test]
  fn swap_exchanges_without_counting() {
    let drops = DropCounter::default();
    let mut a = Shared::new(drops.probe_with_id(1));
    let mut b = Shared::empty();
    Shared::swap(&mut a, &mut b);
    assert!(Shared::is_empty(&a));
    assert_eq!(b.id, 1);
    assert_eq!(Shared::strong_count(&b), 1);
  }

  #[test]
  fn retype_shares_block() {
    let drops = DropCounter::default();
    let sprite = Shared::new(Sprite {
      name: "hero".to_string(),
      _probe: drops.probe()
    });
    let named: Shared<dyn Named> = Shared::project(&sprite, |s| Some(s as &(dyn Named + 'static)));
    assert_eq!(named.name(), "hero");
    assert_eq!(Shared::strong_count(&sprite), 2);

    let back = Shared::retype::<Sprite>(&named);
    assert!(Shared::ptr_eq(&back, &sprite));
    assert_eq!(Shared::strong_count(&sprite), 3);

    drop(sprite);
    drop(named);
    assert_eq!(drops.count(), 0);
    drop(back);
    assert_eq!(drops.count(), 1);
  }

  #[test]
  fn failed_retype_is_distinguishable() {
    let a = Shared::new(5_u32);
    assert_eq!(
      Shared::try_retype::<i64>(&a).unwrap_err(),
      HandleError::TypeMismatch { expected: "i64" }
    );
    assert!(Shared::is_empty(&Shared::retype::<i64>(&a)));
    assert_eq!(Shared::strong_count(&a), 1);

    let empty = Shared::<u32>::empty();
    assert_eq!(Shared::try_retype::<u32>(&empty).unwrap_err(), HandleError::NullTarget);
  }

  #[test]
  fn project_field_keeps_whole_object() {
    let drops = DropCounter::default();
    let sprite = Shared::new(Sprite {
      name: "tree".to_string(),
      _probe: drops.probe()
    });
    let name: Shared<str> = Shared::project(&sprite, |s| Some(s.name.as_str()));
    drop(sprite);
    assert_eq!(&*name, "tree");
    assert_eq!(drops.count(), 0);
    drop(name);
    assert_eq!(drops.count(), 1);
  }

  #[test]
  fn declined_projection_is_empty() {
    let a = Shared::new(1_u8);
    let none: Shared<dyn Debug> = Shared::project(&a, |_| None);
    assert!(Shared::is_empty(&none));
    assert_eq!(Shared::strong_count(&a), 1);
  }

  #[test]
  fn from_exclusive_reuses_object() {
    let drops = DropCounter::default();
    let mut exclusive = Exclusive::new(drops.probe_with_id(3));
    let address = NonNull::from(&*exclusive);
    let shared = Shared::from(Exclusive::take(&mut exclusive));
    assert_eq!(NonNull::from(&*shared), address);
    assert!(Exclusive::is_empty(&exclusive));
    drop(shared);
    assert_eq!(drops.count(), 1);
  }

  #[test]
  fn custom_allocator_gets_everything_back() {
    let alloc = CountingAlloc::default();
    let a = Shared::new_in(String::from("texture"), alloc.clone());
    let b = a.clone();
    assert_eq!(alloc.live(), 2);
    drop(a);
    drop(b);
    assert_eq!(alloc.live(), 0);
  }

  #[test]
  fn allocation_failure_is_reported() {
    let result = Shared::try_new_in(0_u64, FailingAlloc);
    assert_eq!(result.unwrap_err(), HandleError::AllocFailed { size: 8, align: 8 });
  }

  #[test]
  fn zero_sized_value_only_allocates_block() {
    let alloc = CountingAlloc::default();
    let unit = Shared::new_in((), alloc.clone());
    let weak = Shared::downgrade(&unit);
    assert_eq!(alloc.live(), 1);
    drop(unit);
    assert_eq!(alloc.live(), 1);
    drop(weak);
    assert_eq!(alloc.live(), 0);
  }

  #[test]
  #[should_panic(expected = "access through an empty handle")]
  fn deref_empty_panics() {
    let empty = Shared::<u32>::empty();
    let _value: u32 = *empty;
  }

  #[test]
  fn debug_shows_value_or_empty() {
    assert_eq!(format!("{:?}", Shared::new(3)), "3");
    assert_eq!(format!("{:?}", Shared::<i32>::empty()), "(empty)");
  }
}
