//! Single instance slots with replace-and-destroy-previous semantics.
//!
//! - [`StaticSlot`] is one owned slot for one type.
//! - [`StaticContext`] holds at most one instance per type and is meant
//!   to be created by the top level of an application and passed down
//!   explicitly.
//! - [`GlobalSlot`] is the process-wide variant for the rare places which
//!   really need a `static`.

use std::{any::{type_name, Any, TypeId}, collections::HashMap, fmt, mem, ptr::NonNull};

use allocator_api2::alloc::Global;
use log::debug;
use parking_lot::{const_mutex, Mutex};

use crate::{allocator::{self, HandleAlloc}, exclusive::Exclusive};

/// Holds zero or one instance of `T`.
pub struct StaticSlot<T, A: HandleAlloc = Global> {
  instance: Exclusive<T, A>
}

impl<T> StaticSlot<T, Global> {
  pub const fn new() -> Self {
    Self {
      instance: Exclusive::empty()
    }
  }
}

impl<T, A: HandleAlloc> StaticSlot<T, A> {
  pub fn new_in(alloc: A) -> Self {
    Self {
      instance: Exclusive::empty_in(alloc)
    }
  }

  pub fn get(&self) -> Option<&T> {
    Exclusive::get(&self.instance)
  }

  pub fn get_mut(&mut self) -> Option<&mut T> {
    Exclusive::get_mut(&mut self.instance)
  }

  pub fn is_null(&self) -> bool {
    Exclusive::is_empty(&self.instance)
  }

  /// Destroys the current instance (if any) and installs `value`.
  pub fn reset(&mut self, value: Option<T>) {
    if !self.is_null() {
      debug!("Replacing instance of {} in static slot", type_name::<T>());
    }

    match value {
      Some(value) => Exclusive::reset_with(&mut self.instance, value),
      None => Exclusive::reset(&mut self.instance)
    }
  }
}

impl<T> Default for StaticSlot<T, Global> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> From<T> for StaticSlot<T, Global> {
  fn from(value: T) -> Self {
    Self {
      instance: Exclusive::new(value)
    }
  }
}

impl<T: fmt::Debug, A: HandleAlloc> fmt::Debug for StaticSlot<T, A> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("StaticSlot").field(&self.instance).finish()
  }
}

/// Registry of at most one instance per type.
///
/// ```
/// use ownkit::StaticContext;
///
/// struct Textures(Vec<&'static str>);
///
/// let mut context = StaticContext::new();
/// context.set(Textures(vec!["grass"]));
/// context.set(Textures(vec!["stone"]));
/// assert_eq!(context.get::<Textures>().map(|t| t.0[0]), Some("stone"));
/// assert_eq!(context.len(), 1);
/// ```
pub struct StaticContext<A: HandleAlloc = Global> {
  instances: HashMap<TypeId, Exclusive<dyn Any, A>>,
  alloc: A
}

impl StaticContext<Global> {
  pub fn new() -> Self {
    Self::new_in(Global)
  }
}

impl<A: HandleAlloc> StaticContext<A> {
  pub fn new_in(alloc: A) -> Self {
    Self {
      instances: HashMap::new(),
      alloc
    }
  }

  /// Destroys the instance of `T` (if any) then installs `value`.
  pub fn set<T: Any>(&mut self, value: T) {
    let object: NonNull<dyn Any> = allocator::alloc_value(&self.alloc, value);
    // SAFETY: Just allocated by this allocator and nothing else owns it
    let instance = unsafe { Exclusive::from_raw_in(object, self.alloc.clone()) };

    if self.clear::<T>() {
      debug!("Replaced instance of {} in static context", type_name::<T>());
    }
    self.instances.insert(TypeId::of::<T>(), instance);
  }

  /// Destroys the instance of `T`, returns whether there was one.
  pub fn clear<T: Any>(&mut self) -> bool {
    self.instances.remove(&TypeId::of::<T>()).is_some()
  }

  pub fn get<T: Any>(&self) -> Option<&T> {
    let instance = self.instances.get(&TypeId::of::<T>())?;
    Exclusive::get(instance)?.downcast_ref::<T>()
  }

  pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
    let instance = self.instances.get_mut(&TypeId::of::<T>())?;
    Exclusive::get_mut(instance)?.downcast_mut::<T>()
  }

  pub fn contains<T: Any>(&self) -> bool {
    self.instances.contains_key(&TypeId::of::<T>())
  }

  pub fn len(&self) -> usize {
    self.instances.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instances.is_empty()
  }
}

impl Default for StaticContext<Global> {
  fn default() -> Self {
    Self::new()
  }
}

/// Process-wide slot, declared as a `static`.
///
/// ```
/// use ownkit::GlobalSlot;
///
/// struct Settings {
///   volume: u8
/// }
///
/// static SETTINGS: GlobalSlot<Settings> = GlobalSlot::new();
///
/// SETTINGS.reset(Some(Settings { volume: 3 }));
/// SETTINGS.with(|settings| {
///   if let Some(settings) = settings {
///     settings.volume += 1;
///   }
/// });
/// assert_eq!(SETTINGS.with(|settings| settings.map(|s| s.volume)), Some(4));
/// ```
pub struct GlobalSlot<T> {
  instance: Mutex<Exclusive<T>>
}

impl<T: Send> GlobalSlot<T> {
  pub const fn new() -> Self {
    Self {
      instance: const_mutex(Exclusive::empty())
    }
  }

  pub fn is_null(&self) -> bool {
    Exclusive::is_empty(&self.instance.lock())
  }

  /// Installs `value` and destroys the previous instance (if any).
  ///
  /// The previous instance is destroyed after the slot is unlocked so
  /// its destructor may use the slot too.
  pub fn reset(&self, value: Option<T>) {
    let fresh = match value {
      Some(value) => Exclusive::new(value),
      None => Exclusive::empty()
    };

    let previous = mem::replace(&mut *self.instance.lock(), fresh);
    if !Exclusive::is_empty(&previous) {
      debug!("Replacing instance of {} in global slot", type_name::<T>());
    }
    drop(previous);
  }

  /// Runs `f` with the current instance while holding the slot locked.
  pub fn with<R>(&self, f: impl FnOnce(Option<&mut T>) -> R) -> R {
    let mut instance = self.instance.lock();
    f(Exclusive::get_mut(&mut instance))
  }
}

impl<T: Send> Default for GlobalSlot<T> {
  fn default() -> Self {
    Self::new()
  }
}
