#![allow(dead_code)]

use std::{cell::RefCell, fmt, rc::Rc};

use ownkit::{AllocError, Allocator, Global, HandleAlloc};

// Records the id of every Tracked value that got dropped
#[derive(Clone, Default)]
pub struct DropLog(Rc<RefCell<Vec<u32>>>);

impl DropLog {
  pub fn track(&self, id: u32) -> Tracked {
    Tracked {
      id,
      log: self.clone()
    }
  }

  pub fn total(&self) -> usize {
    self.0.borrow().len()
  }

  pub fn times_dropped(&self, id: u32) -> usize {
    self.0.borrow().iter().filter(|dropped| **dropped == id).count()
  }
}

pub struct Tracked {
  pub id: u32,
  log: DropLog
}

impl fmt::Debug for Tracked {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Tracked({})", self.id)
  }
}

impl Drop for Tracked {
  fn drop(&mut self) {
    self.log.0.borrow_mut().push(self.id);
  }
}

// Polymorphic components in the shape the scene layer uses them
pub trait Component {
  fn category(&self) -> &'static str;
}

pub struct Transform {
  pub x: f32,
  pub y: f32,
  pub tracked: Tracked
}

impl Component for Transform {
  fn category(&self) -> &'static str {
    "transform"
  }
}

pub struct Shape {
  pub sides: u32,
  pub tracked: Tracked
}

impl Component for Shape {
  fn category(&self) -> &'static str {
    "shape"
  }
}

#[path = "../../src/test_util/allocators.rs"]
mod allocators;

pub use allocators::{CountingAlloc, FailingAlloc};
