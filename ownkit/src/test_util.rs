// Fixtures shared by unit tests

use std::{cell::Cell, rc::Rc};

use allocator_api2::alloc::{AllocError, Allocator, Global};

use crate::allocator::HandleAlloc;

mod allocators;

pub use allocators::{CountingAlloc, FailingAlloc};

// Counts how many probes it handed out got dropped
#[derive(Clone, Default)]
pub struct DropCounter(Rc<Cell<usize>>);

impl DropCounter {
  pub fn probe(&self) -> Probe {
    Probe {
      drops: self.0.clone(),
      id: 0
    }
  }

  pub fn probe_with_id(&self, id: u32) -> Probe {
    Probe {
      drops: self.0.clone(),
      id
    }
  }

  pub fn count(&self) -> usize {
    self.0.get()
  }
}

#[derive(Debug)]
pub struct Probe {
  drops: Rc<Cell<usize>>,
  pub id: u32
}

impl Drop for Probe {
  fn drop(&mut self) {
    self.drops.set(self.drops.get() + 1);
  }
}
