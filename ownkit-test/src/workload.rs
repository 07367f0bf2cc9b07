use std::{cell::Cell, rc::Rc, time::{Duration, Instant}};

use log::{debug, trace};
use ownkit::{Exclusive, Nullable, Shared, StaticContext, Weak};
use rand::{rngs::SmallRng, Rng};

const MESSAGE_SIZE: usize = 64;

// Running totals of objects which were created and destroyed
#[derive(Clone, Default)]
pub struct Ledger {
  created: Rc<Cell<u64>>,
  destroyed: Rc<Cell<u64>>
}

impl Ledger {
  pub fn created(&self) -> u64 {
    self.created.get()
  }

  pub fn destroyed(&self) -> u64 {
    self.destroyed.get()
  }

  fn message(&self, id: u64) -> Message {
    self.created.set(self.created.get() + 1);
    Message {
      id,
      payload: [(id & 0xFF) as u8; MESSAGE_SIZE],
      ledger: self.clone()
    }
  }
}

pub trait Envelope {
  fn checksum(&self) -> u64;
}

pub struct Message {
  id: u64,
  payload: [u8; MESSAGE_SIZE],
  ledger: Ledger
}

impl Envelope for Message {
  fn checksum(&self) -> u64 {
    self.payload.iter().map(|byte| u64::from(*byte)).sum::<u64>() ^ self.id
  }
}

impl Drop for Message {
  fn drop(&mut self) {
    let destroyed = &self.ledger.destroyed;
    destroyed.set(destroyed.get() + 1);
  }
}

// Most recent message, replaced as a whole in the context
struct Latest(Message);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
  Create,
  Copy,
  Move,
  Drop,
  Downgrade,
  Lock,
  Retype,
  Handover,
  Replace
}

impl Op {
  pub const ALL: [Op; 9] = [
    Op::Create,
    Op::Copy,
    Op::Move,
    Op::Drop,
    Op::Downgrade,
    Op::Lock,
    Op::Retype,
    Op::Handover,
    Op::Replace
  ];

  pub fn name(self) -> &'static str {
    match self {
      Op::Create => "create",
      Op::Copy => "copy",
      Op::Move => "move",
      Op::Drop => "drop",
      Op::Downgrade => "downgrade",
      Op::Lock => "lock",
      Op::Retype => "retype",
      Op::Handover => "handover",
      Op::Replace => "replace"
    }
  }
}

#[derive(Clone, Copy, Default)]
pub struct OpStats {
  pub count: u64,
  pub total: Duration,
  pub worst: Duration
}

impl OpStats {
  fn record(&mut self, time: Duration) {
    self.count += 1;
    self.total += time;
    self.worst = self.worst.max(time);
  }
}

pub struct Workload {
  rng: SmallRng,
  ledger: Ledger,
  next_id: u64,
  owners: Vec<Shared<dyn Envelope>>,
  observers: Vec<Weak<dyn Envelope>>,
  context: StaticContext,
  stats: [OpStats; Op::ALL.len()],
  checksum: u64
}

fn as_envelope(message: &Message) -> Option<&(dyn Envelope + 'static)> {
  Some(message)
}

impl Workload {
  pub fn new(rng: SmallRng, pool_size: usize) -> Self {
    Self {
      rng,
      ledger: Ledger::default(),
      next_id: 0,
      owners: Vec::with_capacity(pool_size),
      observers: Vec::with_capacity(pool_size),
      context: StaticContext::new(),
      stats: [OpStats::default(); Op::ALL.len()],
      checksum: 0
    }
  }

  pub fn ledger(&self) -> &Ledger {
    &self.ledger
  }

  pub fn stats(&self) -> impl Iterator<Item = (Op, &OpStats)> {
    Op::ALL.into_iter().zip(self.stats.iter())
  }

  pub fn checksum(&self) -> u64 {
    self.checksum
  }

  fn fresh(&mut self) -> Message {
    let id = self.next_id;
    self.next_id += 1;
    self.ledger.message(id)
  }

  fn pick(&mut self, len: usize) -> Option<usize> {
    if len == 0 {
      return None;
    }
    Some(self.rng.gen_range(0..len))
  }

  // Keeps pools within bounds by evicting random slots
  fn make_room(&mut self, pool_size: usize) {
    while self.owners.len() >= pool_size {
      let index = self.rng.gen_range(0..self.owners.len());
      self.owners.swap_remove(index);
    }
    while self.observers.len() >= pool_size {
      let index = self.rng.gen_range(0..self.observers.len());
      self.observers.swap_remove(index);
    }
  }

  pub fn step(&mut self, pool_size: usize) {
    let op = Op::ALL[self.rng.gen_range(0..Op::ALL.len())];
    self.make_room(pool_size);

    let start = Instant::now();
    self.run(op);
    let time = start.elapsed();

    trace!("{} took {:?}", op.name(), time);
    self.stats[op as usize].record(time);
  }

  fn run(&mut self, op: Op) {
    match op {
      Op::Create => {
        let message = self.fresh();
        self.owners.push(Shared::project(&Shared::new(message), as_envelope));
      },
      Op::Copy => {
        if let Some(index) = self.pick(self.owners.len()) {
          let copy = self.owners[index].clone();
          self.owners.push(copy);
        }
      },
      Op::Move => {
        if let Some(index) = self.pick(self.owners.len()) {
          let moved = Shared::take(&mut self.owners[index]);
          self.owners.push(moved);
        }
      },
      Op::Drop => {
        if let Some(index) = self.pick(self.owners.len()) {
          self.owners.swap_remove(index);
        }
      },
      Op::Downgrade => {
        if let Some(index) = self.pick(self.owners.len()) {
          let observer = Shared::downgrade(&self.owners[index]);
          self.observers.push(observer);
        }
      },
      Op::Lock => {
        if let Some(index) = self.pick(self.observers.len()) {
          let locked = self.observers[index].lock();
          if locked.is_null() {
            self.observers.swap_remove(index);
          } else {
            self.checksum = self.checksum.wrapping_add(locked.checksum());
          }
        }
      },
      Op::Retype => {
        if let Some(index) = self.pick(self.owners.len()) {
          let concrete = Shared::retype::<Message>(&self.owners[index]);
          if let Some(message) = Shared::get(&concrete) {
            self.checksum = self.checksum.wrapping_add(message.id);
          }
        }
      },
      Op::Handover => {
        let message = self.fresh();
        let mut exclusive = Exclusive::new(message);
        let replacement = self.fresh();
        Exclusive::reset_with(&mut exclusive, replacement);
        let shared = Exclusive::into_shared(exclusive);
        self.owners.push(Shared::project(&shared, as_envelope));
      },
      Op::Replace => {
        let message = self.fresh();
        self.context.set(Latest(message));
        if let Some(Latest(latest)) = self.context.get::<Latest>() {
          self.checksum = self.checksum.wrapping_add(latest.checksum());
        }
      }
    }
  }

  // Drops every handle, all objects must be gone afterwards
  pub fn finish(&mut self) {
    debug!("Releasing {} owners and {} observers", self.owners.len(), self.observers.len());
    self.owners.clear();
    self.context.clear::<Latest>();
    debug_assert!(self.observers.iter().all(Weak::is_expired));
    self.observers.clear();
  }
}
