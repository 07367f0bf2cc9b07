#![deny(unsafe_op_in_unsafe_fn)]

// Ownership handles for heap objects:
//
// - Exclusive: sole owner, moves but never copies
// - Shared: reference counted co-owner, can be retyped
//   while keeping one ownership accounting
// - Weak: observer of Shared owned object which can be
//   promoted back while the object is alive
// - StaticSlot, StaticContext, GlobalSlot: zero or one
//   instance slots which destroy the previous on replace
//
// Single threaded: Shared and Weak are neither
// Send nor Sync.

mod allocator;
mod control_block;
mod error;
mod exclusive;
mod handle;
mod shared;
mod static_slot;
mod weak;

#[cfg(test)]
mod test_util;

// Publicize the API
pub use allocator::HandleAlloc;
pub use allocator_api2::alloc::{AllocError, Allocator, Global};
pub use error::HandleError;
pub use exclusive::Exclusive;
pub use handle::Nullable;
pub use shared::Shared;
pub use static_slot::{GlobalSlot, StaticContext, StaticSlot};
pub use weak::Weak;
