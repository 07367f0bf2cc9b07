use thiserror::Error;

// NOTE: This type is considered to be part of public API
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HandleError {
  // Handle does not hold anything (never filled, moved
  // out of, reset or released)
  #[error("access through an empty handle")]
  NullTarget,

  // Weak handle outlived every owner of the object
  #[error("object observed by weak handle was already destroyed")]
  Expired,

  // Polymorphic retype to a type the object is not
  #[error("object is not a `{expected}`")]
  TypeMismatch {
    expected: &'static str
  },

  #[error("allocator could not satisfy {size} bytes aligned to {align}")]
  AllocFailed {
    size: usize,
    align: usize
  }
}

impl HandleError {
  pub(crate) fn alloc_failed<T>() -> Self {
    Self::AllocFailed {
      size: std::mem::size_of::<T>(),
      align: std::mem::align_of::<T>()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_name_the_condition() {
    assert_eq!(HandleError::NullTarget.to_string(), "access through an empty handle");
    let mismatch = HandleError::TypeMismatch { expected: "u32" };
    assert_eq!(mismatch.to_string(), "object is not a `u32`");
  }

  #[test]
  fn alloc_failed_reports_layout() {
    assert_eq!(HandleError::alloc_failed::<u64>(), HandleError::AllocFailed { size: 8, align: 8 });
  }
}
