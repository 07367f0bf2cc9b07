use std::ffi::{c_int, c_long};

use log::{debug, warn};
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub fn prepare_mimalloc(reserve_mib: usize) {
  // mimalloc crate does not expose mi_reserve_os_memory
  // and the option setters, so declare them here
  const MI_OPTION_SHOW_ERRORS: c_int = 0;
  const MI_OPTION_PURGE_DELAY: c_int = 15;

  extern "C" {
    fn mi_reserve_os_memory(size: usize, commit: bool, allow_large: bool) -> c_int;
    fn mi_option_set(option: c_int, val: c_long);
    fn mi_option_enable(option: c_int);
  }

  // SAFETY: Plain option setters of the linked mimalloc
  unsafe {
    mi_option_enable(MI_OPTION_SHOW_ERRORS);
    mi_option_set(MI_OPTION_PURGE_DELAY, 30_000);
  };

  if reserve_mib == 0 {
    return;
  }

  // SAFETY: Only asks mimalloc to map more memory for its arenas
  if unsafe { mi_reserve_os_memory(reserve_mib * 1024 * 1024, true, false) } != 0 {
    warn!("Could not reserve {reserve_mib} MiB from mimalloc");
    return;
  }
  debug!("Reserved {reserve_mib} MiB from mimalloc");
}
