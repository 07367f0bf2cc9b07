#![allow(clippy::needless_return)]
#![deny(unsafe_op_in_unsafe_fn)]

use std::{process::ExitCode, time::Instant};

use clap::Parser;
use log::{error, info};
use rand::{rngs::SmallRng, SeedableRng};
use tabled::{settings::Style, Table, Tabled};

mod workload;

#[cfg(not(miri))]
mod non_miri;

use workload::Workload;

/// Hammers the handle types with random operations and checks
/// that every object created was destroyed exactly once.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Params {
  /// Number of random operations to perform
  #[arg(long, default_value_t = 1_000_000)]
  iterations: u64,

  /// Maximum number of owners (and observers) alive at once
  #[arg(long, default_value_t = 4096)]
  pool_size: usize,

  /// Seed for the operation sequence, random when absent
  #[arg(long)]
  seed: Option<u64>,

  /// MiB to reserve up front from mimalloc, 0 to skip
  #[arg(long, default_value_t = 0)]
  reserve_mib: usize
}

#[derive(Tabled)]
struct OpEntry {
  op: &'static str,
  count: String,
  total: String,
  average: String,
  worst: String
}

fn main() -> ExitCode {
  env_logger::init();
  let params = Params::parse();

  #[cfg(not(miri))]
  non_miri::prepare_mimalloc(params.reserve_mib);

  let seed = params.seed.unwrap_or_else(rand::random);
  info!("Running {} iterations with pool size {} and seed {seed}", params.iterations, params.pool_size);

  let pool_size = params.pool_size.max(1);
  let mut workload = Workload::new(SmallRng::seed_from_u64(seed), pool_size);
  let start = Instant::now();
  for _ in 0..params.iterations {
    workload.step(pool_size);
  }
  workload.finish();
  let complete_time = start.elapsed().as_secs_f32();

  let table_content = workload.stats()
    .map(|(op, stats)| {
      let total = stats.total.as_secs_f64() * 1000.0;
      let average = if stats.count == 0 {
        0.0
      } else {
        stats.total.as_secs_f64() * 1_000_000_000.0 / stats.count as f64
      };

      OpEntry {
        op: op.name(),
        count: format!("{:>10}", stats.count),
        total: format!("{total:>10.3} ms"),
        average: format!("{average:>8.1} ns"),
        worst: format!("{:>8.3} us", stats.worst.as_secs_f64() * 1_000_000.0)
      }
    });

  let mut table = Table::new(table_content);
  table.with(Style::rounded());
  println!("{table}");

  let ledger = workload.ledger();
  println!("Test time was {complete_time:.2} secs");
  println!("Objects created  : {:>12}", ledger.created());
  println!("Objects destroyed: {:>12}", ledger.destroyed());
  println!("Checksum         : {:>12}", workload.checksum());

  if ledger.created() != ledger.destroyed() {
    error!("{} objects were created but {} destroyed (seed {seed})", ledger.created(), ledger.destroyed());
    return ExitCode::FAILURE;
  }

  info!("Every object was destroyed exactly once");
  return ExitCode::SUCCESS;
}
