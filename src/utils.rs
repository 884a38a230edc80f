use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Seed used by scenarios, set per iteration by the CLI
pub static RAND_SEED: AtomicU64 = AtomicU64::new(0);

/// Number of closed loop simulation runs completed in this process
pub static TOTAL_SIMULATION_RUNS: AtomicUsize = AtomicUsize::new(0);

/// Current scenario seed, offset by `salt` so that several random sources in one scenario differ
pub fn scenario_seed(salt: u64) -> u64 {
    RAND_SEED.load(Ordering::Relaxed).wrapping_mul(1_000_003).wrapping_add(salt)
}

/// StdRng seeded from the current scenario seed
pub fn seeded_rng(salt: u64) -> StdRng {
    StdRng::seed_from_u64(scenario_seed(salt))
}
