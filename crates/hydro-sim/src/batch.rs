//! Independent simulation instances, one per seed.
//!
//! A [`Harness`] is single-threaded (its bus delivers through `Rc`), so each
//! instance is constructed *on* the worker that runs it.  Instances share
//! nothing; results come back in seed order.

use hydro_core::{SimConfig, SimRng};
use tracing::info;

use crate::{Harness, HarnessState, SimResult, Snapshot};

/// Result of one instance in a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub seed:   u64,
    pub result: SimResult<(HarnessState, Vec<Snapshot>)>,
}

/// `n` distinct instance seeds derived from `root`, reproducible for a given root.
pub fn batch_seeds(root: u64, n: usize) -> Vec<u64> {
    let mut rng = SimRng::new(root);
    (0..n as u64).map(|i| rng.child_seed(i)).collect()
}

/// Build and run one harness per seed.
///
/// `factory` receives a copy of `base` with `seed` replaced and must return
/// an un-built or built harness; it is built here when still `Building`.
/// With the `parallel` feature the instances run on Rayon's pool (or a
/// dedicated pool when `base.num_threads` is set); otherwise sequentially.
pub fn run_batch<F>(base: &SimConfig, seeds: &[u64], factory: F) -> Vec<BatchOutcome>
where
    F: Fn(SimConfig) -> SimResult<Harness> + Sync,
{
    info!(instances = seeds.len(), "batch started");
    let run_one = |seed: u64| BatchOutcome { seed, result: run_instance(base, seed, &factory) };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        let run_all = || seeds.par_iter().map(|&s| run_one(s)).collect::<Vec<_>>();
        match base.num_threads {
            Some(n) if n > 0 => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
                Ok(pool) => pool.install(run_all),
                Err(e) => {
                    tracing::warn!(error = %e, "falling back to the global thread pool");
                    run_all()
                }
            },
            _ => run_all(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        seeds.iter().map(|&s| run_one(s)).collect()
    }
}

fn run_instance<F>(base: &SimConfig, seed: u64, factory: &F) -> SimResult<(HarnessState, Vec<Snapshot>)>
where
    F: Fn(SimConfig) -> SimResult<Harness>,
{
    let config = SimConfig { seed, ..base.clone() };
    let mut harness = factory(config)?;
    if harness.state() == HarnessState::Building {
        harness.build()?;
    }
    let state = harness.run()?;
    Ok((state, harness.take_history()))
}
