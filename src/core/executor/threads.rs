//! Lightweight-thread workers on a dedicated rayon pool.

use super::{CancellationToken, Progress};
use crate::core::extractor::{ExtractOutcome, Extractor};
use crate::core::scanner::DiscoveredFile;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::warn;

/// Fill every empty slot that gets dispatched before cancellation
pub(super) fn run(
    workers: usize,
    files: &[DiscoveredFile],
    extractor: &Extractor<'_>,
    cancel: &CancellationToken,
    progress: &Progress<'_>,
    slots: &mut [Option<ExtractOutcome>],
) {
    let pending: Vec<usize> = slots
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.is_none())
        .map(|(index, _)| index)
        .collect();
    if pending.is_empty() {
        return;
    }

    let work = || {
        pending
            .par_iter()
            .map(|&index| {
                if cancel.is_cancelled() {
                    return (index, None);
                }
                let outcome = extractor.extract(&files[index], index);
                progress.record(&outcome);
                (index, Some(outcome))
            })
            .collect::<Vec<_>>()
    };

    let results = match ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(work),
        Err(e) => {
            warn!("Could not build a {}-thread pool ({}); using the global pool", workers, e);
            work()
        }
    };

    for (index, outcome) in results {
        if outcome.is_some() {
            slots[index] = outcome;
        }
    }
}
