//! Trial budget bookkeeping

/// Trials still to run to reach `target`, given `recorded` trials so far.
pub fn remaining_trials(target: u64, recorded: u64) -> u64 {
    target.saturating_sub(recorded)
}

/// Split `trials` over `jobs` workers.
///
/// Every worker gets `trials / jobs`; the remainder goes to the last one.
/// `jobs == 0` is treated as one worker.
pub fn split_trials(trials: u64, jobs: u64) -> Vec<u64> {
    let jobs = jobs.max(1);
    let share = trials / jobs;
    let mut split = vec![share; jobs as usize];
    if let Some(last) = split.last_mut() {
        *last += trials - share * jobs;
    }
    split
}
