//! Block sizing for dispatching a work pool across workers.

/// Returns `(block_size, total_tasks)` for splitting `total_work` bytes across
/// `n_workers`, or `None` when there is nothing to do.
///
/// `block_size = total_work / n_workers` (at least 1) and
/// `total_tasks = ceil(total_work / block_size)`.
pub fn plan_blocks(total_work: u64, n_workers: usize) -> Option<(u64, u64)> {
    if total_work == 0 {
        return None;
    }
    let n = n_workers.max(1) as u64;
    let block_size = (total_work / n).max(1);
    let total_tasks = total_work.div_ceil(block_size);
    Some((block_size, total_tasks))
}
