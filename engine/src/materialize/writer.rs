//! Chunked conditional writes with retry of the failed subset.

use crate::errors::Result;
use crate::retry::RetryPolicy;
use crate::store::{BatchWrite, ItemKey};
use std::collections::BTreeSet;

/// Write `rows` in chunks of `batch_size`.
///
/// After each chunk, only the rows the store reported as failed are resent,
/// up to `retry.max_retries` times with backoff. Rows still failing are
/// returned in `failed`. A store-level error aborts the remaining chunks.
pub(crate) fn write_in_chunks<T>(
    rows: &[T],
    batch_size: usize,
    retry: &RetryPolicy,
    key_of: impl Fn(&T) -> ItemKey,
    write: impl Fn(&[T]) -> Result<BatchWrite>,
) -> Result<BatchWrite>
where
    T: Clone,
{
    let mut total = BatchWrite::default();

    for chunk in rows.chunks(batch_size.max(1)) {
        let mut outcome = write(chunk)?;
        let mut pending = std::mem::take(&mut outcome.failed);
        total.merge(outcome);

        let mut attempt = 0;
        while !pending.is_empty() && attempt < retry.max_retries {
            attempt += 1;
            let failed_keys: BTreeSet<&ItemKey> = pending.iter().map(|f| &f.key).collect();
            let subset: Vec<T> = chunk
                .iter()
                .filter(|row| failed_keys.contains(&key_of(*row)))
                .cloned()
                .collect();

            tracing::debug!(attempt, rows = subset.len(), "retrying failed batch items");
            retry.wait(attempt);

            let mut outcome = write(subset.as_slice())?;
            let still_failing = std::mem::take(&mut outcome.failed);
            total.merge(outcome);
            pending = still_failing;
        }

        total.failed.extend(pending);
    }

    Ok(total)
}
