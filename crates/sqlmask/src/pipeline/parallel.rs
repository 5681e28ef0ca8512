//! Order-preserving parallel row transformation.
//!
//! One reader feeds a fixed pool of worker threads through a bounded job
//! channel; workers run the table's transformers on each row and return
//! `(index, row)` results; the reader thread drains results and hands rows
//! to the writer in strictly ascending index order. Both channels are
//! bounded to `2 × jobs`, and the reader additionally blocks once more than
//! `2 × jobs` rows are in flight, so memory use stays bounded.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::core::Value;
use crate::error::{MaskError, Result};
use crate::transform::{RowContext, Transformer};

/// A transformer bound to its column position in the row.
pub(crate) struct BoundTransform<'a> {
    pub index: usize,
    pub column: &'a str,
    pub transformer: &'a dyn Transformer,
}

struct RowJob {
    index: u64,
    values: Vec<Value>,
    ctx: RowContext,
}

struct RowResult {
    index: u64,
    values: Result<Vec<Value>>,
}

/// Apply the bound transformers to one row in place.
pub(crate) fn apply_transforms(
    transforms: &[BoundTransform<'_>],
    values: &mut [Value],
    ctx: &RowContext,
) -> Result<()> {
    for bt in transforms {
        let cell = std::mem::replace(&mut values[bt.index], Value::Null);
        values[bt.index] = bt
            .transformer
            .transform(cell, ctx)
            .map_err(|e| MaskError::transform(&ctx.table, bt.column, e.to_string()))?;
    }
    Ok(())
}

/// Pump rows from `next_row` through a worker pool and into `write`,
/// preserving source order.
///
/// `next_row` runs on the calling thread (it holds the source row cursor),
/// `write` also runs on the calling thread (it holds the output statement).
pub(crate) fn run_parallel(
    jobs: usize,
    transforms: &[BoundTransform<'_>],
    cancel: &CancellationToken,
    mut next_row: impl FnMut() -> Result<Option<(Vec<Value>, RowContext)>>,
    mut write: impl FnMut(Vec<Value>) -> Result<()>,
) -> Result<()> {
    let capacity = jobs * 2;
    let (job_tx, job_rx) = mpsc::sync_channel::<RowJob>(capacity);
    let (result_tx, result_rx) = mpsc::sync_channel::<RowResult>(capacity);
    let job_rx = Arc::new(Mutex::new(job_rx));

    // The scope closure takes ownership of both channel endpoints so an
    // early error return drops them before the implicit join, letting
    // blocked workers disconnect instead of deadlocking.
    std::thread::scope(move |scope| -> Result<()> {
        for _ in 0..jobs {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            scope.spawn(move || loop {
                let job = {
                    let rx = match job_rx.lock() {
                        Ok(rx) => rx,
                        Err(_) => return,
                    };
                    rx.recv()
                };
                let Ok(mut job) = job else { return };
                let outcome = apply_transforms(transforms, &mut job.values, &job.ctx);
                let result = RowResult {
                    index: job.index,
                    values: outcome.map(|()| job.values),
                };
                if result_tx.send(result).is_err() {
                    return;
                }
            });
        }
        // The workers hold their own clones.
        drop(result_tx);

        let mut pending: BTreeMap<u64, Vec<Value>> = BTreeMap::new();
        let mut next_write: u64 = 0;
        let mut flush = |result: RowResult,
                         pending: &mut BTreeMap<u64, Vec<Value>>,
                         next_write: &mut u64|
         -> Result<()> {
            pending.insert(result.index, result.values?);
            while let Some(values) = pending.remove(&*next_write) {
                write(values)?;
                *next_write += 1;
            }
            Ok(())
        };

        let mut index: u64 = 0;
        let mut inflight: usize = 0;
        while let Some((values, ctx)) = next_row()? {
            if cancel.is_cancelled() {
                return Err(MaskError::Cancelled);
            }
            job_tx
                .send(RowJob { index, values, ctx })
                .map_err(|_| MaskError::Cancelled)?;
            index += 1;
            inflight += 1;
            while inflight > capacity {
                let result = result_rx.recv().map_err(|_| MaskError::Cancelled)?;
                inflight -= 1;
                flush(result, &mut pending, &mut next_write)?;
            }
        }
        drop(job_tx);
        for _ in 0..inflight {
            let result = result_rx.recv().map_err(|_| MaskError::Cancelled)?;
            flush(result, &mut pending, &mut next_write)?;
        }
        Ok(())
    })
}
