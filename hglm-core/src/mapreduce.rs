//! Partitioned map-reduce over a frame.
//!
//! Partitions are mapped in parallel on the rayon pool; partial results are
//! then folded sequentially in partition order, so the outcome depends only
//! on how the frame is chunked and never on thread scheduling.

use rayon::prelude::*;

use hglm_frame::{Frame, Partition};

use crate::error::{HglmError, Result};
use crate::job::JobHandle;

/// A pass over the frame: a per-partition map and an associative combine.
pub trait PartitionTask: Sync {
    type Output: Send;

    /// Neutral element of [`PartitionTask::reduce`].
    fn identity(&self) -> Self::Output;

    fn map(&self, partition: &Partition<'_>) -> Self::Output;

    fn reduce(&self, left: Self::Output, right: Self::Output) -> Self::Output;
}

/// Run `task` over every partition of `frame`.
///
/// Each map first polls the stop flag and yields the identity when a stop
/// was requested; the pass then reports [`HglmError::Cancelled`] so no
/// partial reduction is ever used.
pub fn run_task<T: PartitionTask>(task: &T, frame: &Frame, job: &JobHandle) -> Result<T::Output> {
    let partitions = frame.partitions();
    let partials: Vec<T::Output> = partitions
        .par_iter()
        .map(|partition| {
            if job.stop_requested() {
                task.identity()
            } else {
                task.map(partition)
            }
        })
        .collect();
    if job.stop_requested() {
        return Err(HglmError::Cancelled);
    }
    Ok(partials
        .into_iter()
        .fold(task.identity(), |acc, partial| task.reduce(acc, partial)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hglm_frame::FrameBuilder;

    struct SumTask;

    impl PartitionTask for SumTask {
        type Output = (f64, Vec<usize>);

        fn identity(&self) -> Self::Output {
            (0.0, Vec::new())
        }

        fn map(&self, partition: &Partition<'_>) -> Self::Output {
            let sum = partition.rows().map(|row| row.numeric(0)).sum();
            (sum, vec![partition.index()])
        }

        fn reduce(&self, mut left: Self::Output, right: Self::Output) -> Self::Output {
            left.0 += right.0;
            left.1.extend(right.1);
            left
        }
    }

    fn frame(chunk_rows: usize) -> Frame {
        FrameBuilder::new()
            .numeric("v", (1..=10).map(f64::from).collect())
            .chunk_rows(chunk_rows)
            .build()
            .unwrap()
    }

    #[test]
    fn test_reduces_in_partition_order() {
        let (sum, order) = run_task(&SumTask, &frame(3), &JobHandle::new()).unwrap();
        assert_eq!(sum, 55.0);
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_chunking_does_not_change_result() {
        let job = JobHandle::new();
        let one = run_task(&SumTask, &frame(100), &job).unwrap().0;
        let many = run_task(&SumTask, &frame(1), &job).unwrap().0;
        assert_eq!(one, many);
    }

    #[test]
    fn test_stopped_job_is_cancelled() {
        let job = JobHandle::new();
        job.request_stop();
        assert!(matches!(
            run_task(&SumTask, &frame(2), &job),
            Err(HglmError::Cancelled)
        ));
    }
}
