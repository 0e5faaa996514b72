//
// Copyright 2020-2022 Signal Messenger, LLC.
// SPDX-License-Identifier: AGPL-3.0-only
//

//! Per-bucket FIFO serialization of session operations.
//!
//! Every encrypt, decrypt or bootstrap against a given remote address must run with exclusive
//! access to that address's session record. Buckets are independent: operations against
//! distinct addresses proceed concurrently.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::sync::{Mutex, OwnedMutexGuard};

static SESSION_JOB_QUEUE: Lazy<JobQueue> = Lazy::new(JobQueue::new);

/// The process-wide queue used by [crate::SessionCipher] and [crate::SessionBuilder].
pub fn session_job_queue() -> &'static JobQueue {
    &SESSION_JOB_QUEUE
}

/// Serializes tasks per bucket while letting distinct buckets interleave.
///
/// The per-bucket lock is a fair [tokio::sync::Mutex], so tasks acquire their turn in the
/// order they requested it. A task's failure releases the bucket like any other completion;
/// nothing is poisoned. Bucket entries are dropped once the last interested task releases its
/// turn, so the map does not grow with the set of addresses ever seen.
pub struct JobQueue {
    buckets: DashMap<String, Arc<Mutex<()>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Wait for `bucket`'s turn. The returned guard holds the bucket until dropped.
    pub async fn acquire(&self, bucket: &str) -> BucketGuard<'_> {
        let gate = self
            .buckets
            .entry(bucket.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let turn = gate.clone().lock_owned().await;
        BucketGuard {
            queue: self,
            bucket: bucket.to_string(),
            _gate: gate,
            turn: Some(turn),
        }
    }

    /// Run `task` once `bucket`'s prior tasks have completed, returning its output.
    pub async fn run<F, T>(&self, bucket: &str, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _turn = self.acquire(bucket).await;
        task.await
    }

    fn release(&self, bucket: &str) {
        // Two strong references remain while the releasing guard is alive: the map's and the
        // guard's own. More than two means another task is queued on this bucket.
        self.buckets
            .remove_if(bucket, |_, gate| Arc::strong_count(gate) == 2);
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive hold on one bucket, released on drop.
pub struct BucketGuard<'a> {
    queue: &'a JobQueue,
    bucket: String,
    _gate: Arc<Mutex<()>>,
    turn: Option<OwnedMutexGuard<()>>,
}

impl Drop for BucketGuard<'_> {
    fn drop(&mut self) {
        self.turn.take();
        self.queue.release(&self.bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;
    use std::rc::Rc;

    #[tokio::test]
    async fn tasks_in_one_bucket_complete_in_submission_order() {
        let queue = JobQueue::new();
        let log: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));

        let slow = async {
            let _turn = queue.acquire("bucket").await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            log.borrow_mut().push(1);
        };
        let fast = async {
            let _turn = queue.acquire("bucket").await;
            log.borrow_mut().push(2);
        };
        let faster = async {
            let _turn = queue.acquire("bucket").await;
            log.borrow_mut().push(3);
        };

        tokio::join!(slow, fast, faster);
        assert_eq!(&*log.borrow(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn distinct_buckets_interleave() {
        let queue = JobQueue::new();
        let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let blocked = async {
            let _turn = queue.acquire("a").await;
            // Let the other bucket's task run while this one holds "a".
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            log.borrow_mut().push("a");
        };
        let free = async {
            queue
                .run("b", async {
                    log.borrow_mut().push("b");
                })
                .await;
        };

        tokio::join!(blocked, free);
        assert_eq!(&*log.borrow(), &["b", "a"]);
    }

    #[tokio::test]
    async fn failed_tasks_do_not_poison_the_bucket() {
        let queue = JobQueue::new();

        let failed: Result<(), &'static str> = queue.run("bucket", async { Err("boom") }).await;
        assert!(failed.is_err());

        let ok: Result<u32, &'static str> = queue.run("bucket", async { Ok(42) }).await;
        assert_eq!(ok, Ok(42));
    }

    #[tokio::test]
    async fn bucket_entries_are_released() {
        let queue = JobQueue::new();
        queue.run("bucket", async {}).await;
        assert!(queue.buckets.is_empty());
    }
}
