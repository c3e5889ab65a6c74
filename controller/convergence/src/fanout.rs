//! Runs one task per target against a shared deadline.

use std::{future::Future, sync::Arc};
use tokio::{task::JoinSet, time};

/// Reports how many of the spawned tasks finished before the deadline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Completion {
    pub spawned: usize,
    pub completed: usize,
}

// === impl Completion ===

impl Completion {
    /// An empty fanout is never complete.
    pub fn all_completed(&self) -> bool {
        self.spawned > 0 && self.completed == self.spawned
    }

    pub fn outstanding(&self) -> usize {
        self.spawned - self.completed
    }
}

/// Spawns every task and waits up to `deadline` for all of them to finish.
///
/// `aggregate` is invoked from within each task with that task's output as
/// soon as it is available, so it must tolerate concurrent calls. Tasks still
/// running when the deadline elapses are aborted; their outputs are never
/// aggregated once the fanout has returned.
pub async fn run<I, F, A>(tasks: I, deadline: time::Duration, aggregate: A) -> Completion
where
    I: IntoIterator<Item = F>,
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    A: Fn(F::Output) + Send + Sync + 'static,
{
    let aggregate = Arc::new(aggregate);
    let mut running = JoinSet::new();
    for task in tasks {
        let aggregate = aggregate.clone();
        running.spawn(async move { aggregate(task.await) });
    }

    let spawned = running.len();
    let mut completed = 0;
    let finished = time::timeout(deadline, async {
        while let Some(res) = running.join_next().await {
            if let Err(error) = res {
                tracing::warn!(%error, "fanout task failed");
            }
            completed += 1;
        }
    })
    .await
    .is_ok();

    if !finished {
        tracing::debug!(
            outstanding = spawned - completed,
            ?deadline,
            "deadline elapsed; aborting outstanding tasks"
        );
        running.abort_all();
    }

    Completion { spawned, completed }
}
