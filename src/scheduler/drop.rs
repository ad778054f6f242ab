//! Cancel / drop fan-out, grounded on SPEC_FULL.md §4.7 / original
//! `scheduler.c` `schDropJobAllTasks`/`schedulerFreeJob`, plus the
//! DESIGN.md-recorded resolution of the `schCancelJob` Open Question
//! (stub in the original): cancel reuses the same drop-RPC fan-out,
//! transitioning through `Cancelling` to `Cancelled` instead of straight
//! to `Dropped`.

use std::sync::Arc;

use crate::scheduler::job::{Job, JobStatus};
use crate::scheduler::launch::TaskDispatcher;
use crate::scheduler::task::SchedTaskState;

/// Walk every task across every level and fire a best-effort DROP-TASK RPC
/// at each address it ever actually executed on (§4.7 "walks executing +
/// succeeded + failed task maps [...] dispatches a drop RPC per address").
/// Tasks marked `no_need_drop` (never launched) are skipped.
async fn fan_out_drop(job: &Arc<Job>, dispatcher: &dyn TaskDispatcher) {
    // Collect (task_id, addrs) first so the drop RPCs can be awaited
    // without holding the levels lock across network I/O.
    let targets: Vec<(u64, Vec<std::net::SocketAddr>)> = {
        let levels = job.levels.lock();
        levels
            .iter()
            .flat_map(|level| level.tasks.iter())
            .filter(|task| !task.no_need_drop)
            .map(|task| (task.task_id, task.exec_addrs()))
            .collect()
    };

    for (task_id, addrs) in targets {
        for addr in addrs {
            dispatcher.dispatch_drop(addr, task_id).await;
        }
    }

    let mut levels = job.levels.lock();
    for level in levels.iter_mut() {
        for task in level.tasks.iter_mut() {
            if !task.state().is_terminal() {
                task.set_state(SchedTaskState::Dropped);
            }
        }
    }
}

/// User-initiated drop: walks all recorded execution addresses issuing
/// best-effort DROP-TASK RPCs, then marks the job `Dropping` -> (after the
/// fan-out) terminal `Dropped`. Per §8 "no leaks on drop": after this
/// returns, every recorded execution address has received at least one
/// drop-RPC attempt.
pub async fn drop_job(job: &Arc<Job>, dispatcher: &dyn TaskDispatcher) {
    job.set_status(JobStatus::Dropping);
    fan_out_drop(job, dispatcher).await;
    job.set_status(JobStatus::Dropped);
}

/// Cancel: same fan-out, but settles on `Cancelled` rather than `Dropped`,
/// matching the DESIGN.md decision for the `schCancelJob` Open Question.
pub async fn cancel_job(job: &Arc<Job>, dispatcher: &dyn TaskDispatcher) {
    job.set_status(JobStatus::Cancelling);
    fan_out_drop(job, dispatcher).await;
    job.set_status(JobStatus::Cancelled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::level::Level;
    use crate::scheduler::task::Task;
    use bytes::Bytes;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn addr(p: u16) -> SocketAddr {
        format!("127.0.0.1:{p}").parse().unwrap()
    }

    struct RecordingDispatcher {
        drops: StdMutex<Vec<(SocketAddr, u64)>>,
        count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl TaskDispatcher for RecordingDispatcher {
        async fn dispatch_query(&self, _addr: SocketAddr, _task_id: u64, _plan: &Bytes) -> crate::Result<()> {
            Ok(())
        }
        async fn dispatch_drop(&self, addr: SocketAddr, task_id: u64) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.drops.lock().unwrap().push((addr, task_id));
        }
    }

    #[tokio::test]
    async fn drop_reaches_every_recorded_exec_addr() {
        let t1 = Task::new(1, 0, vec![addr(1), addr(2)], Bytes::new(), None, vec![]);
        t1.record_exec_addr(addr(1));
        let t2 = Task::new(2, 0, vec![addr(3)], Bytes::new(), None, vec![]);
        t2.record_exec_addr(addr(3));
        let job = Job::new(1, vec![Level::new(0, vec![t1, t2])]);
        job.set_status(JobStatus::Executing);

        let dispatcher = RecordingDispatcher { drops: StdMutex::new(vec![]), count: AtomicUsize::new(0) };
        drop_job(&job, &dispatcher).await;

        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 2);
        assert_eq!(job.status(), JobStatus::Dropped);
    }

    #[tokio::test]
    async fn no_need_drop_task_is_skipped() {
        let mut t1 = Task::new(1, 0, vec![addr(1)], Bytes::new(), None, vec![]);
        t1.no_need_drop = true;
        t1.record_exec_addr(addr(1));
        let job = Job::new(1, vec![Level::new(0, vec![t1])]);

        let dispatcher = RecordingDispatcher { drops: StdMutex::new(vec![]), count: AtomicUsize::new(0) };
        drop_job(&job, &dispatcher).await;

        assert_eq!(dispatcher.count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_settles_on_cancelled() {
        let t1 = Task::new(1, 0, vec![addr(1)], Bytes::new(), None, vec![]);
        let job = Job::new(1, vec![Level::new(0, vec![t1])]);
        let dispatcher = RecordingDispatcher { drops: StdMutex::new(vec![]), count: AtomicUsize::new(0) };
        cancel_job(&job, &dispatcher).await;
        assert_eq!(job.status(), JobStatus::Cancelled);
    }
}
