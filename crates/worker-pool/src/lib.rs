//! Multi-tenant worker pool: claims runnable tasks off the store and hands
//! them to per-user worker lanes sized by [`fair_share::allocate`].
//!
//! Three independent loops drive the pool once [`WorkerPool::start`] is
//! called:
//!
//! - task scheduler (2s): claims `pending -> queued` tasks up to each
//!   user's current allocation and pushes them onto that user's channel.
//! - allocation updater (30s): recomputes every active user's share of
//!   `capacity` from their cumulative error count.
//! - dynamic worker manager (10s): spawns or cancels worker tasks so each
//!   user's live worker count matches their current allocation.
//!
//! A user's channel is read by however many live workers are currently
//! assigned to them, behind a shared [`tokio::sync::Mutex`] - scaling a
//! lane up or down never touches the channel itself, only how many readers
//! pull from it.

mod error;

pub use error::PoolError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use batch_domain::{BatchRepository, BatchStatus, TaskRepository, TaskStatus};
use fair_share::UserLoad;
use serde::Serialize;
use task_executor::TaskExecutor;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TASK_SCHEDULER_INTERVAL: Duration = Duration::from_secs(2);
const ALLOCATION_INTERVAL: Duration = Duration::from_secs(30);
const ADJUSTMENT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub capacity: u32,
    pub penalty_threshold: i64,
    pub max_retry_count: i32,
}

struct UserLane {
    sender: mpsc::Sender<Uuid>,
    receiver: Arc<AsyncMutex<mpsc::Receiver<Uuid>>>,
    allocated: u32,
    tokens: Vec<CancellationToken>,
    live: Arc<AtomicU32>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    loop_handles: Vec<JoinHandle<()>>,
    users: Arc<RwLock<HashMap<Uuid, UserLane>>>,
    workers: Arc<AsyncMutex<JoinSet<()>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub allocated: u32,
    pub live: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub running: bool,
    pub capacity: u32,
    pub allocations: HashMap<Uuid, UserStatus>,
}

pub struct WorkerPool {
    batches: Arc<dyn BatchRepository>,
    tasks: Arc<dyn TaskRepository>,
    executor: Arc<TaskExecutor>,
    config: PoolConfig,
    inner: AsyncMutex<Option<Running>>,
}

impl WorkerPool {
    pub fn new(
        batches: Arc<dyn BatchRepository>,
        tasks: Arc<dyn TaskRepository>,
        executor: Arc<TaskExecutor>,
        config: PoolConfig,
    ) -> Self {
        Self {
            batches,
            tasks,
            executor,
            config,
            inner: AsyncMutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    /// Idempotent: a second call while already running is a no-op.
    pub async fn start(&self) -> Result<(), PoolError> {
        let mut guard = self.inner.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        self.cold_start_sweep().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let users: Arc<RwLock<HashMap<Uuid, UserLane>>> = Arc::new(RwLock::new(HashMap::new()));
        let workers: Arc<AsyncMutex<JoinSet<()>>> = Arc::new(AsyncMutex::new(JoinSet::new()));
        let mut loop_handles = Vec::with_capacity(3);

        loop_handles.push(tokio::spawn(task_scheduler_loop(
            self.tasks.clone(),
            users.clone(),
            self.config.max_retry_count,
            shutdown_rx.clone(),
        )));

        loop_handles.push(tokio::spawn(allocation_updater_loop(
            self.batches.clone(),
            self.tasks.clone(),
            users.clone(),
            self.config.clone(),
            shutdown_rx.clone(),
        )));

        loop_handles.push(tokio::spawn(dynamic_worker_manager_loop(
            self.executor.clone(),
            users.clone(),
            workers.clone(),
            shutdown_rx.clone(),
        )));

        tracing::info!(capacity = self.config.capacity, "worker pool started");
        *guard = Some(Running {
            shutdown: shutdown_tx,
            loop_handles,
            users,
            workers,
        });
        Ok(())
    }

    /// Signals every loop and worker to stop and waits for them to drain.
    /// A second call while already stopped is a no-op.
    pub async fn stop(&self) -> Result<(), PoolError> {
        let mut guard = self.inner.lock().await;
        let Some(running) = guard.take() else {
            return Ok(());
        };

        let _ = running.shutdown.send(true);
        {
            let users = running.users.read().await;
            for lane in users.values() {
                for token in &lane.tokens {
                    token.cancel();
                }
            }
        }

        for handle in running.loop_handles {
            let _ = handle.await;
        }
        let mut joinset = running.workers.lock().await;
        while joinset.join_next().await.is_some() {}

        tracing::info!("worker pool stopped");
        Ok(())
    }

    pub async fn status(&self) -> PoolStatus {
        let guard = self.inner.lock().await;
        match guard.as_ref() {
            None => PoolStatus {
                running: false,
                capacity: self.config.capacity,
                allocations: HashMap::new(),
            },
            Some(running) => {
                let users = running.users.read().await;
                let allocations = users
                    .iter()
                    .map(|(id, lane)| {
                        (
                            *id,
                            UserStatus {
                                allocated: lane.allocated,
                                live: lane.live.load(Ordering::SeqCst),
                            },
                        )
                    })
                    .collect();
                PoolStatus {
                    running: true,
                    capacity: self.config.capacity,
                    allocations,
                }
            }
        }
    }

    pub async fn reset_batch_error_count(&self, batch_id: Uuid) -> Result<(), PoolError> {
        self.batches.reset_error_count(batch_id).await?;
        Ok(())
    }

    pub async fn reset_user_error_count(&self, user_id: Uuid) -> Result<u64, PoolError> {
        Ok(self.batches.reset_error_count_for_user(user_id).await?)
    }

    /// Crash-recovery sweep run once before the first scheduler tick:
    /// reverts tasks an interrupted process left `running`/`queued`,
    /// cancels runnable tasks of batches stopped while nothing was
    /// listening, and reverts batches stranded `processing` with no live
    /// task back to `pending`.
    async fn cold_start_sweep(&self) -> Result<(), PoolError> {
        let reset = self.tasks.cold_start_reset().await?;
        let stopped = self.batches.ids_with_status(BatchStatus::Stopped).await?;
        let cancelled = self
            .tasks
            .cancel_pending_queued_for_batches(&stopped)
            .await?;
        let stalled = self.batches.reset_stalled_processing_batches().await?;
        tracing::info!(reset, cancelled, stalled, "cold start sweep complete");
        Ok(())
    }
}

async fn task_scheduler_loop(
    tasks: Arc<dyn TaskRepository>,
    users: Arc<RwLock<HashMap<Uuid, UserLane>>>,
    max_retry_count: i32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(TASK_SCHEDULER_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = fetch_and_schedule(&tasks, &users, max_retry_count).await {
                    tracing::error!(error = %e, "task scheduler tick failed");
                }
            }
        }
    }
}

/// Claims up to each active user's allocation worth of `pending` tasks and
/// hands them to that user's lane. A claim that fails to enqueue (lane full
/// or not yet provisioned) reverts back to `pending` for the next tick.
async fn fetch_and_schedule(
    tasks: &Arc<dyn TaskRepository>,
    users: &Arc<RwLock<HashMap<Uuid, UserLane>>>,
    max_retry_count: i32,
) -> Result<(), PoolError> {
    let by_user = tasks.runnable_tasks_by_user(max_retry_count).await?;
    let lanes = users.read().await;

    for (user_id, user_tasks) in by_user {
        let Some(lane) = lanes.get(&user_id) else {
            continue;
        };
        if lane.allocated == 0 {
            continue;
        }

        let candidates: Vec<Uuid> = user_tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .take(lane.allocated as usize)
            .map(|t| t.id)
            .collect();
        if candidates.is_empty() {
            continue;
        }

        let claimed = tasks.claim_pending(&candidates).await?;
        for id in claimed {
            if lane.sender.try_send(id).is_err() {
                tracing::warn!(task_id = %id, user_id = %user_id, "user lane full, reverting task to pending");
                tasks.revert_to_pending(id).await?;
            }
        }
    }
    Ok(())
}

async fn allocation_updater_loop(
    batches: Arc<dyn BatchRepository>,
    tasks: Arc<dyn TaskRepository>,
    users: Arc<RwLock<HashMap<Uuid, UserLane>>>,
    config: PoolConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(ALLOCATION_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = refresh_allocation(&batches, &tasks, &users, &config).await {
                    tracing::error!(error = %e, "allocation refresh failed");
                }
            }
        }
    }
}

/// Recomputes the fair-share split of `config.capacity` across every user
/// with at least one runnable task, ordered by their earliest pending
/// task's creation time (the allocator's documented tie-break order).
/// Users that fall idle keep their lane (in case a worker is still
/// mid-task) but drop to zero allocation; lanes with nothing live and
/// nothing allocated are garbage-collected here.
async fn refresh_allocation(
    batches: &Arc<dyn BatchRepository>,
    tasks: &Arc<dyn TaskRepository>,
    users: &Arc<RwLock<HashMap<Uuid, UserLane>>>,
    config: &PoolConfig,
) -> Result<(), PoolError> {
    let error_counts = batches.active_user_error_counts().await?;
    let runnable = tasks.runnable_tasks_by_user(config.max_retry_count).await?;

    let mut ordered: Vec<(Uuid, chrono::DateTime<chrono::Utc>)> = runnable
        .iter()
        .filter_map(|(uid, ts)| ts.iter().map(|t| t.created_at).min().map(|m| (*uid, m)))
        .collect();
    ordered.sort_by_key(|(_, created_at)| *created_at);

    let loads: Vec<UserLoad> = ordered
        .iter()
        .map(|(uid, _)| UserLoad {
            user_id: *uid,
            error_count: error_counts.get(uid).copied().unwrap_or(0),
        })
        .collect();

    let allocation = fair_share::allocate(&loads, config.capacity, config.penalty_threshold);

    let mut lanes = users.write().await;
    for (uid, lane) in lanes.iter_mut() {
        lane.allocated = allocation.get(uid).copied().unwrap_or(0);
        observability::BatchMetrics::set_allocated_workers(&uid.to_string(), lane.allocated);
    }
    for (uid, allocated) in &allocation {
        if lanes.contains_key(uid) {
            continue;
        }
        let (sender, receiver) = mpsc::channel(((*allocated).max(1) as usize) * 2);
        lanes.insert(
            *uid,
            UserLane {
                sender,
                receiver: Arc::new(AsyncMutex::new(receiver)),
                allocated: *allocated,
                tokens: Vec::new(),
                live: Arc::new(AtomicU32::new(0)),
            },
        );
        observability::BatchMetrics::set_allocated_workers(&uid.to_string(), *allocated);
    }
    lanes.retain(|_, lane| lane.allocated > 0 || lane.live.load(Ordering::SeqCst) > 0);
    Ok(())
}

async fn dynamic_worker_manager_loop(
    executor: Arc<TaskExecutor>,
    users: Arc<RwLock<HashMap<Uuid, UserLane>>>,
    workers: Arc<AsyncMutex<JoinSet<()>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(ADJUSTMENT_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                adjust_workers(&users, &executor, &workers, &shutdown).await;
            }
        }
    }
}

/// Spawns or cancels worker tasks so each lane's live worker count matches
/// its current allocation. Workers share their lane's receiver behind a
/// mutex; scaling never touches the channel, only how many readers poll it.
async fn adjust_workers(
    users: &Arc<RwLock<HashMap<Uuid, UserLane>>>,
    executor: &Arc<TaskExecutor>,
    workers: &Arc<AsyncMutex<JoinSet<()>>>,
    global_shutdown: &watch::Receiver<bool>,
) {
    let mut lanes = users.write().await;
    let mut joinset = workers.lock().await;

    for (user_id, lane) in lanes.iter_mut() {
        let target = lane.allocated as usize;
        let current = lane.tokens.len();

        if current < target {
            for _ in current..target {
                let token = CancellationToken::new();
                let worker_token = token.clone();
                let receiver = lane.receiver.clone();
                let executor = executor.clone();
                let live = lane.live.clone();
                let mut shutdown = global_shutdown.clone();
                let uid = *user_id;

                joinset.spawn(async move {
                    live.fetch_add(1, Ordering::SeqCst);
                    loop {
                        tokio::select! {
                            _ = worker_token.cancelled() => break,
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    break;
                                }
                            }
                            claimed = async { receiver.lock().await.recv().await } => {
                                match claimed {
                                    Some(task_id) => {
                                        if let Err(e) = executor.execute(task_id).await {
                                            tracing::error!(user_id = %uid, task_id = %task_id, error = %e, "task execution error");
                                        }
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                    live.fetch_sub(1, Ordering::SeqCst);
                });
                lane.tokens.push(token);
            }
        } else if current > target {
            for token in lane.tokens.drain(target..) {
                token.cancel();
            }
        }

        observability::BatchMetrics::set_live_workers(
            &user_id.to_string(),
            lane.live.load(Ordering::SeqCst),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_domain::{MockBatchRepository, MockTaskRepository, Task};
    use chrono::Utc;
    use std::collections::HashMap as StdHashMap;

    fn task(batch_id: Uuid, status: TaskStatus) -> Task {
        Task {
            id: Uuid::now_v7(),
            batch_id,
            row_index: 0,
            inputs: StdHashMap::new(),
            status,
            result: None,
            error: None,
            error_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn refresh_allocation_creates_a_lane_per_active_user() {
        let user_id = Uuid::now_v7();
        let batch_id = Uuid::now_v7();

        let mut batches = MockBatchRepository::new();
        batches
            .expect_active_user_error_counts()
            .returning(|| Box::pin(async { Ok(StdHashMap::new()) }));

        let mut tasks = MockTaskRepository::new();
        tasks.expect_runnable_tasks_by_user().returning(move |_| {
            let t = task(batch_id, TaskStatus::Pending);
            Box::pin(async move { Ok(StdHashMap::from([(user_id, vec![t])])) })
        });

        let users: Arc<RwLock<HashMap<Uuid, UserLane>>> = Arc::new(RwLock::new(HashMap::new()));
        let config = PoolConfig {
            capacity: 4,
            penalty_threshold: 50,
            max_retry_count: 3,
        };

        refresh_allocation(&(Arc::new(batches) as Arc<dyn BatchRepository>), &(Arc::new(tasks) as Arc<dyn TaskRepository>), &users, &config)
            .await
            .unwrap();

        let lanes = users.read().await;
        assert_eq!(lanes.len(), 1);
        assert_eq!(lanes.get(&user_id).unwrap().allocated, 4);
    }

    #[tokio::test]
    async fn refresh_allocation_garbage_collects_idle_lanes() {
        let users: Arc<RwLock<HashMap<Uuid, UserLane>>> = Arc::new(RwLock::new(HashMap::new()));
        {
            let (sender, receiver) = mpsc::channel(2);
            users.write().await.insert(
                Uuid::now_v7(),
                UserLane {
                    sender,
                    receiver: Arc::new(AsyncMutex::new(receiver)),
                    allocated: 0,
                    tokens: Vec::new(),
                    live: Arc::new(AtomicU32::new(0)),
                },
            );
        }

        let mut batches = MockBatchRepository::new();
        batches
            .expect_active_user_error_counts()
            .returning(|| Box::pin(async { Ok(StdHashMap::new()) }));
        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_runnable_tasks_by_user()
            .returning(|_| Box::pin(async { Ok(StdHashMap::new()) }));

        let config = PoolConfig {
            capacity: 4,
            penalty_threshold: 50,
            max_retry_count: 3,
        };
        refresh_allocation(&(Arc::new(batches) as Arc<dyn BatchRepository>), &(Arc::new(tasks) as Arc<dyn TaskRepository>), &users, &config)
            .await
            .unwrap();

        assert!(users.read().await.is_empty());
    }

    #[tokio::test]
    async fn fetch_and_schedule_skips_users_with_zero_allocation() {
        let user_id = Uuid::now_v7();
        let batch_id = Uuid::now_v7();

        let mut tasks = MockTaskRepository::new();
        tasks.expect_runnable_tasks_by_user().returning(move |_| {
            let t = task(batch_id, TaskStatus::Pending);
            Box::pin(async move { Ok(StdHashMap::from([(user_id, vec![t])])) })
        });
        // claim_pending must never be called since allocation is zero.

        let users: Arc<RwLock<HashMap<Uuid, UserLane>>> = Arc::new(RwLock::new(HashMap::new()));
        {
            let (sender, receiver) = mpsc::channel(2);
            users.write().await.insert(
                user_id,
                UserLane {
                    sender,
                    receiver: Arc::new(AsyncMutex::new(receiver)),
                    allocated: 0,
                    tokens: Vec::new(),
                    live: Arc::new(AtomicU32::new(0)),
                },
            );
        }

        fetch_and_schedule(&(Arc::new(tasks) as Arc<dyn TaskRepository>), &users, 3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fetch_and_schedule_claims_and_enqueues_up_to_allocation() {
        let user_id = Uuid::now_v7();
        let batch_id = Uuid::now_v7();
        let t = task(batch_id, TaskStatus::Pending);
        let task_id = t.id;

        let mut tasks = MockTaskRepository::new();
        tasks
            .expect_runnable_tasks_by_user()
            .returning(move |_| {
                let t = t.clone();
                Box::pin(async move { Ok(StdHashMap::from([(user_id, vec![t])])) })
            });
        tasks
            .expect_claim_pending()
            .returning(move |ids| {
                let ids = ids.to_vec();
                Box::pin(async move { Ok(ids) })
            });

        let users: Arc<RwLock<HashMap<Uuid, UserLane>>> = Arc::new(RwLock::new(HashMap::new()));
        let (sender, mut receiver) = mpsc::channel(2);
        users.write().await.insert(
            user_id,
            UserLane {
                sender,
                receiver: Arc::new(AsyncMutex::new(mpsc::channel(1).1)),
                allocated: 1,
                tokens: Vec::new(),
                live: Arc::new(AtomicU32::new(0)),
            },
        );

        fetch_and_schedule(&(Arc::new(tasks) as Arc<dyn TaskRepository>), &users, 3)
            .await
            .unwrap();

        assert_eq!(receiver.try_recv().unwrap(), task_id);
    }
}
