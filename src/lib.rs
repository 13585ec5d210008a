pub mod activity;
pub mod config;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod policy;
pub mod queue;
pub mod rest;
pub mod storage;
pub mod tasks;
pub mod users;

use std::sync::Arc;

use activity::audit::AuditRecorder;
use activity::ActivityRecorder;
use config::DaemonConfig;
use notify::{ChannelPolicy, NotificationDispatcher, NotificationFeed};
use queue::DeliveryQueue;
use storage::Storage;
use tasks::{TaskEngine, TaskStore};
use users::UserDirectory;

/// Shared application state passed to every REST handler and background job.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    pub engine: Arc<TaskEngine>,
    pub users: UserDirectory,
    pub activity: ActivityRecorder,
    pub audit: AuditRecorder,
    pub queue: DeliveryQueue,
    pub feed: NotificationFeed,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire every component off one storage pool.
    pub fn new(config: DaemonConfig, storage: Storage) -> Self {
        let pool = storage.pool();
        let users = UserDirectory::new(pool.clone());
        let queue = DeliveryQueue::new(pool.clone());
        let dispatcher = NotificationDispatcher::new(
            users.clone(),
            queue.clone(),
            ChannelPolicy {
                email_enabled: config.email.enabled(),
                sms_enabled: config.sms.enabled(),
            },
        );
        let engine = TaskEngine::new(
            TaskStore::new(pool.clone()),
            users.clone(),
            ActivityRecorder::new(pool.clone()),
            AuditRecorder::new(pool.clone()),
            dispatcher,
        );

        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            users,
            activity: ActivityRecorder::new(pool.clone()),
            audit: AuditRecorder::new(pool.clone()),
            queue,
            feed: NotificationFeed::new(pool),
            storage: Arc::new(storage),
            started_at: std::time::Instant::now(),
        }
    }
}
