// packages/engine/src/extensions/user_concurrency.rs
//! Per-user concurrency limits
//!
//! Each user gets their own semaphore, created on first use. The permit for
//! a run is parked in the context resource map, so it is released when the
//! run finishes, fails, times out or is dropped. A user whose last run
//! finished, with nobody waiting on their semaphore or holding their lock, is
//! evicted straight away.

use crate::runtime::context::{ExecutionContext, ExecutionFailure, ExecutionResult};
use crate::runtime::extension::ExecutionExtension;
use crate::utils::config::EngineConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

/// Context resource key holding the user's permit
pub const USER_PERMIT_RESOURCE: &str = "user_concurrency.permit";

/// Concurrency state for one user
pub struct UserExecutionState {
    semaphore: Arc<Semaphore>,
    active_runs: AtomicUsize,
    lock: OnceLock<Arc<Mutex<()>>>,
}

impl UserExecutionState {
    fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            active_runs: AtomicUsize::new(0),
            lock: OnceLock::new(),
        }
    }

    pub fn active_runs(&self) -> usize {
        self.active_runs.load(Ordering::Acquire)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Per-user lock, created the first time someone asks for it
    pub fn lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(self.lock.get_or_init(|| Arc::new(Mutex::new(()))))
    }

    fn is_idle(&self, max_concurrent: usize) -> bool {
        self.active_runs() == 0
            && self.available_permits() == max_concurrent
            && self.lock.get().map_or(true, |lock| Arc::strong_count(lock) == 1)
    }
}

/// Held for the duration of one run
struct UserPermit {
    _permit: OwnedSemaphorePermit,
    state: Arc<UserExecutionState>,
}

impl Drop for UserPermit {
    fn drop(&mut self) {
        self.state.active_runs.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct UserConcurrencyExtension {
    max_concurrent_per_user: usize,
    users: DashMap<String, Arc<UserExecutionState>>,
}

impl UserConcurrencyExtension {
    pub fn new(max_concurrent_per_user: usize) -> Self {
        Self {
            max_concurrent_per_user: max_concurrent_per_user.max(1),
            users: DashMap::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_concurrent_per_user)
    }

    /// State for `user_id`, creating it on first touch
    pub fn user_state(&self, user_id: &str) -> Arc<UserExecutionState> {
        // Clone out of the map so no shard lock is held across an await
        Arc::clone(
            self.users
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(UserExecutionState::new(self.max_concurrent_per_user)))
                .value(),
        )
    }

    pub fn active_runs(&self, user_id: &str) -> usize {
        self.users.get(user_id).map_or(0, |state| state.active_runs())
    }

    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    fn release(&self, ctx: &mut ExecutionContext) {
        if ctx.take_resource::<UserPermit>(USER_PERMIT_RESOURCE).is_none() {
            return;
        }
        debug!(run_id = %ctx.run_id, "Released user permit");

        if let Some(user_id) = ctx.user_id.as_deref() {
            self.evict_if_idle(user_id);
        }
    }

    /// Only the map may hold the state; a waiter's clone keeps it alive
    fn evict_if_idle(&self, user_id: &str) {
        let max = self.max_concurrent_per_user;
        let evicted = self.users.remove_if(user_id, |_, state| {
            Arc::strong_count(state) == 1 && state.is_idle(max)
        });
        if evicted.is_some() {
            debug!(user = %user_id, "Evicted idle user state");
        }
    }
}

#[async_trait]
impl ExecutionExtension for UserConcurrencyExtension {
    fn name(&self) -> &str {
        "user_concurrency"
    }

    async fn initialize(&self, _config: &EngineConfig) -> anyhow::Result<()> {
        info!(
            "User concurrency limit: {} runs per user",
            self.max_concurrent_per_user
        );
        Ok(())
    }

    async fn pre_execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        let Some(user_id) = ctx.user_id.clone() else {
            return Ok(());
        };

        let state = self.user_state(&user_id);
        let permit = Arc::clone(&state.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| anyhow::anyhow!("user semaphore closed: {}", e))?;
        state.active_runs.fetch_add(1, Ordering::AcqRel);

        debug!(
            run_id = %ctx.run_id,
            user = %user_id,
            "Acquired user permit ({} active)", state.active_runs()
        );

        ctx.insert_resource(
            USER_PERMIT_RESOURCE,
            UserPermit {
                _permit: permit,
                state,
            },
        );
        Ok(())
    }

    async fn post_execute(
        &self,
        result: ExecutionResult,
        ctx: &mut ExecutionContext,
    ) -> anyhow::Result<ExecutionResult> {
        self.release(ctx);
        Ok(result)
    }

    async fn on_error(
        &self,
        _failure: &ExecutionFailure,
        ctx: &mut ExecutionContext,
    ) -> anyhow::Result<()> {
        self.release(ctx);
        Ok(())
    }

    /// Forget users with nothing in flight, including abandoned runs
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.users.retain(|_, state| state.active_runs() > 0);
        Ok(())
    }

    fn health(&self) -> Value {
        let active_users = self
            .users
            .iter()
            .filter(|entry| entry.value().active_runs() > 0)
            .count();
        let active_runs: usize = self.users.iter().map(|entry| entry.value().active_runs()).sum();

        json!({
            "status": "healthy",
            "tracked_users": self.users.len(),
            "active_users": active_users,
            "active_runs": active_runs,
            "max_concurrent_per_user": self.max_concurrent_per_user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::ErrorKind;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permit_held_until_post_execute() {
        let ext = UserConcurrencyExtension::new(1);
        let mut first = ExecutionContext::new("echo").with_user("alice");
        let mut second = ExecutionContext::new("echo").with_user("alice");

        ext.pre_execute(&mut first).await.unwrap();
        assert!(first.has_resource(USER_PERMIT_RESOURCE));
        assert_eq!(ext.active_runs("alice"), 1);

        // Same user, no slot left
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), ext.pre_execute(&mut second)).await;
        assert!(blocked.is_err());

        ext.post_execute(ExecutionResult::success(Value::Null, 1.0), &mut first)
            .await
            .unwrap();
        assert_eq!(ext.active_runs("alice"), 0);

        ext.pre_execute(&mut second).await.unwrap();
        assert_eq!(ext.active_runs("alice"), 1);
    }

    #[tokio::test]
    async fn test_users_do_not_share_permits() {
        let ext = UserConcurrencyExtension::new(1);
        let mut alice = ExecutionContext::new("echo").with_user("alice");
        let mut bob = ExecutionContext::new("echo").with_user("bob");

        ext.pre_execute(&mut alice).await.unwrap();
        tokio::time::timeout(Duration::from_millis(50), ext.pre_execute(&mut bob))
            .await
            .expect("bob must not wait on alice")
            .unwrap();

        assert_eq!(ext.health()["active_users"], json!(2));
    }

    #[tokio::test]
    async fn test_released_on_error_and_on_drop() {
        let ext = UserConcurrencyExtension::new(2);

        let mut failed = ExecutionContext::new("boom").with_user("carol");
        ext.pre_execute(&mut failed).await.unwrap();
        ext.on_error(&ExecutionFailure::new(ErrorKind::AgentError, "x"), &mut failed)
            .await
            .unwrap();
        assert_eq!(ext.active_runs("carol"), 0);

        let mut abandoned = ExecutionContext::new("slow").with_user("carol");
        ext.pre_execute(&mut abandoned).await.unwrap();
        assert_eq!(ext.active_runs("carol"), 1);
        drop(abandoned);
        assert_eq!(ext.active_runs("carol"), 0);
        assert_eq!(ext.user_state("carol").available_permits(), 2);

        ext.cleanup().await.unwrap();
        assert_eq!(ext.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_anonymous_calls_unlimited() {
        let ext = UserConcurrencyExtension::new(1);
        for _ in 0..3 {
            let mut ctx = ExecutionContext::new("echo");
            ext.pre_execute(&mut ctx).await.unwrap();
            assert!(!ctx.has_resource(USER_PERMIT_RESOURCE));
        }
        assert_eq!(ext.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_idle_users_evicted_after_run() {
        let ext = UserConcurrencyExtension::new(2);
        for i in 0..100 {
            let mut ctx = ExecutionContext::new("echo").with_user(format!("user-{}", i));
            ext.pre_execute(&mut ctx).await.unwrap();
            if i % 2 == 0 {
                ext.post_execute(ExecutionResult::success(Value::Null, 1.0), &mut ctx)
                    .await
                    .unwrap();
            } else {
                ext.on_error(&ExecutionFailure::new(ErrorKind::AgentError, "x"), &mut ctx)
                    .await
                    .unwrap();
            }
        }
        assert_eq!(ext.tracked_users(), 0);
    }

    #[tokio::test]
    async fn test_waited_on_or_locked_users_kept() {
        let ext = Arc::new(UserConcurrencyExtension::new(1));
        let mut first = ExecutionContext::new("echo").with_user("erin");
        ext.pre_execute(&mut first).await.unwrap();

        let waiter = {
            let ext = Arc::clone(&ext);
            tokio::spawn(async move {
                let mut second = ExecutionContext::new("echo").with_user("erin");
                ext.pre_execute(&mut second).await.unwrap();
                second
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        ext.post_execute(ExecutionResult::success(Value::Null, 1.0), &mut first)
            .await
            .unwrap();
        let mut second = waiter.await.unwrap();
        assert_eq!(ext.tracked_users(), 1);
        assert_eq!(ext.active_runs("erin"), 1);

        let lock = ext.user_state("erin").lock();
        ext.post_execute(ExecutionResult::success(Value::Null, 1.0), &mut second)
            .await
            .unwrap();
        assert_eq!(ext.tracked_users(), 1);

        drop(lock);
        ext.cleanup().await.unwrap();
        assert_eq!(ext.tracked_users(), 0);
    }

    #[test]
    fn test_user_lock_is_shared() {
        let ext = UserConcurrencyExtension::new(1);
        let a = ext.user_state("dave").lock();
        let b = ext.user_state("dave").lock();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
