//! Durable activities
//!
//! An activity is a named, idempotent unit of remote work. A workflow engine
//! (outside this crate) delivers its serialized input at least once; the
//! [`ActivityRegistry`] decodes the input, runs the activity with a
//! cancellable [`ActivityContext`], and can re-deliver it locally with
//! backoff.
//!
//! Errors follow the crate-wide classification: retryable errors are
//! re-delivered, everything else is final.

pub mod storage_account;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Error, Result};

pub use storage_account::{CreateStorageAccountActivityInput, StorageAccountActivity};

/// A named unit of remote work that is safe to repeat
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Serialized input delivered by the engine
    type Input: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Registration name
    fn name(&self) -> &'static str;

    /// Run one attempt
    async fn execute(&self, ctx: &ActivityContext, input: Self::Input) -> Result<()>;
}

/// Per-attempt context: identity plus cancellation
#[derive(Debug, Clone)]
pub struct ActivityContext {
    activity: String,
    attempt: u32,
    token: CancellationToken,
}

impl ActivityContext {
    /// Context for one attempt of `activity`
    pub fn new(activity: impl Into<String>, attempt: u32, token: CancellationToken) -> Self {
        Self {
            activity: activity.into(),
            attempt,
            token,
        }
    }

    /// Activity name
    pub fn activity(&self) -> &str {
        &self.activity
    }

    /// 1-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True once the engine cancelled the activity
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Sleep, returning [`Error::Cancelled`] if cancelled first
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => Err(Error::cancelled(&self.activity)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Run a future, returning [`Error::Cancelled`] if cancelled first
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            _ = self.token.cancelled() => Err(Error::cancelled(&self.activity)),
            result = fut => result,
        }
    }
}

#[async_trait]
trait ErasedActivity: Send + Sync {
    async fn execute_json(&self, ctx: &ActivityContext, input: &serde_json::Value) -> Result<()>;
}

struct Registered<A>(A);

#[async_trait]
impl<A: Activity> ErasedActivity for Registered<A> {
    async fn execute_json(&self, ctx: &ActivityContext, input: &serde_json::Value) -> Result<()> {
        let input: A::Input = serde_json::from_value(input.clone())
            .map_err(|e| Error::serialization_for_kind(self.0.name(), e.to_string()))?;
        self.0.execute(ctx, input).await
    }
}

/// Activities by registration name
#[derive(Default)]
pub struct ActivityRegistry {
    activities: BTreeMap<&'static str, Arc<dyn ErasedActivity>>,
}

impl ActivityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an activity under its name
    pub fn register<A: Activity>(&mut self, activity: A) -> Result<()> {
        let name = activity.name();
        if self.activities.contains_key(name) {
            return Err(Error::validation(format!(
                "activity {name} is already registered"
            )));
        }
        self.activities.insert(name, Arc::new(Registered(activity)));
        debug!(activity = name, "activity registered");
        Ok(())
    }

    /// Registered names
    pub fn names(&self) -> Vec<&'static str> {
        self.activities.keys().copied().collect()
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn ErasedActivity>> {
        self.activities
            .get(name)
            .cloned()
            .ok_or_else(|| Error::validation(format!("unknown activity {name}")))
    }

    /// Run a single attempt
    pub async fn dispatch(
        &self,
        name: &str,
        input: &serde_json::Value,
        token: CancellationToken,
    ) -> Result<()> {
        let activity = self.lookup(name)?;
        let ctx = ActivityContext::new(name, 1, token);
        activity.execute_json(&ctx, input).await
    }

    /// Run until success, a permanent error, the attempt limit or cancellation
    pub async fn dispatch_with_retry(
        &self,
        name: &str,
        input: &serde_json::Value,
        config: &RetryConfig,
        token: &CancellationToken,
    ) -> Result<()> {
        let activity = self.lookup(name)?;

        retry_with_backoff(config, name, token, |attempt| {
            let activity = activity.clone();
            let ctx = ActivityContext::new(name, attempt, token.clone());
            async move {
                if attempt > 1 {
                    info!(activity = %ctx.activity(), attempt, "re-delivering activity");
                }
                activity.execute_json(&ctx, input).await
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct EchoInput {
        fail_times: u32,
        permanent: bool,
    }

    #[derive(Clone, Default)]
    struct Flaky {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Activity for Flaky {
        type Input = EchoInput;

        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn execute(&self, ctx: &ActivityContext, input: EchoInput) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(call, ctx.attempt());
            if call <= input.fail_times {
                return Err(if input.permanent {
                    Error::activity_permanent(self.name(), "bad request")
                } else {
                    Error::activity(self.name(), "throttled")
                });
            }
            Ok(())
        }
    }

    fn fast_retry(attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    fn registry() -> (ActivityRegistry, Arc<AtomicU32>) {
        let activity = Flaky::default();
        let calls = activity.calls.clone();
        let mut registry = ActivityRegistry::new();
        registry.register(activity).unwrap();
        (registry, calls)
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let (mut registry, _) = registry();
        assert!(registry.register(Flaky::default()).is_err());
        assert_eq!(registry.names(), vec!["flaky"]);
    }

    #[tokio::test]
    async fn test_unknown_activity() {
        let (registry, _) = registry();
        let err = registry
            .dispatch("missing", &serde_json::json!({}), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_input_is_permanent() {
        let (registry, calls) = registry();
        let err = registry
            .dispatch_with_retry(
                "flaky",
                &serde_json::json!({"fail_times": "many"}),
                &fast_retry(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    /// Story: transient failures are re-delivered until the activity succeeds
    #[tokio::test]
    async fn story_transient_failures_are_redelivered() {
        let (registry, calls) = registry();
        registry
            .dispatch_with_retry(
                "flaky",
                &serde_json::json!({"fail_times": 2, "permanent": false}),
                &fast_retry(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_retries() {
        let (registry, calls) = registry();
        let err = registry
            .dispatch_with_retry(
                "flaky",
                &serde_json::json!({"fail_times": 2, "permanent": true}),
                &fast_retry(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_sleep_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = ActivityContext::new("flaky", 1, token.clone());

        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(
            ctx.sleep(Duration::from_secs(3600)).await,
            Err(Error::Cancelled { .. })
        ));
        assert!(matches!(
            ctx.run(std::future::pending::<Result<()>>()).await,
            Err(Error::Cancelled { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_sleep_completes() {
        let ctx = ActivityContext::new("flaky", 1, CancellationToken::new());
        ctx.sleep(Duration::from_secs(60)).await.unwrap();
        assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
    }
}
