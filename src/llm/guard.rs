//! Recovery wrapper for "model not found" failures.
//!
//! The first invocation that reports a missing model triggers one pull of
//! that model, after which the invocation is retried exactly once. Every
//! other failure is returned untouched.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::provider::{FragmentReceiver, LanguageModel};
use crate::core::errors::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Ready,
    Recovering,
}

pub struct ModelGuard<M> {
    model: M,
    // also serialises concurrent recoveries
    state: Mutex<GuardState>,
    recoveries: AtomicUsize,
    /// Successful pulls; a waiter that sees this move skips its own pull.
    completed_pulls: AtomicUsize,
}

impl<M: LanguageModel> ModelGuard<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            state: Mutex::new(GuardState::Ready),
            recoveries: AtomicUsize::new(0),
            completed_pulls: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &M {
        &self.model
    }

    pub async fn state(&self) -> GuardState {
        *self.state.lock().await
    }

    /// Number of pulls triggered so far.
    pub fn recoveries(&self) -> usize {
        self.recoveries.load(Ordering::SeqCst)
    }

    /// Pull the model, unless a pull finished after `seen_pulls` was read.
    async fn recover(&self, seen_pulls: Option<usize>) -> Result<(), RagError> {
        let mut state = self.state.lock().await;
        if let Some(seen) = seen_pulls {
            if self.completed_pulls.load(Ordering::SeqCst) > seen {
                tracing::debug!(
                    "Model {} was pulled while waiting, retrying",
                    self.model.model_name()
                );
                return Ok(());
            }
        }

        *state = GuardState::Recovering;
        self.recoveries.fetch_add(1, Ordering::SeqCst);
        tracing::warn!(
            "Model {} not found, pulling before retrying",
            self.model.model_name()
        );

        let result = self.model.pull_model().await;
        if result.is_ok() {
            self.completed_pulls.fetch_add(1, Ordering::SeqCst);
        }
        *state = GuardState::Ready;

        match &result {
            Ok(()) => tracing::info!("Model {} pulled", self.model.model_name()),
            Err(err) => tracing::error!("Pulling model {} failed: {}", self.model.model_name(), err),
        }
        result
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for ModelGuard<M> {
    fn model_name(&self) -> &str {
        self.model.model_name()
    }

    async fn stream_generate(&self, prompt: &str) -> Result<FragmentReceiver, RagError> {
        let seen_pulls = self.completed_pulls.load(Ordering::SeqCst);
        match self.model.stream_generate(prompt).await {
            Err(RagError::ModelNotFound(_)) => {
                let pulled = self.recover(Some(seen_pulls)).await;
                match (self.model.stream_generate(prompt).await, pulled) {
                    (Ok(rx), _) => Ok(rx),
                    (Err(_), Err(pull_err)) => Err(pull_err),
                    (Err(retry_err), Ok(())) => Err(retry_err),
                }
            }
            other => other,
        }
    }

    async fn pull_model(&self) -> Result<(), RagError> {
        self.recover(None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Scripted model: each invocation pops the next outcome.
    struct ScriptedModel {
        outcomes: StdMutex<VecDeque<Result<&'static str, RagError>>>,
        pull_result: StdMutex<Option<RagError>>,
        calls: AtomicUsize,
        pulls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(outcomes: Vec<Result<&'static str, RagError>>) -> Self {
            Self {
                outcomes: StdMutex::new(outcomes.into()),
                pull_result: StdMutex::new(None),
                calls: AtomicUsize::new(0),
                pulls: AtomicUsize::new(0),
            }
        }

        fn failing_pull(self, err: RagError) -> Self {
            *self.pull_result.lock().unwrap() = Some(err);
            self
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn stream_generate(&self, _prompt: &str) -> Result<FragmentReceiver, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RagError::llm("script exhausted")));
            let text = next?;
            let (tx, rx) = mpsc::channel(4);
            tx.send(Ok(text.to_string())).await.unwrap();
            Ok(rx)
        }

        async fn pull_model(&self) -> Result<(), RagError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            match self.pull_result.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    async fn first_fragment(mut rx: FragmentReceiver) -> String {
        rx.recv().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn passes_through_when_model_is_available() {
        let guard = ModelGuard::new(ScriptedModel::new(vec![Ok("hello")]));

        let rx = guard.stream_generate("prompt").await.unwrap();
        assert_eq!(first_fragment(rx).await, "hello");
        assert_eq!(guard.recoveries(), 0);
        assert_eq!(guard.inner().pulls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn recovers_once_from_model_not_found() {
        let guard = ModelGuard::new(ScriptedModel::new(vec![
            Err(RagError::ModelNotFound("scripted".into())),
            Ok("answer after pull"),
        ]));

        let rx = guard.stream_generate("prompt").await.unwrap();
        assert_eq!(first_fragment(rx).await, "answer after pull");
        assert_eq!(guard.inner().pulls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(guard.state().await, GuardState::Ready);
    }

    #[tokio::test]
    async fn does_not_loop_when_model_stays_missing() {
        let guard = ModelGuard::new(ScriptedModel::new(vec![
            Err(RagError::ModelNotFound("scripted".into())),
            Err(RagError::ModelNotFound("scripted".into())),
            Ok("never reached"),
        ]));

        let err = guard.stream_generate("prompt").await.unwrap_err();
        assert!(matches!(err, RagError::ModelNotFound(_)));
        assert_eq!(guard.inner().pulls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(guard.state().await, GuardState::Ready);
    }

    #[tokio::test]
    async fn failed_pull_is_reported() {
        let model = ScriptedModel::new(vec![
            Err(RagError::ModelNotFound("scripted".into())),
            Err(RagError::ModelNotFound("scripted".into())),
        ])
        .failing_pull(RagError::llm("registry unreachable"));
        let guard = ModelGuard::new(model);

        let err = guard.stream_generate("prompt").await.unwrap_err();
        assert!(err.to_string().contains("registry unreachable"));
        assert_eq!(guard.state().await, GuardState::Ready);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let guard = ModelGuard::new(ScriptedModel::new(vec![
            Err(RagError::llm("connection reset")),
            Ok("never reached"),
        ]));

        let err = guard.stream_generate("prompt").await.unwrap_err();
        assert!(matches!(err, RagError::LanguageModel(_)));
        assert_eq!(guard.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.recoveries(), 0);
    }

    /// Missing until a slow pull has finished.
    struct SlowPullModel {
        installed: AtomicBool,
        pulls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for SlowPullModel {
        fn model_name(&self) -> &str {
            "slow-pull"
        }

        async fn stream_generate(&self, _prompt: &str) -> Result<FragmentReceiver, RagError> {
            if !self.installed.load(Ordering::SeqCst) {
                return Err(RagError::ModelNotFound("slow-pull".into()));
            }
            let (tx, rx) = mpsc::channel(1);
            tx.send(Ok("ready".to_string())).await.unwrap();
            Ok(rx)
        }

        async fn pull_model(&self) -> Result<(), RagError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.installed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_pull() {
        let guard = ModelGuard::new(SlowPullModel {
            installed: AtomicBool::new(false),
            pulls: AtomicUsize::new(0),
        });

        let (first, second) = tokio::join!(
            guard.stream_generate("first"),
            guard.stream_generate("second")
        );

        assert_eq!(first_fragment(first.unwrap()).await, "ready");
        assert_eq!(first_fragment(second.unwrap()).await, "ready");
        assert_eq!(guard.inner().pulls.load(Ordering::SeqCst), 1);
        assert_eq!(guard.recoveries(), 1);
        assert_eq!(guard.state().await, GuardState::Ready);
    }

    #[tokio::test]
    async fn explicit_pull_always_reaches_the_model() {
        let guard = ModelGuard::new(ScriptedModel::new(vec![]));
        guard.pull_model().await.unwrap();
        guard.pull_model().await.unwrap();
        assert_eq!(guard.inner().pulls.load(Ordering::SeqCst), 2);
    }
}
