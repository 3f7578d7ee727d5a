//! Send and retry machinery shared by every gateway variant.
//!
//! Semantics of [`GatewayCore::send_with_retry`]:
//! - Up to `max_retries + 1` calls to [`GatewayCore::send`] (one initial try plus retries).
//! - Cancellation, whether seen in the context or surfaced by the sender, ends the loop at once
//!   with [`GatewayError::Cancelled`].
//! - Configuration and serialization failures are returned as-is; they would fail the same way
//!   on every attempt.
//! - Every other failure is retried. When the last attempt fails the result is
//!   [`GatewayError::MaxRetriesExceeded`] wrapping that failure.
//! - The wait before retry `n` (zero-based) is `backoff.next_backoff(n)` with jitter applied, and
//!   is raced against the context so cancellation never waits out a backoff.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::BackoffStrategy;
use crate::codec::Serializer;
use crate::context::DispatchContext;
use crate::gateway::GatewayError;
use crate::jitter::Jitter;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::transport::Sender;

/// Name reported by a gateway constructed without one.
pub const UNNAMED_GATEWAY: &str = "unnamed gateway";

/// Per-gateway retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    max_retries: u32,
    backoff: Arc<dyn BackoffStrategy>,
    jitter: Jitter,
}

impl RetryConfig {
    pub fn new<B>(max_retries: u32, backoff: B) -> Self
    where
        B: BackoffStrategy + 'static,
    {
        Self { max_retries, backoff: Arc::new(backoff), jitter: Jitter::None }
    }

    /// A single attempt, no retries.
    pub fn no_retries() -> Self {
        Self::new(0, crate::backoff::ConstantBackoff::none())
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Wait before zero-based retry `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.backoff.next_backoff(attempt))
    }
}

/// Serializer + sender + retry policy, generic over one gateway's wire shapes.
///
/// Missing collaborators are not a construction error; [`GatewayCore::send`] reports them as
/// [`GatewayError::Unconfigured`].
pub struct GatewayCore<Req, Res> {
    name: String,
    serializer: Option<Arc<dyn Serializer<Req, Res>>>,
    sender: Option<Arc<dyn Sender>>,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl<Req, Res> fmt::Debug for GatewayCore<Req, Res> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCore")
            .field("name", &self.name)
            .field("serializer", &self.serializer.as_ref().map(|s| s.format()))
            .field("sender", &self.sender)
            .field("retry", &self.retry)
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl<Req, Res> GatewayCore<Req, Res>
where
    Req: Sync,
    Res: Send,
{
    pub fn new(name: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            name: name.into(),
            serializer: None,
            sender: None,
            retry,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_serializer<S>(mut self, serializer: S) -> Self
    where
        S: Serializer<Req, Res> + 'static,
    {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    pub fn with_sender<S>(mut self, sender: S) -> Self
    where
        S: Sender + 'static,
    {
        self.sender = Some(Arc::new(sender));
        self
    }

    pub fn with_shared_sender(mut self, sender: Arc<dyn Sender>) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Replace the retry wait (tests inject `InstantSleeper` / `TrackingSleeper`).
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Configured name, or [`UNNAMED_GATEWAY`].
    pub fn name(&self) -> &str {
        if self.name.is_empty() {
            UNNAMED_GATEWAY
        } else {
            &self.name
        }
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// One round trip: encode, send, decode.
    pub async fn send(&self, ctx: &DispatchContext, request: &Req) -> Result<Res, GatewayError> {
        let serializer = self.serializer.as_deref().ok_or(GatewayError::Unconfigured("serializer"))?;
        let sender = self.sender.as_deref().ok_or(GatewayError::Unconfigured("sender"))?;

        let encoded = serializer.serialize(request).map_err(GatewayError::Serialization)?;
        let reply = sender.send(ctx, &encoded).await.map_err(GatewayError::Transport)?;
        if reply.is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        serializer.deserialize(&reply).map_err(GatewayError::Deserialization)
    }

    /// [`send`](Self::send) with bounded, cancellable retries.
    pub async fn send_with_retry(
        &self,
        ctx: &DispatchContext,
        request: &Req,
    ) -> Result<Res, GatewayError> {
        let max_retries = self.retry.max_retries;
        let mut attempt: u32 = 0;

        loop {
            let err = match self.send(ctx, request).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::debug!(
                            target: "paywire::gateway",
                            gateway = self.name(),
                            attempts = attempt + 1,
                            "succeeded after retrying"
                        );
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            if let Some(reason) = err.cancel_reason() {
                tracing::warn!(
                    target: "paywire::gateway",
                    gateway = self.name(),
                    attempt = attempt + 1,
                    %reason,
                    "operation cancelled or timed out"
                );
                return Err(GatewayError::Cancelled(reason));
            }
            if err.is_permanent() {
                return Err(err);
            }

            if err.is_unavailable() {
                tracing::warn!(
                    target: "paywire::gateway",
                    gateway = self.name(),
                    attempt = attempt + 1,
                    max_retries,
                    "gateway unavailable, retrying"
                );
            } else {
                tracing::warn!(
                    target: "paywire::gateway",
                    gateway = self.name(),
                    attempt = attempt + 1,
                    max_retries,
                    error = %err,
                    "gateway call failed"
                );
            }

            if attempt >= max_retries {
                tracing::error!(
                    target: "paywire::gateway",
                    gateway = self.name(),
                    attempts = attempt.saturating_add(1),
                    "max retries reached"
                );
                return Err(GatewayError::MaxRetriesExceeded {
                    attempts: attempt.saturating_add(1),
                    last: Box::new(err),
                });
            }

            let delay = self.retry.delay(attempt);
            tracing::debug!(
                target: "paywire::gateway",
                gateway = self.name(),
                ?delay,
                "waiting before retry"
            );
            tokio::select! {
                biased;
                reason = ctx.done() => {
                    tracing::warn!(
                        target: "paywire::gateway",
                        gateway = self.name(),
                        %reason,
                        "context ended during backoff"
                    );
                    return Err(GatewayError::Cancelled(reason));
                }
                _ = self.sleeper.sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::{ConstantBackoff, ExponentialBackoff};
    use crate::codec::JsonCodec;
    use crate::context::CancelReason;
    use crate::sleeper::{InstantSleeper, TrackingSleeper};
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Serialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        ok: bool,
    }

    type Script = VecDeque<Result<Vec<u8>, TransportError>>;

    /// Replays scripted results, then repeats the fallback forever.
    #[derive(Debug)]
    struct ScriptedSender {
        script: Mutex<Script>,
        fallback: fn() -> Result<Vec<u8>, TransportError>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedSender {
        fn new(script: Script, fallback: fn() -> Result<Vec<u8>, TransportError>) -> Self {
            Self { script: Mutex::new(script), fallback, calls: Arc::new(AtomicUsize::new(0)) }
        }
    }

    #[async_trait]
    impl Sender for ScriptedSender {
        async fn send(
            &self,
            _ctx: &DispatchContext,
            _payload: &[u8],
        ) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(self.fallback)
        }
    }

    fn ok() -> Result<Vec<u8>, TransportError> {
        Ok(br#"{"ok":true}"#.to_vec())
    }

    fn unavailable() -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Unavailable("down".into()))
    }

    fn core(max_retries: u32, sender: ScriptedSender) -> GatewayCore<Ping, Pong> {
        GatewayCore::new("gw", RetryConfig::new(max_retries, ConstantBackoff::none()))
            .with_serializer(JsonCodec)
            .with_sender(sender)
            .with_sleeper(InstantSleeper)
    }

    #[tokio::test]
    async fn succeeds_on_fourth_attempt_with_three_retries() {
        let sender = ScriptedSender::new(
            VecDeque::from([unavailable(), Err(TransportError::Status(500)), unavailable()]),
            ok,
        );
        let calls = sender.calls.clone();
        let sleeper = TrackingSleeper::new();
        let backoff =
            ExponentialBackoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(10)).unwrap();
        let core: GatewayCore<Ping, Pong> = GatewayCore::new("gw", RetryConfig::new(3, backoff))
            .with_serializer(JsonCodec)
            .with_sender(sender)
            .with_sleeper(sleeper.clone());

        let pong = core.send_with_retry(&DispatchContext::background(), &Ping { n: 1 }).await;

        assert_eq!(pong.unwrap(), Pong { ok: true });
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            sleeper.calls(),
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn always_unavailable_exhausts_after_max_retries_plus_one() {
        let sender = ScriptedSender::new(VecDeque::new(), unavailable);
        let calls = sender.calls.clone();
        let core = core(2, sender);

        let err = core
            .send_with_retry(&DispatchContext::background(), &Ping { n: 1 })
            .await
            .unwrap_err();

        let GatewayError::MaxRetriesExceeded { attempts, last } = &err else {
            panic!("expected MaxRetriesExceeded, got {err:?}");
        };
        assert_eq!(*attempts, 3);
        assert!(last.is_unavailable());
        assert!(err.is_unavailable());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_means_single_attempt() {
        let sender = ScriptedSender::new(VecDeque::new(), unavailable);
        let calls = sender.calls.clone();
        let err = core(0, sender)
            .send_with_retry(&DispatchContext::background(), &Ping { n: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MaxRetriesExceeded { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_returns_promptly() {
        let sender = ScriptedSender::new(VecDeque::new(), unavailable);
        let core: GatewayCore<Ping, Pong> =
            GatewayCore::new("gw", RetryConfig::new(5, ConstantBackoff::new(Duration::from_secs(60))))
                .with_serializer(JsonCodec)
                .with_sender(sender);

        let ctx = DispatchContext::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = tokio::time::Instant::now();
        let err = core.send_with_retry(&ctx, &Ping { n: 1 }).await.unwrap_err();

        assert!(matches!(err, GatewayError::Cancelled(CancelReason::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1), "waited {:?}", start.elapsed());
    }

    #[tokio::test]
    async fn cancellation_from_sender_is_not_retried() {
        let sender = ScriptedSender::new(
            VecDeque::from([Err(TransportError::Cancelled(CancelReason::DeadlineExceeded))]),
            ok,
        );
        let calls = sender.calls.clone();
        let err = core(3, sender)
            .send_with_retry(&DispatchContext::background(), &Ping { n: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled(CancelReason::DeadlineExceeded)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_collaborators_are_unconfigured_and_not_retried() {
        let no_serializer: GatewayCore<Ping, Pong> =
            GatewayCore::new("gw", RetryConfig::new(3, ConstantBackoff::none()))
                .with_sender(ScriptedSender::new(VecDeque::new(), ok));
        let err = no_serializer
            .send_with_retry(&DispatchContext::background(), &Ping { n: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unconfigured("serializer")));

        let no_sender: GatewayCore<Ping, Pong> =
            GatewayCore::new("gw", RetryConfig::new(3, ConstantBackoff::none()))
                .with_serializer(JsonCodec);
        let err = no_sender.send(&DispatchContext::background(), &Ping { n: 1 }).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unconfigured("sender")));
    }

    #[tokio::test]
    async fn serialization_failure_is_not_retried() {
        struct Unencodable;
        impl Serialize for Unencodable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("cannot encode"))
            }
        }

        let sender = ScriptedSender::new(VecDeque::new(), ok);
        let calls = sender.calls.clone();
        let core: GatewayCore<Unencodable, Pong> =
            GatewayCore::new("gw", RetryConfig::new(3, ConstantBackoff::none()))
                .with_serializer(JsonCodec)
                .with_sender(sender)
                .with_sleeper(InstantSleeper);

        let err =
            core.send_with_retry(&DispatchContext::background(), &Unencodable).await.unwrap_err();
        assert!(matches!(err, GatewayError::Serialization(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_reply_is_reported() {
        let sender = ScriptedSender::new(VecDeque::from([Ok(Vec::new())]), ok);
        let err = core(0, sender).send(&DispatchContext::background(), &Ping { n: 1 }).await;
        assert!(matches!(err, Err(GatewayError::EmptyResponse)));
    }

    #[tokio::test]
    async fn malformed_reply_is_a_deserialization_error_and_retried() {
        let sender = ScriptedSender::new(VecDeque::from([Ok(b"<html>".to_vec())]), ok);
        let calls = sender.calls.clone();
        let core = core(1, sender);

        let err = core.send(&DispatchContext::background(), &Ping { n: 1 }).await.unwrap_err();
        assert!(matches!(err, GatewayError::Deserialization(_)));

        let pong = core.send_with_retry(&DispatchContext::background(), &Ping { n: 1 }).await;
        assert_eq!(pong.unwrap(), Pong { ok: true });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_name_falls_back() {
        let core: GatewayCore<Ping, Pong> = GatewayCore::new("", RetryConfig::no_retries());
        assert_eq!(core.name(), UNNAMED_GATEWAY);
        let core: GatewayCore<Ping, Pong> = GatewayCore::new("Gateway-A", RetryConfig::no_retries());
        assert_eq!(core.name(), "Gateway-A");
    }

    #[test]
    fn jitter_is_applied_to_delay() {
        let retry = RetryConfig::new(3, ConstantBackoff::new(Duration::from_millis(100)))
            .with_jitter(Jitter::Full);
        for attempt in 0..20 {
            assert!(retry.delay(attempt) <= Duration::from_millis(100));
        }
        assert_eq!(retry.jitter(), Jitter::Full);
    }
}
