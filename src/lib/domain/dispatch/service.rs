//! Dispatch service module

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Semaphore, task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[cfg(test)]
use mockall::mock;

use crate::domain::{
    communication::mailer::{MailTransport, Message, MessageTemplate, RelayConfig},
    dispatch::{DispatchResult, RecipientOutcome, SendRequest},
};

/// Dispatch service
#[async_trait]
pub trait DispatchService: Clone + Send + Sync + 'static {
    /// Sends the request's message to each of its recipients.
    ///
    /// # Arguments
    /// * `request` - The validated [`SendRequest`].
    /// * `cancellation` - Stops the dispatch between recipients once cancelled.
    ///
    /// # Returns
    /// A [`DispatchResult`] with one outcome per attempted recipient, in request order. A failed
    /// send is reported in the result and never stops the remaining recipients.
    async fn dispatch(
        &self,
        request: &SendRequest,
        cancellation: &CancellationToken,
    ) -> DispatchResult;
}

#[cfg(test)]
mock! {
    pub DispatchService {}

    impl Clone for DispatchService {
        fn clone(&self) -> Self;
    }

    #[async_trait]
    impl DispatchService for DispatchService {
        async fn dispatch(
            &self,
            request: &SendRequest,
            cancellation: &CancellationToken,
        ) -> DispatchResult;
    }
}

/// Dispatch service implementation
#[derive(Debug, Clone)]
pub struct DispatchServiceImpl<T>
where
    T: MailTransport,
{
    transport: Arc<T>,
}

impl<T> DispatchServiceImpl<T>
where
    T: MailTransport,
{
    /// Creates a new dispatch service.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// One send at a time, pausing after every send but the last.
    async fn dispatch_sequential(
        &self,
        request: &SendRequest,
        cancellation: &CancellationToken,
    ) -> Vec<RecipientOutcome> {
        let recipients = request.recipients();
        let delay = request.policy().delay;
        let mut outcomes = Vec::with_capacity(recipients.len());

        for (index, recipient) in recipients.iter().enumerate() {
            if cancellation.is_cancelled() {
                break;
            }

            outcomes.push(
                deliver(
                    self.transport.as_ref(),
                    request.relay(),
                    request.template(),
                    recipient,
                )
                .await,
            );

            if index + 1 < recipients.len() {
                pause(delay, cancellation).await;
            }
        }

        outcomes
    }

    /// Up to `concurrency` sends in flight, with `delay` between send starts.
    async fn dispatch_pooled(
        &self,
        request: &SendRequest,
        cancellation: &CancellationToken,
    ) -> Vec<RecipientOutcome> {
        let recipients = request.recipients();
        let delay = request.policy().delay;
        let semaphore = Arc::new(Semaphore::new(request.policy().concurrency.get()));
        let mut workers = JoinSet::new();
        let mut launched = 0;

        for (index, recipient) in recipients.iter().enumerate() {
            if index > 0 {
                pause(delay, cancellation).await;
            }

            let permit = tokio::select! {
                biased;

                _ = cancellation.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let transport = Arc::clone(&self.transport);
            let relay = Arc::clone(request.relay());
            let template = Arc::clone(request.template());
            let recipient = recipient.clone();

            workers.spawn(
                async move {
                    let outcome = deliver(transport.as_ref(), &relay, &template, &recipient).await;
                    drop(permit);
                    (index, outcome)
                }
                .in_current_span(),
            );
            launched += 1;
        }

        let mut slots: Vec<Option<RecipientOutcome>> = (0..launched).map(|_| None).collect();

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(err) => error!(error = %err, "dispatch worker failed"),
            }
        }

        slots
            .into_iter()
            .zip(recipients)
            .map(|(slot, recipient)| {
                slot.unwrap_or_else(|| RecipientOutcome::failed(recipient, "Dispatch worker failed"))
            })
            .collect()
    }
}

#[async_trait]
impl<T> DispatchService for DispatchServiceImpl<T>
where
    T: MailTransport,
{
    async fn dispatch(
        &self,
        request: &SendRequest,
        cancellation: &CancellationToken,
    ) -> DispatchResult {
        let requested = request.recipients().len();
        let span = info_span!(
            "dispatch",
            id = %Uuid::now_v7(),
            relay = %request.relay().host(),
            recipients = requested,
        );

        async move {
            let policy = request.policy();

            info!(
                delay = ?policy.delay,
                concurrency = policy.concurrency.get(),
                "starting dispatch"
            );

            let outcomes = if policy.concurrency.get() == 1 {
                self.dispatch_sequential(request, cancellation).await
            } else {
                self.dispatch_pooled(request, cancellation).await
            };

            let result = DispatchResult::from_outcomes(outcomes, requested);
            let summary = result.summary();

            if result.truncated() {
                warn!(skipped = result.skipped(), "dispatch cancelled");
            }

            info!(
                total = summary.total,
                successful = summary.successful,
                failed = summary.failed,
                "{}",
                result.message()
            );

            result
        }
        .instrument(span)
        .await
    }
}

async fn deliver<T: MailTransport>(
    transport: &T,
    relay: &RelayConfig,
    template: &MessageTemplate,
    recipient: &str,
) -> RecipientOutcome {
    let message = Message::build(relay.sender().as_str(), recipient, template);

    match transport.send(relay, &message).await {
        Ok(()) => {
            info!(recipient, "sent");
            RecipientOutcome::sent(recipient)
        }
        Err(err) => {
            warn!(recipient, error = %err, "send failed");
            RecipientOutcome::failed(recipient, err)
        }
    }
}

/// Waits out the pacing delay, returning early if the dispatch is cancelled.
async fn pause(delay: Duration, cancellation: &CancellationToken) {
    if delay.is_zero() {
        return;
    }

    tokio::select! {
        _ = sleep(delay) => {}
        _ = cancellation.cancelled() => debug!("pause interrupted by cancellation"),
    }
}
