use crate::client::{OutboundMessage, Producer, SendResult};
use crate::host::RunContext;
use crate::metrics::PublishOutcome;
use crate::pubsub::PubSub;
use crate::{Error, Result};
use bytes::Bytes;
use futures::FutureExt;
use std::collections::HashMap;
use tracing::warn;

impl PubSub {
    /// Publishes one message and reports its outcome as three samples.
    ///
    /// With `async_send` the call returns `Ok(())` as soon as the message is
    /// handed to the client; the samples are reported later from the
    /// completion handler. Otherwise the call waits for the acknowledgment,
    /// reports, and returns the client's send error if there was one.
    ///
    /// # Errors
    ///
    /// - [`Error::NoActiveState`] when `ctx` has no running iteration. Nothing
    ///   is sent or reported.
    /// - [`Error::Send`] with the client's error when a synchronous send fails.
    /// - [`Error::Canceled`] when the run ends while a synchronous send waits.
    ///
    /// Reporting failures are logged, never returned.
    pub async fn publish(
        &self,
        ctx: &RunContext,
        producer: &Producer,
        payload: impl Into<Bytes>,
        properties: HashMap<String, String>,
        async_send: bool,
    ) -> Result<()> {
        if ctx.state().is_none() {
            return Err(Error::NoActiveState);
        }

        let payload = payload.into();
        let attempt = PublishOutcome::attempt(producer.topic(), producer.name(), payload.len());
        let message = OutboundMessage { payload, properties };

        if async_send {
            let metrics = self.metrics.clone();
            let ctx = ctx.clone();
            producer.inner().send_async(
                message,
                Box::new(move |result: SendResult| {
                    async move {
                        let outcome = attempt.completed(result.is_err());
                        if let Err(e) = metrics.report(&ctx, &outcome).await {
                            warn!(
                                topic = %outcome.topic,
                                producer = %outcome.producer_name,
                                error = %e,
                                "Could not report async publish metrics"
                            );
                        }
                    }
                    .boxed()
                }),
            );
            return Ok(());
        }

        let result = tokio::select! {
            sent = producer.inner().send(message) => sent.map(|_| ()).map_err(Error::Send),
            _ = ctx.done().cancelled() => Err(Error::Canceled),
        };

        let outcome = attempt.completed(result.is_err());
        if let Err(e) = self.report_publish_metrics(ctx, &outcome).await {
            warn!(
                topic = %outcome.topic,
                producer = %outcome.producer_name,
                error = %e,
                "Could not report sync publish metrics"
            );
        }
        result
    }

    pub(crate) async fn report_publish_metrics(
        &self,
        ctx: &RunContext,
        outcome: &PublishOutcome,
    ) -> Result<()> {
        self.metrics.report(ctx, outcome).await
    }
}
