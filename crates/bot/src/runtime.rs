//! Long-polling runtime.
//!
//! Pulls updates from the Bot API and handles each one on its own task, so a
//! slow store write for one identity never holds up anybody else. Polling
//! stops on the shutdown signal; tasks already running are awaited.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sentry::SentryFutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::dispatch::Dispatcher;
use crate::gateway::telegram::TelegramClient;
use crate::gateway::{GatewayError, InboundEvent};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Poll until `shutdown` resolves.
///
/// # Errors
///
/// Returns the gateway error that made polling impossible (rejected token).
pub async fn run<F>(
    client: Arc<TelegramClient>,
    dispatcher: Dispatcher<TelegramClient>,
    shutdown: F,
) -> Result<(), GatewayError>
where
    F: Future<Output = ()> + Send,
{
    tokio::pin!(shutdown);

    let mut offset: Option<i64> = None;
    let mut tasks = JoinSet::new();
    let mut backoff = INITIAL_BACKOFF;
    let mut outcome = Ok(());

    info!("Polling for updates");
    loop {
        while let Some(joined) = tasks.try_join_next() {
            log_join(joined);
        }

        let polled = tokio::select! {
            () = &mut shutdown => break,
            polled = client.get_updates(offset) => polled,
        };

        match polled {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                for update in updates {
                    offset = Some(update.update_id + 1);
                    if let Some(event) = update.into_event() {
                        spawn_update(&mut tasks, &client, &dispatcher, event);
                    }
                }
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Polling cannot continue");
                outcome = Err(e);
                break;
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?backoff, "Polling failed");
                tokio::select! {
                    () = &mut shutdown => break,
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }

    info!(in_flight = tasks.len(), "Polling stopped, finishing in-flight updates");
    while let Some(joined) = tasks.join_next().await {
        log_join(joined);
    }

    if let (Some(offset), Ok(())) = (offset, &outcome)
        && let Err(e) = client.acknowledge(offset).await
    {
        warn!(error = %e, "Failed to acknowledge last updates");
    }

    outcome
}

fn spawn_update(
    tasks: &mut JoinSet<()>,
    client: &Arc<TelegramClient>,
    dispatcher: &Dispatcher<TelegramClient>,
    event: InboundEvent,
) {
    let client = Arc::clone(client);
    let dispatcher = dispatcher.clone();
    let hub = Arc::new(sentry::Hub::new_from_top(sentry::Hub::current()));

    tasks.spawn(
        async move {
            let callback_id = match &event {
                InboundEvent::Callback(action) => Some(action.id.clone()),
                InboundEvent::Message(_) => None,
            };

            let toast = dispatcher.handle(event).await;

            if let Some(id) = callback_id
                && let Err(e) = client.answer_callback_query(&id, toast).await
            {
                warn!(error = %e, "Failed to acknowledge callback");
            }
        }
        .bind_hub(hub),
    );
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Update task failed");
    }
}
