//! Per-client view subscriptions.
//!
//! Each subscriber holds its own `ViewState`. Incoming change events are
//! coalesced for `EVENT_DEBOUNCE`, reconciled against the view, and the
//! resulting impacts are flushed as notifications once `FLUSH_DEBOUNCE`
//! passes without new impacts.

use std::{future::Future, sync::Arc, time::Duration};

use futures::{stream, Stream};
use sqlx::PgPool;
use tokio::{
    sync::{broadcast, mpsc},
    time::Instant,
};
use uuid::Uuid;

use super::EmployeeChange;
use crate::{
    core::view_impact::{EmployeeFilters, NotificationBatch, ViewNotification, ViewState},
    model::{column_config::ColumnConfig, role::UserRole},
    repository::employee::get_employee_ids,
    AppState,
};

pub const EVENT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const FLUSH_DEBOUNCE: Duration = Duration::from_millis(200);
const OUTBOX_CAPACITY: usize = 64;

pub async fn seed_visible_ids(db: &PgPool, filters: &EmployeeFilters) -> anyhow::Result<Vec<Uuid>> {
    let mut tx = db.begin().await?;
    let ids = get_employee_ids(&mut tx, filters).await?;
    tx.commit().await?;
    Ok(ids)
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

/// Drive one subscriber until its outbox is dropped or the change feed closes.
pub async fn run_subscription<F, Fut>(
    mut view: ViewState,
    mut rx: broadcast::Receiver<EmployeeChange>,
    outbox: mpsc::Sender<ViewNotification>,
    mut reseed: F,
) where
    F: FnMut(EmployeeFilters) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<Uuid>>>,
{
    let mut pending: Vec<EmployeeChange> = vec![];
    let mut batch = NotificationBatch::default();
    let mut event_deadline: Option<Instant> = None;
    let mut flush_deadline: Option<Instant> = None;

    loop {
        let event_at = event_deadline.unwrap_or_else(far_future);
        let flush_at = flush_deadline.unwrap_or_else(far_future);

        tokio::select! {
            _ = outbox.closed() => {
                tracing::debug!("subscriber went away");
                return;
            }

            _ = tokio::time::sleep_until(event_at), if event_deadline.is_some() => {
                event_deadline = None;
                let mut impacted = false;
                for change in pending.drain(..) {
                    if let Some(impact) = view.reconcile(change.old.as_ref(), change.new.as_ref()) {
                        batch.push(impact);
                        impacted = true;
                    }
                }
                if impacted {
                    flush_deadline = Some(Instant::now() + FLUSH_DEBOUNCE);
                }
            }

            _ = tokio::time::sleep_until(flush_at), if flush_deadline.is_some() => {
                flush_deadline = None;
                for notification in batch.flush() {
                    if outbox.send(notification).await.is_err() {
                        return;
                    }
                }
            }

            result = rx.recv() => {
                match result {
                    Ok(change) => {
                        pending.push(change);
                        event_deadline = Some(Instant::now() + EVENT_DEBOUNCE);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("subscription lagged {n} changes, reseeding view");
                        pending.clear();
                        event_deadline = None;
                        match reseed(view.filters.clone()).await {
                            Ok(ids) => view.visible_ids = ids.into_iter().collect(),
                            Err(err) => tracing::error!("failed to reseed view: {err}"),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("change feed closed, ending subscription");
                        return;
                    }
                }
            }
        }
    }
}

/// Start a subscription for `filters` as seen by `role` and return its
/// notification stream.
pub async fn subscribe(
    app_state: Arc<AppState>,
    filters: EmployeeFilters,
    role: UserRole,
    columns: Vec<ColumnConfig>,
) -> anyhow::Result<impl Stream<Item = ViewNotification> + Send + 'static> {
    let filters = filters.visible_to(role, &columns);
    // subscribe before seeding so no change falls between the two
    let rx = app_state.changes.subscribe();
    let ids = seed_visible_ids(&app_state.db, &filters).await?;
    let view = ViewState::new(filters, ids).visible_to(role, &columns);

    let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
    let db = app_state.db.clone();
    tokio::spawn(run_subscription(view, rx, outbox, move |filters| {
        let db = db.clone();
        async move { seed_visible_ids(&db, &filters).await }
    }));

    Ok(stream::unfold(inbox, |mut inbox| async move {
        inbox.recv().await.map(|x| (x, inbox))
    }))
}
