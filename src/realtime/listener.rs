use std::time::Duration;

use sqlx::{postgres::PgListener, PgPool};
use tokio::{sync::broadcast, task::JoinHandle};

use super::EmployeeChange;

pub const CHANNEL: &str = "employee_changes";

const BASE_DELAY_MS: u64 = 500;
const MAX_DELAY_MS: u64 = 30_000;
/// Consecutive failed connections before the listener gives up
pub const MAX_ATTEMPTS: u32 = 10;

/// Delay before reconnect attempt number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = BASE_DELAY_MS.saturating_mul(1 << exponent);
    Duration::from_millis(delay.min(MAX_DELAY_MS))
}

pub fn parse_payload(payload: &str) -> anyhow::Result<EmployeeChange> {
    let change: EmployeeChange = serde_json::from_str(payload)?;
    if change.old.is_none() && change.new.is_none() {
        anyhow::bail!("change payload carries neither old nor new row");
    }
    Ok(change)
}

/// Listen on one connection until it fails.
async fn listen(pool: &PgPool, tx: &broadcast::Sender<EmployeeChange>, attempts: &mut u32) -> anyhow::Result<()> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(CHANNEL).await?;
    tracing::info!(channel = CHANNEL, "listening for employee changes");
    *attempts = 0;

    loop {
        let notification = listener.recv().await?;
        match parse_payload(notification.payload()) {
            Ok(change) => {
                // no subscribers is not an error
                let _ = tx.send(change);
            }
            Err(err) => {
                tracing::warn!("dropping malformed change payload: {err}");
            }
        }
    }
}

/// Re-broadcast every `employee_changes` notification, reconnecting with
/// exponential backoff. Returns once `MAX_ATTEMPTS` connections in a row fail.
pub async fn run_listener(pool: PgPool, tx: broadcast::Sender<EmployeeChange>) {
    let mut attempts: u32 = 0;
    loop {
        if let Err(err) = listen(&pool, &tx, &mut attempts).await {
            attempts += 1;
            if attempts > MAX_ATTEMPTS {
                tracing::error!(attempts, "change listener giving up: {err}");
                return;
            }
            let delay = backoff_delay(attempts);
            tracing::warn!(
                attempts,
                delay_ms = delay.as_millis() as u64,
                "change listener disconnected, reconnecting: {err}"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

pub fn spawn_listener(pool: PgPool, tx: broadcast::Sender<EmployeeChange>) -> JoinHandle<()> {
    tokio::spawn(run_listener(pool, tx))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Local;
    use sqlx::PgPool;

    use super::*;
    use crate::{
        factory::employee::EmployeeFactory, model::employee::Employee, realtime::ChangeOp,
        repository::employee::update_employee,
    };

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(4), Duration::from_millis(4000));
        assert_eq!(backoff_delay(7), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(MAX_ATTEMPTS), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_parse_payload() {
        let employee = serde_json::to_value(crate::model::employee::tests::sample_employee())
            .unwrap();
        let payload = serde_json::json!({"op": "INSERT", "old": null, "new": employee});
        let change = parse_payload(&payload.to_string()).unwrap();
        assert_eq!(change.op, ChangeOp::Insert);
        assert!(change.old.is_none());
        assert_eq!(change.new.unwrap().first_name, "Jane");

        assert!(parse_payload(r#"{"op": "DELETE", "old": null, "new": null}"#).is_err());
        assert!(parse_payload("not json").is_err());
    }

    #[sqlx::test]
    async fn test_listener_broadcasts_trigger_payload(pool: PgPool) -> anyhow::Result<()> {
        // Given
        let (tx, mut rx) = broadcast::channel(16);
        let handle = spawn_listener(pool.clone(), tx);
        // give the listener time to subscribe
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut employee = EmployeeFactory::<()>::new().generate_one(&pool, ()).await?;
        let user = crate::factory::user::UserFactory::<()>::new()
            .generate_one(&pool, ())
            .await?;

        // When
        let mut tx = pool.begin().await?;
        employee.email = Some("changed@example.com".to_string());
        update_employee(&mut tx, &mut employee, &user, &Local::now().fixed_offset()).await?;
        tx.commit().await?;

        // Expect
        let inserted = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await??;
        assert_eq!(inserted.op, ChangeOp::Insert);
        let updated = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await??;
        assert_eq!(updated.op, ChangeOp::Update);
        let old: Employee = updated.old.unwrap();
        assert_ne!(old.email, updated.new.unwrap().email);
        handle.abort();
        Ok(())
    }
}
