use chrono::Local;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    core::security::hash_password,
    model::{role::UserRole, user::User},
    repository,
};

/// Create an active user directly in the database. Used to bootstrap the
/// first HR Admin account.
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password: &str,
    role: UserRole,
) -> anyhow::Result<User> {
    let email = email.trim().to_lowercase();
    if password.len() < 8 {
        anyhow::bail!("password must be at least 8 characters");
    }
    let mut tx = pool.begin().await?;
    if repository::user::get_user_by_email(&mut tx, &email)
        .await?
        .is_some()
    {
        anyhow::bail!("user with email {} already exists", email);
    }

    let hashed_password = hash_password(password).map_err(|err| anyhow::anyhow!("{}", err))?;
    let now = Local::now().fixed_offset();
    let user = User {
        id: Uuid::now_v7(),
        email,
        password: hashed_password,
        full_name: None,
        role,
        is_active: true,
        last_login_date: None,
        created_by: None,
        updated_by: None,
        created_date: Some(now),
        updated_date: Some(now),
    };
    repository::user::create_user(&mut tx, &user).await?;
    tx.commit().await?;
    tracing::info!(user_id = %user.id, role = %role, "user created from cli");
    Ok(user)
}
