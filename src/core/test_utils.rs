use std::sync::Arc;

use chrono::Local;
use fake::{Fake, Faker};
use redis::ConnectionLike;
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use uuid::Uuid;

use super::security::{generate_refresh_token_from_user, generate_token_from_user};
use crate::{
    core::{security::hash_password, session::add_session},
    model::{role::UserRole, user::User},
    settings::{get_config, Config},
    AppState,
};

pub fn generate_random<T: fake::Dummy<fake::Faker>>() -> T {
    Faker.fake()
}

pub struct TestUser {
    pub user: User,
    pub token: String,
    pub refresh_token: String,
}

impl TestUser {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Insert an active user with `role` and open a session for it.
pub async fn generate_test_user<C: ConnectionLike>(
    db: &mut PoolConnection<Postgres>,
    redis_conn: &mut C,
    config: Config,
    email: &str,
    password: &str,
    role: UserRole,
) -> anyhow::Result<TestUser> {
    let hashed_password = hash_password(password).map_err(|err| anyhow::anyhow!("{}", err))?;
    let now = Local::now().fixed_offset();
    let user = User {
        id: Uuid::now_v7(),
        email: email.to_string(),
        password: hashed_password,
        full_name: Some(format!("Test {}", role)),
        role,
        is_active: true,
        last_login_date: None,
        created_by: None,
        updated_by: None,
        created_date: Some(now),
        updated_date: Some(now),
    };

    sqlx::query(
        r#"
        INSERT INTO public.user (id, email, password, full_name, role, is_active, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password)
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(user.is_active)
    .bind(user.created_date)
    .bind(user.updated_date)
    .execute(&mut **db)
    .await?;

    let token = generate_token_from_user(&user, &config)?;
    let refresh_token = generate_refresh_token_from_user(&user, &config)?;
    add_session(
        redis_conn,
        &user,
        &config,
        token.clone(),
        refresh_token.clone(),
    )?;

    Ok(TestUser {
        user,
        token,
        refresh_token,
    })
}

/// App state and config for route tests, with the api mounted under `/api`.
pub fn test_app_state(pool: PgPool) -> anyhow::Result<(Arc<AppState>, Config)> {
    let mut config = get_config()?;
    config.prefix = Some("/api".to_string());
    let client = redis::Client::open(config.redis_url.clone())?;
    let redis_pool = r2d2::Pool::builder().build(client)?;
    Ok((Arc::new(AppState::new(pool, redis_pool)), config))
}

/// Shorthand for a user of `role` with a unique email.
pub async fn login_as(
    app_state: &AppState,
    config: &Config,
    role: UserRole,
) -> anyhow::Result<TestUser> {
    let mut db = app_state.db.acquire().await?;
    let mut redis_conn = app_state.redis_conn.get()?;
    let email = format!("{}-{}@example.com", role, Uuid::now_v7().simple());
    generate_test_user(
        &mut db,
        &mut redis_conn,
        config.clone(),
        &email,
        "password",
        role,
    )
    .await
}
