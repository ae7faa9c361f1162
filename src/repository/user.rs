use chrono::{DateTime, FixedOffset};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    core::sqlx_utils::{binds_query_as, query_builder, Filters, SqlxBinds},
    model::{
        role::UserRole,
        user::{User, TABLE_NAME},
    },
};

#[derive(Debug, Default, Clone)]
pub struct UserFilters {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

pub async fn get_all_user(
    tx: &mut Transaction<'_, Postgres>,
    page: u32,
    page_size: u32,
    user_filters: &UserFilters,
) -> anyhow::Result<(Vec<User>, u32, u32)> {
    let mut filters = Filters::default();
    if let Some(search) = user_filters.search.as_deref().filter(|x| !x.trim().is_empty()) {
        filters.search(&["email", "full_name"], search);
    }
    if let Some(role) = user_filters.role {
        let placeholder = filters.bind(SqlxBinds::String(role.to_string()));
        filters.push(format!("role = {}", placeholder));
    }
    if let Some(is_active) = user_filters.is_active {
        let placeholder = filters.bind(SqlxBinds::Bool(is_active));
        filters.push(format!("is_active = {}", placeholder));
    }

    let offset = (page - 1) * page_size;
    let stmt = query_builder(
        None,
        TABLE_NAME,
        &filters.wheres,
        vec!["created_date DESC".to_string(), "email ASC".to_string()],
        Some(page_size),
        Some(offset),
    );
    let stmt_count = query_builder(
        Some("count(id)".to_string()),
        TABLE_NAME,
        &filters.wheres,
        vec![],
        None,
        None,
    );

    let data = binds_query_as::<User>(&stmt, filters.binds.clone())
        .fetch_all(&mut **tx)
        .await?;
    let count = binds_query_as::<(i64,)>(&stmt_count, filters.binds)
        .fetch_one(&mut **tx)
        .await?;
    let counts = count.0 as u32;
    Ok((data, counts, counts.div_ceil(page_size)))
}

pub async fn get_user_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: &Uuid,
) -> anyhow::Result<Option<User>> {
    let stmt = query_builder(
        None,
        TABLE_NAME,
        &["id = $1".to_string()],
        vec![],
        None,
        None,
    );
    let user = binds_query_as::<User>(&stmt, vec![SqlxBinds::Uuid(*id)])
        .fetch_optional(&mut **tx)
        .await?;
    Ok(user)
}

pub async fn get_user_by_email(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
) -> anyhow::Result<Option<User>> {
    let user: Option<User> = sqlx::query_as(
        r#"SELECT *
        FROM public.user
        WHERE LOWER(email) = LOWER($1)
        "#,
    )
    .bind(email.trim())
    .fetch_optional(&mut **tx)
    .await?;
    Ok(user)
}

pub async fn create_user(tx: &mut Transaction<'_, Postgres>, user: &User) -> anyhow::Result<()> {
    sqlx::query(
        format!(r#"
        INSERT INTO {} (id, email, password, full_name, role, is_active, last_login_date, created_by, updated_by, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#, TABLE_NAME).as_str(),
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password)
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(user.is_active)
    .bind(user.last_login_date)
    .bind(user.created_by)
    .bind(user.updated_by)
    .bind(user.created_date)
    .bind(user.updated_date)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_user(
    tx: &mut Transaction<'_, Postgres>,
    user: &mut User,
    request_user: &User,
    now: &DateTime<FixedOffset>,
) -> anyhow::Result<()> {
    user.updated_by = Some(request_user.id);
    user.updated_date = Some(*now);
    sqlx::query(
        format!(
            r#"UPDATE {}
            SET email = $1, password = $2, full_name = $3, role = $4, is_active = $5,
            updated_by = $6, updated_date = $7
            WHERE id = $8"#,
            TABLE_NAME
        )
        .as_str(),
    )
    .bind(&user.email)
    .bind(&user.password)
    .bind(&user.full_name)
    .bind(user.role.as_str())
    .bind(user.is_active)
    .bind(user.updated_by)
    .bind(user.updated_date)
    .bind(user.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_last_login(
    tx: &mut Transaction<'_, Postgres>,
    user: &mut User,
    now: &DateTime<FixedOffset>,
) -> anyhow::Result<()> {
    user.last_login_date = Some(*now);
    sqlx::query(format!("UPDATE {} SET last_login_date = $1 WHERE id = $2", TABLE_NAME).as_str())
        .bind(now)
        .bind(user.id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
