use chrono::{DateTime, FixedOffset};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    core::sqlx_utils::{binds_query, binds_query_as, query_builder, Filters, SqlxBinds},
    model::{
        important_date::{ImportantDate, TABLE_NAME},
        user::User,
    },
};

#[derive(Debug, Default, Clone)]
pub struct ImportantDateFilters {
    pub year: Option<i32>,
    pub category: Option<String>,
}

impl ImportantDateFilters {
    fn to_filters(&self) -> Filters {
        let mut filters = Filters::default();
        if let Some(year) = self.year {
            let placeholder = filters.bind(SqlxBinds::Int(year));
            filters.push(format!("year = {}", placeholder));
        }
        if let Some(category) = self.category.as_deref().filter(|x| !x.trim().is_empty()) {
            let placeholder = filters.bind(SqlxBinds::String(category.trim().to_string()));
            filters.push(format!("LOWER(category) = LOWER({})", placeholder));
        }
        filters
    }
}

fn order_by() -> Vec<String> {
    vec![
        "year DESC".to_string(),
        "week_number ASC".to_string(),
        "category ASC".to_string(),
    ]
}

/// `page` of `None` returns every matching row.
pub async fn get_all_important_date(
    tx: &mut Transaction<'_, Postgres>,
    page: Option<(u32, u32)>,
    date_filters: &ImportantDateFilters,
) -> anyhow::Result<(Vec<ImportantDate>, u32)> {
    let filters = date_filters.to_filters();
    let (limit, offset) = match page {
        Some((page, page_size)) => (Some(page_size), Some((page - 1) * page_size)),
        None => (None, None),
    };
    let stmt = query_builder(None, TABLE_NAME, &filters.wheres, order_by(), limit, offset);
    let stmt_count = query_builder(
        Some("count(id)".to_string()),
        TABLE_NAME,
        &filters.wheres,
        vec![],
        None,
        None,
    );
    let data = binds_query_as::<ImportantDate>(&stmt, filters.binds.clone())
        .fetch_all(&mut **tx)
        .await?;
    let count = binds_query_as::<(i64,)>(&stmt_count, filters.binds)
        .fetch_one(&mut **tx)
        .await?;
    Ok((data, count.0 as u32))
}

pub async fn get_important_date_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: &Uuid,
) -> anyhow::Result<Option<ImportantDate>> {
    let stmt = query_builder(None, TABLE_NAME, &["id = $1".to_string()], vec![], None, None);
    let data = binds_query_as::<ImportantDate>(&stmt, vec![SqlxBinds::Uuid(*id)])
        .fetch_optional(&mut **tx)
        .await?;
    Ok(data)
}

/// Look up a date by its unique key (year, week, category, date value).
pub async fn get_important_date_by_key(
    tx: &mut Transaction<'_, Postgres>,
    year: i32,
    week_number: i32,
    category: &str,
    date_value: &str,
) -> anyhow::Result<Option<ImportantDate>> {
    let stmt = query_builder(
        None,
        TABLE_NAME,
        &[
            "year = $1".to_string(),
            "week_number = $2".to_string(),
            "category = $3".to_string(),
            "date_value = $4".to_string(),
        ],
        vec![],
        None,
        None,
    );
    let binds = vec![
        SqlxBinds::Int(year),
        SqlxBinds::Int(week_number),
        SqlxBinds::String(category.to_string()),
        SqlxBinds::String(date_value.to_string()),
    ];
    let data = binds_query_as::<ImportantDate>(&stmt, binds)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(data)
}

pub async fn create_important_date(
    tx: &mut Transaction<'_, Postgres>,
    data: &ImportantDate,
) -> anyhow::Result<()> {
    sqlx::query(
        format!(r#"
        INSERT INTO {} (id, week_number, year, category, description, date_value, notes, created_by, updated_by, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#, TABLE_NAME).as_str(),
    )
    .bind(data.id)
    .bind(data.week_number)
    .bind(data.year)
    .bind(&data.category)
    .bind(&data.description)
    .bind(&data.date_value)
    .bind(&data.notes)
    .bind(data.created_by)
    .bind(data.updated_by)
    .bind(data.created_date)
    .bind(data.updated_date)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_important_date(
    tx: &mut Transaction<'_, Postgres>,
    data: &mut ImportantDate,
    request_user: &User,
    now: &DateTime<FixedOffset>,
) -> anyhow::Result<()> {
    data.updated_by = Some(request_user.id);
    data.updated_date = Some(*now);
    sqlx::query(
        format!(
            r#"UPDATE {}
            SET week_number = $1, year = $2, category = $3, description = $4, date_value = $5,
            notes = $6, updated_by = $7, updated_date = $8
            WHERE id = $9"#,
            TABLE_NAME
        )
        .as_str(),
    )
    .bind(data.week_number)
    .bind(data.year)
    .bind(&data.category)
    .bind(&data.description)
    .bind(&data.date_value)
    .bind(&data.notes)
    .bind(data.updated_by)
    .bind(data.updated_date)
    .bind(data.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Employee references are cleared by the foreign key.
pub async fn delete_important_date(
    tx: &mut Transaction<'_, Postgres>,
    id: &Uuid,
) -> anyhow::Result<bool> {
    let stmt = format!("DELETE FROM {} WHERE id = $1", TABLE_NAME);
    let res = binds_query(&stmt, vec![SqlxBinds::Uuid(*id)])
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected() > 0)
}
