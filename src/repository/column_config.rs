use chrono::{DateTime, FixedOffset};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    core::sqlx_utils::{binds_query, binds_query_as, query_builder, SqlxBinds},
    model::{
        column_config::{ColumnConfig, TABLE_NAME},
        employee::TABLE_NAME as EMPLOYEE_TABLE_NAME,
        role::UserRole,
        user::User,
    },
};

pub async fn get_all_column_config(
    tx: &mut Transaction<'_, Postgres>,
) -> anyhow::Result<Vec<ColumnConfig>> {
    let stmt = query_builder(
        None,
        TABLE_NAME,
        &[],
        vec!["display_order ASC".to_string(), "column_name ASC".to_string()],
        None,
        None,
    );
    let data = binds_query_as::<ColumnConfig>(&stmt, vec![])
        .fetch_all(&mut **tx)
        .await?;
    Ok(data)
}

pub async fn get_column_config_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: &Uuid,
) -> anyhow::Result<Option<ColumnConfig>> {
    let stmt = query_builder(None, TABLE_NAME, &["id = $1".to_string()], vec![], None, None);
    let data = binds_query_as::<ColumnConfig>(&stmt, vec![SqlxBinds::Uuid(*id)])
        .fetch_optional(&mut **tx)
        .await?;
    Ok(data)
}

/// Case-insensitive name lookup inside one role scope.
pub async fn get_column_config_by_name(
    tx: &mut Transaction<'_, Postgres>,
    column_name: &str,
    scope: UserRole,
) -> anyhow::Result<Option<ColumnConfig>> {
    let stmt = query_builder(
        None,
        TABLE_NAME,
        &[
            "LOWER(column_name) = LOWER($1)".to_string(),
            "COALESCE(owner_role, 'hr_admin') = $2".to_string(),
        ],
        vec![],
        None,
        None,
    );
    let binds = vec![
        SqlxBinds::String(column_name.trim().to_string()),
        SqlxBinds::String(scope.to_string()),
    ];
    let data = binds_query_as::<ColumnConfig>(&stmt, binds)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(data)
}

pub async fn next_display_order(tx: &mut Transaction<'_, Postgres>) -> anyhow::Result<i32> {
    let stmt = query_builder(
        Some("COALESCE(MAX(display_order), 0) + 1".to_string()),
        TABLE_NAME,
        &[],
        vec![],
        None,
        None,
    );
    let res = binds_query_as::<(i32,)>(&stmt, vec![])
        .fetch_one(&mut **tx)
        .await?;
    Ok(res.0)
}

pub async fn create_column_config(
    tx: &mut Transaction<'_, Postgres>,
    data: &ColumnConfig,
) -> anyhow::Result<()> {
    sqlx::query(
        format!(r#"
        INSERT INTO {} (id, column_name, display_name, data_type, is_masterdata, category, display_order, is_visible,
            owner_role, options, role_permissions, created_by, updated_by, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#, TABLE_NAME).as_str(),
    )
    .bind(data.id)
    .bind(&data.column_name)
    .bind(&data.display_name)
    .bind(data.data_type.as_str())
    .bind(data.is_masterdata)
    .bind(&data.category)
    .bind(data.display_order)
    .bind(data.is_visible)
    .bind(&data.owner_role)
    .bind(&data.options)
    .bind(&data.role_permissions)
    .bind(data.created_by)
    .bind(data.updated_by)
    .bind(data.created_date)
    .bind(data.updated_date)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_column_config(
    tx: &mut Transaction<'_, Postgres>,
    data: &mut ColumnConfig,
    request_user: &User,
    now: &DateTime<FixedOffset>,
) -> anyhow::Result<()> {
    data.updated_by = Some(request_user.id);
    data.updated_date = Some(*now);
    sqlx::query(
        format!(
            r#"UPDATE {}
            SET display_name = $1, data_type = $2, category = $3, display_order = $4, is_visible = $5,
            options = $6, role_permissions = $7, updated_by = $8, updated_date = $9
            WHERE id = $10"#,
            TABLE_NAME
        )
        .as_str(),
    )
    .bind(&data.display_name)
    .bind(data.data_type.as_str())
    .bind(&data.category)
    .bind(data.display_order)
    .bind(data.is_visible)
    .bind(&data.options)
    .bind(&data.role_permissions)
    .bind(data.updated_by)
    .bind(data.updated_date)
    .bind(data.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Apply a new ordering. Returns how many columns were updated.
pub async fn reorder_column_config(
    tx: &mut Transaction<'_, Postgres>,
    orders: &[(Uuid, i32)],
    request_user: &User,
    now: &DateTime<FixedOffset>,
) -> anyhow::Result<u64> {
    let mut updated = 0;
    for (id, display_order) in orders {
        let res = sqlx::query(
            format!(
                "UPDATE {} SET display_order = $1, updated_by = $2, updated_date = $3 WHERE id = $4",
                TABLE_NAME
            )
            .as_str(),
        )
        .bind(display_order)
        .bind(request_user.id)
        .bind(now)
        .bind(id)
        .execute(&mut **tx)
        .await?;
        updated += res.rows_affected();
    }
    Ok(updated)
}

/// Delete a custom column and drop its stored values from every employee.
pub async fn delete_column_config(
    tx: &mut Transaction<'_, Postgres>,
    column: &ColumnConfig,
) -> anyhow::Result<bool> {
    let stmt = format!("DELETE FROM {} WHERE id = $1 AND is_masterdata = false", TABLE_NAME);
    let res = binds_query(&stmt, vec![SqlxBinds::Uuid(column.id)])
        .execute(&mut **tx)
        .await?;
    if res.rows_affected() == 0 {
        return Ok(false);
    }
    sqlx::query(
        format!(
            "UPDATE {} SET custom_fields = custom_fields - $1 WHERE custom_fields ? $1",
            EMPLOYEE_TABLE_NAME
        )
        .as_str(),
    )
    .bind(column.storage_key())
    .execute(&mut **tx)
    .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::{
        factory::{column_config::ColumnConfigFactory, employee::EmployeeFactory},
        model::employee::Employee,
    };

    #[sqlx::test]
    async fn test_seeded_masterdata_columns(pool: PgPool) -> anyhow::Result<()> {
        // When
        let mut tx = pool.begin().await?;
        let columns = get_all_column_config(&mut tx).await?;

        // Expect
        assert_eq!(columns.len(), 16);
        assert!(columns.iter().all(|x| x.is_masterdata && x.owner_role.is_none()));
        assert_eq!(columns[0].column_name, "first_name");
        Ok(())
    }

    #[sqlx::test]
    async fn test_get_by_name_is_scoped_and_case_insensitive(pool: PgPool) -> anyhow::Result<()> {
        // Given
        let mut factory = ColumnConfigFactory::<UserRole>::new();
        factory.modified_one(|x, owner| ColumnConfig {
            column_name: "Locker".to_string(),
            owner_role: Some(owner.to_string()),
            ..x.clone()
        });
        let column = factory.generate_one(&pool, UserRole::Sodexo).await?;

        // When
        let mut tx = pool.begin().await?;
        let same_scope = get_column_config_by_name(&mut tx, "LOCKER", UserRole::Sodexo).await?;
        let other_scope = get_column_config_by_name(&mut tx, "locker", UserRole::Omc).await?;
        let masterdata = get_column_config_by_name(&mut tx, "SSN", UserRole::HrAdmin).await?;

        // Expect
        assert_eq!(same_scope.map(|x| x.id), Some(column.id));
        assert!(other_scope.is_none());
        assert!(masterdata.is_some());
        Ok(())
    }

    #[sqlx::test]
    async fn test_delete_drops_custom_values(pool: PgPool) -> anyhow::Result<()> {
        // Given
        let mut column_factory = ColumnConfigFactory::<UserRole>::new();
        column_factory.modified_one(|x, owner| ColumnConfig {
            column_name: "locker".to_string(),
            owner_role: Some(owner.to_string()),
            ..x.clone()
        });
        let sodexo = column_factory.generate_one(&pool, UserRole::Sodexo).await?;
        let payroll = column_factory.generate_one(&pool, UserRole::Payroll).await?;
        let mut employee_factory = EmployeeFactory::<(String, String)>::new();
        employee_factory.modified_one(|x, (first, second)| {
            let mut employee = x.clone();
            employee.custom_fields.0.insert(first, serde_json::json!("A1"));
            employee.custom_fields.0.insert(second, serde_json::json!("B2"));
            employee
        });
        let employee = employee_factory
            .generate_one(&pool, (sodexo.storage_key(), payroll.storage_key()))
            .await?;

        // When
        let mut tx = pool.begin().await?;
        let deleted = delete_column_config(&mut tx, &sodexo).await?;
        let stored: Employee = sqlx::query_as("SELECT * FROM public.employee WHERE id = $1")
            .bind(employee.id)
            .fetch_one(&mut *tx)
            .await?;

        // Expect only the deleted column's values are gone
        assert!(deleted);
        assert!(stored.custom_fields.0.get(&sodexo.storage_key()).is_none());
        assert_eq!(stored.column_value(&payroll), serde_json::json!("B2"));
        Ok(())
    }

    #[sqlx::test]
    async fn test_masterdata_is_never_deleted(pool: PgPool) -> anyhow::Result<()> {
        // Given
        let mut tx = pool.begin().await?;
        let ssn = get_column_config_by_name(&mut tx, "ssn", UserRole::HrAdmin)
            .await?
            .unwrap();

        // When
        let deleted = delete_column_config(&mut tx, &ssn).await?;

        // Expect
        assert!(!deleted);
        assert!(get_column_config_by_id(&mut tx, &ssn.id).await?.is_some());
        Ok(())
    }
}
