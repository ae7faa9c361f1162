use chrono::{DateTime, FixedOffset};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    core::{
        sqlx_utils::{binds_query_as, query_builder, Filters, SqlxBinds},
        view_impact::{EmployeeFilters, SortState},
    },
    model::{
        employee::{Employee, MASTERDATA_COLUMNS, TABLE_NAME},
        user::User,
    },
};

fn build_filters(employee_filters: &EmployeeFilters) -> Filters {
    let mut filters = Filters::default();
    if !employee_filters.include_archived {
        filters.push("is_archived = false");
    }
    if !employee_filters.include_terminated {
        filters.push("is_terminated = false");
    }
    if let Some(search) = employee_filters.search_term() {
        let mut columns = vec![];
        if employee_filters.searches("first_name") && employee_filters.searches("last_name") {
            columns.push("(first_name || ' ' || last_name)");
        }
        for (name, expr) in [
            ("first_name", "first_name"),
            ("last_name", "last_name"),
            ("ssn", "ssn"),
            ("email", "COALESCE(email, '')"),
        ] {
            if employee_filters.searches(name) {
                columns.push(expr);
            }
        }
        filters.search(&columns, search);
    }
    filters
}

fn order_by(sort: &SortState, filters: &mut Filters) -> Vec<String> {
    let direction = if sort.descending { "DESC" } else { "ASC" };
    let mut order = vec![];
    match sort.sort_by.as_deref() {
        Some(column) if MASTERDATA_COLUMNS.contains(&column) => {
            order.push(format!("{} {} NULLS LAST", column, direction));
        }
        Some(key) if !key.trim().is_empty() => {
            let placeholder = filters.bind(SqlxBinds::String(key.to_string()));
            order.push(format!("custom_fields ->> {} {} NULLS LAST", placeholder, direction));
        }
        _ => {}
    }
    order.push("last_name ASC".to_string());
    order.push("first_name ASC".to_string());
    order.push("id ASC".to_string());
    order
}

/// `page` of `None` returns every matching row.
pub async fn get_all_employee(
    tx: &mut Transaction<'_, Postgres>,
    page: Option<(u32, u32)>,
    employee_filters: &EmployeeFilters,
    sort: &SortState,
) -> anyhow::Result<(Vec<Employee>, u32)> {
    let filters = build_filters(employee_filters);
    let stmt_count = query_builder(
        Some("count(id)".to_string()),
        TABLE_NAME,
        &filters.wheres,
        vec![],
        None,
        None,
    );
    let count = binds_query_as::<(i64,)>(&stmt_count, filters.binds.clone())
        .fetch_one(&mut **tx)
        .await?;

    let mut filters = filters;
    let order = order_by(sort, &mut filters);
    let (limit, offset) = match page {
        Some((page, page_size)) => (Some(page_size), Some((page - 1) * page_size)),
        None => (None, None),
    };
    let stmt = query_builder(None, TABLE_NAME, &filters.wheres, order, limit, offset);
    let data = binds_query_as::<Employee>(&stmt, filters.binds)
        .fetch_all(&mut **tx)
        .await?;
    Ok((data, count.0 as u32))
}

/// Ids currently matching `employee_filters`, used to seed a view state.
pub async fn get_employee_ids(
    tx: &mut Transaction<'_, Postgres>,
    employee_filters: &EmployeeFilters,
) -> anyhow::Result<Vec<Uuid>> {
    let filters = build_filters(employee_filters);
    let stmt = query_builder(
        Some("id".to_string()),
        TABLE_NAME,
        &filters.wheres,
        vec![],
        None,
        None,
    );
    let data = binds_query_as::<(Uuid,)>(&stmt, filters.binds)
        .fetch_all(&mut **tx)
        .await?;
    Ok(data.into_iter().map(|x| x.0).collect())
}

pub async fn get_employee_by_id(
    tx: &mut Transaction<'_, Postgres>,
    id: &Uuid,
) -> anyhow::Result<Option<Employee>> {
    let stmt = query_builder(None, TABLE_NAME, &["id = $1".to_string()], vec![], None, None);
    let data = binds_query_as::<Employee>(&stmt, vec![SqlxBinds::Uuid(*id)])
        .fetch_optional(&mut **tx)
        .await?;
    Ok(data)
}

pub async fn get_employee_by_ssn(
    tx: &mut Transaction<'_, Postgres>,
    ssn: &str,
) -> anyhow::Result<Option<Employee>> {
    let stmt = query_builder(None, TABLE_NAME, &["ssn = $1".to_string()], vec![], None, None);
    let data = binds_query_as::<Employee>(&stmt, vec![SqlxBinds::String(ssn.trim().to_string())])
        .fetch_optional(&mut **tx)
        .await?;
    Ok(data)
}

pub async fn create_employee(
    tx: &mut Transaction<'_, Postgres>,
    data: &Employee,
) -> anyhow::Result<()> {
    sqlx::query(
        format!(r#"
        INSERT INTO {} (id, first_name, last_name, ssn, email, mobile, rank, gender, town_district,
            stena_date, omc_date, pe3_date, comments, is_terminated, termination_date, termination_reason,
            is_archived, archived_date, custom_fields, created_by, updated_by, created_date, updated_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
        "#, TABLE_NAME).as_str(),
    )
    .bind(data.id)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.ssn)
    .bind(&data.email)
    .bind(&data.mobile)
    .bind(&data.rank)
    .bind(&data.gender)
    .bind(&data.town_district)
    .bind(data.stena_date)
    .bind(data.omc_date)
    .bind(data.pe3_date)
    .bind(&data.comments)
    .bind(data.is_terminated)
    .bind(data.termination_date)
    .bind(&data.termination_reason)
    .bind(data.is_archived)
    .bind(data.archived_date)
    .bind(&data.custom_fields)
    .bind(data.created_by)
    .bind(data.updated_by)
    .bind(data.created_date)
    .bind(data.updated_date)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Persist every mutable field. Last write wins.
pub async fn update_employee(
    tx: &mut Transaction<'_, Postgres>,
    data: &mut Employee,
    request_user: &User,
    now: &DateTime<FixedOffset>,
) -> anyhow::Result<()> {
    data.updated_by = Some(request_user.id);
    data.updated_date = Some(*now);
    sqlx::query(
        format!(
            r#"UPDATE {}
            SET first_name = $1, last_name = $2, ssn = $3, email = $4, mobile = $5, rank = $6,
            gender = $7, town_district = $8, stena_date = $9, omc_date = $10, pe3_date = $11,
            comments = $12, is_terminated = $13, termination_date = $14, termination_reason = $15,
            is_archived = $16, archived_date = $17, custom_fields = $18, updated_by = $19,
            updated_date = $20
            WHERE id = $21"#,
            TABLE_NAME
        )
        .as_str(),
    )
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.ssn)
    .bind(&data.email)
    .bind(&data.mobile)
    .bind(&data.rank)
    .bind(&data.gender)
    .bind(&data.town_district)
    .bind(data.stena_date)
    .bind(data.omc_date)
    .bind(data.pe3_date)
    .bind(&data.comments)
    .bind(data.is_terminated)
    .bind(data.termination_date)
    .bind(&data.termination_reason)
    .bind(data.is_archived)
    .bind(data.archived_date)
    .bind(&data.custom_fields)
    .bind(data.updated_by)
    .bind(data.updated_date)
    .bind(data.id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Local, NaiveDate};
    use sqlx::PgPool;

    use super::*;
    use crate::{factory::employee::EmployeeFactory, model::employee::Employee};

    #[sqlx::test]
    async fn test_list_excludes_archived_and_terminated(pool: PgPool) -> anyhow::Result<()> {
        // Given
        let mut factory = EmployeeFactory::<()>::new();
        factory.modified_many(|x, idx, _| {
            let mut employee = x.clone();
            match idx {
                0 => employee.archive(Local::now().fixed_offset()),
                1 => employee.terminate(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), None),
                _ => {}
            }
            employee
        });
        factory.generate_many(&pool, 5, ()).await?;

        // When
        let mut tx = pool.begin().await?;
        let sort = SortState::default();
        let (active, active_counts) =
            get_all_employee(&mut tx, None, &EmployeeFilters::default(), &sort).await?;
        let everything = EmployeeFilters {
            include_archived: true,
            include_terminated: true,
            ..Default::default()
        };
        let (page, all_counts) = get_all_employee(&mut tx, Some((1, 2)), &everything, &sort).await?;
        let ids = get_employee_ids(&mut tx, &EmployeeFilters::default()).await?;

        // Expect
        assert_eq!(active.len(), 3);
        assert_eq!(active_counts, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(all_counts, 5);
        assert_eq!(ids.len(), 3);
        Ok(())
    }

    #[sqlx::test]
    async fn test_search_and_sort(pool: PgPool) -> anyhow::Result<()> {
        // Given
        let mut factory = EmployeeFactory::<()>::new();
        factory.modified_many(|x, idx, _| Employee {
            first_name: ["Anna", "Bertil", "Annika"][idx].to_string(),
            last_name: "Berg".to_string(),
            email: None,
            ..x.clone()
        });
        factory.generate_many(&pool, 3, ()).await?;

        // When
        let mut tx = pool.begin().await?;
        let filters = EmployeeFilters {
            search: Some("ANN".to_string()),
            ..Default::default()
        };
        let sort = SortState {
            sort_by: Some("first_name".to_string()),
            descending: true,
        };
        let (data, counts) = get_all_employee(&mut tx, None, &filters, &sort).await?;

        // Expect
        assert_eq!(counts, 2);
        let names: Vec<String> = data.into_iter().map(|x| x.first_name).collect();
        assert_eq!(names, vec!["Annika", "Anna"]);
        Ok(())
    }

    #[sqlx::test]
    async fn test_search_is_literal_and_scoped(pool: PgPool) -> anyhow::Result<()> {
        // Given
        let mut factory = EmployeeFactory::<()>::new();
        factory.modified_many(|x, idx, _| Employee {
            first_name: ["a_b", "axb", "50%"][idx].to_string(),
            last_name: "Berg".to_string(),
            ssn: format!("1990010{}-0000", idx),
            email: None,
            ..x.clone()
        });
        factory.generate_many(&pool, 3, ()).await?;

        // When
        let mut tx = pool.begin().await?;
        let sort = SortState::default();
        let underscore = EmployeeFilters::new(Some("a_b".to_string()), false, false);
        let (by_underscore, _) = get_all_employee(&mut tx, None, &underscore, &sort).await?;
        let percent = EmployeeFilters::new(Some("%".to_string()), false, false);
        let (by_percent, _) = get_all_employee(&mut tx, None, &percent, &sort).await?;
        let mut names_only = EmployeeFilters::new(Some("19900101".to_string()), false, false);
        names_only.search_columns = vec!["first_name".to_string(), "last_name".to_string()];
        let (by_hidden_ssn, hidden_counts) =
            get_all_employee(&mut tx, None, &names_only, &sort).await?;
        let ids = get_employee_ids(&mut tx, &underscore).await?;

        // Expect
        let names: Vec<String> = by_underscore.iter().map(|x| x.first_name.clone()).collect();
        assert_eq!(names, vec!["a_b"]);
        assert!(by_underscore.iter().all(|x| underscore.matches(x)));
        assert_eq!(by_percent.len(), 1);
        assert_eq!(by_percent[0].first_name, "50%");
        assert!(by_hidden_ssn.is_empty());
        assert_eq!(hidden_counts, 0);
        assert_eq!(ids, vec![by_underscore[0].id]);
        Ok(())
    }

    #[sqlx::test]
    async fn test_update_round_trips_custom_fields(pool: PgPool) -> anyhow::Result<()> {
        // Given
        let mut factory = EmployeeFactory::<()>::new();
        let mut employee = factory.generate_one(&pool, ()).await?;
        let mut user_factory = crate::factory::user::UserFactory::<()>::new();
        let user = user_factory.generate_one(&pool, ()).await?;
        employee
            .custom_fields
            .0
            .insert("locker".to_string(), serde_json::json!("B7"));

        // When
        let mut tx = pool.begin().await?;
        update_employee(&mut tx, &mut employee, &user, &Local::now().fixed_offset()).await?;
        let stored = get_employee_by_ssn(&mut tx, &employee.ssn).await?.unwrap();

        // Expect
        assert_eq!(stored.custom_fields.0.get("locker"), Some(&serde_json::json!("B7")));
        assert_eq!(stored.updated_by, Some(user.id));
        Ok(())
    }
}
