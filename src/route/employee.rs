use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, Local};
use futures::{stream::BoxStream, StreamExt};
use poem::{web::Data, Request};
use poem_openapi::{
    param::{Path, Query},
    payload::{Attachment, EventStream, Json},
    OpenApi, Tags,
};
use serde_json::Value;
use sqlx::{Acquire, Postgres, Transaction};

use crate::{
    core::{
        csv_utils::{cell_text, csv_attachment, write_csv, CsvTable, ImportTally, ROW_NOT_SAVED},
        error::{is_unique_violation, AppError},
        gate::session_token,
        permission::{apply_cell_edits, can_edit, project_employee, visible_columns},
        security::{authenticate, authenticate_token, require_hr_admin, BearerAuthorization},
        utils::{page_meta, page_params, parse_date, parse_id},
        view_impact::{EmployeeFilters, SortState, ViewNotification},
    },
    model::{
        column_config::{ColumnConfig, ColumnDataType},
        employee::Employee,
        role::UserRole,
        user::User,
    },
    realtime::subscription::subscribe,
    repository::{
        column_config::get_all_column_config,
        employee::{
            create_employee, get_all_employee, get_employee_by_id, get_employee_by_ssn,
            update_employee,
        },
        important_date::get_important_date_by_id,
    },
    schema::{
        common::{ApiError, DataResponse, ImportResult},
        employee::{
            CellEditRequest, CsvUpload, EmployeeCreateRequest, EmployeeCreateResponses,
            TerminateRequest,
        },
    },
    AppState,
};

const DUPLICATE_SSN: &str = "Employee with this SSN already exists";
const KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Tags)]
enum ApiEmployeeTags {
    Employee,
}

pub struct ApiEmployee;

async fn load_columns(
    tx: &mut Transaction<'_, Postgres>,
    function: &'static str,
) -> Result<Vec<ColumnConfig>, AppError> {
    get_all_column_config(tx)
        .await
        .map_err(|err| AppError::internal("route.employee", function, "get all column config", err))
}

async fn find_employee(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    function: &'static str,
) -> Result<Employee, AppError> {
    let id = parse_id(id, "Employee")?;
    get_employee_by_id(tx, &id)
        .await
        .map_err(|err| AppError::internal("route.employee", function, "get employee by id", err))?
        .ok_or(AppError::NotFound("Employee".to_string()))
}

/// Every important date reference must point at an existing row.
async fn check_date_refs(
    tx: &mut Transaction<'_, Postgres>,
    employee: &Employee,
    function: &'static str,
) -> Result<(), AppError> {
    for id in employee.important_date_refs() {
        let found = get_important_date_by_id(tx, &id).await.map_err(|err| {
            AppError::internal("route.employee", function, "get important date by id", err)
        })?;
        if found.is_none() {
            return Err(AppError::validation(format!("Unknown important date {}", id)));
        }
    }
    Ok(())
}

async fn check_unique_ssn(
    tx: &mut Transaction<'_, Postgres>,
    employee: &Employee,
    function: &'static str,
) -> Result<(), AppError> {
    let existing = get_employee_by_ssn(tx, &employee.ssn).await.map_err(|err| {
        AppError::internal("route.employee", function, "get employee by ssn", err)
    })?;
    match existing {
        Some(existing) if existing.id != employee.id => {
            Err(AppError::Conflict(DUPLICATE_SSN.to_string()))
        }
        _ => Ok(()),
    }
}

fn sort_state(
    sort_by: Option<String>,
    sort_order: Option<String>,
    role: UserRole,
    columns: &[ColumnConfig],
) -> Result<SortState, AppError> {
    let descending = match sort_order.as_deref().map(|x| x.trim().to_lowercase()) {
        None => false,
        Some(order) if order == "asc" => false,
        Some(order) if order == "desc" => true,
        Some(order) => return Err(AppError::validation(format!("Invalid sort order: {}", order))),
    };
    let sort_by = match sort_by.map(|x| x.trim().to_lowercase()).filter(|x| !x.is_empty()) {
        None => None,
        Some(name) => {
            // sorting by a hidden column would leak its values
            let visible = visible_columns(role, columns);
            let column = visible
                .iter()
                .filter(|x| x.column_name.eq_ignore_ascii_case(&name))
                .min_by_key(|x| !x.is_masterdata)
                .ok_or_else(|| AppError::validation(format!("Unknown sort column: {}", name)))?;
            if column.is_masterdata {
                Some(column.column_name.clone())
            } else {
                Some(column.storage_key())
            }
        }
    };
    Ok(SortState {
        sort_by,
        descending,
    })
}

fn create_changes(json: &EmployeeCreateRequest) -> BTreeMap<String, Value> {
    let mut changes = BTreeMap::new();
    changes.insert("first_name".to_string(), Value::String(json.first_name.clone()));
    changes.insert("last_name".to_string(), Value::String(json.last_name.clone()));
    changes.insert("ssn".to_string(), Value::String(json.ssn.clone()));
    for (name, value) in [
        ("email", &json.email),
        ("mobile", &json.mobile),
        ("rank", &json.rank),
        ("gender", &json.gender),
        ("town_district", &json.town_district),
        ("stena_date", &json.stena_date),
        ("omc_date", &json.omc_date),
        ("pe3_date", &json.pe3_date),
        ("comments", &json.comments),
    ] {
        if let Some(value) = value {
            changes.insert(name.to_string(), Value::String(value.clone()));
        }
    }
    if let Some(custom_fields) = &json.custom_fields {
        for (name, value) in custom_fields {
            changes.insert(name.clone(), value.clone());
        }
    }
    changes
}

/// Flatten a validation error into one line for the import report.
fn row_error(err: AppError) -> String {
    match err {
        AppError::Validation {
            details: Some(Value::Object(details)),
            ..
        } => details
            .iter()
            .map(|(column, message)| format!("{}: {}", column, cell_text(message)))
            .collect::<Vec<String>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn flag(table: &CsvTable, row: &[String], name: &str) -> Result<bool, String> {
    match table.get(row, name) {
        None => Ok(false),
        Some(value) => {
            let value = ColumnDataType::Boolean
                .coerce(&Value::String(value.to_string()), None)
                .map_err(|err| format!("{}: {}", name, err))?;
            Ok(value == Value::Bool(true))
        }
    }
}

/// Build a new employee from one CSV data row.
fn employee_from_row(
    table: &CsvTable,
    row: &[String],
    columns: &[ColumnConfig],
    request_user: &User,
    now: &DateTime<FixedOffset>,
) -> Result<Employee, String> {
    let mut employee = Employee::new(Some(request_user.id), *now);
    let mut changes = BTreeMap::new();
    for header in table.headers.iter() {
        if Employee::is_lifecycle_column(header)
            || !columns.iter().any(|x| x.column_name.eq_ignore_ascii_case(header))
        {
            continue;
        }
        if let Some(value) = table.get(row, header) {
            changes.insert(header.clone(), Value::String(value.to_string()));
        }
    }
    apply_cell_edits(&mut employee, &changes, columns, request_user.role).map_err(row_error)?;

    let missing = employee.missing_required();
    if !missing.is_empty() {
        return Err(format!("{} is required", missing.join(", ")));
    }
    if flag(table, row, "is_terminated")? {
        let date = table
            .get(row, "termination_date")
            .and_then(parse_date)
            .ok_or("termination_date (YYYY-MM-DD) is required for terminated employees")?;
        let reason = table.get(row, "termination_reason").map(str::to_string);
        employee.terminate(date, reason);
    }
    if flag(table, row, "is_archived")? {
        employee.archive(*now);
    }
    Ok(employee)
}

/// Load, mutate and persist one employee for a lifecycle action.
async fn change_lifecycle(
    state: &AppState,
    auth: &BearerAuthorization,
    id: &str,
    function: &'static str,
    change: impl FnOnce(&mut Employee, DateTime<FixedOffset>),
) -> Result<Value, AppError> {
    let (mut tx, request_user) = authenticate(state, auth, "route.employee", function).await?;
    require_hr_admin(&request_user)?;
    let mut employee = find_employee(&mut tx, id, function).await?;
    let now = Local::now().fixed_offset();
    change(&mut employee, now);
    update_employee(&mut tx, &mut employee, &request_user, &now)
        .await
        .map_err(|err| AppError::internal("route.employee", function, "update employee", err))?;
    let columns = load_columns(&mut tx, function).await?;
    tx.commit()
        .await
        .map_err(|err| AppError::internal("route.employee", function, "commit transaction", err))?;
    tracing::info!(employee_id = %employee.id, action = function, "employee lifecycle changed");
    Ok(project_employee(&employee, request_user.role, &columns))
}

#[OpenApi]
impl ApiEmployee {
    #[allow(clippy::too_many_arguments)]
    #[oai(path = "/employees", method = "get", tag = "ApiEmployeeTags::Employee")]
    async fn get_paginate_employee_api(
        &self,
        Query(page): Query<Option<u32>>,
        Query(page_size): Query<Option<u32>>,
        Query(search): Query<Option<String>>,
        Query(include_archived): Query<Option<bool>>,
        Query(include_terminated): Query<Option<bool>>,
        Query(sort_by): Query<Option<String>>,
        Query(sort_order): Query<Option<String>>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Vec<Value>>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.employee", "get_paginate_employee_api").await?;
        let columns = load_columns(&mut tx, "get_paginate_employee_api").await?;
        let sort = sort_state(sort_by, sort_order, request_user.role, &columns)?;
        let filters = EmployeeFilters::new(
            search,
            include_archived.unwrap_or(false),
            include_terminated.unwrap_or(false),
        )
        .visible_to(request_user.role, &columns);
        let (page, page_size) = page_params(page, page_size);
        let (data, counts) = get_all_employee(&mut tx, Some((page, page_size)), &filters, &sort)
            .await
            .map_err(|err| {
                AppError::internal(
                    "route.employee",
                    "get_paginate_employee_api",
                    "get all employee",
                    err,
                )
            })?;
        let rows = data
            .iter()
            .map(|x| project_employee(x, request_user.role, &columns))
            .collect();
        Ok(Json(DataResponse::paginated(
            rows,
            page_meta(counts, page, page_size),
        )))
    }

    #[allow(clippy::too_many_arguments)]
    #[oai(
        path = "/employees/export",
        method = "get",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn export_employee_api(
        &self,
        Query(search): Query<Option<String>>,
        Query(include_archived): Query<Option<bool>>,
        Query(include_terminated): Query<Option<bool>>,
        Query(sort_by): Query<Option<String>>,
        Query(sort_order): Query<Option<String>>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Attachment<Vec<u8>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.employee", "export_employee_api").await?;
        let columns = load_columns(&mut tx, "export_employee_api").await?;
        let sort = sort_state(sort_by, sort_order, request_user.role, &columns)?;
        let filters = EmployeeFilters::new(
            search,
            include_archived.unwrap_or(false),
            include_terminated.unwrap_or(false),
        )
        .visible_to(request_user.role, &columns);
        let (data, _) = get_all_employee(&mut tx, None, &filters, &sort)
            .await
            .map_err(|err| {
                AppError::internal("route.employee", "export_employee_api", "get all employee", err)
            })?;
        let visible = visible_columns(request_user.role, &columns);
        let headers: Vec<String> = visible.iter().map(|x| x.column_name.clone()).collect();
        let rows: Vec<Vec<String>> = data
            .iter()
            .map(|employee| {
                visible
                    .iter()
                    .map(|x| cell_text(&employee.column_value(x)))
                    .collect()
            })
            .collect();
        let content = write_csv(&headers, &rows).map_err(|err| {
            AppError::internal("route.employee", "export_employee_api", "write csv", err)
        })?;
        Ok(csv_attachment("employees.csv", content))
    }

    #[oai(
        path = "/employees/template",
        method = "get",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn template_employee_api(
        &self,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Attachment<Vec<u8>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.employee", "template_employee_api").await?;
        let columns = load_columns(&mut tx, "template_employee_api").await?;
        let headers: Vec<String> = visible_columns(request_user.role, &columns)
            .iter()
            .filter(|x| {
                !Employee::is_lifecycle_column(&x.column_name) && can_edit(request_user.role, x)
            })
            .map(|x| x.column_name.clone())
            .collect();
        let content = write_csv(&headers, &[]).map_err(|err| {
            AppError::internal("route.employee", "template_employee_api", "write csv", err)
        })?;
        Ok(csv_attachment("employees_template.csv", content))
    }

    #[oai(
        path = "/employees/import",
        method = "post",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn import_employee_api(
        &self,
        upload: CsvUpload,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<ImportResult>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.employee", "import_employee_api").await?;
        require_hr_admin(&request_user)?;
        let content = upload.file.into_vec().await.map_err(|err| {
            AppError::internal("route.employee", "import_employee_api", "read upload", err)
        })?;
        let table = CsvTable::parse(&content)
            .map_err(|err| AppError::validation(format!("Invalid CSV file: {}", err)))?;
        if !table.has_column("ssn") {
            return Err(AppError::validation("CSV file must have an ssn column").into());
        }
        let columns = load_columns(&mut tx, "import_employee_api").await?;

        let now = Local::now().fixed_offset();
        let mut tally = ImportTally::default();
        for (idx, row) in table.rows.iter().enumerate() {
            let employee = match employee_from_row(&table, row, &columns, &request_user, &now) {
                Ok(val) => val,
                Err(message) => {
                    tally.failed(idx + 1, row, message);
                    continue;
                }
            };
            if let Err(err) = check_unique_ssn(&mut tx, &employee, "import_employee_api").await {
                match err {
                    AppError::Conflict(_) => tally.skipped(),
                    other => return Err(other.into()),
                }
                continue;
            }
            if let Err(err) = check_date_refs(&mut tx, &employee, "import_employee_api").await {
                match err {
                    AppError::Validation { .. } => tally.failed(idx + 1, row, err.to_string()),
                    other => return Err(other.into()),
                }
                continue;
            }
            let mut savepoint = tx.begin().await.map_err(|err| {
                AppError::internal("route.employee", "import_employee_api", "begin savepoint", err)
            })?;
            match create_employee(&mut savepoint, &employee).await {
                Ok(()) => {
                    savepoint.commit().await.map_err(|err| {
                        AppError::internal(
                            "route.employee",
                            "import_employee_api",
                            "commit savepoint",
                            err,
                        )
                    })?;
                    tally.imported();
                }
                Err(err) if is_unique_violation(&err) => tally.skipped(),
                Err(err) => {
                    tracing::error!(row = idx + 1, "failed to import employee row: {err:#}");
                    tally.failed(idx + 1, row, ROW_NOT_SAVED.to_string());
                }
            }
        }

        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.employee",
                "import_employee_api",
                "commit transaction",
                err,
            )
        })?;
        tracing::info!(
            imported = tally.imported,
            skipped = tally.skipped,
            failed = tally.errors.len(),
            "employees imported"
        );
        let result = tally.into_result(&table.headers).map_err(|err| {
            AppError::internal(
                "route.employee",
                "import_employee_api",
                "build error report",
                err,
            )
        })?;
        Ok(Json(DataResponse::new(result)))
    }

    /// Server-sent view-impact notifications for the given filters. The
    /// session token may come from the bearer header, the session cookie or
    /// the `token` query parameter.
    #[oai(
        path = "/employees/changes",
        method = "get",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn employee_changes_api(
        &self,
        Query(search): Query<Option<String>>,
        Query(include_archived): Query<Option<bool>>,
        Query(include_terminated): Query<Option<bool>>,
        Query(token): Query<Option<String>>,
        state: Data<&Arc<AppState>>,
        req: &Request,
    ) -> Result<EventStream<BoxStream<'static, ViewNotification>>, ApiError> {
        let token = token.or_else(|| session_token(req));
        let (mut tx, request_user) =
            authenticate_token(&state, token, "route.employee", "employee_changes_api").await?;
        let columns = load_columns(&mut tx, "employee_changes_api").await?;
        drop(tx);
        let filters = EmployeeFilters::new(
            search,
            include_archived.unwrap_or(false),
            include_terminated.unwrap_or(false),
        );
        let stream = subscribe(state.0.clone(), filters, request_user.role, columns)
            .await
            .map_err(|err| {
                AppError::internal("route.employee", "employee_changes_api", "subscribe", err)
            })?;
        tracing::debug!(user_id = %request_user.id, "employee change subscription opened");
        Ok(EventStream::new(stream.boxed()).keep_alive(KEEP_ALIVE))
    }

    #[oai(path = "/employees/:id", method = "get", tag = "ApiEmployeeTags::Employee")]
    async fn get_detail_employee_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Value>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.employee", "get_detail_employee_api").await?;
        let employee = find_employee(&mut tx, &id, "get_detail_employee_api").await?;
        let columns = load_columns(&mut tx, "get_detail_employee_api").await?;
        Ok(Json(DataResponse::new(project_employee(
            &employee,
            request_user.role,
            &columns,
        ))))
    }

    #[oai(path = "/employees", method = "post", tag = "ApiEmployeeTags::Employee")]
    async fn create_employee_api(
        &self,
        json: Json<EmployeeCreateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<EmployeeCreateResponses, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.employee", "create_employee_api").await?;
        require_hr_admin(&request_user)?;
        let columns = load_columns(&mut tx, "create_employee_api").await?;

        let now = Local::now().fixed_offset();
        let mut employee = Employee::new(Some(request_user.id), now);
        apply_cell_edits(
            &mut employee,
            &create_changes(&json),
            &columns,
            request_user.role,
        )?;
        check_unique_ssn(&mut tx, &employee, "create_employee_api").await?;
        check_date_refs(&mut tx, &employee, "create_employee_api").await?;
        create_employee(&mut tx, &employee).await.map_err(|err| {
            AppError::from_write(
                "route.employee",
                "create_employee_api",
                "create employee",
                err,
                DUPLICATE_SSN,
            )
        })?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.employee",
                "create_employee_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(EmployeeCreateResponses::Created(Json(DataResponse::new(
            project_employee(&employee, request_user.role, &columns),
        ))))
    }

    /// Inline cell edits. Each column is checked against the caller's edit
    /// permission; lifecycle columns go through the dedicated actions.
    #[oai(
        path = "/employees/:id",
        method = "patch",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn edit_employee_api(
        &self,
        Path(id): Path<String>,
        json: Json<CellEditRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Value>>, ApiError> {
        let (mut tx, request_user) =
            authenticate(&state, &auth, "route.employee", "edit_employee_api").await?;
        if json.changes.is_empty() {
            return Err(AppError::validation("No changes given").into());
        }
        let mut employee = find_employee(&mut tx, &id, "edit_employee_api").await?;
        let columns = load_columns(&mut tx, "edit_employee_api").await?;
        let ssn = employee.ssn.clone();
        apply_cell_edits(&mut employee, &json.changes, &columns, request_user.role)?;
        if employee.ssn != ssn {
            check_unique_ssn(&mut tx, &employee, "edit_employee_api").await?;
        }
        check_date_refs(&mut tx, &employee, "edit_employee_api").await?;

        let now = Local::now().fixed_offset();
        update_employee(&mut tx, &mut employee, &request_user, &now)
            .await
            .map_err(|err| {
                AppError::from_write(
                    "route.employee",
                    "edit_employee_api",
                    "update employee",
                    err,
                    DUPLICATE_SSN,
                )
            })?;
        tx.commit().await.map_err(|err| {
            AppError::internal("route.employee", "edit_employee_api", "commit transaction", err)
        })?;
        Ok(Json(DataResponse::new(project_employee(
            &employee,
            request_user.role,
            &columns,
        ))))
    }

    #[oai(
        path = "/employees/:id/archive",
        method = "post",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn archive_employee_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Value>>, ApiError> {
        let row = change_lifecycle(&state, &auth, &id, "archive_employee_api", |x, now| {
            x.archive(now)
        })
        .await?;
        Ok(Json(DataResponse::new(row)))
    }

    #[oai(
        path = "/employees/:id/unarchive",
        method = "post",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn unarchive_employee_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Value>>, ApiError> {
        let row = change_lifecycle(&state, &auth, &id, "unarchive_employee_api", |x, _| {
            x.unarchive()
        })
        .await?;
        Ok(Json(DataResponse::new(row)))
    }

    #[oai(
        path = "/employees/:id/terminate",
        method = "post",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn terminate_employee_api(
        &self,
        Path(id): Path<String>,
        json: Json<TerminateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Value>>, ApiError> {
        let date = json.termination_date;
        let reason = json
            .termination_reason
            .as_deref()
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .map(str::to_string);
        let row = change_lifecycle(&state, &auth, &id, "terminate_employee_api", |x, _| {
            x.terminate(date, reason)
        })
        .await?;
        Ok(Json(DataResponse::new(row)))
    }

    #[oai(
        path = "/employees/:id/reactivate",
        method = "post",
        tag = "ApiEmployeeTags::Employee"
    )]
    async fn reactivate_employee_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Value>>, ApiError> {
        let row = change_lifecycle(&state, &auth, &id, "reactivate_employee_api", |x, _| {
            x.reactivate()
        })
        .await?;
        Ok(Json(DataResponse::new(row)))
    }
}
