use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use poem::web::Data;
use poem_openapi::{
    param::{Path, Query},
    payload::{Attachment, Json},
    OpenApi, Tags,
};
use sqlx::{Acquire, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    core::{
        csv_utils::{csv_attachment, write_csv, CsvTable, ImportTally, ROW_NOT_SAVED},
        error::{is_unique_violation, AppError},
        security::{authenticate, require_hr_admin, BearerAuthorization},
        utils::{page_meta, page_params, parse_id},
    },
    model::{
        important_date::{ImportantDate, CSV_HEADERS},
        user::User,
    },
    repository::important_date::{
        create_important_date, delete_important_date, get_all_important_date,
        get_important_date_by_id, get_important_date_by_key, update_important_date,
        ImportantDateFilters,
    },
    schema::{
        common::{ApiError, DataResponse, ImportResult, NoContentResponses},
        employee::CsvUpload,
        important_date::{DetailImportantDate, ImportantDateCreateResponses, ImportantDateRequest},
    },
    AppState,
};

const DUPLICATE_MESSAGE: &str = "Important date already exists";

#[derive(Tags)]
enum ApiImportantDateTags {
    ImportantDate,
}

pub struct ApiImportantDate;

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
}

async fn find_important_date(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    function: &'static str,
) -> Result<ImportantDate, AppError> {
    let id = parse_id(id, "Important date")?;
    get_important_date_by_id(tx, &id)
        .await
        .map_err(|err| {
            AppError::internal("route.important_date", function, "get important date", err)
        })?
        .ok_or(AppError::NotFound("Important date".to_string()))
}

/// Parse one CSV data row into a new important date.
fn important_date_from_row(
    table: &CsvTable,
    row: &[String],
    request_user: &User,
    now: &DateTime<FixedOffset>,
) -> Result<ImportantDate, String> {
    let required = |name: &str| table.get(row, name).ok_or(format!("{} is required", name));
    let week_number: i32 = required("week_number")?
        .parse()
        .map_err(|_| "week_number must be a number".to_string())?;
    if !(1..=53).contains(&week_number) {
        return Err("week_number must be between 1 and 53".to_string());
    }
    let year: i32 = required("year")?
        .parse()
        .map_err(|_| "year must be a number".to_string())?;
    if !(1900..=2200).contains(&year) {
        return Err("year must be between 1900 and 2200".to_string());
    }
    Ok(ImportantDate {
        id: Uuid::now_v7(),
        week_number,
        year,
        category: required("category")?.to_string(),
        description: table.get(row, "description").map(str::to_string),
        date_value: required("date_value")?.to_string(),
        notes: table.get(row, "notes").map(str::to_string),
        created_by: Some(request_user.id),
        updated_by: Some(request_user.id),
        created_date: Some(*now),
        updated_date: Some(*now),
    })
}

#[OpenApi]
impl ApiImportantDate {
    #[oai(
        path = "/important-dates",
        method = "get",
        tag = "ApiImportantDateTags::ImportantDate"
    )]
    async fn get_paginate_important_date_api(
        &self,
        Query(page): Query<Option<u32>>,
        Query(page_size): Query<Option<u32>>,
        Query(year): Query<Option<i32>>,
        Query(category): Query<Option<String>>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<Vec<DetailImportantDate>>>, ApiError> {
        let (mut tx, _) = authenticate(
            &state,
            &auth,
            "route.important_date",
            "get_paginate_important_date_api",
        )
        .await?;
        let (page, page_size) = page_params(page, page_size);
        let filters = ImportantDateFilters { year, category };
        let (data, counts) = get_all_important_date(&mut tx, Some((page, page_size)), &filters)
            .await
            .map_err(|err| {
                AppError::internal(
                    "route.important_date",
                    "get_paginate_important_date_api",
                    "get all important date",
                    err,
                )
            })?;
        Ok(Json(DataResponse::paginated(
            data.iter().map(DetailImportantDate::from).collect(),
            page_meta(counts, page, page_size),
        )))
    }

    #[oai(
        path = "/important-dates/export",
        method = "get",
        tag = "ApiImportantDateTags::ImportantDate"
    )]
    async fn export_important_date_api(
        &self,
        Query(year): Query<Option<i32>>,
        Query(category): Query<Option<String>>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Attachment<Vec<u8>>, ApiError> {
        let (mut tx, _) = authenticate(
            &state,
            &auth,
            "route.important_date",
            "export_important_date_api",
        )
        .await?;
        let filters = ImportantDateFilters { year, category };
        let (data, _) = get_all_important_date(&mut tx, None, &filters)
            .await
            .map_err(|err| {
                AppError::internal(
                    "route.important_date",
                    "export_important_date_api",
                    "get all important date",
                    err,
                )
            })?;
        let headers: Vec<String> = CSV_HEADERS.iter().map(|x| x.to_string()).collect();
        let rows: Vec<Vec<String>> = data.iter().map(ImportantDate::csv_record).collect();
        let content = write_csv(&headers, &rows).map_err(|err| {
            AppError::internal(
                "route.important_date",
                "export_important_date_api",
                "write csv",
                err,
            )
        })?;
        Ok(csv_attachment("important_dates.csv", content))
    }

    #[oai(
        path = "/important-dates/template",
        method = "get",
        tag = "ApiImportantDateTags::ImportantDate"
    )]
    async fn template_important_date_api(
        &self,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Attachment<Vec<u8>>, ApiError> {
        authenticate(
            &state,
            &auth,
            "route.important_date",
            "template_important_date_api",
        )
        .await?;
        let headers: Vec<String> = CSV_HEADERS.iter().map(|x| x.to_string()).collect();
        let content = write_csv(&headers, &[]).map_err(|err| {
            AppError::internal(
                "route.important_date",
                "template_important_date_api",
                "write csv",
                err,
            )
        })?;
        Ok(csv_attachment("important_dates_template.csv", content))
    }

    #[oai(
        path = "/important-dates/import",
        method = "post",
        tag = "ApiImportantDateTags::ImportantDate"
    )]
    async fn import_important_date_api(
        &self,
        upload: CsvUpload,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<ImportResult>>, ApiError> {
        let (mut tx, request_user) = authenticate(
            &state,
            &auth,
            "route.important_date",
            "import_important_date_api",
        )
        .await?;
        require_hr_admin(&request_user)?;
        let content = upload.file.into_vec().await.map_err(|err| {
            AppError::internal(
                "route.important_date",
                "import_important_date_api",
                "read upload",
                err,
            )
        })?;
        let table = CsvTable::parse(&content)
            .map_err(|err| AppError::validation(format!("Invalid CSV file: {}", err)))?;

        let now = Local::now().fixed_offset();
        let mut tally = ImportTally::default();
        for (idx, row) in table.rows.iter().enumerate() {
            let data = match important_date_from_row(&table, row, &request_user, &now) {
                Ok(val) => val,
                Err(message) => {
                    tally.failed(idx + 1, row, message);
                    continue;
                }
            };
            let existing = get_important_date_by_key(
                &mut tx,
                data.year,
                data.week_number,
                &data.category,
                &data.date_value,
            )
            .await
            .map_err(|err| {
                AppError::internal(
                    "route.important_date",
                    "import_important_date_api",
                    "get important date by key",
                    err,
                )
            })?;
            if existing.is_some() {
                tally.skipped();
                continue;
            }
            // a failed row must not poison the rest of the import
            let mut savepoint = tx.begin().await.map_err(|err| {
                AppError::internal(
                    "route.important_date",
                    "import_important_date_api",
                    "begin savepoint",
                    err,
                )
            })?;
            match create_important_date(&mut savepoint, &data).await {
                Ok(()) => {
                    savepoint.commit().await.map_err(|err| {
                        AppError::internal(
                            "route.important_date",
                            "import_important_date_api",
                            "commit savepoint",
                            err,
                        )
                    })?;
                    tally.imported();
                }
                Err(err) if is_unique_violation(&err) => tally.skipped(),
                Err(err) => {
                    tracing::error!(row = idx + 1, "failed to import important date row: {err:#}");
                    tally.failed(idx + 1, row, ROW_NOT_SAVED.to_string());
                }
            }
        }

        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.important_date",
                "import_important_date_api",
                "commit transaction",
                err,
            )
        })?;
        tracing::info!(
            imported = tally.imported,
            skipped = tally.skipped,
            failed = tally.errors.len(),
            "important dates imported"
        );
        let result = tally.into_result(&table.headers).map_err(|err| {
            AppError::internal(
                "route.important_date",
                "import_important_date_api",
                "build error report",
                err,
            )
        })?;
        Ok(Json(DataResponse::new(result)))
    }

    #[oai(
        path = "/important-dates/:id",
        method = "get",
        tag = "ApiImportantDateTags::ImportantDate"
    )]
    async fn get_detail_important_date_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailImportantDate>>, ApiError> {
        let (mut tx, _) = authenticate(
            &state,
            &auth,
            "route.important_date",
            "get_detail_important_date_api",
        )
        .await?;
        let data = find_important_date(&mut tx, &id, "get_detail_important_date_api").await?;
        Ok(Json(DataResponse::new(DetailImportantDate::from(&data))))
    }

    #[oai(
        path = "/important-dates",
        method = "post",
        tag = "ApiImportantDateTags::ImportantDate"
    )]
    async fn create_important_date_api(
        &self,
        json: Json<ImportantDateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<ImportantDateCreateResponses, ApiError> {
        let (mut tx, request_user) = authenticate(
            &state,
            &auth,
            "route.important_date",
            "create_important_date_api",
        )
        .await?;
        require_hr_admin(&request_user)?;
        let now = Local::now().fixed_offset();
        let data = ImportantDate {
            id: Uuid::now_v7(),
            week_number: json.week_number,
            year: json.year,
            category: json.category.trim().to_string(),
            description: clean(&json.description),
            date_value: json.date_value.trim().to_string(),
            notes: clean(&json.notes),
            created_by: Some(request_user.id),
            updated_by: Some(request_user.id),
            created_date: Some(now),
            updated_date: Some(now),
        };
        create_important_date(&mut tx, &data).await.map_err(|err| {
            AppError::from_write(
                "route.important_date",
                "create_important_date_api",
                "create important date",
                err,
                DUPLICATE_MESSAGE,
            )
        })?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.important_date",
                "create_important_date_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(ImportantDateCreateResponses::Created(Json(
            DataResponse::new(DetailImportantDate::from(&data)),
        )))
    }

    #[oai(
        path = "/important-dates/:id",
        method = "put",
        tag = "ApiImportantDateTags::ImportantDate"
    )]
    async fn update_important_date_api(
        &self,
        Path(id): Path<String>,
        json: Json<ImportantDateRequest>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<Json<DataResponse<DetailImportantDate>>, ApiError> {
        let (mut tx, request_user) = authenticate(
            &state,
            &auth,
            "route.important_date",
            "update_important_date_api",
        )
        .await?;
        require_hr_admin(&request_user)?;
        let mut data = find_important_date(&mut tx, &id, "update_important_date_api").await?;
        data.week_number = json.week_number;
        data.year = json.year;
        data.category = json.category.trim().to_string();
        data.description = clean(&json.description);
        data.date_value = json.date_value.trim().to_string();
        data.notes = clean(&json.notes);

        let now = Local::now().fixed_offset();
        update_important_date(&mut tx, &mut data, &request_user, &now)
            .await
            .map_err(|err| {
                AppError::from_write(
                    "route.important_date",
                    "update_important_date_api",
                    "update important date",
                    err,
                    DUPLICATE_MESSAGE,
                )
            })?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.important_date",
                "update_important_date_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(Json(DataResponse::new(DetailImportantDate::from(&data))))
    }

    #[oai(
        path = "/important-dates/:id",
        method = "delete",
        tag = "ApiImportantDateTags::ImportantDate"
    )]
    async fn delete_important_date_api(
        &self,
        Path(id): Path<String>,
        state: Data<&Arc<AppState>>,
        auth: BearerAuthorization,
    ) -> Result<NoContentResponses, ApiError> {
        let (mut tx, request_user) = authenticate(
            &state,
            &auth,
            "route.important_date",
            "delete_important_date_api",
        )
        .await?;
        require_hr_admin(&request_user)?;
        let data = find_important_date(&mut tx, &id, "delete_important_date_api").await?;
        delete_important_date(&mut tx, &data.id).await.map_err(|err| {
            AppError::internal(
                "route.important_date",
                "delete_important_date_api",
                "delete important date",
                err,
            )
        })?;
        tx.commit().await.map_err(|err| {
            AppError::internal(
                "route.important_date",
                "delete_important_date_api",
                "commit transaction",
                err,
            )
        })?;
        Ok(NoContentResponses::NoContent)
    }
}
