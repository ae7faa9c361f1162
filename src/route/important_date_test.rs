use poem::{
    http::StatusCode,
    test::{TestClient, TestForm, TestFormField},
};
use serde_json::json;
use sqlx::PgPool;

use crate::{
    core::{
        csv_utils::ROW_NOT_SAVED,
        test_utils::{login_as, test_app_state},
    },
    factory::important_date::ImportantDateFactory,
    init_openapi_route,
    model::{important_date::ImportantDate, role::UserRole},
};

fn csv_form(content: &str) -> TestForm {
    TestForm::new().field(
        TestFormField::bytes(content.as_bytes().to_vec())
            .name("file")
            .filename("dates.csv")
            .content_type("text/csv"),
    )
}

#[sqlx::test]
async fn test_important_date_crud(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);
    let payload = json!({
        "week_number": 12,
        "year": 2025,
        "category": "Stena",
        "description": "Course start",
        "date_value": "17-21/3"
    });

    // When create
    let resp = cli
        .post("/api/important-dates")
        .header("authorization", admin.bearer())
        .body_json(&payload)
        .send()
        .await;

    // Expect create
    resp.assert_status(StatusCode::CREATED);
    let json = resp.json().await;
    let id: String = json
        .value()
        .object()
        .get("data")
        .object()
        .get("id")
        .deserialize();

    // When duplicate
    let resp = cli
        .post("/api/important-dates")
        .header("authorization", admin.bearer())
        .body_json(&payload)
        .send()
        .await;

    // Expect duplicate
    resp.assert_status(StatusCode::CONFLICT);

    // When update
    let resp = cli
        .put(format!("/api/important-dates/{}", id))
        .header("authorization", admin.bearer())
        .body_json(&json!({
            "week_number": 13,
            "year": 2025,
            "category": "Stena",
            "date_value": "24-28/3",
            "notes": "moved"
        }))
        .send()
        .await;

    // Expect update
    resp.assert_status_is_ok();
    let json = resp.json().await;
    let data = json.value().object().get("data").object();
    data.get("week_number").assert_i64(13);
    data.get("notes").assert_string("moved");
    data.get("description").assert_null();

    // When delete
    let resp = cli
        .delete(format!("/api/important-dates/{}", id))
        .header("authorization", admin.bearer())
        .send()
        .await;

    // Expect delete
    resp.assert_status(StatusCode::NO_CONTENT);
    let resp = cli
        .get(format!("/api/important-dates/{}", id))
        .header("authorization", admin.bearer())
        .send()
        .await;
    resp.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}

#[sqlx::test]
async fn test_list_and_write_permissions(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let mut factory = ImportantDateFactory::<()>::new();
    factory.modified_many(|x, idx, _| ImportantDate {
        year: if idx < 3 { 2024 } else { 2025 },
        ..x.clone()
    });
    factory.generate_many(&app_state.db, 5, ()).await?;
    let external = login_as(&app_state, &config, UserRole::Omc).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);

    // When list
    let resp = cli
        .get("/api/important-dates")
        .query("year", &2024)
        .header("authorization", external.bearer())
        .send()
        .await;

    // Expect list
    resp.assert_status_is_ok();
    let json = resp.json().await;
    json.value().object().get("data").array().assert_len(3);

    // When external party writes
    let resp = cli
        .post("/api/important-dates")
        .header("authorization", external.bearer())
        .body_json(&json!({
            "week_number": 1,
            "year": 2025,
            "category": "OMC",
            "date_value": "1/1"
        }))
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::FORBIDDEN);
    Ok(())
}

#[sqlx::test]
async fn test_import_accounts_for_every_row(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);
    let content = "Week Number;Year;Category;Description;Date Value;Notes\n\
        10;2025;Stena;Intro;3-7/3;\n\
        11;2025;PE3;;10-14/3;bring id\n\
        10;2025;Stena;Intro again;3-7/3;\n\
        60;2025;Stena;;1/1;\n\
        ;2025;OMC;;2/2;\n\
        ;;;;;\n";

    // When import
    let resp = cli
        .post("/api/important-dates/import")
        .header("authorization", admin.bearer())
        .multipart(csv_form(content))
        .send()
        .await;

    // Expect import
    resp.assert_status_is_ok();
    let json = resp.json().await;
    let data = json.value().object().get("data").object();
    data.get("imported").assert_i64(2);
    data.get("skipped").assert_i64(1);
    let errors = data.get("errors").array();
    errors.assert_len(2);
    errors.get(0).object().get("row").assert_i64(4);
    errors
        .get(1)
        .object()
        .get("message")
        .assert_string("week_number is required");
    let report: String = data.get("error_report").deserialize();
    assert!(report.starts_with("week_number,year,category,description,date_value,notes,error\n"));

    // When export
    let resp = cli
        .get("/api/important-dates/export")
        .header("authorization", admin.bearer())
        .send()
        .await;

    // Expect export
    resp.assert_status_is_ok();
    let body = resp.0.into_body().into_string().await?;
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines[0], "week_number,year,category,description,date_value,notes");
    assert_eq!(lines.len(), 3);

    // When external party imports
    let external = login_as(&app_state, &config, UserRole::Sodexo).await?;
    let resp = cli
        .post("/api/important-dates/import")
        .header("authorization", external.bearer())
        .multipart(csv_form(content))
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::FORBIDDEN);
    Ok(())
}

#[sqlx::test]
async fn test_import_hides_database_errors(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);
    // category holds at most 100 characters
    let content = format!(
        "week_number,year,category,date_value\n\
        10,2025,{},3-7/3\n\
        11,2025,PE3,10-14/3\n",
        "c".repeat(150)
    );

    // When
    let resp = cli
        .post("/api/important-dates/import")
        .header("authorization", admin.bearer())
        .multipart(csv_form(&content))
        .send()
        .await;

    // Expect
    resp.assert_status_is_ok();
    let json = resp.json().await;
    let data = json.value().object().get("data").object();
    data.get("imported").assert_i64(1);
    let errors = data.get("errors").array();
    errors.assert_len(1);
    errors.get(0).object().get("row").assert_i64(1);
    errors
        .get(0)
        .object()
        .get("message")
        .assert_string(ROW_NOT_SAVED);
    Ok(())
}
