use std::time::Duration;

use futures::StreamExt;
use poem::{
    http::{header, StatusCode},
    test::{TestClient, TestForm, TestFormField},
};
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::{
    core::{
        csv_utils::ROW_NOT_SAVED,
        test_utils::{login_as, test_app_state},
    },
    factory::{column_config::ColumnConfigFactory, employee::EmployeeFactory},
    init_openapi_route,
    model::{column_config::ColumnConfig, employee::Employee, role::UserRole},
    realtime::listener::spawn_listener,
};

fn csv_form(content: &str) -> TestForm {
    TestForm::new().field(
        TestFormField::bytes(content.as_bytes().to_vec())
            .name("file")
            .filename("employees.csv")
            .content_type("text/csv"),
    )
}

#[sqlx::test]
async fn test_create_edit_and_lifecycle(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);
    let payload = json!({
        "first_name": "Anna",
        "last_name": "Berg",
        "ssn": "19900101-1234",
        "email": "anna@example.com"
    });

    // When create
    let resp = cli
        .post("/api/employees")
        .header("authorization", admin.bearer())
        .body_json(&payload)
        .send()
        .await;

    // Expect create
    resp.assert_status(StatusCode::CREATED);
    let json = resp.json().await;
    let data = json.value().object().get("data").object();
    data.get("first_name").assert_string("Anna");
    data.get("is_archived").assert_bool(false);
    let id: String = data.get("id").deserialize();

    // When same ssn again
    let resp = cli
        .post("/api/employees")
        .header("authorization", admin.bearer())
        .body_json(&payload)
        .send()
        .await;

    // Expect conflict
    resp.assert_status(StatusCode::CONFLICT);

    // When cell edit
    let resp = cli
        .patch(format!("/api/employees/{}", id))
        .header("authorization", admin.bearer())
        .body_json(&json!({"changes": {"First_Name": "Anne", "mobile": "0701234567"}}))
        .send()
        .await;

    // Expect cell edit
    resp.assert_status_is_ok();
    let json = resp.json().await;
    let data = json.value().object().get("data").object();
    data.get("first_name").assert_string("Anne");
    data.get("mobile").assert_string("0701234567");

    // When archive
    let resp = cli
        .post(format!("/api/employees/{}/archive", id))
        .header("authorization", admin.bearer())
        .send()
        .await;

    // Expect archived rows to leave the default list
    resp.assert_status_is_ok();
    resp.json()
        .await
        .value()
        .object()
        .get("data")
        .object()
        .get("is_archived")
        .assert_bool(true);
    let resp = cli
        .get("/api/employees")
        .header("authorization", admin.bearer())
        .send()
        .await;
    resp.json().await.value().object().get("data").array().assert_len(0);
    let resp = cli
        .get("/api/employees")
        .query("include_archived", &true)
        .header("authorization", admin.bearer())
        .send()
        .await;
    resp.json().await.value().object().get("data").array().assert_len(1);

    // When unarchive then terminate
    cli.post(format!("/api/employees/{}/unarchive", id))
        .header("authorization", admin.bearer())
        .send()
        .await
        .assert_status_is_ok();
    let resp = cli
        .post(format!("/api/employees/{}/terminate", id))
        .header("authorization", admin.bearer())
        .body_json(&json!({"termination_date": "2025-03-31", "termination_reason": "  moved  "}))
        .send()
        .await;

    // Expect terminated
    resp.assert_status_is_ok();
    let json = resp.json().await;
    let data = json.value().object().get("data").object();
    data.get("is_terminated").assert_bool(true);
    data.get("termination_date").assert_string("2025-03-31");
    data.get("termination_reason").assert_string("moved");

    // When reactivate
    let resp = cli
        .post(format!("/api/employees/{}/reactivate", id))
        .header("authorization", admin.bearer())
        .send()
        .await;

    // Expect reactivated
    resp.assert_status_is_ok();
    let json = resp.json().await;
    let data = json.value().object().get("data").object();
    data.get("is_terminated").assert_bool(false);
    data.get("termination_date").assert_null();
    Ok(())
}

#[sqlx::test]
async fn test_external_party_sees_projected_rows(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let mut employee_factory = EmployeeFactory::<()>::new();
    let employee = employee_factory.generate_one(&app_state.db, ()).await?;
    let external = login_as(&app_state, &config, UserRole::Sodexo).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);

    // When list
    let resp = cli
        .get("/api/employees")
        .header("authorization", external.bearer())
        .send()
        .await;

    // Expect only viewable columns
    resp.assert_status_is_ok();
    let data: Value = resp.json().await.value().object().get("data").deserialize();
    let row = &data[0];
    assert_eq!(row["id"], json!(employee.id.to_string()));
    assert_eq!(row["first_name"], json!(employee.first_name));
    assert!(row.get("ssn").is_none());
    assert!(row.get("mobile").is_none());
    assert!(row.get("archived_date").is_none());

    // When sorting by a hidden column
    let resp = cli
        .get("/api/employees")
        .query("sort_by", &"ssn")
        .header("authorization", external.bearer())
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::BAD_REQUEST);

    // When editing a read-only column
    let resp = cli
        .patch(format!("/api/employees/{}", employee.id))
        .header("authorization", external.bearer())
        .body_json(&json!({"changes": {"first_name": "Changed"}}))
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::FORBIDDEN);

    // When running a lifecycle action
    let resp = cli
        .post(format!("/api/employees/{}/archive", employee.id))
        .header("authorization", external.bearer())
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::FORBIDDEN);
    Ok(())
}

#[sqlx::test]
async fn test_cell_edit_rules(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let mut employee_factory = EmployeeFactory::<()>::new();
    let employees = employee_factory.generate_many(&app_state.db, 2, ()).await?;
    let mut column_factory = ColumnConfigFactory::<()>::new();
    column_factory.modified_one(|x, _| ColumnConfig {
        column_name: "shoe_size".to_string(),
        display_name: "Shoe size".to_string(),
        data_type: crate::model::column_config::ColumnDataType::Number,
        ..x.clone()
    });
    column_factory.generate_one(&app_state.db, ()).await?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);
    let url = format!("/api/employees/{}", employees[0].id);

    // When editing a lifecycle column
    let resp = cli
        .patch(&url)
        .header("authorization", admin.bearer())
        .body_json(&json!({"changes": {"is_archived": true}}))
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::BAD_REQUEST);

    // When taking another employee's ssn
    let resp = cli
        .patch(&url)
        .header("authorization", admin.bearer())
        .body_json(&json!({"changes": {"ssn": employees[1].ssn}}))
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::CONFLICT);

    // When a custom value has the wrong type
    let resp = cli
        .patch(&url)
        .header("authorization", admin.bearer())
        .body_json(&json!({"changes": {"shoe_size": "large"}}))
        .send()
        .await;

    // Expect per column details
    resp.assert_status(StatusCode::BAD_REQUEST);
    let json = resp.json().await;
    let error = json.value().object().get("error").object();
    error.get("code").assert_string("validation_error");
    error.get("details").object().get("shoe_size").assert_not_null();

    // When a custom value is valid
    let resp = cli
        .patch(&url)
        .header("authorization", admin.bearer())
        .body_json(&json!({"changes": {"shoe_size": "43,5"}}))
        .send()
        .await;

    // Expect stored in custom fields
    resp.assert_status_is_ok();
    let json = resp.json().await;
    json.value()
        .object()
        .get("data")
        .object()
        .get("custom_fields")
        .object()
        .get("shoe_size")
        .assert_f64(43.5);

    // When referencing an unknown important date
    let resp = cli
        .patch(&url)
        .header("authorization", admin.bearer())
        .body_json(&json!({"changes": {"stena_date": uuid::Uuid::now_v7().to_string()}}))
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[sqlx::test]
async fn test_import_export_and_template(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let mut employee_factory = EmployeeFactory::<()>::new();
    let existing = employee_factory.generate_one(&app_state.db, ()).await?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);
    let content = format!(
        "First Name,Last Name,SSN,Email,Is Terminated,Termination Date\n\
        Ada,Lovelace,18151210-0001,ada@example.com,,\n\
        Bob,Existing,{},,,\n\
        Carl,,19800101-0003,,,\n\
        Dana,Smith,19800101-0004,,true,\n\
        Eve,Stone,19800101-0005,,yes,2025-01-31\n",
        existing.ssn
    );

    // When import
    let resp = cli
        .post("/api/employees/import")
        .header("authorization", admin.bearer())
        .multipart(csv_form(&content))
        .send()
        .await;

    // Expect every row accounted for
    resp.assert_status_is_ok();
    let json = resp.json().await;
    let data = json.value().object().get("data").object();
    data.get("imported").assert_i64(2);
    data.get("skipped").assert_i64(1);
    let errors = data.get("errors").array();
    errors.assert_len(2);
    errors.get(0).object().get("row").assert_i64(3);
    errors
        .get(0)
        .object()
        .get("message")
        .assert_string("last_name is required");
    errors.get(1).object().get("row").assert_i64(4);
    let terminated: Vec<Employee> =
        sqlx::query_as(r#"SELECT * FROM public.employee WHERE is_terminated = true"#)
            .fetch_all(&app_state.db)
            .await?;
    assert_eq!(terminated.len(), 1);
    assert_eq!(terminated[0].first_name, "Eve");

    // When export, default filters
    let resp = cli
        .get("/api/employees/export")
        .header("authorization", admin.bearer())
        .send()
        .await;

    // Expect terminated rows excluded
    resp.assert_status_is_ok();
    let body = resp.0.into_body().into_string().await?;
    let lines: Vec<&str> = body.lines().collect();
    assert!(lines[0].starts_with("first_name,last_name,ssn,"));
    assert_eq!(lines.len(), 3);

    // When template
    let resp = cli
        .get("/api/employees/template")
        .header("authorization", admin.bearer())
        .send()
        .await;

    // Expect no lifecycle columns
    resp.assert_status_is_ok();
    let body = resp.0.into_body().into_string().await?;
    assert!(body.starts_with("first_name,last_name,ssn,"));
    assert!(!body.contains("is_terminated"));
    assert!(!body.contains("is_archived"));

    // When an external party imports
    let external = login_as(&app_state, &config, UserRole::Payroll).await?;
    let resp = cli
        .post("/api/employees/import")
        .header("authorization", external.bearer())
        .multipart(csv_form(&content))
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::FORBIDDEN);
    Ok(())
}

#[sqlx::test]
async fn test_import_requires_ssn_column(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);

    // When
    let resp = cli
        .post("/api/employees/import")
        .header("authorization", admin.bearer())
        .multipart(csv_form("first_name;last_name\nAda;Lovelace\n"))
        .send()
        .await;

    // Expect
    resp.assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[sqlx::test]
async fn test_employee_routes_require_session(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);

    // When
    let resp = cli.get("/api/employees").send().await;

    // Expect
    resp.assert_status(StatusCode::UNAUTHORIZED);

    // When change feed without a token
    let resp = cli.get("/api/employees/changes").send().await;

    // Expect
    resp.assert_status(StatusCode::UNAUTHORIZED);
    Ok(())
}

#[sqlx::test]
async fn test_search_only_looks_at_viewable_columns(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let mut employee_factory = EmployeeFactory::<()>::new();
    let employee = employee_factory.generate_one(&app_state.db, ()).await?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let external = login_as(&app_state, &config, UserRole::Sodexo).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);

    // When HR Admin searches by ssn
    let resp = cli
        .get("/api/employees")
        .query("search", &employee.ssn)
        .header("authorization", admin.bearer())
        .send()
        .await;

    // Expect a hit
    resp.assert_status_is_ok();
    resp.json().await.value().object().get("data").array().assert_len(1);

    // When an external party without ssn access searches by ssn
    let resp = cli
        .get("/api/employees")
        .query("search", &employee.ssn)
        .header("authorization", external.bearer())
        .send()
        .await;

    // Expect no hit
    resp.assert_status_is_ok();
    resp.json().await.value().object().get("data").array().assert_len(0);

    // When searching by a visible name
    let resp = cli
        .get("/api/employees")
        .query("search", &employee.last_name)
        .header("authorization", external.bearer())
        .send()
        .await;

    // Expect a hit
    resp.assert_status_is_ok();
    resp.json().await.value().object().get("data").array().assert_len(1);
    Ok(())
}

#[sqlx::test]
async fn test_import_reports_database_failures_generically(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);
    // gender holds at most 20 characters
    let content = format!(
        "first_name,last_name,ssn,gender\n\
        Ada,Lovelace,18151210-0001,{}\n\
        Bob,Berg,19800101-0002,\n",
        "x".repeat(40)
    );

    // When
    let resp = cli
        .post("/api/employees/import")
        .header("authorization", admin.bearer())
        .multipart(csv_form(&content))
        .send()
        .await;

    // Expect the failed row reported without database details
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

#[sqlx::test]
async fn test_change_feed_reports_archived_employee(pool: PgPool) -> anyhow::Result<()> {
    // Given
    let (app_state, config) = test_app_state(pool)?;
    let mut employee_factory = EmployeeFactory::<()>::new();
    let employee = employee_factory.generate_one(&app_state.db, ()).await?;
    let admin = login_as(&app_state, &config, UserRole::HrAdmin).await?;
    let external = login_as(&app_state, &config, UserRole::Sodexo).await?;
    let listener = spawn_listener(app_state.db.clone(), app_state.changes.clone());
    // give the listener time to LISTEN before anything changes
    tokio::time::sleep(Duration::from_millis(500)).await;
    let app = init_openapi_route(app_state.clone(), &config);
    let cli = TestClient::new(app);

    // When subscribing with the token query parameter
    let resp = cli
        .get("/api/employees/changes")
        .query("token", &external.token)
        .send()
        .await;

    // Expect an event stream
    resp.assert_status_is_ok();
    let content_type = resp
        .0
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|x| x.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    // When HR Admin archives the employee
    cli.post(format!("/api/employees/{}/archive", employee.id))
        .header("authorization", admin.bearer())
        .send()
        .await
        .assert_status_is_ok();

    // Expect a removed notification for that employee
    let mut body = resp.0.into_body().into_bytes_stream();
    let mut received = String::new();
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            received.push_str(&String::from_utf8_lossy(&chunk?));
            if received.contains("\"removed\"") {
                return anyhow::Ok(true);
            }
        }
        anyhow::Ok(false)
    })
    .await??;
    listener.abort();
    assert!(found);
    assert!(received.contains(&employee.id.to_string()));
    Ok(())
}
