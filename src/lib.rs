use std::sync::Arc;

use poem::{
    endpoint::StaticFilesEndpoint,
    middleware::{
        AddData, AddDataEndpoint, CookieJarManager, CookieJarManagerEndpoint, Cors, CorsEndpoint,
    },
    EndpointExt, Route,
};
use poem_openapi::OpenApiService;
use r2d2::Pool as r2d2Pool;
use realtime::EmployeeChange;
use redis::Client;
use route::{
    auth::ApiAuth, column_config::ApiColumnConfig, employee::ApiEmployee,
    important_date::ApiImportantDate, user::ApiUser,
};
use settings::Config;
use sqlx::{Pool, Postgres};
use tokio::sync::broadcast;

use crate::core::gate::{RoleGate, RoleGateEndpoint};

pub mod cli;
pub mod core;
pub mod factory;
pub mod model;
pub mod realtime;
pub mod repository;
pub mod route;
pub mod schema;
pub mod settings;

const CHANGE_FEED_CAPACITY: usize = 1024;

pub struct AppState {
    pub db: Pool<Postgres>,
    pub redis_conn: r2d2Pool<Client>,
    /// Employee change events fanned out to every live subscription
    pub changes: broadcast::Sender<EmployeeChange>,
}

impl AppState {
    pub fn new(db: Pool<Postgres>, redis_conn: r2d2Pool<Client>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            db,
            redis_conn,
            changes,
        }
    }
}

pub type AppEndpoint =
    CorsEndpoint<AddDataEndpoint<CookieJarManagerEndpoint<RoleGateEndpoint<Route>>, Arc<AppState>>>;

pub fn init_openapi_route(app_state: Arc<AppState>, config: &Config) -> AppEndpoint {
    let prefix = config.api_prefix();
    let openapi_route = OpenApiService::new(
        (
            ApiAuth,
            ApiUser,
            ApiEmployee,
            ApiColumnConfig,
            ApiImportantDate,
        ),
        "HR Dashboard",
        "1.0",
    )
    .server(prefix.clone());
    let openapi_json_endpoint = openapi_route.spec_endpoint();
    let ui = openapi_route.swagger_ui();
    let mut route = Route::new()
        .nest(prefix.clone(), openapi_route)
        .nest("/docs", ui)
        .at("openapi.json", openapi_json_endpoint);
    if let Some(static_dir) = &config.static_dir {
        route = route.nest(
            "/",
            StaticFilesEndpoint::new(static_dir)
                .index_file("index.html")
                .fallback_to_index(),
        );
    }
    route
        .with(RoleGate::new(app_state.clone(), &prefix))
        .with(CookieJarManager::new())
        .with(AddData::new(app_state))
        .with(Cors::new())
}
