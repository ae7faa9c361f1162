pub mod auth;
pub mod column_config;
pub mod common;
pub mod employee;
pub mod important_date;
pub mod user;
