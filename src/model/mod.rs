pub mod column_config;
pub mod employee;
pub mod important_date;
pub mod role;
pub mod user;
