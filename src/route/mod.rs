pub mod auth;
pub mod column_config;
pub mod employee;
#[cfg(test)]
mod employee_test;
pub mod important_date;
#[cfg(test)]
mod important_date_test;
pub mod user;
