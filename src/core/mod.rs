pub mod csv_utils;
pub mod db;
pub mod error;
pub mod gate;
pub mod permission;
pub mod security;
pub mod session;
pub mod sqlx_utils;
pub mod test_utils;
pub mod utils;
pub mod view_impact;
