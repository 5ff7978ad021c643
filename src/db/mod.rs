pub mod covid19;
pub mod dockless;
pub mod prod_db;
