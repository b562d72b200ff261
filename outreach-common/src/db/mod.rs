//! Database access layer

pub mod init;
pub mod models;

pub use init::{
    create_schema, ensure_setting, get_setting, get_setting_i64, init_database,
    init_memory_database,
};
