pub mod check_catalog;
pub mod init;
pub mod list_models;
pub mod serve;
