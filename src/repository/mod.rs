pub mod portfolio;
pub mod table_service;
