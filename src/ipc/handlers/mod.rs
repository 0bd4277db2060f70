pub mod analytics;
pub mod backup;
pub mod core;
pub mod import_csv;
pub mod records;
pub mod settings;
