pub mod catalog_service;
pub mod progress_service;
pub mod quiz_service;
pub mod summary_service;
