pub mod catalog_dto;
pub mod progress_dto;
pub mod quiz_dto;
pub mod summary_dto;
