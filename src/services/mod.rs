pub mod ai_service;
pub mod conflict_service;
pub mod file_service;
pub mod plan_service;
pub mod prompt_service;
pub mod scan_service;
pub mod session_service;
pub mod undo_service;
