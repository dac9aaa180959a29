pub mod db;

pub use db::extraction_repo::DocumentExtractionRow;
pub use db::folder_repo::{JobStatus, PendingFolderRow};
pub use db::report_repo::{Patch, ReportPatch, ReportRow};
pub use db::{default_database_path, Database, DatabaseError};
