mod report;
mod report_document;

pub use report::{
    Report, ReportCategory, ReportFilter, ReportLocation, ReportStatus, SyncState,
};
pub use report_document::{decode_report, status_patch, NewReport};
