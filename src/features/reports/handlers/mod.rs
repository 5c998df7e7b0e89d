pub mod report_handler;

pub use report_handler::{
    __path_create_report, __path_get_report, __path_list_reports, __path_update_report_status,
    create_report, get_report, list_reports, update_report_status, ReportState,
};
