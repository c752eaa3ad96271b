//! rollcall-store — the attendance CSV and reports built from it.

pub mod ledger;
pub mod report;

pub use ledger::{
    format_timestamp, AttendanceLog, AttendanceRow, StoreError, HEADER, TIMESTAMP_FORMAT,
};
pub use report::{filter_rows, AttendanceReport};
