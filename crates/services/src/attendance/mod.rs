pub mod calculator;
pub mod ledger;

pub use calculator::{attendance_percentage, classify};
pub use ledger::{AttendanceEntry, AttendanceLedger, AttendanceReport};
