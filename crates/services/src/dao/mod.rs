pub mod attendance;
pub mod base;
pub mod memory;
pub mod receipt;
pub mod session;
pub mod store;

pub use attendance::AttendanceDao;
pub use base::{BaseDao, StoreError, StoreResult};
pub use memory::{InMemoryAttendanceStore, InMemoryReceiptStore, InMemorySessionStore};
pub use receipt::ReceiptDao;
pub use session::SessionDao;
pub use store::{AttendanceStore, ReceiptStore, SessionStore};
