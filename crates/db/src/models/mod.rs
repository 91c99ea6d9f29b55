pub mod attendance;
pub mod session;
pub mod webhook_receipt;

pub use attendance::*;
pub use session::*;
pub use webhook_receipt::*;
