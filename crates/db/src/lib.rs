pub mod connection;
pub mod indexes;
pub mod models;
pub mod time;

pub use connection::connect;
pub use indexes::ensure_indexes;
