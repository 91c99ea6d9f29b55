pub mod meeting;
pub mod session;
pub mod webhook;
