pub mod attendance;
pub mod auth;
pub mod dao;
pub mod error;
pub mod livekit;
pub mod meeting;
pub mod webhook;

pub use attendance::AttendanceLedger;
pub use auth::AuthService;
pub use dao::*;
pub use error::{MeetingError, MeetingResult};
pub use livekit::{ConferencingClient, LiveKitClient};
pub use meeting::{MeetingService, RoomProvisioner, SessionService};
pub use webhook::WebhookProcessor;
