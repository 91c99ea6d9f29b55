pub mod access;
pub mod capable;
pub mod identity;
pub mod lifecycle;
pub mod provisioner;
pub mod service;
pub mod sessions;
pub mod window;

pub use access::{MeetingRole, Requester, RosterPolicy, SessionAccessPolicy};
pub use capable::MeetingCapable;
pub use lifecycle::LifecycleEvent;
pub use provisioner::{ParticipantToken, RoomBinding, RoomOverrides, RoomProvisioner, TokenPermissions};
pub use service::{MeetingService, MeetingStatus, RoomDetails, SweepReport};
pub use sessions::SessionService;
pub use window::{EmptyRoomDecision, SessionWindow, WindowPhase};
