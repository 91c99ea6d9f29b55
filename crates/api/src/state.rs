use std::sync::Arc;

use classmeet_config::Settings;
use classmeet_services::{
    AttendanceLedger, AuthService, MeetingService, RoomProvisioner, SessionService,
    WebhookProcessor,
    dao::{
        AttendanceDao, AttendanceStore, ReceiptDao, ReceiptStore, SessionDao, SessionStore,
    },
    livekit::{ConferencingClient, ConferencingError, LiveKitClient},
    meeting::{RosterPolicy, SessionAccessPolicy},
    webhook::{Deduplicator, WebhookVerifier},
};
use mongodb::Database;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub auth: Arc<AuthService>,
    pub meetings: Arc<MeetingService>,
    pub webhooks: Arc<WebhookProcessor>,
}

impl AppState {
    /// Production wiring: MongoDB stores and the LiveKit HTTP client.
    pub fn new(db: Database, settings: Settings) -> Result<Self, ConferencingError> {
        let client: Arc<dyn ConferencingClient> = Arc::new(LiveKitClient::new(&settings.livekit)?);
        Ok(Self::from_parts(
            settings,
            Arc::new(SessionDao::new(&db)),
            Arc::new(AttendanceDao::new(&db)),
            Arc::new(ReceiptDao::new(&db)),
            client,
        ))
    }

    pub fn from_parts(
        settings: Settings,
        session_store: Arc<dyn SessionStore>,
        attendance_store: Arc<dyn AttendanceStore>,
        receipt_store: Arc<dyn ReceiptStore>,
        client: Arc<dyn ConferencingClient>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(settings.jwt.clone()));
        let policy: Arc<dyn SessionAccessPolicy> = Arc::new(RosterPolicy);

        let sessions = Arc::new(SessionService::new(session_store, settings.meeting.clone()));
        let ledger = Arc::new(AttendanceLedger::new(
            attendance_store,
            settings.meeting.clone(),
        ));
        let provisioner = Arc::new(RoomProvisioner::new(
            sessions.clone(),
            client.clone(),
            policy.clone(),
            settings.livekit.clone(),
        ));
        let meetings = Arc::new(MeetingService::new(
            sessions.clone(),
            provisioner,
            ledger.clone(),
            client.clone(),
            policy,
        ));
        let webhooks = Arc::new(WebhookProcessor::new(
            WebhookVerifier::new(&settings.livekit),
            Deduplicator::new(receipt_store, settings.meeting.dedup_capacity),
            sessions,
            ledger,
            client,
        ));

        Self {
            settings,
            auth,
            meetings,
            webhooks,
        }
    }
}
