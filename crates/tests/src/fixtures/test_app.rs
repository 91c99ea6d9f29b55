use std::net::SocketAddr;
use std::sync::Arc;

use classmeet_api::{build_router, state::AppState};
use classmeet_config::Settings;
use classmeet_services::dao::{InMemoryAttendanceStore, InMemoryReceiptStore, InMemorySessionStore};
use classmeet_services::livekit::mock::{MOCK_API_KEY, MOCK_API_SECRET, MockConferencingClient};
use tokio::net::TcpListener;

/// A running test application backed by in-memory stores and a mock
/// conferencing service, so neither MongoDB nor LiveKit is needed.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub settings: Settings,
    pub client: reqwest::Client,
    pub state: AppState,
    pub conferencing: Arc<MockConferencingClient>,
    pub session_store: Arc<InMemorySessionStore>,
    pub receipt_store: Arc<InMemoryReceiptStore>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// Spawn a test server with customized settings.
    ///
    /// The `mutator` closure receives a `&mut Settings` after defaults are applied.
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = test_settings();
        mutator(&mut settings);

        let conferencing = Arc::new(MockConferencingClient::accepting());
        let session_store = Arc::new(InMemorySessionStore::new());
        let receipt_store = Arc::new(InMemoryReceiptStore::new());

        let state = AppState::from_parts(
            settings.clone(),
            session_store.clone(),
            Arc::new(InMemoryAttendanceStore::new()),
            receipt_store.clone(),
            conferencing.clone(),
        );
        let app = build_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            addr,
            base_url,
            settings,
            client,
            state,
            conferencing,
            session_store,
            receipt_store,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn test_settings() -> Settings {
    Settings {
        app: classmeet_config::AppSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        database: classmeet_config::DatabaseSettings {
            url: "mongodb://localhost:27017".to_string(),
            name: "classmeet_test".to_string(),
            max_pool_size: Some(5),
            min_pool_size: Some(1),
        },
        jwt: classmeet_config::JwtSettings {
            secret: "test-secret-key-for-jwt-signing-minimum-32-chars".to_string(),
            access_token_ttl_secs: 3600,
            issuer: "classmeet".to_string(),
        },
        livekit: classmeet_config::LiveKitSettings {
            server_url: "wss://conferencing.test".to_string(),
            api_url: "http://conferencing.test".to_string(),
            api_key: MOCK_API_KEY.to_string(),
            api_secret: MOCK_API_SECRET.to_string(),
            request_timeout_secs: 5,
            token_ttl_secs: 3 * 3600,
            verify_webhooks: true,
            max_participants: 100,
            empty_timeout_secs: 300,
        },
        meeting: classmeet_config::MeetingSettings::default(),
    }
}
