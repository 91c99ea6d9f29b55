use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub livekit: LiveKitSettings,
    pub meeting: MeetingSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_ttl_secs: u64,
    pub issuer: String,
}

/// Conferencing service connection.
///
/// `server_url` is what browsers connect to, `api_url` is what the backend
/// calls for room management.
#[derive(Debug, Deserialize, Clone)]
pub struct LiveKitSettings {
    pub server_url: String,
    pub api_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub request_timeout_secs: u64,
    pub token_ttl_secs: u64,
    pub verify_webhooks: bool,
    pub max_participants: u32,
    pub empty_timeout_secs: u32,
}

/// Time windows and thresholds used by the lifecycle and attendance rules.
#[derive(Debug, Deserialize, Clone)]
pub struct MeetingSettings {
    /// Minutes before the scheduled start when joining opens.
    pub preparation_minutes: i64,
    /// Minutes after the scheduled end the room stays usable.
    pub ending_buffer_minutes: i64,
    /// Joins later than this after the scheduled start count as late.
    pub late_tolerance_minutes: i64,
    /// Overtime allowance after the scheduled end for closing open intervals.
    pub post_session_grace_minutes: i64,
    /// Keep-alive window added to the scheduled end once a room starts.
    pub persistence_grace_minutes: i64,
    /// Room lifetime measured from the scheduled start.
    pub room_lifetime_minutes: i64,
    /// Attendance percentage below which a participant is `partial`.
    pub attendance_threshold_percent: f64,
    /// Rooms finishing under this many seconds are not a delivered lesson.
    pub min_activity_secs: i64,
    /// Capacity of the in-memory recent webhook key set.
    pub dedup_capacity: usize,
    /// Interval of the background status sweep; 0 disables it.
    pub sweep_interval_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("CLASSMEET"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3000)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "classmeet")?
            .set_default("jwt.secret", "change-me-in-production")?
            .set_default("jwt.access_token_ttl_secs", 3600)?
            .set_default("jwt.issuer", "classmeet")?
            .set_default("livekit.server_url", "wss://localhost:7880")?
            .set_default("livekit.api_url", "http://localhost:7880")?
            .set_default("livekit.api_key", "")?
            .set_default("livekit.api_secret", "")?
            .set_default("livekit.request_timeout_secs", 10)?
            .set_default("livekit.token_ttl_secs", 3 * 3600)?
            .set_default("livekit.verify_webhooks", true)?
            .set_default("livekit.max_participants", 100)?
            .set_default("livekit.empty_timeout_secs", 300)?
            .set_default("meeting.preparation_minutes", 10)?
            .set_default("meeting.ending_buffer_minutes", 5)?
            .set_default("meeting.late_tolerance_minutes", 15)?
            .set_default("meeting.post_session_grace_minutes", 30)?
            .set_default("meeting.persistence_grace_minutes", 30)?
            .set_default("meeting.room_lifetime_minutes", 180)?
            .set_default("meeting.attendance_threshold_percent", 75.0)?
            .set_default("meeting.min_activity_secs", 60)?
            .set_default("meeting.dedup_capacity", 4096)?
            .set_default("meeting.sweep_interval_secs", 60)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for MeetingSettings {
    fn default() -> Self {
        Self {
            preparation_minutes: 10,
            ending_buffer_minutes: 5,
            late_tolerance_minutes: 15,
            post_session_grace_minutes: 30,
            persistence_grace_minutes: 30,
            room_lifetime_minutes: 180,
            attendance_threshold_percent: 75.0,
            min_activity_secs: 60,
            dedup_capacity: 4096,
            sweep_interval_secs: 60,
        }
    }
}
