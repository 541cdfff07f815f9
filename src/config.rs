//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so everything is read once at startup.

use std::env;

/// Cloud Tasks queue carrying fleet sync jobs.
pub const SYNC_QUEUE_NAME: &str = "fleet-sync";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

/// Where profiles and availability are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

/// How fleet sync jobs are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDispatchMode {
    /// Durable Cloud Tasks queue, retried by the queue.
    CloudTasks,
    /// Spawned on the local runtime. For local development.
    Inline,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Service ---
    pub port: u16,
    pub environment: Environment,
    /// Frontend origin allowed by CORS.
    pub frontend_url: String,
    /// Public URL of this API. Cloud Tasks callbacks target it and use it
    /// as their OIDC audience.
    pub api_url: String,
    pub gcp_project_id: String,
    pub gcp_region: String,
    pub storage_backend: StorageBackend,
    pub sync_dispatch: SyncDispatchMode,

    // --- Authentication ---
    pub oidc_issuer: String,
    pub oidc_audience: String,
    /// HS256 secret for local development and tests. When set, ID tokens are
    /// verified with it instead of the issuer's JWKS.
    pub oidc_shared_secret: Option<String>,
    pub admin_emails: Vec<String>,
    pub admin_subjects: Vec<String>,
    pub admin_group: Option<String>,
    pub external_api_keys: Vec<String>,

    // --- Fleet platform ---
    pub fleet_api_url: String,
    pub fleet_api_key: String,
    pub fleet_team_id: Option<String>,
    /// Appended to worker display names, e.g. `Ada Lovelace (Onboarding)`.
    pub fleet_name_suffix: String,

    // --- Places / geocoding ---
    pub places_api_url: String,
    pub places_api_key: Option<String>,

    // --- Identity verification ---
    pub verification_api_url: String,
    pub verification_api_key: String,
    pub verification_webhook_secret: Option<String>,
    pub verification_return_url: String,

    // --- Availability requests ---
    pub availability_requests_url: String,
    pub availability_requests_api_key: Option<String>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            port: 8080,
            environment: Environment::Development,
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "northamerica-northeast1".to_string(),
            storage_backend: StorageBackend::Memory,
            sync_dispatch: SyncDispatchMode::Inline,
            oidc_issuer: "https://issuer.test".to_string(),
            oidc_audience: "driver-onboarding-test".to_string(),
            oidc_shared_secret: Some("test_oidc_secret_32_bytes_minimum!!".to_string()),
            admin_emails: vec!["admin@example.ca".to_string()],
            admin_subjects: Vec::new(),
            admin_group: None,
            external_api_keys: vec!["test_external_key".to_string()],
            fleet_api_url: "http://localhost:9001".to_string(),
            fleet_api_key: "test_fleet_key".to_string(),
            fleet_team_id: Some("team-test".to_string()),
            fleet_name_suffix: "(Onboarding)".to_string(),
            places_api_url: "http://localhost:9002".to_string(),
            places_api_key: None,
            verification_api_url: "http://localhost:9003".to_string(),
            verification_api_key: "test_verification_key".to_string(),
            verification_webhook_secret: Some("whsec_test".to_string()),
            verification_return_url: "http://localhost:5173/onboarding/verify".to_string(),
            availability_requests_url: "http://localhost:9004".to_string(),
            availability_requests_api_key: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let environment = match optional("APP_ENV").as_deref() {
            None | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(_) => return Err(ConfigError::Invalid("APP_ENV")),
        };

        let storage_backend = match optional("STORAGE_BACKEND").as_deref() {
            None | Some("firestore") => StorageBackend::Firestore,
            Some("memory") => StorageBackend::Memory,
            Some(_) => return Err(ConfigError::Invalid("STORAGE_BACKEND")),
        };

        let sync_dispatch = match optional("SYNC_DISPATCH").as_deref() {
            None | Some("cloud_tasks") => SyncDispatchMode::CloudTasks,
            Some("inline") => SyncDispatchMode::Inline,
            Some(_) => return Err(ConfigError::Invalid("SYNC_DISPATCH")),
        };

        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());

        let config = Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            environment,
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION")
                .unwrap_or_else(|_| "northamerica-northeast1".to_string()),
            storage_backend,
            sync_dispatch,

            oidc_issuer: required("OIDC_ISSUER")?,
            oidc_audience: required("OIDC_AUDIENCE")?,
            oidc_shared_secret: optional("OIDC_SHARED_SECRET"),
            admin_emails: list("ADMIN_EMAILS")
                .into_iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            admin_subjects: list("ADMIN_SUBJECTS"),
            admin_group: optional("ADMIN_GROUP"),
            external_api_keys: list("EXTERNAL_API_KEYS"),

            fleet_api_url: required("FLEET_API_URL")?,
            fleet_api_key: required("FLEET_API_KEY")?,
            fleet_team_id: optional("FLEET_TEAM_ID"),
            fleet_name_suffix: env::var("FLEET_NAME_SUFFIX").unwrap_or_default(),

            places_api_url: env::var("PLACES_API_URL")
                .unwrap_or_else(|_| "https://maps.googleapis.com/maps/api".to_string()),
            places_api_key: optional("PLACES_API_KEY"),

            verification_api_url: env::var("VERIFICATION_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            verification_api_key: required("VERIFICATION_API_KEY")?,
            verification_webhook_secret: optional("VERIFICATION_WEBHOOK_SECRET"),
            verification_return_url: env::var("VERIFICATION_RETURN_URL")
                .unwrap_or_else(|_| format!("{}/onboarding/verify", frontend_url)),

            availability_requests_url: required("AVAILABILITY_REQUESTS_URL")?,
            availability_requests_api_key: optional("AVAILABILITY_REQUESTS_API_KEY"),

            frontend_url,
        };

        if config.environment == Environment::Production && config.oidc_shared_secret.is_some() {
            return Err(ConfigError::Invalid("OIDC_SHARED_SECRET"));
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

/// Trimmed value, treating empty as unset.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Comma-separated list.
fn list(name: &str) -> Vec<String> {
    optional(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
