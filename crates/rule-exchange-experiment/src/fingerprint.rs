//! Client-environment fingerprint: assembled once at session start and
//! refined in place by best-effort network lookups.
//!
//! The lookups are fire-and-forget. Whatever has resolved by submission
//! time ships; unresolved fields stay blank and never block a phase.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::debug;

/// One installed browser plugin, as reported by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub filename: String,
    pub description: String,
}

/// Host-reported client environment, captured once at session start.
#[derive(Debug, Clone, Default)]
pub struct ClientEnv {
    pub user_agent: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
    /// Minutes offset from UTC, as the browser reports it.
    pub timezone_offset_min: i32,
    pub plugins: Vec<PluginInfo>,
}

/// Geolocation details from the lookup collaborator. Fields beyond the
/// address are whatever the service knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    pub ip: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub region_name: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// The assembled fingerprint as it ships in the submission payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub browser: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub color_depth: u32,
    /// Blank until the ip lookup resolves.
    pub ip: String,
    pub geo: Option<GeoInfo>,
    pub timezone: i32,
    pub plugins: Vec<PluginInfo>,
}

impl Fingerprint {
    pub fn from_env(env: &ClientEnv) -> Self {
        Self {
            browser: env.user_agent.clone(),
            screen_width: env.screen_width,
            screen_height: env.screen_height,
            color_depth: env.color_depth,
            ip: String::new(),
            geo: None,
            timezone: env.timezone_offset_min,
            plugins: env.plugins.clone(),
        }
    }
}

/// Fingerprint shared between the session and its lookup tasks.
pub type SharedFingerprint = Arc<RwLock<Fingerprint>>;

pub fn shared(env: &ClientEnv) -> SharedFingerprint {
    Arc::new(RwLock::new(Fingerprint::from_env(env)))
}

/// Snapshot the fingerprint as it stands right now.
pub fn snapshot(fingerprint: &SharedFingerprint) -> Fingerprint {
    fingerprint
        .read()
        .map(|fp| fp.clone())
        .unwrap_or_default()
}

/// Resolves the client's public address.
#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn lookup(&self) -> Option<String>;
}

/// Resolves geolocation details for the client.
#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self) -> Option<GeoInfo>;
}

/// Spawn the fire-and-forget lookup chain: resolve the address first, then
/// try for richer geolocation, updating the shared fingerprint as each
/// answer lands. Failures leave the fields blank.
pub fn spawn_lookups(
    fingerprint: SharedFingerprint,
    ip: Arc<dyn IpLookup>,
    geo: Arc<dyn GeoLookup>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(addr) = ip.lookup().await else {
            debug!("ip lookup unresolved");
            return;
        };
        if let Ok(mut fp) = fingerprint.write() {
            fp.ip = addr;
        }

        let Some(info) = geo.lookup().await else {
            debug!("geo lookup unresolved");
            return;
        };
        if let Ok(mut fp) = fingerprint.write() {
            // the geo service's view of the address wins
            fp.ip = info.ip.clone();
            fp.geo = Some(info);
        }
    })
}

/// JSON-endpoint address lookup (the production collaborator).
pub struct HttpIpLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpIpLookup {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[derive(Deserialize)]
struct IpReply {
    ip: String,
}

#[async_trait]
impl IpLookup for HttpIpLookup {
    async fn lookup(&self) -> Option<String> {
        let reply = self
            .client
            .get(&self.url)
            .send()
            .await
            .ok()?
            .json::<IpReply>()
            .await
            .ok()?;
        Some(reply.ip)
    }
}

/// JSON-endpoint geolocation lookup.
pub struct HttpGeoLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpGeoLookup {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self) -> Option<GeoInfo> {
        self.client
            .get(&self.url)
            .send()
            .await
            .ok()?
            .json::<GeoInfo>()
            .await
            .ok()
    }
}

/// Canned lookup results for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    pub ip: Option<String>,
    pub geo: Option<GeoInfo>,
}

impl StaticLookup {
    /// A lookup that never resolves anything.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            geo: None,
        }
    }

    pub fn with_geo(geo: GeoInfo) -> Self {
        Self {
            ip: Some(geo.ip.clone()),
            geo: Some(geo),
        }
    }
}

#[async_trait]
impl IpLookup for StaticLookup {
    async fn lookup(&self) -> Option<String> {
        self.ip.clone()
    }
}

#[async_trait]
impl GeoLookup for StaticLookup {
    async fn lookup(&self) -> Option<GeoInfo> {
        self.geo.clone()
    }
}
