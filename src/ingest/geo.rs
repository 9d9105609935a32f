use crate::config::GeoConfig;
use crate::ingest::normalize::sanitize_text;
use moka::sync::Cache;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country: String,
    pub city: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    success: Option<bool>,
    country_code: Option<String>,
    country: Option<String>,
    city: Option<String>,
}

/// Best-effort IP geolocation with a process-local TTL cache.
/// Lookups that fail for any reason resolve to `None`.
pub struct GeoResolver {
    client: reqwest::Client,
    cache: Cache<String, GeoInfo>,
    base_url: String,
    enabled: bool,
}

/// Addresses that must never be sent to the lookup service. Anything that
/// does not parse as an IP address is treated the same way.
pub fn is_private_or_local(ip: &str) -> bool {
    let Ok(addr) = ip.trim().parse::<IpAddr>() else {
        return true;
    };
    match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

impl GeoResolver {
    pub fn new(config: &GeoConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build geo client, using defaults");
                reqwest::Client::new()
            });

        Self {
            client,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(config.cache_ttl_secs))
                .max_capacity(config.cache_capacity)
                .build(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            enabled: config.enabled,
        }
    }

    /// Resolver that never performs lookups.
    pub fn disabled() -> Self {
        Self::new(&GeoConfig {
            enabled: false,
            ..GeoConfig::default()
        })
    }

    pub async fn lookup(&self, ip: &str) -> Option<GeoInfo> {
        if !self.enabled || ip.is_empty() || is_private_or_local(ip) {
            return None;
        }

        if let Some(hit) = self.cache.get(ip) {
            return Some(hit);
        }

        match self.fetch(ip).await {
            Ok(Some(info)) => {
                self.cache.insert(ip.to_string(), info.clone());
                Some(info)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(ip = %ip, error = %e, "geo lookup failed");
                None
            }
        }
    }

    async fn fetch(&self, ip: &str) -> Result<Option<GeoInfo>, reqwest::Error> {
        let resp = self
            .client
            .get(format!("{}/{}", self.base_url, ip.trim()))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !resp.status().is_success() {
            tracing::debug!(ip = %ip, status = resp.status().as_u16(), "geo lookup non-success status");
            return Ok(None);
        }

        let payload: GeoResponse = resp.json().await?;
        Ok(geo_from_response(payload))
    }
}

fn geo_from_response(payload: GeoResponse) -> Option<GeoInfo> {
    if payload.success == Some(false) {
        return None;
    }

    let country_code = sanitize_text(payload.country_code.as_deref(), 8).to_uppercase();
    let country_name = sanitize_text(payload.country.as_deref(), 80);
    let city = sanitize_text(payload.city.as_deref(), 120);
    let country = if country_code.is_empty() {
        country_name
    } else {
        country_code
    };

    if country.is_empty() && city.is_empty() {
        return None;
    }
    Some(GeoInfo { country, city })
}
