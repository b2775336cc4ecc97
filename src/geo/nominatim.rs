//! Nominatim (OpenStreetMap) geocoding.
//!
//! The public instance allows one request per second and requires an
//! identifying User-Agent, so every call goes through [`RateLimiter`].

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

use super::search::GeoPoint;
use crate::{
    config::GeocodingConfig,
    error::{
        retry::{retry_with_backoff, RetryPolicy},
        AppError, Result,
    },
};

pub const MAX_SEARCH_RESULTS: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Address {
    pub road: Option<String>,
    pub house_number: Option<String>,
    pub postcode: Option<String>,
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub country_code: Option<String>,
}

impl Address {
    /// Nominatim puts the municipality under city, town or village
    /// depending on its size.
    pub fn municipality(&self) -> Option<&str> {
        self.city
            .as_deref()
            .or(self.town.as_deref())
            .or(self.village.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub display_name: String,
    pub point: GeoPoint,
    pub city: Option<String>,
    pub province: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub address: Address,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
    #[serde(default)]
    address: Address,
}

impl TryFrom<NominatimPlace> for GeocodeResult {
    type Error = AppError;

    fn try_from(place: NominatimPlace) -> Result<Self> {
        let lat: f64 = place
            .lat
            .parse()
            .map_err(|_| AppError::Internal(format!("Nominatim returned invalid lat {}", place.lat)))?;
        let lon: f64 = place
            .lon
            .parse()
            .map_err(|_| AppError::Internal(format!("Nominatim returned invalid lon {}", place.lon)))?;

        Ok(Self {
            display_name: place.display_name,
            point: GeoPoint::new(lat, lon)?,
            city: place.address.municipality().map(str::to_string),
            province: place.address.county.clone(),
            region: place.address.state.clone(),
            postal_code: place.address.postcode.clone(),
            address: place.address,
        })
    }
}

/// Serializes callers and spaces requests at least `min_interval` apart.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct NominatimClient {
    http: Client,
    base_url: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
}

impl NominatimClient {
    pub fn new(config: &GeocodingConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: config.nominatim_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(config.min_interval),
            retry: RetryPolicy::default(),
        })
    }

    pub async fn search(&self, query: &str, limit: u8) -> Result<Vec<GeocodeResult>> {
        let query = query.trim();
        if query.len() < 3 {
            return Err(AppError::Validation(
                "Inserisci almeno 3 caratteri per la ricerca dell'indirizzo".into(),
            ));
        }
        let limit = limit.clamp(1, MAX_SEARCH_RESULTS).to_string();
        let url = format!("{}/search", self.base_url);

        let places: Vec<NominatimPlace> = self
            .get_json(
                &url,
                &[
                    ("q", query),
                    ("format", "jsonv2"),
                    ("addressdetails", "1"),
                    ("countrycodes", "it"),
                    ("accept-language", "it"),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;

        debug!(query, results = places.len(), "Nominatim search completed");
        places.into_iter().map(GeocodeResult::try_from).collect()
    }

    pub async fn reverse(&self, point: GeoPoint) -> Result<Option<GeocodeResult>> {
        let url = format!("{}/reverse", self.base_url);
        let lat = point.lat.to_string();
        let lon = point.lon.to_string();

        let value: serde_json::Value = self
            .get_json(
                &url,
                &[
                    ("lat", lat.as_str()),
                    ("lon", lon.as_str()),
                    ("format", "jsonv2"),
                    ("addressdetails", "1"),
                    ("accept-language", "it"),
                ],
            )
            .await?;

        parse_reverse(value)
    }

    async fn get_json<T>(&self, url: &str, params: &[(&str, &str)]) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        retry_with_backoff(&self.retry, "nominatim", move || async move {
            self.limiter.acquire().await;
            let response = self.http.get(url).query(params).send().await?;
            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(AppError::Upstream {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(response.json::<T>().await?)
        })
        .await
    }
}

/// Nominatim answers an unmatched reverse lookup with `{"error": ...}`.
fn parse_reverse(value: serde_json::Value) -> Result<Option<GeocodeResult>> {
    if value.get("error").is_some() {
        return Ok(None);
    }
    let place: NominatimPlace = serde_json::from_value(value)
        .map_err(|e| AppError::Internal(format!("Unexpected Nominatim response: {e}")))?;
    GeocodeResult::try_from(place).map(Some)
}
