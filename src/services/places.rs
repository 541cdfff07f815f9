// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Places API client used to geocode a driver's home address by place id.

use anyhow::Context;
use serde::Deserialize;
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// A point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum PlacesError {
    #[error("places request failed: {0}")]
    Transport(String),
    #[error("places returned HTTP {0}")]
    Http(u16),
    #[error("places lookup status {0}")]
    Status(String),
    #[error("places response invalid: {0}")]
    Decode(String),
}

/// Places details client.
#[derive(Clone)]
pub struct PlacesClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl PlacesClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed building places HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Geocoding needs a key; without one every lookup is skipped.
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Coordinates for a place id.
    pub async fn geocode(&self, place_id: &str) -> Result<Coordinates, PlacesError> {
        let url = format!("{}/place/details/json", self.base_url);
        let key = self.api_key.as_deref().unwrap_or_default();

        let response = self
            .http
            .get(&url)
            .query(&[("place_id", place_id), ("fields", "geometry"), ("key", key)])
            .send()
            .await
            .map_err(|e| PlacesError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlacesError::Http(response.status().as_u16()));
        }

        let details: PlaceDetailsResponse = response
            .json()
            .await
            .map_err(|e| PlacesError::Decode(e.to_string()))?;

        if details.status != "OK" {
            return Err(PlacesError::Status(details.status));
        }

        details
            .result
            .map(|r| r.geometry.location)
            .ok_or_else(|| PlacesError::Decode("missing result".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct PlaceDetailsResponse {
    status: String,
    result: Option<PlaceResult>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Coordinates,
}
