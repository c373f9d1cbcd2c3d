use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::data::Coordinate;

#[derive(Debug, Error)]
enum LocationUnavailable {
    #[error("position lookup failed: {0}")]
    Lookup(#[from] reqwest::Error),
    #[error("position lookup answered with status {0}")]
    Status(u16),
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    latitude: f64,
    longitude: f64,
}

/// Result of one position resolution. `fallback` is set when the real
/// lookup failed and the configured default was substituted; callers
/// surface that to the user but otherwise proceed normally.
#[derive(Debug, Clone, Copy)]
pub struct Fix {
    pub coordinate: Coordinate,
    pub fallback: bool,
}

/// One-shot device position source.
///
/// Desktop sessions rarely have a GPS, so the position comes from an
/// IP-geolocation endpoint. The call is single-shot and not
/// cancellable; a denied or failed lookup is a recovered condition,
/// never a fatal one.
#[derive(Debug, Clone)]
pub struct GeolocationSource {
    http: reqwest::Client,
    endpoint: String,
    fallback: Coordinate,
}

impl GeolocationSource {
    pub fn new(endpoint: &str, fallback: Coordinate) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            fallback,
        }
    }

    pub async fn resolve(&self) -> Fix {
        match self.lookup().await {
            Ok(coordinate) => Fix {
                coordinate,
                fallback: false,
            },
            Err(e) => {
                warn!("{}, using fallback position", e);
                Fix {
                    coordinate: self.fallback,
                    fallback: true,
                }
            }
        }
    }

    async fn lookup(&self) -> Result<Coordinate, LocationUnavailable> {
        let response = self.http.get(&self.endpoint).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LocationUnavailable::Status(status.as_u16()));
        }

        let position: LookupResponse = response.json().await?;
        Ok(Coordinate::new(position.latitude, position.longitude))
    }
}
