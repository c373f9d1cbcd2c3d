use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::aggregate::NearbyQuery;
use crate::data::{Audience, Coordinate, LocationRecord};
use crate::session::ShareRequest;

/// Any failed exchange with the location service. Transport failures
/// (no response at all) carry status 0.
#[derive(Debug, Clone, Error)]
#[error("location service error ({status}): {message}")]
pub struct ServiceError {
    pub status: u16,
    pub message: String,
}

impl ServiceError {
    fn transport(e: reqwest::Error) -> Self {
        Self {
            status: 0,
            message: e.to_string(),
        }
    }
}

/// Thin typed client for the location service. Owns no state beyond
/// the connection pool; callers are responsible for surfacing errors
/// and for leaving their own state untouched until an ack arrives.
#[derive(Debug, Clone)]
pub struct LocationApi {
    http: reqwest::Client,
    base_url: String,
}

impl LocationApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Start (or replace) the viewer's broadcast. The service keeps at
    /// most one active share per user.
    pub async fn share(&self, request: &ShareRequest) -> Result<(), ServiceError> {
        let body = json!({
            "latitude": request.position.latitude,
            "longitude": request.position.longitude,
            "visibility": request.visibility.wire_name(),
            "type": request.share_type.wire_name(),
            "duration": request.duration_hours,
        });

        let response = self
            .http
            .post(format!("{}/location/share", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::transport)?;
        Self::check(response).await?;

        info!(
            "sharing {} position for {}h",
            request.share_type.wire_name(),
            request.duration_hours
        );
        Ok(())
    }

    pub async fn fetch_nearby(
        &self,
        query: &NearbyQuery,
    ) -> Result<Vec<LocationRecord>, ServiceError> {
        let url = format!(
            "{}/location/shared?{}",
            self.base_url,
            query.query_string()
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(ServiceError::transport)?;
        let response = Self::check(response).await?;

        response
            .json::<Vec<LocationRecord>>()
            .await
            .map_err(|e| ServiceError {
                status: 0,
                message: format!("could not decode nearby locations: {e}"),
            })
    }

    pub async fn stop_sharing(&self) -> Result<(), ServiceError> {
        let response = self
            .http
            .delete(format!("{}/location/share", self.base_url))
            .send()
            .await
            .map_err(ServiceError::transport)?;
        Self::check(response).await?;

        info!("stopped sharing");
        Ok(())
    }

    pub async fn create_shoutout(
        &self,
        position: Coordinate,
        content: &str,
        visibility: Audience,
    ) -> Result<(), ServiceError> {
        let body = json!({
            "latitude": position.latitude,
            "longitude": position.longitude,
            "content": content,
            "visibility": visibility.wire_name(),
        });

        let response = self
            .http
            .post(format!("{}/location/shoutout", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(ServiceError::transport)?;
        Self::check(response).await?;
        Ok(())
    }

    /// Web URL for a post, used by the detail popover's "view post"
    /// action.
    pub fn post_url(&self, post_id: &str) -> String {
        format!("{}/post/{}", self.base_url, urlencoding::encode(post_id))
    }

    /// Web URL for a user profile, used by "view profile".
    pub fn profile_url(&self, username: &str) -> String {
        format!("{}/profile/{}", self.base_url, urlencoding::encode(username))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        Err(ServiceError {
            status: status.as_u16(),
            message: if message.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                message
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let api = LocationApi::new("http://localhost:8080/");

        assert_eq!(api.post_url("p1"), "http://localhost:8080/post/p1");
        assert_eq!(api.profile_url("ada"), "http://localhost:8080/profile/ada");
    }

    #[test]
    fn test_navigation_urls_encode_identifiers() {
        let api = LocationApi::new("https://api.waypost.app");

        assert_eq!(
            api.post_url("p/1"),
            "https://api.waypost.app/post/p%2F1"
        );
    }

    #[test]
    fn test_service_error_display() {
        let error = ServiceError {
            status: 500,
            message: "boom".to_string(),
        };

        assert_eq!(error.to_string(), "location service error (500): boom");
    }
}
