use crate::error::{BridgeError, Result};
use crate::protocol::{self, DeviceInfo, Mute, Volume};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Upper bound for a single request against a speaker
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Speaker control API, addressed per call so the target can move
#[async_trait]
pub trait SpeakerApi: Send + Sync {
    /// Leadership status of the unit at `endpoint`
    async fn device_info(&self, endpoint: &str) -> Result<DeviceInfo>;

    /// Current volume (0..=100)
    async fn volume(&self, endpoint: &str) -> Result<u8>;

    /// Set volume; callers clamp beforehand
    async fn set_volume(&self, endpoint: &str, volume: u8) -> Result<()>;

    /// Native mute toggle
    async fn set_mute(&self, endpoint: &str, muted: bool) -> Result<()>;
}

/// HTTP implementation of [`SpeakerApi`]
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
}

impl HttpApi {
    /// Create a client with the default request timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str, path: &str) -> Result<T> {
        let url = protocol::url(endpoint, path);
        tracing::debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json<B: Serialize + Sync>(&self, endpoint: &str, path: &str, body: &B) -> Result<()> {
        let url = protocol::url(endpoint, path);
        tracing::debug!("POST {}", url);

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SpeakerApi for HttpApi {
    async fn device_info(&self, endpoint: &str) -> Result<DeviceInfo> {
        self.get_json(endpoint, protocol::DEVICE_PATH).await
    }

    async fn volume(&self, endpoint: &str) -> Result<u8> {
        let data: Volume = self.get_json(endpoint, protocol::VOLUME_PATH).await?;
        if data.volume > 100 {
            return Err(BridgeError::InvalidResponse(format!(
                "volume {} out of range",
                data.volume
            )));
        }
        Ok(data.volume)
    }

    async fn set_volume(&self, endpoint: &str, volume: u8) -> Result<()> {
        self.post_json(endpoint, protocol::VOLUME_PATH, &Volume { volume })
            .await
    }

    async fn set_mute(&self, endpoint: &str, muted: bool) -> Result<()> {
        self.post_json(endpoint, protocol::MUTE_PATH, &Mute { muted })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn reads_leadership_and_volume() {
        let mut server = Server::new_async().await;
        let device = server
            .mock("GET", protocol::DEVICE_PATH)
            .with_header("content-type", "application/json")
            .with_body(r#"{"isSystemLeader": true, "deviceName": "Phantom"}"#)
            .create_async()
            .await;
        let volume = server
            .mock("GET", protocol::VOLUME_PATH)
            .with_body(r#"{"volume": 37}"#)
            .create_async()
            .await;

        let api = HttpApi::new().unwrap();
        let endpoint = server.host_with_port();

        assert!(api.device_info(&endpoint).await.unwrap().is_system_leader);
        assert_eq!(api.volume(&endpoint).await.unwrap(), 37);

        device.assert_async().await;
        volume.assert_async().await;
    }

    #[tokio::test]
    async fn posts_volume_and_mute_bodies() {
        let mut server = Server::new_async().await;
        let volume = server
            .mock("POST", protocol::VOLUME_PATH)
            .match_body(Matcher::Json(json!({ "volume": 55 })))
            .with_status(200)
            .create_async()
            .await;
        let mute = server
            .mock("POST", protocol::MUTE_PATH)
            .match_body(Matcher::Json(json!({ "muted": true })))
            .with_status(204)
            .create_async()
            .await;

        let api = HttpApi::new().unwrap();
        let endpoint = server.host_with_port();

        api.set_volume(&endpoint, 55).await.unwrap();
        api.set_mute(&endpoint, true).await.unwrap();

        volume.assert_async().await;
        mute.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", protocol::VOLUME_PATH)
            .with_status(500)
            .create_async()
            .await;

        let api = HttpApi::new().unwrap();
        let err = api
            .set_volume(&server.host_with_port(), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn malformed_volume_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", protocol::VOLUME_PATH)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let api = HttpApi::new().unwrap();
        let err = api.volume(&server.host_with_port()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Json(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let api = HttpApi::with_timeout(Duration::from_millis(200)).unwrap();
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        assert!(api.device_info("127.0.0.1:9").await.is_err());
    }
}
