//! Fire-and-forget upload to the companion sync server.
//!
//! The store is the source of truth; the server only mirrors it. Uploads
//! that fail are simply re-attempted the next time the event is touched,
//! so nothing here retries or queues.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::db::{Event, TrackPoint};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventUpload<'a> {
    event: &'a Event,
    track: &'a [TrackPoint],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRegistration<'a> {
    device_id: &'a str,
}

#[derive(Clone)]
pub struct SyncClient {
    http: reqwest::Client,
    base_url: String,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            bail!("sync base URL is empty");
        }

        Ok(Self { http, base_url })
    }

    /// Uploads one event revision together with its full trail.
    pub async fn push_event(&self, event: &Event, track: &[TrackPoint]) -> Result<()> {
        let url = format!("{}/events", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EventUpload { event, track })
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        response
            .error_for_status()
            .context("server rejected event upload")?;
        Ok(())
    }

    /// Tells the server a previously uploaded event was deleted.
    pub async fn push_deletion(&self, uuid: &str) -> Result<()> {
        let url = format!("{}/events/{uuid}/delete", self.base_url);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        response
            .error_for_status()
            .context("server rejected deletion")?;
        Ok(())
    }

    /// Registers this device so uploads can be attributed to it.
    pub async fn register_device(&self, device_id: &str) -> Result<()> {
        let url = format!("{}/devices", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&DeviceRegistration { device_id })
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?;

        response
            .error_for_status()
            .context("server rejected device registration")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let client = SyncClient::new("https://sync.example.com/").expect("valid base URL");
        assert_eq!(client.base_url, "https://sync.example.com");
    }

    #[test]
    fn rejects_empty_base_url() {
        assert!(SyncClient::new("").is_err());
        assert!(SyncClient::new("/").is_err());
    }

    #[test]
    fn event_upload_payload_uses_camel_case() {
        let event = Event {
            id: Some(7),
            uuid: "abc-123".to_string(),
            name: "lunch".to_string(),
            notes: String::new(),
            tag: Some("food".to_string()),
            started_at: Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap(),
            ended_at: Some(Utc.with_ymd_and_hms(2024, 5, 6, 13, 0, 0).unwrap()),
            updated_at: Utc.with_ymd_and_hms(2024, 5, 6, 13, 0, 0).unwrap(),
            deleted: false,
            synced: false,
        };
        let track = vec![TrackPoint {
            id: Some(1),
            event_id: 7,
            latitude: 43.6532,
            longitude: -79.3832,
            recorded_at: Utc.with_ymd_and_hms(2024, 5, 6, 12, 5, 0).unwrap(),
        }];

        let payload = serde_json::to_value(EventUpload {
            event: &event,
            track: &track,
        })
        .expect("serializable payload");

        let started = payload["event"]["startedAt"]
            .as_str()
            .expect("startedAt is a string");
        let parsed = chrono::DateTime::parse_from_rfc3339(started)
            .expect("startedAt is RFC 3339")
            .with_timezone(&Utc);
        assert_eq!(parsed, event.started_at);

        assert_eq!(payload["event"]["tag"], json!("food"));
        assert!(payload["event"]["endedAt"].is_string());
        assert_eq!(payload["track"][0]["eventId"], json!(7));
        assert!(payload["track"][0]["recordedAt"].is_string());
    }

    #[test]
    fn device_registration_payload_shape() {
        let payload = serde_json::to_value(DeviceRegistration {
            device_id: "device-1",
        })
        .expect("serializable payload");
        assert_eq!(payload, json!({ "deviceId": "device-1" }));
    }
}
