//! Remote collector upload for Lampyris
//!
//! POSTs the full readings export to the collector and pushes a lightweight
//! per-reading live power value. Both endpoints share one client with a
//! bounded timeout; credentials are optional basic auth.

use crate::config::UploadConfig;
use crate::error::{LampyrisError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::store::ReadingRow;

/// Client for the remote collector endpoints
pub struct Uploader {
    config: UploadConfig,
    client: reqwest::Client,
    logger: StructuredLogger,
}

impl Uploader {
    /// Create a new uploader from the upload configuration
    pub fn new(config: &UploadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("lampyris/1.0")
            .build()?;

        Ok(Self {
            config: config.clone(),
            client,
            logger: get_logger("upload"),
        })
    }

    /// Whether uploads are enabled at all
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// POST the full readings export as one JSON array
    pub async fn upload_readings(&self, rows: &[ReadingRow]) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let mut req = self.client.post(&self.config.readings_url).json(rows);
        if !self.config.username.is_empty() {
            req = req.basic_auth(&self.config.username, Some(&self.config.password));
        }

        let resp = req
            .send()
            .await
            .map_err(|e| LampyrisError::upload(format!("Readings upload failed: {}", e)))?;
        if !resp.status().is_success() {
            self.logger.error(&format!(
                "Collector rejected readings upload: {}",
                resp.status()
            ));
            return Err(LampyrisError::upload(format!(
                "Collector returned {}",
                resp.status()
            )));
        }

        self.logger.info(&format!("Uploaded {} readings", rows.len()));
        Ok(())
    }

    /// POST the current power draw to the live-telemetry side channel
    ///
    /// Best-effort: failures are logged at debug and otherwise ignored.
    pub async fn post_live_kw(&self, kw: f64) {
        if !self.config.enabled || self.config.live_kw_url.is_empty() {
            return;
        }

        let mut req = self
            .client
            .post(&self.config.live_kw_url)
            .form(&[("kW", kw.to_string())]);
        if !self.config.username.is_empty() {
            req = req.basic_auth(&self.config.username, Some(&self.config.password));
        }

        match req.send().await {
            Ok(resp) if !resp.status().is_success() => {
                self.logger
                    .debug(&format!("Live kW post rejected: {}", resp.status()));
            }
            Ok(_) => {}
            Err(e) => {
                self.logger.debug(&format!("Live kW post failed: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_upload_is_a_noop() {
        let uploader = Uploader::new(&UploadConfig::default()).unwrap();
        assert!(!uploader.is_enabled());
        assert!(uploader.upload_readings(&[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_live_kw_without_url_is_a_noop() {
        let config = UploadConfig {
            enabled: true,
            readings_url: "https://example.org/energy".to_string(),
            ..Default::default()
        };
        let uploader = Uploader::new(&config).unwrap();
        // Must return without attempting any request
        uploader.post_live_kw(0.8).await;
    }
}
