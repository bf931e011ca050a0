//! REST adapter for the notification store.
//! Uses reqwest-middleware for transient retries.

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::NotificationApi;
use crate::config::Config;
use crate::errors::{ClientError, Result};
use crate::models::{Notification, ReadAllAck};

pub struct HttpNotificationApi {
    client: ClientWithMiddleware,
    config: Config,
}

impl HttpNotificationApi {
    pub fn new(config: &Config) -> Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.http_timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("notify-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut builder = ClientBuilder::new(reqwest_client);
        if config.http_max_retries > 0 {
            let retry_policy =
                ExponentialBackoff::builder().build_with_max_retries(config.http_max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self {
            client: builder.build(),
            config: config.clone(),
        })
    }

    /// Issue a request and decode a JSON body. `owned_id` is the notification
    /// the call targets; 403/404 on such calls map to `NotFound`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        owned_id: Option<&str>,
    ) -> Result<T> {
        let request_id = uuid::Uuid::new_v4().to_string();

        let mut req = self
            .client
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json")
            .header("x-request-id", &request_id);

        if let Some(token) = &self.config.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(%method, url = %url, request_id = %request_id, "notification request failed: {}", e);
            ClientError::from(e)
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::debug!(%method, url = %url, status = %status, request_id = %request_id, "non-success response");
            return Err(match (status, owned_id) {
                // 403 is folded into NotFound so other users' ids stay indistinguishable.
                (StatusCode::NOT_FOUND | StatusCode::FORBIDDEN, Some(id)) => {
                    ClientError::NotFound { id: id.to_string() }
                }
                _ => ClientError::Transport(format!(
                    "{} {} returned {}: {}",
                    method,
                    url.path(),
                    status,
                    &body[..floor_char_boundary(&body, 200)]
                )),
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ClientError::Malformed(format!(
                "{} {}: {} (body: {})",
                method,
                url.path(),
                e,
                &body[..floor_char_boundary(&body, 200)]
            ))
        })
    }
}

#[async_trait::async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn fetch_all(&self) -> Result<Vec<Notification>> {
        let url = self.config.endpoint("notifications")?;
        let items: Vec<Notification> = self.call(Method::GET, url, None).await?;
        tracing::debug!(count = items.len(), "fetched notifications");
        Ok(items)
    }

    async fn mark_read(&self, id: &str) -> Result<Notification> {
        let path = format!("notifications/{}/read", urlencoding::encode(id));
        let url = self.config.endpoint(&path)?;
        self.call(Method::PUT, url, Some(id)).await
    }

    async fn mark_all_read(&self) -> Result<ReadAllAck> {
        let url = self.config.endpoint("notifications/read-all")?;
        self.call(Method::PUT, url, None).await
    }
}

/// Largest index `<= max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
