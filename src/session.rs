//! Authenticated session: owns the REST adapter and the single live connection.
//!
//! The live connection is created lazily on first use and shared by every
//! consumer of the session. `logout()` tears it down together with every
//! notification center the session started, so nothing stays bound to the
//! previous identity.

use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::api::{HttpNotificationApi, NotificationApi};
use crate::config::Config;
use crate::errors::Result;
use crate::live::LiveConnection;
use crate::sync::NotificationCenter;

pub struct Session<A = HttpNotificationApi> {
    config: Config,
    api: Arc<A>,
    live: OnceCell<LiveConnection>,
    centers: Mutex<Vec<Arc<NotificationCenter<Arc<A>>>>>,
}

impl Session<HttpNotificationApi> {
    pub fn new(config: Config) -> Result<Self> {
        let api = HttpNotificationApi::new(&config)?;
        Ok(Self::with_api(config, api))
    }
}

impl<A: NotificationApi + 'static> Session<A> {
    pub fn with_api(config: Config, api: A) -> Self {
        Self {
            config,
            api: Arc::new(api),
            live: OnceCell::new(),
            centers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn api(&self) -> Arc<A> {
        Arc::clone(&self.api)
    }

    /// The session's live connection, connecting on first call.
    pub async fn live(&self) -> Result<&LiveConnection> {
        self.live
            .get_or_try_init(|| async {
                LiveConnection::connect(&self.config, &self.config.user_id)
            })
            .await
    }

    /// Create a notification center, load the initial list and wire up live
    /// delivery and polling as configured. A failed initial fetch or an
    /// unavailable live channel is logged, not fatal.
    pub async fn start_center(&self) -> Arc<NotificationCenter<Arc<A>>> {
        let center = Arc::new(
            NotificationCenter::new(Arc::clone(&self.api))
                .with_resync_on_reconnect(self.config.resync_on_reconnect),
        );

        // Subscribe before the initial fetch so no push falls in between.
        if self.config.ws_url.is_some() {
            match self.live().await {
                Ok(live) => center.attach_live(live.subscribe()),
                Err(e) => warn!(error = %e, "live notifications unavailable"),
            }
        }

        if let Err(e) = center.refresh().await {
            warn!(error = %e, "initial notification fetch failed");
        }

        if let Some(interval) = self.config.poll_interval {
            center.spawn_polling(interval);
        }

        if let Ok(mut centers) = self.centers.lock() {
            centers.push(Arc::clone(&center));
        }
        center
    }

    /// Tear down every center and the live connection.
    pub async fn logout(self) {
        let centers = match self.centers.lock() {
            Ok(mut centers) => std::mem::take(&mut *centers),
            Err(_) => Vec::new(),
        };
        for center in &centers {
            center.teardown();
        }
        if let Some(live) = self.live.get() {
            live.close().await;
        }
        info!(user_id = %self.config.user_id, "session closed");
    }
}
