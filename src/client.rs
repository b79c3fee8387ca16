//! Base url configuration for the api client.
//!
//! [`BaseUrlConfig`] ties the persisted `API_BASE_URL` setting to the
//! [`ApiEndpoint`] every request reads its target from. Reconfiguring takes
//! effect for the next request of any caller holding the endpoint.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::settings::{API_BASE_URL_KEY, SettingsStore};

/// Compiled-in service url, overridable at build time.
pub const DEFAULT_API_URL: &str = match option_env!("WORDSEARCH_API_URL") {
    Some(url) => url,
    None => "http://121.4.251.254:5035/",
};

/// Shared, runtime mutable request target.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    target: Arc<RwLock<String>>,
}

impl ApiEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            target: Arc::new(RwLock::new(url.into())),
        }
    }

    pub fn current(&self) -> String {
        match self.target.read() {
            Ok(target) => target.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace(&self, url: &str) -> String {
        let mut target = self.target.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *target, url.to_string())
    }
}

/// Confirmation returned by [`BaseUrlConfig::set_api_base_url`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconfigured {
    pub previous: String,
    pub current: String,
    pub persisted: bool,
}

pub struct BaseUrlConfig {
    store: Arc<dyn SettingsStore>,
    endpoint: ApiEndpoint,
    default_url: String,
}

impl BaseUrlConfig {
    pub fn new(store: Arc<dyn SettingsStore>, default_url: impl Into<String>) -> Self {
        let default_url = default_url.into();
        Self {
            store,
            endpoint: ApiEndpoint::new(default_url.clone()),
            default_url,
        }
    }

    pub fn endpoint(&self) -> ApiEndpoint {
        self.endpoint.clone()
    }

    /// Persisted base url, or the default when nothing was saved yet.
    pub fn get_api_base_url(&self) -> String {
        self.store
            .get_item(API_BASE_URL_KEY)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.default_url.clone())
    }

    /// Persists `url` and points the endpoint at it. The url is not validated.
    pub fn set_api_base_url(&self, url: &str) -> Reconfigured {
        let persisted = match self.store.set_item(API_BASE_URL_KEY, url) {
            Ok(()) => true,
            Err(error) => {
                warn!("Base url {url} applied but not saved: {error}");
                false
            }
        };
        let previous = self.endpoint.replace(url);
        info!("Api base url {previous} -> {url}");
        Reconfigured {
            previous,
            current: url.to_string(),
            persisted,
        }
    }

    /// Applies the persisted (or default) base url to the endpoint.
    pub fn hydrate_api_base_url(&self) -> String {
        let url = self.get_api_base_url();
        self.endpoint.replace(&url);
        url
    }
}

pub fn compose_base_url(host: &str, port: &str) -> String {
    format!("http://{host}:{port}/")
}

pub fn extract_host(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// Port of `url`; an implicit port reads as "80".
pub fn extract_port(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    Some(
        parsed
            .port()
            .map(|port| port.to_string())
            .unwrap_or_else(|| "80".to_string()),
    )
}
