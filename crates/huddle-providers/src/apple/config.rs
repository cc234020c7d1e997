//! Apple (iCloud CalDAV) provider configuration.

use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Configuration for the Apple provider.
#[derive(Debug, Clone)]
pub struct AppleConfig {
    /// CalDAV entry point used for principal discovery.
    pub caldav_base: Url,
}

impl AppleConfig {
    /// iCloud's CalDAV entry point.
    pub const DEFAULT_CALDAV_BASE: &'static str = "https://caldav.icloud.com/";

    /// Creates a configuration pointing at `caldav_base`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the URL is invalid.
    pub fn new(caldav_base: impl AsRef<str>) -> ProviderResult<Self> {
        let parsed = Url::parse(caldav_base.as_ref()).map_err(|e| {
            ProviderError::configuration(format!("invalid CalDAV base URL: {}", e)).with_source(e)
        })?;
        Ok(Self {
            caldav_base: parsed,
        })
    }

    /// Configuration for iCloud.
    pub fn icloud() -> ProviderResult<Self> {
        Self::new(Self::DEFAULT_CALDAV_BASE)
    }

    /// Resolves an href from a multistatus response against the base URL.
    pub fn resolve(&self, href: &str) -> ProviderResult<Url> {
        self.caldav_base.join(href).map_err(|e| {
            ProviderError::malformed(format!("invalid href `{}`: {}", href, e)).with_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icloud_default() {
        let config = AppleConfig::icloud().unwrap();
        assert_eq!(config.caldav_base.as_str(), "https://caldav.icloud.com/");
    }

    #[test]
    fn resolves_relative_and_absolute_hrefs() {
        let config = AppleConfig::new("https://caldav.icloud.com/").unwrap();
        assert_eq!(
            config.resolve("/123/principal/").unwrap().as_str(),
            "https://caldav.icloud.com/123/principal/"
        );
        assert_eq!(
            config
                .resolve("https://p42-caldav.icloud.com/123/calendars/")
                .unwrap()
                .as_str(),
            "https://p42-caldav.icloud.com/123/calendars/"
        );
    }

    #[test]
    fn invalid_url_returns_error() {
        assert!(AppleConfig::new("not a valid url").is_err());
    }
}
