//! Concrete breach sources and the table that builds them.

mod cloudbleed;
mod hibp;
mod pwned_passwords;

pub use cloudbleed::CloudbleedChecker;
pub use hibp::HibpChecker;
pub use pwned_passwords::PwnedPasswordsChecker;

use crate::checker::{BreachChecker, CheckerFactory};
use crate::retry::RetryPolicy;
use crate::transport::HttpTransport;
use breachwatch_core::{AppConfig, BreachSource, CheckingConfig, SourcesConfig};
use std::sync::Arc;

/// Maps each [`BreachSource`] to its backend, sharing one transport.
#[derive(Clone)]
pub struct BackendTable {
    transport: Arc<dyn HttpTransport>,
    checking: CheckingConfig,
    sources: SourcesConfig,
}

impl BackendTable {
    /// Create a table that hands `transport` to every backend it builds.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, config: &AppConfig) -> Self {
        Self {
            transport,
            checking: config.checking.clone(),
            sources: config.sources.clone(),
        }
    }
}

impl CheckerFactory for BackendTable {
    fn create(&self, source: BreachSource) -> Box<dyn BreachChecker> {
        let retry = RetryPolicy::from_config(&self.checking);
        let transport = Arc::clone(&self.transport);

        match source {
            BreachSource::HaveIBeenPwned => Box::new(HibpChecker::new(
                transport,
                self.sources.hibp_api_url.clone(),
                retry,
            )),
            BreachSource::Cloudbleed => Box::new(CloudbleedChecker::new(
                transport,
                self.sources.cloudbleed_list_url.clone(),
                retry,
            )),
            BreachSource::PwnedPasswords => Box::new(
                PwnedPasswordsChecker::new(transport, self.sources.pwned_passwords_url.clone(), retry)
                    .with_max_age_days(self.sources.password_max_age_days)
                    .with_max_concurrent(self.checking.max_concurrent_requests),
            ),
        }
    }
}

/// `host` followed by each parent domain down to two labels.
///
/// `login.mail.example.com` yields itself, `mail.example.com` and `example.com`.
pub(crate) fn domain_candidates(host: &str) -> Vec<&str> {
    let mut candidates = vec![host];
    let mut rest = host;
    while let Some((_, parent)) = rest.split_once('.') {
        if !parent.contains('.') {
            break;
        }
        candidates.push(parent);
        rest = parent;
    }
    candidates
}
