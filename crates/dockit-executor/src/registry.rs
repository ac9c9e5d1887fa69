//! Registry credential resolution.

use dockit_core::{BuildOptions, CredentialStore, GoalInvocation, RegistryCredential, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Produces the registry credentials for a goal invocation.
///
/// Explicit configuration always wins; the credential store is only asked
/// when neither a raw docker config nor any registry is configured.
#[derive(Clone, Default)]
pub struct RegistryResolver {
    store: Option<Arc<dyn CredentialStore>>,
}

impl RegistryResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A resolver that never discovers registries.
    pub fn static_only() -> Self {
        Self { store: None }
    }

    pub async fn resolve(
        &self,
        options: &BuildOptions,
        invocation: &GoalInvocation,
    ) -> Result<Vec<RegistryCredential>> {
        if options.has_explicit_registries() {
            debug!(count = options.registries.len(), "Using configured registries");
            return Ok(options.registries.clone());
        }

        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };

        let providers = store.registry_providers().await?;
        let mut registries = Vec::with_capacity(providers.len());

        for provider in providers {
            let mut credential = RegistryCredential::new(strip_scheme(&provider.url))
                .with_label(provider.name.clone())
                .displayed(true);

            match &provider.credential_id {
                Some(id) => match store.secret(id).await? {
                    Some(secret) => {
                        credential = credential.with_login(secret.owner_login, secret.secret);
                    }
                    None => {
                        warn!(provider = %provider.name, "Registry provider has no stored secret");
                    }
                },
                None => {
                    warn!(provider = %provider.name, "Registry provider has no credential");
                }
            }

            registries.push(credential);
        }

        info!(
            invocation = %invocation.id,
            count = registries.len(),
            "Discovered registries"
        );
        invocation.log.system(&format!(
            "Discovered {} registr{} from credential store",
            registries.len(),
            if registries.len() == 1 { "y" } else { "ies" }
        ));

        Ok(registries)
    }
}

/// `https://registry.example.com/` -> `registry.example.com`.
///
/// Values without a `scheme://` prefix (including `localhost:5000`) are
/// returned trimmed, as they are already host names.
pub fn strip_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.contains("://") {
        return trimmed.trim_end_matches('/').to_string();
    }

    match Url::parse(trimmed) {
        Ok(url) => {
            let mut host = url.host_str().unwrap_or_default().to_string();
            if let Some(port) = url.port() {
                host.push_str(&format!(":{}", port));
            }
            let path = url.path().trim_matches('/');
            if !path.is_empty() {
                host.push('/');
                host.push_str(path);
            }
            host
        }
        Err(_) => trimmed
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(trimmed)
            .trim_end_matches('/')
            .to_string(),
    }
}
