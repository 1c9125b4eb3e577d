//! Named provider definitions and the registry that binaries are resolved against.
use crate::{
    Result,
    config::{HttpConfig, ProviderRef, ProviderSpec},
    dsn::ProviderData,
    error,
    http::HttpClient,
};
use std::{collections::HashMap, sync::Arc};

const GITHUB: &str = "github";
const GITLAB: &str = "gitlab";

/// Query parameter of the forge providers that holds the asset file name template
const ASSET: &str = "asset";

/// A provider definition together with the HTTP client used to talk to it.
#[derive(Debug)]
pub struct Provider {
    spec: ProviderSpec,
    client: HttpClient,
    required_query: &'static [&'static str],
}

impl Provider {
    /// Create a provider from its definition.
    ///
    /// If the definition has an auth token, the client authenticates with it.  A token of the form
    /// `${NAME}` is read from the environment variable `NAME`; if that variable is unset or empty
    /// the provider is unauthenticated.
    pub fn new(spec: ProviderSpec, http: &HttpConfig) -> Result<Self> {
        let client = match resolve_auth_token(spec.auth_token.as_deref()) {
            Some(token) => {
                tracing::debug!(provider = %spec.name, "Using authenticated HTTP client");
                HttpClient::with_bearer_token(http, &spec.name, &token)?
            }
            None => HttpClient::new(http)?,
        };

        Ok(Self {
            spec,
            client,
            required_query: &[],
        })
    }

    fn requiring(mut self, parameters: &'static [&'static str]) -> Self {
        self.required_query = parameters;
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Fail if `data` lacks a query parameter this provider's templates depend on.
    fn check_query(&self, data: &ProviderData) -> Result<()> {
        for parameter in self.required_query {
            data.require_query(self.name(), parameter)?;
        }
        Ok(())
    }
}

fn resolve_auth_token(token: Option<&str>) -> Option<String> {
    let token = token?;

    let token = match token.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(var) => std::env::var(var).unwrap_or_default(),
        None => token.to_string(),
    };

    if token.is_empty() { None } else { Some(token) }
}

/// The providers every registry starts out with, in registration order.
fn builtin_providers(http: &HttpConfig) -> Result<Vec<Provider>> {
    let github = ProviderSpec {
        name: GITHUB.to_string(),
        versions_url:
            "https://api.github.com/repos/{{ .Provider.Host }}/{{ .Provider.Path }}/releases?per_page=100"
                .to_string(),
        versions_json_path: "$[*].tag_name".to_string(),
        download_url: "https://github.com/{{ .Provider.Host }}/{{ .Provider.Path }}/releases/download/{{ .Version }}/{{ tpl(template=.Provider.Query.asset) }}"
            .to_string(),
        auth_token: Some("${GITHUB_TOKEN}".to_string()),
    };

    let gitlab = ProviderSpec {
        name: GITLAB.to_string(),
        versions_url: r#"{% set project = Provider.Host ~ "/" ~ Provider.Path %}https://gitlab.com/api/v4/projects/{{ project | urlencode_strict }}/releases?per_page=100"#
            .to_string(),
        versions_json_path: "$[*].tag_name".to_string(),
        download_url: "https://gitlab.com/{{ .Provider.Host }}/{{ .Provider.Path }}/-/releases/{{ .Version }}/downloads/{{ tpl(template=.Provider.Query.asset) }}"
            .to_string(),
        auth_token: Some("${GITLAB_TOKEN}".to_string()),
    };

    let plain = |scheme: &str| ProviderSpec {
        name: scheme.to_string(),
        versions_url: String::new(),
        versions_json_path: String::new(),
        download_url: "{{ .Provider.Scheme }}://{{ .Provider.Host }}/{{ tpl(template=.Provider.Path) }}"
            .to_string(),
        auth_token: None,
    };

    Ok(vec![
        Provider::new(github, http)?.requiring(&[ASSET]),
        Provider::new(gitlab, http)?.requiring(&[ASSET]),
        Provider::new(plain("https"), http)?,
        Provider::new(plain("http"), http)?,
    ])
}

/// All providers known to a run, keyed by name.
///
/// Built once at startup and shared read-only by every resolution and install task.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<Provider>>,
    http: HttpConfig,
    default_client: HttpClient,
}

impl ProviderRegistry {
    /// Register the built-in providers, then every provider in `specs`.
    ///
    /// Fails if a provider has no name, or has the same name as one registered before it
    /// (including the built-in ones).
    pub fn init(specs: &[ProviderSpec], http: &HttpConfig) -> Result<Self> {
        let mut registry = Self {
            providers: HashMap::new(),
            http: http.clone(),
            default_client: HttpClient::new(http)?,
        };

        for provider in builtin_providers(http)? {
            registry.register(provider)?;
        }

        for spec in specs {
            registry.register(Provider::new(spec.clone(), http)?)?;
        }

        Ok(registry)
    }

    fn register(&mut self, provider: Provider) -> Result<()> {
        if provider.name().is_empty() {
            return error::MissingProviderNameSnafu.fail();
        }
        if self.providers.contains_key(provider.name()) {
            return error::DuplicateProviderSnafu {
                name: provider.name(),
            }
            .fail();
        }

        tracing::trace!(name = provider.name(), "Registered provider");
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Provider>> {
        self.providers.get(name)
    }

    /// Resolve the provider a binary refers to, along with the data its templates are rendered
    /// with.
    ///
    /// Inline provider definitions are used as-is without being registered; their scheme is their
    /// name.  Specifiers are parsed and looked up by scheme, except that `github.com` release
    /// download URLs are routed to the GitHub provider.
    pub fn resolve(&self, provider: &ProviderRef) -> Result<(Arc<Provider>, ProviderData)> {
        match provider {
            ProviderRef::Inline(spec) => {
                let data = ProviderData {
                    scheme: spec.name.clone(),
                    ..Default::default()
                };
                Ok((Arc::new(Provider::new(spec.clone(), &self.http)?), data))
            }
            ProviderRef::Dsn(dsn) => {
                let mut data = ProviderData::parse(dsn)?;
                if matches!(data.scheme.as_str(), "http" | "https") && data.host == "github.com" {
                    data = github_release_url(dsn, &data)?;
                }

                let provider = self
                    .providers
                    .get(&data.scheme)
                    .ok_or_else(|| error::Error::UnknownProvider {
                        name: data.scheme.clone(),
                    })?;
                provider.check_query(&data)?;

                Ok((Arc::clone(provider), data))
            }
        }
    }

    /// The HTTP client to download a locked binary with, by provider name.
    ///
    /// Falls back to an unauthenticated client for providers that are not registered, which is
    /// the case for binaries whose provider was defined inline.
    pub fn client(&self, name: &str) -> &HttpClient {
        self.providers
            .get(name)
            .map_or(&self.default_client, |provider| provider.client())
    }
}

/// Convert `https://github.com/<owner>/<repo>/releases/download/<version>/<asset>` into the
/// equivalent `github://<owner>/<repo>?asset=<asset>` data.  The version in the URL is replaced by
/// the resolved one, so it may be a template or a placeholder.
fn github_release_url(dsn: &str, data: &ProviderData) -> Result<ProviderData> {
    let invalid = |reason: &str| error::Error::InvalidProviderUrl {
        dsn: dsn.to_string(),
        provider: GITHUB,
        reason: reason.to_string(),
    };

    let segments: Vec<&str> = data.path.split('/').collect();
    let [owner, repo, "releases", "download", _version, asset @ ..] = segments.as_slice() else {
        return Err(invalid(
            "expected https://github.com/<owner>/<repo>/releases/download/<version>/<asset>",
        ));
    };

    if owner.is_empty() || repo.is_empty() {
        return Err(invalid("owner and repository must not be empty"));
    }
    if asset.is_empty() || asset.iter().any(|segment| segment.is_empty()) {
        return Err(invalid("asset path must not be empty"));
    }

    Ok(ProviderData {
        scheme: GITHUB.to_string(),
        host: (*owner).to_string(),
        path: (*repo).to_string(),
        query: [(ASSET.to_string(), asset.join("/"))].into_iter().collect(),
    })
}
