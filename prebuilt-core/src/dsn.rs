//! Parsing of compact provider specifiers such as
//! `github://cluttrdev/prebuilt?asset=prebuilt_{{ .Version }}_linux-amd64.tar.gz`.

use crate::{Result, error};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;
use url::Url;

/// The decoded form of a provider specifier.
///
/// This is exposed to templates as `Provider`, so the field names are capitalized to read like
/// the rest of the template context (`Provider.Host`, `Provider.Query.asset`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderData {
    /// Selects the provider from the registry
    pub scheme: String,

    /// Free-form identifier, for the forge providers this is the repository owner.
    ///
    /// For `http` and `https` it is the URL authority, including the port if one was given.
    pub host: String,

    /// Free-form identifier without its leading slash, for the forge providers this is the
    /// repository name.
    pub path: String,

    /// Every query parameter, copied verbatim after URI decoding.  Values may contain template
    /// syntax that is only rendered once the version is known.
    pub query: BTreeMap<String, String>,
}

impl ProviderData {
    /// Parse a provider specifier of the form `scheme://host/path?key=value&...`.
    pub fn parse(dsn: &str) -> Result<Self> {
        let url = Url::parse(dsn).with_context(|_| error::InvalidSpecifierSnafu { dsn: dsn.to_string() })?;

        let mut host = url.host_str().unwrap_or_default().to_string();
        if let Some(port) = url.port() {
            host = format!("{}:{}", host, port);
        }

        let path = url.path().strip_prefix('/').unwrap_or(url.path());
        let path = percent_decode_str(path).decode_utf8_lossy().into_owned();

        let query = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            path,
            query,
        })
    }

    /// Look up a required query parameter, failing with a named error if it is absent or empty.
    pub(crate) fn require_query(&self, provider: &str, parameter: &'static str) -> Result<&str> {
        match self.query.get(parameter) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => error::MissingQueryParameterSnafu {
                provider: provider.to_string(),
                parameter,
            }
            .fail(),
        }
    }
}
