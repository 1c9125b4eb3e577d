use crate::{Result, error};
use figment::{
    Figment,
    providers::{Format, Toml, Yaml},
};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Name of the configuration file used when none is given on the command line.
pub const DEFAULT_CONFIG_FILE: &str = ".prebuilt.yaml";

const DEFAULT_INSTALL_DIR: &str = "~/.local/bin";

/// The contents of a prebuilt configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub global: Global,

    /// The binaries to manage
    pub binaries: Vec<BinarySpec>,

    /// Additional named providers that `binaries` can refer to by scheme
    pub providers: Vec<ProviderSpec>,

    pub http: HttpConfig,

    /// Log filter used when neither the command line nor the environment specify one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load the configuration file at `path`.
    ///
    /// Files ending in `.toml` are read as TOML, everything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return error::ConfigNotFoundSnafu { path }.fail();
        }

        let figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Figment::from(Toml::file(path)),
            _ => Figment::from(Yaml::file(path)),
        };

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().map_err(|e| error::Error::ConfigLoad {
            source: Box::new(e),
        })?;

        tracing::debug!(
            binaries = config.binaries.len(),
            providers = config.providers.len(),
            "Loaded configuration"
        );

        Ok(config)
    }

    /// Look up a binary by the name it has in the configuration.
    pub fn binary(&self, name: &str) -> Option<&BinarySpec> {
        self.binaries.iter().find(|bin| bin.name == name)
    }
}

/// Settings that apply to all managed binaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Global {
    /// Directory binaries are installed into.  May start with `~` and contain environment
    /// variable references.
    pub install_dir: String,
}

impl Default for Global {
    fn default() -> Self {
        Self {
            install_dir: DEFAULT_INSTALL_DIR.to_string(),
        }
    }
}

impl Global {
    /// The install directory with `~` and environment variables expanded.
    pub fn install_dir(&self) -> Result<PathBuf> {
        expand_path(&self.install_dir)
    }
}

/// Expand a leading `~` and any `$VAR`/`${VAR}` references in `path`.
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|_| error::ExpandPathSnafu { path })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

/// A binary to resolve and install.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinarySpec {
    /// The name the binary is selected by on the command line
    #[serde(default)]
    pub name: String,

    /// Overrides the file name the binary is installed as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_name: Option<String>,

    #[serde(default)]
    pub version: VersionSpec,

    pub provider: ProviderRef,

    /// Path of the binary inside the downloaded archive, if the download is an archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_path: Option<String>,
}

impl BinarySpec {
    /// The file name configured for this binary, if any: `bin_name`, else `name`.
    pub fn installed_name(&self) -> Option<&str> {
        self.bin_name
            .as_deref()
            .filter(|bin_name| !bin_name.is_empty())
            .or_else(|| Some(self.name.as_str()).filter(|name| !name.is_empty()))
    }
}

/// The version of a binary to install.
///
/// Either a bare constraint (`"latest"`, `">=3,<4"`, `"v1.2.3"`), or a constraint together with
/// a prefix that release tags carry in front of the version (`jq-` in `jq-1.7.1`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VersionSpec {
    Constraint(String),
    Prefixed {
        #[serde(default)]
        prefix: String,
        #[serde(default)]
        constraints: String,
    },
}

impl Default for VersionSpec {
    fn default() -> Self {
        Self::Constraint(String::new())
    }
}

impl VersionSpec {
    pub fn constraint(&self) -> &str {
        match self {
            Self::Constraint(constraint) => constraint,
            Self::Prefixed { constraints, .. } => constraints,
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            Self::Constraint(_) => "",
            Self::Prefixed { prefix, .. } => prefix,
        }
    }
}

/// Where a binary comes from: a specifier naming a registered provider, or a provider defined
/// inline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderRef {
    Dsn(String),
    Inline(ProviderSpec),
}

impl Default for ProviderRef {
    fn default() -> Self {
        Self::Dsn(String::new())
    }
}

/// A provider definition: how to list available versions and how to build a download URL.
///
/// All string fields except `name` and `auth_token` are templates.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    #[serde(default)]
    pub name: String,

    /// URL returning a JSON document that lists available versions.  Empty if the provider has
    /// no way to discover versions, in which case the version constraint is used verbatim.
    #[serde(default, alias = "versionsURL")]
    pub versions_url: String,

    /// JSONPath expression selecting the version strings in the versions document
    #[serde(default, alias = "versionsPath")]
    pub versions_json_path: String,

    #[serde(default, alias = "downloadURL")]
    pub download_url: String,

    /// Bearer token, either literal or a `${VAR}` reference to an environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

// Literal tokens never show up in debug output, `${VAR}` references do
impl std::fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth_token = self.auth_token.as_deref().map(|token| {
            if token.starts_with("${") && token.ends_with('}') {
                token
            } else {
                "<redacted>"
            }
        });

        f.debug_struct("ProviderSpec")
            .field("name", &self.name)
            .field("versions_url", &self.versions_url)
            .field("versions_json_path", &self.versions_json_path)
            .field("download_url", &self.download_url)
            .field("auth_token", &auth_token)
            .finish()
    }
}

/// HTTP client configuration shared by all providers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpConfig {
    /// Timeout for a single HTTP request, including reading the body
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Number of retries for transient failures
    pub retries: usize,

    /// Initial delay between retries; grows exponentially up to `backoff_max`
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,

    /// Proxy URL for all requests.  Without one, the system proxy settings apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
            proxy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use sealed_test::prelude::*;

    fn from_yaml(doc: &str) -> Result<Config> {
        Config::extract(Figment::from(Yaml::string(doc)))
    }

    #[test]
    fn debug_output_redacts_literal_tokens() {
        let config = from_yaml(
            r#"
providers:
  - name: forgejo
    versionsUrl: "https://codeberg.org/api/v1/repos/{{ .Provider.Host }}/releases"
    downloadUrl: "https://codeberg.org/{{ .Provider.Host }}"
    authToken: glpat-s3cr3t-t0ken
  - name: internal
    downloadUrl: "https://artifacts.example.com/{{ .Provider.Path }}"
    authToken: "${ARTIFACTS_TOKEN}"
"#,
        )
        .unwrap();

        let debug = format!("{:?}", config.providers[0]);
        assert!(!debug.contains("glpat-s3cr3t-t0ken"), "{debug}");
        assert!(debug.contains("<redacted>"), "{debug}");
        assert!(debug.contains("forgejo"), "{debug}");

        let pretty = format!("{:#?}", config);
        assert!(!pretty.contains("s3cr3t"), "{pretty}");
        assert!(pretty.contains("${ARTIFACTS_TOKEN}"), "{pretty}");
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = from_yaml("{}").unwrap();

        assert_eq!(config.global.install_dir, "~/.local/bin");
        assert!(config.binaries.is_empty());
        assert!(config.providers.is_empty());
        assert_eq!(config.http, HttpConfig::default());
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn scalar_version_and_specifier() {
        let config = from_yaml(
            r#"
binaries:
  - name: prebuilt
    version: ">=0.3, <1"
    provider: "github://cluttrdev/prebuilt?asset=prebuilt_{{ .Version }}_linux-amd64.tar.gz"
    extractPath: prebuilt
"#,
        )
        .unwrap();

        let bin = config.binary("prebuilt").unwrap();
        assert_eq!(bin.version, VersionSpec::Constraint(">=0.3, <1".to_string()));
        assert_eq!(bin.version.prefix(), "");
        assert_matches!(&bin.provider, ProviderRef::Dsn(dsn) if dsn.starts_with("github://"));
        assert_eq!(bin.extract_path.as_deref(), Some("prebuilt"));
        assert_eq!(bin.bin_name, None);
    }

    #[test]
    fn structured_version_and_inline_provider() {
        let config = from_yaml(
            r#"
binaries:
  - name: jq
    binName: jq
    version:
      prefix: jq-
      constraints: ">1.7.0"
    provider:
      name: jq
      versionsUrl: https://api.github.com/repos/jqlang/jq/releases
      versionsJsonPath: "$[*].tag_name"
      downloadUrl: "https://github.com/jqlang/jq/releases/download/{{ .Version }}/jq-linux-amd64"
      authToken: "${GITHUB_TOKEN}"
"#,
        )
        .unwrap();

        let bin = config.binary("jq").unwrap();
        assert_eq!(bin.version.prefix(), "jq-");
        assert_eq!(bin.version.constraint(), ">1.7.0");
        assert_matches!(&bin.provider, ProviderRef::Inline(spec) => {
            assert_eq!(spec.name, "jq");
            assert_eq!(spec.versions_json_path, "$[*].tag_name");
            assert_eq!(spec.auth_token.as_deref(), Some("${GITHUB_TOKEN}"));
        });
    }

    #[test]
    fn missing_version_means_unconstrained() {
        let config = from_yaml(
            r#"
binaries:
  - name: tool
    provider: "https://example.com/tool"
"#,
        )
        .unwrap();

        assert_eq!(config.binaries[0].version.constraint(), "");
    }

    #[test]
    fn provider_path_alias_is_accepted() {
        let config = from_yaml(
            r#"
providers:
  - name: forgejo
    versionsUrl: "https://codeberg.org/api/v1/repos/{{ .Provider.Host }}/{{ .Provider.Path }}/releases"
    versionsPath: "$[*].tag_name"
    downloadUrl: "https://codeberg.org/{{ .Provider.Host }}/{{ .Provider.Path }}/releases/download/{{ .Version }}/{{ .Provider.Query.asset }}"
"#,
        )
        .unwrap();

        assert_eq!(config.providers[0].versions_json_path, "$[*].tag_name");
        assert_eq!(config.providers[0].auth_token, None);
    }

    #[test]
    fn http_durations_are_human_readable() {
        let config = from_yaml(
            r#"
http:
  timeout: 30s
  retries: 5
  backoffBase: 100ms
  proxy: http://proxy.internal:3128
"#,
        )
        .unwrap();

        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert_eq!(config.http.retries, 5);
        assert_eq!(config.http.backoff_base, Duration::from_millis(100));
        assert_eq!(config.http.backoff_max, HttpConfig::default().backoff_max);
        assert_eq!(config.http.proxy.as_deref(), Some("http://proxy.internal:3128"));
    }

    #[test]
    fn invalid_version_type_is_rejected() {
        let result = from_yaml(
            r#"
binaries:
  - name: tool
    version: [1, 2]
    provider: "https://example.com/tool"
"#,
        );
        assert_matches!(result, Err(Error::ConfigLoad { .. }));
    }

    #[test]
    fn loads_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prebuilt.toml");
        std::fs::write(
            &path,
            r#"
logLevel = "debug"

[global]
installDir = "/opt/bin"

[[binaries]]
name = "tool"
version = "1.0.0"
provider = "https://example.com/tool-{{ .Version }}"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.global.install_dir, "/opt/bin");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.binaries.len(), 1);
    }

    #[test]
    fn loads_yaml_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "global:\n  installDir: /usr/local/bin\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.global.install_dir, "/usr/local/bin");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            Config::load(&dir.path().join("nope.yaml")),
            Err(Error::ConfigNotFound { .. })
        );
    }

    #[sealed_test(env = [("HOME", "/home/tester"), ("TOOLS", "/srv/tools")])]
    fn install_dir_is_expanded() {
        let global = Global::default();
        assert_eq!(global.install_dir().unwrap(), PathBuf::from("/home/tester/.local/bin"));

        let global = Global {
            install_dir: "${TOOLS}/bin".to_string(),
        };
        assert_eq!(global.install_dir().unwrap(), PathBuf::from("/srv/tools/bin"));
    }

    #[test]
    fn unset_variable_in_install_dir_is_an_error() {
        let global = Global {
            install_dir: "$PREBUILT_DEFINITELY_UNSET/bin".to_string(),
        };
        assert_matches!(global.install_dir(), Err(Error::ExpandPath { .. }));
    }
}
