use snafu::prelude::*;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    // Provider specifier and registry errors
    #[snafu(display("Invalid provider specifier '{dsn}': {source}"))]
    InvalidSpecifier { dsn: String, source: url::ParseError },

    #[snafu(display("Provider specifier '{dsn}' is not a valid {provider} URL: {reason}"))]
    InvalidProviderUrl {
        dsn: String,
        provider: &'static str,
        reason: String,
    },

    #[snafu(display("Provider definition is missing a name"))]
    MissingProviderName,

    #[snafu(display("Provider '{name}' is already defined"))]
    DuplicateProvider { name: String },

    #[snafu(display("Unknown provider '{name}'; define it in the `providers` section of the config"))]
    UnknownProvider { name: String },

    #[snafu(display("Provider '{provider}' requires the query parameter '{parameter}'"))]
    MissingQueryParameter {
        provider: String,
        parameter: &'static str,
    },

    #[snafu(display("Auth token for provider '{provider}' is not a valid HTTP header value"))]
    InvalidAuthToken { provider: String },

    // HTTP errors
    #[snafu(display("Failed to build HTTP client: {message}"))]
    HttpClientBuild { message: String },

    #[snafu(display("HTTP request to {url} failed: {source}"))]
    HttpRequest { url: String, source: reqwest::Error },

    #[snafu(display("{url} responded with {status}: {body}"))]
    ProviderHttp { url: String, status: u16, body: String },

    // Version resolution errors
    #[snafu(display("Response from {url} is not valid JSON: {source}"))]
    InvalidVersionsResponse { url: String, source: serde_json::Error },

    #[snafu(display("Invalid versions path expression '{expression}': {message}"))]
    InvalidPathExpression { expression: String, message: String },

    #[snafu(display("Invalid version constraint '{constraint}': {source}"))]
    InvalidConstraint {
        constraint: String,
        source: semver::Error,
    },

    #[snafu(display("Invalid version constraint '{constraint}': {reason}"))]
    MalformedConstraint {
        constraint: String,
        reason: &'static str,
    },

    #[snafu(display("No version matches constraint '{constraint}'"))]
    NoMatchingVersion { constraint: String },

    #[snafu(display("Failed to render template '{template}': {}", render_chain(source)))]
    Template { template: String, source: tera::Error },

    // Resolution errors, annotated with the context they occurred in
    #[snafu(display("Failed to resolve binary '{name}': {source}"))]
    ResolveBinary {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Failed to resolve version from {url}: {source}"))]
    ResolveVersion {
        url: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Failed to render download URL: {source}"))]
    RenderDownloadUrl {
        template: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Failed to render extract path: {source}"))]
    RenderExtractPath {
        template: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Binary '{name}' is not defined in the configuration"))]
    NameNotFound { name: String },

    #[snafu(display("Binary '{name}' is not in the lockfile {}; run `prebuilt lock` to update it", path.display()))]
    NameNotLocked { name: String, path: PathBuf },

    // Install errors
    #[snafu(display("Failed to download {url}: {source}"))]
    DownloadAsset {
        url: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Unsupported archive format: {}", path.display()))]
    UnsupportedArchive { path: PathBuf },

    #[snafu(display("File '{member}' not found in archive {}", archive.display()))]
    ArchiveMemberNotFound { archive: PathBuf, member: String },

    #[snafu(display("Failed to extract archive: {source}"))]
    ArchiveExtractionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[snafu(display("Failed to install binary '{name}': {source}"))]
    InstallBinary {
        name: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    #[snafu(display("Installation failed for: {}", names.join(", ")))]
    InstallFailed { names: Vec<String> },

    #[snafu(display("{source}. See {} for details", path.display()))]
    SeeLogFile {
        path: PathBuf,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
    },

    // Lockfile errors
    #[snafu(display("Failed to parse lockfile {}: {source}", path.display()))]
    LockRead { path: PathBuf, source: serde_yaml::Error },

    #[snafu(display("Failed to serialize lockfile {}: {source}", path.display()))]
    LockWrite { path: PathBuf, source: serde_yaml::Error },

    #[snafu(display(
        "Lockfile {} digest mismatch: recorded {expected} but contents hash to {actual}",
        path.display()
    ))]
    LockDigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // Configuration errors
    #[snafu(display("Configuration file {} does not exist", path.display()))]
    ConfigNotFound { path: PathBuf },

    #[snafu(display("Failed to load configuration: {source}"))]
    ConfigLoad { source: Box<figment::Error> },

    #[snafu(display("Failed to expand path '{path}': {source}"))]
    ExpandPath {
        path: String,
        source: shellexpand::LookupError<std::env::VarError>,
    },

    // General errors
    #[snafu(display("{}: {}", path.display(), source))]
    Io { path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to rename {} to {}: {}", src.display(), dst.display(), source))]
    RenameFile {
        src: PathBuf,
        dst: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to create temporary directory in {}: {}", parent.display(), source))]
    TempDirCreation { parent: PathBuf, source: std::io::Error },

    #[snafu(display("JSON serialization error: {source}"))]
    Json { source: serde_json::Error },

    #[snafu(display("Tokio runtime error: {source}"))]
    TokioRuntime { source: std::io::Error },

    #[snafu(display("Tokio task join error: {source}"))]
    TokioJoin { source: tokio::task::JoinError },

    #[snafu(display("Operation cancelled"))]
    Cancelled,
}

impl Error {
    /// Key/value diagnostic metadata carried by this error and every error it wraps.
    ///
    /// Used when logging failures so that the failing URL, template or binary name shows up as
    /// structured fields instead of being buried in the message.
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        let mut current = Some(self);

        while let Some(err) = current {
            current = match err {
                Self::ResolveBinary { name, source } | Self::InstallBinary { name, source } => {
                    fields.push(("name", name.clone()));
                    Some(source.as_ref())
                }
                Self::ResolveVersion { url, source } | Self::DownloadAsset { url, source } => {
                    fields.push(("url", url.clone()));
                    Some(source.as_ref())
                }
                Self::RenderDownloadUrl { template, source }
                | Self::RenderExtractPath { template, source } => {
                    fields.push(("template", template.clone()));
                    Some(source.as_ref())
                }
                Self::ProviderHttp { url, status, body } => {
                    fields.push(("url", url.clone()));
                    fields.push(("status", status.to_string()));
                    fields.push(("body", body.clone()));
                    None
                }
                Self::Template { template, .. } => {
                    fields.push(("template", template.clone()));
                    None
                }
                _ => None,
            };
        }

        fields
    }

    /// True if this error (or an error it wraps) is the result of cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::ResolveBinary { source, .. }
            | Self::ResolveVersion { source, .. }
            | Self::DownloadAsset { source, .. }
            | Self::InstallBinary { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Tera reports the interesting part of a render failure in the error's source chain, not in its
/// top-level message, so flatten the chain for display.
fn render_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub type Result<T> = std::result::Result<T, Error>;
