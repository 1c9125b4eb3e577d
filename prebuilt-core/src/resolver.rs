//! Concurrent resolution of binary specs into a [`Lock`].
use crate::{
    Result,
    config::BinarySpec,
    error,
    lock::{BinaryData, Lock},
    messages::{MessageReporter, ResolutionMessage},
    provider::ProviderRegistry,
    template::{self, TemplateData},
    version,
};
use futures::{StreamExt, stream};
use snafu::ResultExt;
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Number of binaries resolved at the same time.
const MAX_CONCURRENCY: usize = 8;

/// Resolves binary specs against a provider registry.
#[derive(Debug, Clone)]
pub struct Resolver {
    registry: Arc<ProviderRegistry>,
    reporter: MessageReporter,
}

impl Resolver {
    pub fn new(registry: Arc<ProviderRegistry>, reporter: MessageReporter) -> Self {
        Self { registry, reporter }
    }

    /// Resolve every spec and produce a lock.
    ///
    /// Specs are resolved concurrently, and their results are collected in the order of `specs`
    /// no matter which finishes first, so binaries that share a name keep a stable order in the
    /// lock.  All of them run to completion even if one fails, after which the first failure (in
    /// the order of `specs`) is returned, annotated with the name of the binary it belongs to.
    /// Cancelling `cancel` stops outstanding HTTP requests.
    pub async fn resolve<'a>(
        &self,
        specs: impl IntoIterator<Item = &'a BinarySpec>,
        cancel: &CancellationToken,
    ) -> Result<Lock> {
        let specs: Vec<&BinarySpec> = specs.into_iter().collect();
        tracing::info!(count = specs.len(), "Resolving binaries");

        let results: Vec<Result<BinaryData>> = stream::iter(specs)
            .map(|spec| async move {
                self.reporter.report(|| ResolutionMessage::started(&spec.name));

                let result = self
                    .resolve_binary(spec, cancel)
                    .await
                    .context(error::ResolveBinarySnafu { name: &spec.name });

                match &result {
                    Ok(binary) => self.reporter.report(|| ResolutionMessage::resolved(binary)),
                    Err(e) => {
                        tracing::debug!(name = %spec.name, error = %e, "Failed to resolve binary");
                        self.reporter
                            .report(|| ResolutionMessage::failed(&spec.name, e));
                    }
                }

                result
            })
            .buffered(MAX_CONCURRENCY)
            .collect()
            .await;

        let binaries = results.into_iter().collect::<Result<Vec<_>>>()?;

        Lock::new(binaries)
    }

    /// Resolve a single spec.
    pub async fn resolve_binary(
        &self,
        spec: &BinarySpec,
        cancel: &CancellationToken,
    ) -> Result<BinaryData> {
        let (provider, data) = self.registry.resolve(&spec.provider)?;
        self.reporter
            .report(|| ResolutionMessage::provider_resolved(&spec.name, provider.name()));

        let provider_spec = provider.spec();
        let mut context = TemplateData::with_provider(&data);

        let versions_url = template::render(&provider_spec.versions_url, &context)?;
        let version = version::resolve_version(
            provider.client(),
            &versions_url,
            &provider_spec.versions_json_path,
            spec.version.constraint(),
            spec.version.prefix(),
            cancel,
        )
        .await
        .context(error::ResolveVersionSnafu { url: &versions_url })?;

        tracing::debug!(name = %spec.name, %version, "Resolved version");
        self.reporter.report(|| {
            ResolutionMessage::version_resolved(&spec.name, spec.version.constraint(), &version)
        });

        context = context.version(&version);

        let download_url = template::render(&provider_spec.download_url, &context).context(
            error::RenderDownloadUrlSnafu {
                template: &provider_spec.download_url,
            },
        )?;

        let extract_path = spec
            .extract_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .map(|path| {
                template::render(path, &context)
                    .context(error::RenderExtractPathSnafu { template: path })
            })
            .transpose()?;

        Ok(BinaryData {
            name: display_name(spec, &download_url, extract_path.as_deref()),
            provider: provider.name().to_string(),
            version,
            download_url,
            extract_path,
        })
    }
}

/// The file name a binary is installed as: its `binName`, else its `name`, else the file name of
/// the path it is extracted from, else the file name of the downloaded asset.
fn display_name(spec: &BinarySpec, download_url: &str, extract_path: Option<&str>) -> String {
    if let Some(name) = spec.installed_name() {
        return name.to_string();
    }

    if let Some(file_name) = extract_path
        .and_then(|path| Path::new(path).file_name())
        .and_then(|name| name.to_str())
    {
        return file_name.to_string();
    }

    url::Url::parse(download_url)
        .ok()
        .and_then(|url| {
            url.path_segments()?
                .next_back()
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}
