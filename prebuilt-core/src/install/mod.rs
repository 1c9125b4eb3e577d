//! Downloading, extracting and installing resolved binaries.
mod archive;
mod atomic;
mod download;

use crate::{
    Result,
    config::{BinarySpec, Config},
    error,
    lock::{BinaryData, Lock},
    messages::{InstallMessage, MessageReporter},
    provider::ProviderRegistry,
};
use snafu::ResultExt;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;

/// Installs resolved binaries into a directory.
#[derive(Debug, Clone)]
pub struct Installer {
    registry: Arc<ProviderRegistry>,
    install_dir: PathBuf,
    reporter: MessageReporter,
}

impl Installer {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        install_dir: PathBuf,
        reporter: MessageReporter,
    ) -> Self {
        Self {
            registry,
            install_dir,
            reporter,
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Install every binary in `binaries`, each in its own task.
    ///
    /// A failing binary does not stop the others.  Once all of them have been attempted, returns
    /// the installed paths in the order of `binaries`, or [`error::Error::InstallFailed`] naming
    /// every binary that failed.  Details of each failure are logged and reported.
    pub async fn install(
        &self,
        binaries: &[BinaryData],
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        tracing::info!(
            count = binaries.len(),
            install_dir = %self.install_dir.display(),
            "Installing binaries"
        );

        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::new();
        for (index, binary) in binaries.iter().enumerate() {
            let installer = self.clone();
            let binary = binary.clone();
            let cancel = cancel.clone();

            let handle =
                tasks.spawn(async move { installer.try_install_binary(&binary, &cancel).await });
            spawned.insert(handle.id(), index);
        }

        let mut installed = vec![None; binaries.len()];
        let mut failed = Vec::new();

        for (index, result) in join_each(tasks, spawned).await {
            let name = &binaries[index].name;

            match result.context(error::InstallBinarySnafu { name }) {
                Ok(path) => installed[index] = Some(path),
                Err(e) => {
                    tracing::error!(
                        name = %name,
                        metadata = ?e.metadata(),
                        "Failed to install binary: {}",
                        e
                    );
                    self.reporter.report(|| InstallMessage::failed(name, &e));
                    failed.push(name.clone());
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            return error::InstallFailedSnafu { names: failed }.fail();
        }

        Ok(installed.into_iter().flatten().collect())
    }

    /// Download, optionally extract, and install a single binary.
    pub async fn install_binary(
        &self,
        binary: &BinaryData,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.try_install_binary(binary, cancel)
            .await
            .context(error::InstallBinarySnafu { name: &binary.name })
    }

    async fn try_install_binary(
        &self,
        binary: &BinaryData,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let parent = std::env::temp_dir();
        let scratch = tempfile::Builder::new()
            .prefix("prebuilt-")
            .tempdir_in(&parent)
            .context(error::TempDirCreationSnafu { parent })?;

        self.reporter
            .report(|| InstallMessage::downloading(&binary.name, &binary.download_url));

        let client = self.registry.client(&binary.provider);
        let downloaded = download::download(client, &binary.download_url, scratch.path(), cancel)
            .await
            .context(error::DownloadAssetSnafu {
                url: &binary.download_url,
            })?;

        let file = match binary.extract_path.as_deref().filter(|path| !path.is_empty()) {
            Some(member) => {
                self.reporter
                    .report(|| InstallMessage::extracting(&binary.name, member));

                let member = member.to_string();
                tokio::task::spawn_blocking(move || archive::extract_member(&downloaded, &member))
                    .await
                    .context(error::TokioJoinSnafu)??
            }
            None => downloaded,
        };

        if cancel.is_cancelled() {
            return error::CancelledSnafu.fail();
        }

        let dest = self
            .install_dir
            .join(format!("{}{}", binary.name, std::env::consts::EXE_SUFFIX));
        let target = dest.clone();
        tokio::task::spawn_blocking(move || atomic::install(&file, &target))
            .await
            .context(error::TokioJoinSnafu)??;

        tracing::info!(
            name = %binary.name,
            version = %binary.version,
            path = %dest.display(),
            "Installed binary"
        );
        self.reporter
            .report(|| InstallMessage::installed(&binary.name, &binary.version, &dest));

        Ok(dest)
    }
}

/// Wait for every task in `tasks` and pair each outcome with the index it was spawned for.
///
/// A task that panicked or was aborted counts as a failure of its own index; the remaining tasks
/// keep running.
async fn join_each<T: 'static>(
    mut tasks: JoinSet<Result<T>>,
    mut spawned: HashMap<task::Id, usize>,
) -> Vec<(usize, Result<T>)> {
    let mut outcomes = Vec::with_capacity(spawned.len());

    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => (e.id(), Err(error::Error::TokioJoin { source: e })),
        };

        match spawned.remove(&id) {
            Some(index) => outcomes.push((index, result)),
            None => tracing::warn!(%id, "Finished task was not spawned for a binary"),
        }
    }

    outcomes
}

/// The configured binaries to resolve for `names`, or all of them if `names` is empty.
pub fn select_specs<'a>(config: &'a Config, names: &[String]) -> Result<Vec<&'a BinarySpec>> {
    if names.is_empty() {
        return Ok(config.binaries.iter().collect());
    }

    names
        .iter()
        .map(|name| {
            config
                .binary(name)
                .ok_or_else(|| error::Error::NameNotFound { name: name.clone() })
        })
        .collect()
}

/// The locked binaries for `names`, or all of them if `names` is empty.
///
/// Names are the ones binaries have in the configuration; each is mapped to the name it was
/// locked under, which differs when the binary sets `binName`.
pub fn select_locked(
    lock: &Lock,
    lock_path: &Path,
    config: &Config,
    names: &[String],
) -> Result<Vec<BinaryData>> {
    if names.is_empty() {
        return Ok(lock.binaries.clone());
    }

    select_specs(config, names)?
        .into_iter()
        .map(|spec| {
            let locked_name = spec.installed_name().unwrap_or(spec.name.as_str());
            lock.get(locked_name)
                .cloned()
                .ok_or_else(|| error::Error::NameNotLocked {
                    name: spec.name.clone(),
                    path: lock_path.to_path_buf(),
                })
        })
        .collect()
}
