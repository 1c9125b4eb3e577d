pub mod cli;
pub mod config;
pub mod dsn;
pub mod error;
pub mod http;
pub mod install;
pub mod lock;
#[cfg(test)]
pub(crate) mod logging;
pub mod messages;
pub mod provider;
pub mod resolver;
pub mod template;
pub mod version;

pub use error::{Error, Result};

use config::Config;
use install::Installer;
use lock::Lock;
use messages::{LockMessage, MessageReporter};
use provider::ProviderRegistry;
use resolver::Resolver;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

/// Instance of the engine that powers the `prebuilt` tool.
///
/// This is packaged this way so that the binary's `main.rs` stays minimal, and so that other tools
/// can embed the lock and install logic directly.
pub struct Prebuilt {
    config: Config,
    lock_path: PathBuf,
    resolver: Resolver,
    installer: Installer,
    reporter: MessageReporter,
}

impl Prebuilt {
    /// Create a new instance from a loaded configuration.
    ///
    /// `config_path` is where the configuration was loaded from; the lockfile is kept next to it.
    pub fn new(config: Config, config_path: &Path, reporter: MessageReporter) -> Result<Self> {
        tracing::debug!("Using config: {:#?}", config);

        let registry = Arc::new(ProviderRegistry::init(&config.providers, &config.http)?);
        let install_dir = config.global.install_dir()?;

        Ok(Self {
            lock_path: lock::lock_path(config_path),
            resolver: Resolver::new(Arc::clone(&registry), reporter.clone()),
            installer: Installer::new(registry, install_dir, reporter.clone()),
            reporter,
            config,
        })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn install_dir(&self) -> &Path {
        self.installer.install_dir()
    }

    /// Resolve every configured binary and write the lockfile.
    ///
    /// If any binary fails to resolve, nothing is written.
    pub async fn lock(&self, cancel: &CancellationToken) -> Result<Lock> {
        let lock = self.resolver.resolve(&self.config.binaries, cancel).await?;
        lock.write(&self.lock_path)?;

        tracing::info!(
            path = %self.lock_path.display(),
            digest = %lock.digest,
            "Wrote lockfile"
        );
        self.reporter.report(|| {
            LockMessage::written(&self.lock_path, &lock.digest, lock.binaries.len())
        });

        Ok(lock)
    }

    /// Install the binaries named `names`, or all configured binaries if `names` is empty.
    ///
    /// If `use_lock` is set and the lockfile exists, the locked versions are installed without
    /// contacting any provider's version listing.  Otherwise the binaries are resolved first; the
    /// lockfile is not written in that case.
    ///
    /// Returns the paths the binaries were installed to.
    pub async fn install(
        &self,
        names: &[String],
        use_lock: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        let binaries = if use_lock && self.lock_path.is_file() {
            let lock = Lock::read(&self.lock_path)?;
            self.reporter.report(|| {
                LockMessage::loaded(&self.lock_path, &lock.digest, lock.binaries.len())
            });

            install::select_locked(&lock, &self.lock_path, &self.config, names)?
        } else {
            tracing::info!(
                path = %self.lock_path.display(),
                "No lockfile in use, resolving binaries"
            );

            let specs = install::select_specs(&self.config, names)?;
            self.resolver.resolve(specs, cancel).await?.binaries
        };

        self.installer.install(&binaries, cancel).await
    }
}
