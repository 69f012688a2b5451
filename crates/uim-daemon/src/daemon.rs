//! Composition root of the daemon.
//!
//! ```text
//! SmartCardPoller ──► SmartCardSource ──┐
//!                                       ├──► SourceGroup ──► EventPublisher ──► monitors
//! mount roots ──────► MassStorageSource ┘         ▲
//!                                                 └── GroupBackend ◄── UnixServer ◄── clients
//! ```
//!
//! Everything lives on the consumer context: the daemon must be created
//! and run inside a tokio `LocalSet`.

use anyhow::Context;
use std::path::Path;
use std::rc::Rc;
use tokio::sync::mpsc;
use tracing::info;
use uim_core::{Configuration, IdentifiedUser};
use uim_hardware::{CardReaderSubsystem, SmartCardPoller};
use uim_network::{ManagerBackend, UnixServer};
use uim_sources::{
    IdentificationSource, MassStorageSource, SmartCardSource, SourceGroup, SubscriptionId,
};

/// Requests delivered to a running daemon, normally by signal handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Re-read the configuration file and apply the source selection.
    Reload,
    Quit,
}

/// Exposes a [`SourceGroup`] to the service.
pub struct GroupBackend(Rc<SourceGroup>);

impl ManagerBackend for GroupBackend {
    fn identified_users(&self) -> Vec<IdentifiedUser> {
        self.0.identified_users()
    }

    fn sources(&self) -> (Vec<String>, Vec<String>) {
        (self.0.enabled_names(), self.0.disabled_names())
    }
}

pub struct Daemon {
    config: Configuration,
    group: Rc<SourceGroup>,
    server: UnixServer,
    subscription: SubscriptionId,
}

impl Daemon {
    /// Build all sources on top of `card_readers`, bind the service socket
    /// and enable the configured sources.
    ///
    /// # Errors
    ///
    /// Fails only if the service socket cannot be bound. An unusable card
    /// reader subsystem leaves the smart card source inert instead.
    pub fn new<S: CardReaderSubsystem>(config: Configuration, card_readers: S) -> anyhow::Result<Self> {
        let poller = Rc::new(SmartCardPoller::new(card_readers));

        let sources: Vec<Box<dyn IdentificationSource>> = vec![
            Box::new(MassStorageSource::new(config.mass_storage.clone())),
            Box::new(SmartCardSource::new(poller)),
        ];
        let group = SourceGroup::new(sources, config.daemon.max_saved_identified_users);

        let server = UnixServer::bind(&config.daemon.socket_path).with_context(|| {
            format!(
                "failed to listen on {}",
                config.daemon.socket_path.display()
            )
        })?;

        let publisher = server.publisher();
        let subscription = group.subscribe(move |user| {
            publisher.publish(user);
        });

        group.enable(&config.sources.enable);
        info!(
            enabled = ?group.enabled_names(),
            disabled = ?group.disabled_names(),
            "Identification sources ready"
        );

        Ok(Self {
            config,
            group,
            server,
            subscription,
        })
    }

    pub fn group(&self) -> &Rc<SourceGroup> {
        &self.group
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn socket_path(&self) -> &Path {
        self.server.path()
    }

    /// Serve clients until `Quit` is received or every control sender is
    /// gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the service socket stops accepting connections.
    pub async fn run(&mut self, mut control: mpsc::Receiver<Control>) -> anyhow::Result<()> {
        let Self {
            config,
            group,
            server,
            ..
        } = self;

        let service = server.run(Rc::new(GroupBackend(Rc::clone(group))));
        tokio::pin!(service);

        loop {
            tokio::select! {
                result = &mut service => {
                    return result.context("service socket failed");
                }
                command = control.recv() => match command {
                    Some(Control::Reload) => reload(config, group),
                    Some(Control::Quit) | None => {
                        info!("Quitting");
                        return Ok(());
                    }
                },
            }
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.group.unsubscribe(self.subscription);
    }
}

/// Re-read the configuration file and re-apply the source selection.
///
/// The history capacity, socket path and mount settings stay as they were
/// at startup.
fn reload(config: &mut Configuration, group: &SourceGroup) {
    info!("Reloading {}", config.config_file.display());

    let new_config = Configuration::from_file(&config.config_file);
    group.enable(&new_config.sources.enable);

    info!(
        enabled = ?group.enabled_names(),
        disabled = ?group.disabled_names(),
        "Configuration reloaded"
    );

    config.sources = new_config.sources;
}
