//! certwarden: certificate lifecycle scheduler
//!
//! Decides, once per pass, which certificate instances to issue, prepublish
//! in DNS, distribute, expire, archive and delete, and which local
//! certificates need a human reminder. Rollover is make-before-break: a
//! successor's TLSA fingerprint is published next to the serving one before
//! the successor is ever deployed.
//!
//! # Architecture
//!
//! - [`engine`]: retention, rollover state machine, reminder batching and
//!   the deferred applier, driven by [`PassScheduler`]
//! - [`collab`]: traits for everything with side effects, plus hook-based
//!   implementations
//! - [`store`]: persistent certificate and instance records
//! - [`daemon`]: periodic passes until shutdown
//!
//! # Example
//!
//! ```ignore
//! use certwarden::{build_collaborators, PassScheduler, SchedulerSettings};
//! use certwarden_common::ExecutionMode;
//!
//! let config = certwarden_config::Config::from_file("/etc/certwarden.kdl")?;
//! let scheduler = PassScheduler::new(
//!     build_collaborators(&config)?,
//!     SchedulerSettings::from_config(&config),
//! );
//! let report = scheduler.run(ExecutionMode::Preview).await?;
//! println!("{report}");
//! ```

pub mod clock;
pub mod collab;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod store;

use std::sync::Arc;

pub use clock::{Clock, FixedClock, SystemClock};
pub use collab::Collaborators;
pub use daemon::ScheduleLoop;
pub use engine::{PassReport, PassScheduler, SchedulerSettings};
pub use error::{CollaboratorError, ScheduleError, StoreError};

use certwarden_config::Config;

use collab::{CommandMailer, HookCommand, HookDistributor, HookDnsPublisher, HookIssuer};
use store::{FileStore, InstanceStore};

/// Wire the file store, the configured hooks and the system clock
pub fn build_collaborators(config: &Config) -> Result<Collaborators, StoreError> {
    let store: Arc<dyn InstanceStore> = Arc::new(FileStore::open(&config.storage.path)?);
    Ok(collaborators_with_store(config, store, Arc::new(SystemClock)))
}

/// Wire the configured hooks around an existing store and clock
pub fn collaborators_with_store(
    config: &Config,
    store: Arc<dyn InstanceStore>,
    clock: Arc<dyn Clock>,
) -> Collaborators {
    let timeout = config.hooks.timeout();
    let hook = |name: &'static str, command: &Option<String>| {
        HookCommand::from_config(name, command.as_deref(), timeout)
    };

    let mail_command = config
        .mail
        .as_ref()
        .and_then(|mail| mail.command.as_deref())
        .map(|command| HookCommand::new("mail", command, timeout));

    Collaborators {
        issuer: Arc::new(HookIssuer::new(hook("issue", &config.hooks.issue), store.clone())),
        distributor: Arc::new(HookDistributor::new(hook("deploy", &config.hooks.deploy))),
        dns: Arc::new(HookDnsPublisher::new(hook(
            "publish-tlsa",
            &config.hooks.publish_tlsa,
        ))),
        mailer: Arc::new(CommandMailer::new(mail_command)),
        store,
        clock,
    }
}
