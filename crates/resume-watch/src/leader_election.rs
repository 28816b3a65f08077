//! Leader election contract
//!
//! Controllers built on the watch engine use a renewable, time-boxed Lease in
//! the same store to make sure only one instance is active. The election
//! algorithm itself lives behind [`LeaderElector`]; this module defines its
//! configuration surface, the events it emits, and [`LeaseObserver`], which
//! derives those events from Lease notifications delivered by a watch.

use crate::error::{ConfigError, WatchError};
use crate::notification::ChangeNotification;
use k8s_openapi::api::coordination::v1::Lease;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Leader election errors
#[derive(Debug, Error)]
pub enum LeaderElectionError {
    /// Invalid election configuration
    #[error("invalid leader election config: {0}")]
    Config(#[from] ConfigError),

    /// The lease watch failed
    #[error("lease watch failed: {0}")]
    Watch(#[from] WatchError),
}

/// Configuration consumed by leader electors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    /// Namespace of the Lease object
    pub namespace: String,
    /// Name of the Lease object
    pub lease_name: String,
    /// Globally unique identity of this candidate
    pub identity: String,
    /// How long a granted lease is valid without renewal
    pub lease_duration: Duration,
    /// How long the leader keeps retrying renewal before stepping down
    pub renew_deadline: Duration,
    /// Pause between election attempts
    pub retry_period: Duration,
}

impl LeaderElectionConfig {
    /// Create a config with the conventional 15s lease, 10s renew deadline
    /// and 2s retry period.
    pub fn new(
        namespace: impl Into<String>,
        lease_name: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            lease_name: lease_name.into(),
            identity: identity.into(),
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
        }
    }

    /// Check the invariants every elector relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("namespace", &self.namespace),
            ("lease_name", &self.lease_name),
            ("identity", &self.identity),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key.to_string()));
            }
        }
        for (key, value) in [
            ("lease_duration", self.lease_duration),
            ("renew_deadline", self.renew_deadline),
            ("retry_period", self.retry_period),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(key, "0s", "must be positive"));
            }
        }
        if self.renew_deadline >= self.lease_duration {
            return Err(ConfigError::invalid(
                "renew_deadline",
                &format!("{:?}", self.renew_deadline),
                format!("must be less than lease_duration ({:?})", self.lease_duration),
            ));
        }
        if self.retry_period >= self.renew_deadline {
            return Err(ConfigError::invalid(
                "retry_period",
                &format!("{:?}", self.retry_period),
                format!("must be less than renew_deadline ({:?})", self.renew_deadline),
            ));
        }
        Ok(())
    }
}

/// Leadership notifications consumed by controller code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipEvent {
    /// This candidate became leader
    Promoted,
    /// This candidate stopped being leader
    Demoted,
    /// The lease holder changed (`None`: nobody holds the lease)
    LeaderChanged {
        /// New holder identity
        holder: Option<String>,
    },
}

/// Contract for lease-based leader election implementations.
#[async_trait::async_trait]
pub trait LeaderElector: Send + Sync {
    /// Configuration this elector campaigns with.
    fn config(&self) -> &LeaderElectionConfig;

    /// Campaign for leadership until `cancel` fires, reporting transitions on
    /// `events`. A leader must emit `Demoted` before returning.
    async fn run(
        &self,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<LeadershipEvent>,
    ) -> Result<(), LeaderElectionError>;
}

/// Derives leadership events for one candidate from Lease notifications.
#[derive(Debug, Clone)]
pub struct LeaseObserver {
    identity: String,
    holder: Option<String>,
    leading: bool,
}

impl LeaseObserver {
    /// Observer for the candidate named `identity`; nobody holds the lease yet.
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            holder: None,
            leading: false,
        }
    }

    /// Whether the last observed holder is this candidate.
    pub fn is_leader(&self) -> bool {
        self.leading
    }

    /// Last observed holder.
    pub fn holder(&self) -> Option<&str> {
        self.holder.as_deref()
    }

    /// Fold one notification into the observed state.
    ///
    /// Returns the resulting transitions, `Demoted` before `LeaderChanged`
    /// before `Promoted`. Repeats of the current holder produce nothing.
    pub fn observe(&mut self, notification: &ChangeNotification<Lease>) -> Vec<LeadershipEvent> {
        let holder = match notification {
            ChangeNotification::Added(lease) | ChangeNotification::Modified(lease) => lease
                .spec
                .as_ref()
                .and_then(|spec| spec.holder_identity.clone())
                .filter(|holder| !holder.is_empty()),
            ChangeNotification::Deleted(_) => None,
            ChangeNotification::Bookmark { .. } | ChangeNotification::Error(_) => return Vec::new(),
        };

        if holder == self.holder {
            return Vec::new();
        }
        debug!(previous = ?self.holder, current = ?holder, "Lease holder changed");

        let mut events = Vec::new();
        let leading = holder.as_deref() == Some(self.identity.as_str());
        if self.leading && !leading {
            events.push(LeadershipEvent::Demoted);
        }
        events.push(LeadershipEvent::LeaderChanged {
            holder: holder.clone(),
        });
        if leading && !self.leading {
            events.push(LeadershipEvent::Promoted);
        }

        self.holder = holder;
        self.leading = leading;
        events
    }
}
