//! Create-or-attach provisioning of backend resources.
//!
//! Adapters describe their backend's control plane through [`ControlPlane`]
//! and call [`provision`] once at construction. With creation allowed the
//! protocol is: look the resource up, create it when absent, and treat an
//! "already exists" answer from a concurrent creator as success. With
//! creation forbidden the resource must already exist.
//!
//! Consumers never create what they read from; they call [`require`] before
//! declaring anything of their own.

use tracing::{debug, info};

use crate::error::{NotificationError, Result, TransportError};

/// Kind of resource being provisioned, used in error messages and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    PubSubTopic,
    PullQueue,
    Exchange,
    JmsTopic,
    LogTopic,
}

impl ResourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::PubSubTopic => "AWS SNS topic",
            ResourceKind::PullQueue => "AWS SQS queue",
            ResourceKind::Exchange => "RabbitMQ exchange",
            ResourceKind::JmsTopic => "ActiveMQ topic",
            ResourceKind::LogTopic => "Kafka topic",
        }
    }
}

/// The two control-plane calls provisioning needs.
pub trait ControlPlane {
    /// Backend identifier of a provisioned resource (ARN, URL, name).
    type Handle;

    /// Find an existing resource by name.
    fn lookup(&self, name: &str) -> std::result::Result<Option<Self::Handle>, TransportError>;

    /// Create a resource. May answer [`TransportError::AlreadyExists`].
    fn create(&self, name: &str) -> std::result::Result<Self::Handle, TransportError>;
}

/// Resolve the handle for `name`, creating the resource if allowed.
pub fn provision<C: ControlPlane>(
    plane: &C,
    kind: ResourceKind,
    name: &str,
    allow_create: bool,
) -> Result<C::Handle> {
    if let Some(handle) = plane.lookup(name)? {
        debug!(resource = kind.label(), name, "attached to existing resource");
        return Ok(handle);
    }

    if !allow_create {
        return Err(NotificationError::CreationNotPermitted {
            resource: kind.label(),
            name: name.to_string(),
        });
    }

    match plane.create(name) {
        Ok(handle) => {
            info!(resource = kind.label(), name, "created resource");
            Ok(handle)
        }
        Err(TransportError::AlreadyExists(_)) => {
            debug!(resource = kind.label(), name, "resource created concurrently");
            plane.lookup(name)?.ok_or_else(|| {
                NotificationError::Transport(format!(
                    "{} {} reported as existing but cannot be found",
                    kind.label(),
                    name
                ))
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Fail unless a resource a consumer attaches to already exists.
///
/// A missing resource is reported as [`NotificationError::CreationNotPermitted`]
/// when the backend may not create it, and as a transport error otherwise
/// (the producer side has not provisioned it yet).
pub fn require(kind: ResourceKind, name: &str, exists: bool, allow_create: bool) -> Result<()> {
    if exists {
        return Ok(());
    }
    if !allow_create {
        return Err(NotificationError::CreationNotPermitted {
            resource: kind.label(),
            name: name.to_string(),
        });
    }
    Err(NotificationError::Transport(format!(
        "{} {} does not exist",
        kind.label(),
        name
    )))
}

/// A control plane built from two closures.
pub struct FnControlPlane<L, C> {
    lookup: L,
    create: C,
}

impl<L, C> FnControlPlane<L, C> {
    pub fn new(lookup: L, create: C) -> Self {
        Self { lookup, create }
    }
}

impl<H, L, C> ControlPlane for FnControlPlane<L, C>
where
    L: Fn(&str) -> std::result::Result<Option<H>, TransportError>,
    C: Fn(&str) -> std::result::Result<H, TransportError>,
{
    type Handle = H;

    fn lookup(&self, name: &str) -> std::result::Result<Option<H>, TransportError> {
        (self.lookup)(name)
    }

    fn create(&self, name: &str) -> std::result::Result<H, TransportError> {
        (self.create)(name)
    }
}
