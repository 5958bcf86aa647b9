use crate::{InterfaceId, LinkId, TagType};

/// Describes which entity had its tags changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagChange {
    /// The tags of an interface pool changed.
    Interface {
        /// The interface whose pool changed.
        id: InterfaceId,
        /// The tag type that changed.
        tag_type: TagType,
    },
    /// Tags were allocated or released on both endpoints of a link.
    Link {
        /// The link the operation ran on.
        id: LinkId,
        /// The tag type that changed.
        tag_type: TagType,
    },
}

/// Receives a notification after every mutation of a pool or a link. Called outside of
/// every lock, so implementations may call back into the pool.
pub trait TagNotifier: Send + Sync + 'static {
    /// Called once per successful mutation.
    fn tags_changed(&self, change: &TagChange);
}

impl<F> TagNotifier for F
where
    F: Fn(&TagChange) + Send + Sync + 'static,
{
    fn tags_changed(&self, change: &TagChange) {
        self(change)
    }
}

/// A notifier that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl TagNotifier for NoopNotifier {
    fn tags_changed(&self, _: &TagChange) {}
}
