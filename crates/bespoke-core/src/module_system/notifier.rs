use std::fmt;

use tokio::sync::mpsc;

use crate::kernel::constants;

/// Announcement sent to the external system of record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteAction {
    /// A module was added, carries the metadata location
    Add(String),
    /// A module was removed, carries its identifier
    Remove(String),
    Enable(String),
    Disable(String),
}

impl RemoteAction {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteAction::Add(_) => "add",
            RemoteAction::Remove(_) => "remove",
            RemoteAction::Enable(_) => "enable",
            RemoteAction::Disable(_) => "disable",
        }
    }

    pub fn argument(&self) -> &str {
        match self {
            RemoteAction::Add(arg)
            | RemoteAction::Remove(arg)
            | RemoteAction::Enable(arg)
            | RemoteAction::Disable(arg) => arg,
        }
    }

    /// `<base><scheme><action>:<argument>`
    pub fn to_protocol_uri(&self, base: &str, scheme: &str) -> String {
        format!("{}{}{}:{}", base, scheme, self.name(), self.argument())
    }

    /// Parse a protocol URI back into an action.
    ///
    /// Accepts the full URI or only the part starting at `scheme`. The
    /// argument is everything after the action, so it may contain `:`.
    pub fn parse_protocol(uri: &str, scheme: &str) -> Option<Self> {
        let start = uri.find(scheme)?;
        let rest = &uri[start + scheme.len()..];
        let (action, argument) = rest.split_once(':')?;
        if argument.is_empty() {
            return None;
        }
        let argument = argument.to_string();
        match action {
            "add" => Some(RemoteAction::Add(argument)),
            "remove" => Some(RemoteAction::Remove(argument)),
            "enable" => Some(RemoteAction::Enable(argument)),
            "disable" => Some(RemoteAction::Disable(argument)),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.argument())
    }
}

/// One-way channel to the external system of record.
///
/// Notifications are best effort: implementations must not block and must
/// swallow their own failures.
pub trait RemoteNotifier: Send + Sync {
    fn notify(&self, action: RemoteAction);
}

/// Drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl RemoteNotifier for NoopNotifier {
    fn notify(&self, action: RemoteAction) {
        log::trace!("Dropping notification {}", action);
    }
}

/// Forwards notifications into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<RemoteAction>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RemoteNotifier for ChannelNotifier {
    fn notify(&self, action: RemoteAction) {
        if let Err(e) = self.tx.send(action) {
            log::debug!("Notification receiver gone, dropping {}", e.0);
        }
    }
}

type Opener = Box<dyn Fn(&str) + Send + Sync>;

/// Formats notifications as protocol URIs and hands them to an opener
pub struct ProtocolNotifier {
    base: String,
    scheme: String,
    opener: Opener,
}

impl ProtocolNotifier {
    pub fn new(base: impl Into<String>, scheme: impl Into<String>, opener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            base: base.into(),
            scheme: scheme.into(),
            opener: Box::new(opener),
        }
    }

    /// Notifier using the default proxy endpoint
    pub fn with_defaults(opener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self::new(constants::PROTOCOL_BASE, constants::PROTOCOL_SCHEME, opener)
    }

    pub fn uri_for(&self, action: &RemoteAction) -> String {
        action.to_protocol_uri(&self.base, &self.scheme)
    }
}

impl RemoteNotifier for ProtocolNotifier {
    fn notify(&self, action: RemoteAction) {
        let uri = self.uri_for(&action);
        log::debug!("Opening {}", uri);
        (self.opener)(&uri);
    }
}

impl fmt::Debug for ProtocolNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolNotifier")
            .field("base", &self.base)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}
