use tessera_core::ExtensionIdentity;
use uuid::Uuid;

/// `env` namespace: facts about the running host.
#[derive(Debug, Clone)]
pub struct EnvApi {
    identity: Option<ExtensionIdentity>,
    scheme: String,
    session_id: Uuid,
}

impl EnvApi {
    pub(crate) fn create(identity: Option<&ExtensionIdentity>, scheme: &str, session_id: Uuid) -> Self {
        Self {
            identity: identity.cloned(),
            scheme: scheme.to_string(),
            session_id,
        }
    }

    /// Extension this API is attributed to, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&ExtensionIdentity> {
        self.identity.as_ref()
    }

    /// Scheme served by the layered filesystem.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Unique per host instance.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}
