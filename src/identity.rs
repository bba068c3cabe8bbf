use std::{fmt, sync::Arc};

/// Random token naming this process on the broadcast bus.
///
/// Generated once in `main` and handed to every component that must tell its own swap
/// requests apart from a peer's.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessIdentity(Arc<str>);

impl ProcessIdentity {
    pub fn generate() -> Self {
        Self(Arc::from(uuid::Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `origin_id` names this process.
    pub fn is_origin_of(&self, origin_id: &str) -> bool {
        self.as_str() == origin_id
    }
}

impl From<&str> for ProcessIdentity {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
