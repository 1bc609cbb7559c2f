//! Fix-once session identifier.

/// A session id that starts unknown and can be set exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    id: Option<String>,
}

impl SessionIdentity {
    /// An identity with no id yet.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// An identity that may already be known (e.g. when resuming).
    #[must_use]
    pub fn from_option(id: Option<String>) -> Self {
        Self { id }
    }

    /// Fix the id if it is still unknown.
    ///
    /// Returns `true` only for the call that actually fixed it.
    pub fn fix(&mut self, id: &str) -> bool {
        if self.id.is_some() {
            return false;
        }
        self.id = Some(id.to_string());
        true
    }

    #[must_use]
    pub fn get(&self) -> Option<&str> {
        self.id.as_deref()
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn into_inner(self) -> Option<String> {
        self.id
    }
}

/// Reduce an id to characters safe for a file name.
#[must_use]
pub fn sanitize_for_filename(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
