use serde::{Deserialize, Serialize};

/// Key prefix that marks a placeholder identity in persisted form.
pub const PLACEHOLDER_PREFIX: &str = "temp_";

/// A tracked player key.
///
/// `Stable` holds a numeric platform account id (validated digits only).
/// `Placeholder` holds the in-game display name of a player whose stable id is not linked yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PlayerId {
    Stable(String),
    Placeholder(String),
}

impl PlayerId {
    /// Build a stable id, rejecting anything that is not fully numeric.
    pub fn stable(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if is_numeric_id(raw) {
            Some(PlayerId::Stable(raw.to_string()))
        } else {
            None
        }
    }

    pub fn placeholder(display_name: &str) -> Self {
        PlayerId::Placeholder(display_name.to_string())
    }

    /// Parse the persisted key form (`temp_<name>` or digits).
    pub fn parse_key(key: &str) -> Option<Self> {
        match key.strip_prefix(PLACEHOLDER_PREFIX) {
            Some(name) if !name.is_empty() => Some(PlayerId::placeholder(name)),
            Some(_) => None,
            None => PlayerId::stable(key),
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            PlayerId::Stable(id) => id.clone(),
            PlayerId::Placeholder(name) => format!("{}{}", PLACEHOLDER_PREFIX, name),
        }
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, PlayerId::Stable(_))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, PlayerId::Placeholder(_))
    }
}

/// Numeric id check used for every id read from the feed or an operator.
pub fn is_numeric_id(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit())
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerId::Stable(id) => write!(f, "{}", id),
            PlayerId::Placeholder(name) => write!(f, "{}{}", PLACEHOLDER_PREFIX, name),
        }
    }
}

impl TryFrom<String> for PlayerId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        PlayerId::parse_key(&value).ok_or_else(|| format!("not a player key: {:?}", value))
    }
}

impl From<PlayerId> for String {
    fn from(id: PlayerId) -> Self {
        id.as_key()
    }
}
