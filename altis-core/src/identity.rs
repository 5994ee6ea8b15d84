use serde::{Deserialize, Serialize};

/// Who is asking, as resolved by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Requester {
    /// Signed-in customer. The only kind allowed to book.
    Customer(String),
    /// Anonymous session. May view and lock.
    Guest(String),
}

impl Requester {
    /// Identifier used as the lock owner.
    pub fn owner_id(&self) -> &str {
        match self {
            Requester::Customer(id) | Requester::Guest(id) => id,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Requester::Customer(_))
    }
}
