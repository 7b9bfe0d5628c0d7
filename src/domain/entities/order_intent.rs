use serde::{Deserialize, Serialize};

/// What a caller is trying to pay for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderIntent {
    Purchase,
    Playlist,
    Merch,
    SubscriptionNew,
    SubscriptionUpgrade,
    SubscriptionDowngrade,
}

impl OrderIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderIntent::Purchase => "purchase",
            OrderIntent::Playlist => "playlist",
            OrderIntent::Merch => "merch",
            OrderIntent::SubscriptionNew => "subscription_new",
            OrderIntent::SubscriptionUpgrade => "subscription_upgrade",
            OrderIntent::SubscriptionDowngrade => "subscription_downgrade",
        }
    }

    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            OrderIntent::SubscriptionNew
                | OrderIntent::SubscriptionUpgrade
                | OrderIntent::SubscriptionDowngrade
        )
    }
}

impl std::fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
