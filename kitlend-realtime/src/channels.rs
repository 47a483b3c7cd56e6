//! Catalog of the named push channels the portals consume.
//!
//! Each channel fixes both the broker destination and a deterministic
//! subscription id, so repeated subscriptions to the same logical channel
//! overwrite instead of piling up. Two different user-scoped channels can
//! never collide because the id embeds the user id.

/// A named push channel in the lending system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PushChannel {
    /// All rental-request activity, broadcast to admin portals.
    AdminRentalRequests,
    /// System-wide notifications, broadcast to admin portals.
    AdminNotifications,
    /// Per-user notifications.
    UserNotifications { user_id: String },
    /// Per-user rental-request status changes.
    UserRentalRequests { user_id: String },
    /// Per-user wallet balance patches.
    UserWallet { user_id: String },
    /// Per-user wallet transaction feed.
    UserWalletTransactions { user_id: String },
    /// Per-user penalty notices.
    UserPenalties { user_id: String },
    /// Per-user group membership changes.
    UserGroups { user_id: String },
}

impl PushChannel {
    /// The broker destination this channel maps to.
    pub fn destination(&self) -> String {
        match self {
            Self::AdminRentalRequests => "/topic/admin/rental-requests".to_string(),
            Self::AdminNotifications => "/topic/admin/notifications".to_string(),
            Self::UserNotifications { user_id } => format!("/queue/notifications/{user_id}"),
            Self::UserRentalRequests { user_id } => format!("/queue/rental-requests/{user_id}"),
            Self::UserWallet { user_id } => format!("/queue/wallet/{user_id}"),
            Self::UserWalletTransactions { user_id } => {
                format!("/queue/wallet-transactions/{user_id}")
            }
            Self::UserPenalties { user_id } => format!("/queue/penalties/{user_id}"),
            Self::UserGroups { user_id } => format!("/queue/groups/{user_id}"),
        }
    }

    /// The deterministic subscription id for this channel.
    pub fn subscription_id(&self) -> String {
        match self {
            Self::AdminRentalRequests => "admin-rental-requests".to_string(),
            Self::AdminNotifications => "admin-notifications".to_string(),
            Self::UserNotifications { user_id } => format!("user-notifications-{user_id}"),
            Self::UserRentalRequests { user_id } => format!("user-rental-requests-{user_id}"),
            Self::UserWallet { user_id } => format!("user-wallet-{user_id}"),
            Self::UserWalletTransactions { user_id } => {
                format!("user-wallet-transactions-{user_id}")
            }
            Self::UserPenalties { user_id } => format!("user-penalties-{user_id}"),
            Self::UserGroups { user_id } => format!("user-groups-{user_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_id: &str) -> String {
        user_id.to_string()
    }

    #[test]
    fn test_admin_channels() {
        assert_eq!(
            PushChannel::AdminRentalRequests.destination(),
            "/topic/admin/rental-requests"
        );
        assert_eq!(
            PushChannel::AdminRentalRequests.subscription_id(),
            "admin-rental-requests"
        );
        assert_eq!(
            PushChannel::AdminNotifications.destination(),
            "/topic/admin/notifications"
        );
        assert_eq!(
            PushChannel::AdminNotifications.subscription_id(),
            "admin-notifications"
        );
    }

    #[test]
    fn test_user_channel_patterns() {
        let cases = [
            (
                PushChannel::UserNotifications { user_id: user("42") },
                "/queue/notifications/42",
                "user-notifications-42",
            ),
            (
                PushChannel::UserRentalRequests { user_id: user("42") },
                "/queue/rental-requests/42",
                "user-rental-requests-42",
            ),
            (
                PushChannel::UserWallet { user_id: user("42") },
                "/queue/wallet/42",
                "user-wallet-42",
            ),
            (
                PushChannel::UserWalletTransactions { user_id: user("42") },
                "/queue/wallet-transactions/42",
                "user-wallet-transactions-42",
            ),
            (
                PushChannel::UserPenalties { user_id: user("42") },
                "/queue/penalties/42",
                "user-penalties-42",
            ),
            (
                PushChannel::UserGroups { user_id: user("42") },
                "/queue/groups/42",
                "user-groups-42",
            ),
        ];
        for (channel, destination, id) in cases {
            assert_eq!(channel.destination(), destination);
            assert_eq!(channel.subscription_id(), id);
        }
    }

    #[test]
    fn test_user_scoped_ids_do_not_collide() {
        let a = PushChannel::UserWallet { user_id: user("1") }.subscription_id();
        let b = PushChannel::UserWallet { user_id: user("2") }.subscription_id();
        let c = PushChannel::UserPenalties { user_id: user("1") }.subscription_id();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
