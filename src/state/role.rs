//! Roles and deep links.
//!
//! The role of the authenticated user decides which request list a
//! notification opens, and whether the filtered DRH feed applies.

use super::{DemandeId, NotificationId};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Role of the authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum Role {
    /// Regular employee.
    #[serde(rename = "EMPLOYE")]
    #[strum(serialize = "EMPLOYE")]
    Employe,
    /// Line manager, reviews the requests of their team.
    #[serde(rename = "CHEF")]
    #[strum(serialize = "CHEF")]
    Chef,
    /// HR manager, reviews everything.
    #[serde(rename = "DRH")]
    #[strum(serialize = "DRH")]
    Drh,
    /// Handles same-day check-in/out; has no request list of its own.
    #[serde(rename = "CONCIERGE")]
    #[strum(serialize = "CONCIERGE")]
    Concierge,
}

impl Role {
    /// Route of the request list this role lands on when opening a
    /// notification. `None` for roles without a target list.
    pub fn demandes_route(&self) -> Option<&'static str> {
        match self {
            Role::Chef => Some("/chef/demandes"),
            Role::Drh => Some("/drh/demandes"),
            Role::Employe => Some("/demandes-et-solde"),
            Role::Concierge => None,
        }
    }

    /// Only the DRH gets the filtered feed and the attention queue.
    pub fn uses_filtered_feed(&self) -> bool {
        matches!(self, Role::Drh)
    }
}

/// Target resolved from a notification click: the per-role request list
/// with the request id as a query parameter for deep-linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepLink {
    /// Route of the request list.
    pub path: &'static str,
    /// Request to open once there.
    pub demande_id: DemandeId,
    /// Notification that triggered the navigation.
    pub notification_id: NotificationId,
}

impl DeepLink {
    /// Full route with query parameters, e.g.
    /// `/chef/demandes?open=9&notification=42`.
    pub fn to_route(&self) -> String {
        format!(
            "{}?open={}&notification={}",
            self.path, self.demande_id, self.notification_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_routes_match_the_application_map() {
        assert_eq!(Role::Chef.demandes_route(), Some("/chef/demandes"));
        assert_eq!(Role::Drh.demandes_route(), Some("/drh/demandes"));
        assert_eq!(Role::Employe.demandes_route(), Some("/demandes-et-solde"));
        assert_eq!(Role::Concierge.demandes_route(), None);
    }

    #[test]
    fn only_drh_uses_the_filtered_feed() {
        assert!(Role::Drh.uses_filtered_feed());
        assert!(!Role::Chef.uses_filtered_feed());
        assert!(!Role::Employe.uses_filtered_feed());
    }

    #[test]
    fn role_parses_from_wire_spelling() {
        assert_eq!(Role::from_str("DRH").unwrap(), Role::Drh);
        assert_eq!(Role::from_str("EMPLOYE").unwrap(), Role::Employe);
    }

    #[test]
    fn deep_link_renders_query_parameters() {
        let link = DeepLink {
            path: "/drh/demandes",
            demande_id: 9,
            notification_id: 42,
        };
        assert_eq!(link.to_route(), "/drh/demandes?open=9&notification=42");
    }
}
