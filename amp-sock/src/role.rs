//! Endpoint roles and the operations they allow.

use std::fmt;
use std::str::FromStr;

/// The messaging pattern role of an endpoint.
///
/// The role is fixed when the endpoint is created and decides which
/// operations are legal and how inbound and outbound frames are routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Publisher: broadcasts every message to all connected peers.
    Pub,
    /// Subscriber: receives broadcasts, optionally filtered by topic.
    Sub,
    /// Pusher: distributes messages across peers round-robin.
    Push,
    /// Puller: receives pushed messages.
    Pull,
    /// Requester: sends a request and waits for the correlated reply.
    Req,
    /// Replier: answers requests through its request callback.
    Rep,
}

impl Role {
    /// Roles that originate data-plane sends.
    pub(crate) fn can_send(self) -> bool {
        matches!(self, Role::Pub | Role::Push)
    }

    /// Roles that hold a subscription list.
    pub(crate) fn can_subscribe(self) -> bool {
        matches!(self, Role::Sub | Role::Pull)
    }

    /// Roles that accept a generic message callback.
    pub(crate) fn can_observe_messages(self) -> bool {
        matches!(self, Role::Sub | Role::Pull | Role::Req)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Pub => "pub",
            Role::Sub => "sub",
            Role::Push => "push",
            Role::Pull => "pull",
            Role::Req => "req",
            Role::Rep => "rep",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0:?}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pub" => Ok(Role::Pub),
            "sub" => Ok(Role::Sub),
            "push" => Ok(Role::Push),
            "pull" => Ok(Role::Pull),
            "req" => Ok(Role::Req),
            "rep" => Ok(Role::Rep),
            other => Err(ParseRoleError(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_roles() {
        for (name, role) in [
            ("pub", Role::Pub),
            ("sub", Role::Sub),
            ("push", Role::Push),
            ("pull", Role::Pull),
            ("req", Role::Req),
            ("rep", Role::Rep),
        ] {
            assert_eq!(name.parse::<Role>().expect("known role"), role);
            assert_eq!(role.to_string(), name);
        }
    }

    #[test]
    fn test_parse_unknown_role() {
        assert!("dealer".parse::<Role>().is_err());
    }
}
