//! Key layout of the coordination store
//!
//! | Key                          | Type   | Content                         |
//! |------------------------------|--------|---------------------------------|
//! | `{p}:groups`                 | set    | ids of every projected group    |
//! | `{p}:group:{id}`             | hash   | group attributes (`name`)       |
//! | `{p}:group:{id}:members`     | set    | member user ids                 |
//! | `{p}:group:{id}:node`        | string | node the group is assigned to   |
//! | `{p}:node:{node}:groups`     | set    | groups assigned to a node       |
//! | `{p}:users`                  | set    | ids of every projected user     |
//! | `{p}:user:{id}`              | hash   | user attributes (`name`)        |
//! | `{p}:user:{id}:groups`       | set    | groups the user belongs to      |
//! | `{p}:refresh`                | list   | refresh notifications for nodes |
//!
//! The Lua scripts build the per-user and per-node keys themselves from the
//! prefix, so any change here must be mirrored in `redis/lua/*.lua`.

use roster_common::DEFAULT_KEY_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeySpace {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim().trim_end_matches(':');
        Self {
            prefix: if prefix.is_empty() {
                DEFAULT_KEY_PREFIX.to_string()
            } else {
                prefix.to_string()
            },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn groups(&self) -> String {
        format!("{}:groups", self.prefix)
    }

    pub fn group(&self, group_id: &str) -> String {
        format!("{}:group:{}", self.prefix, group_id)
    }

    pub fn group_members(&self, group_id: &str) -> String {
        format!("{}:group:{}:members", self.prefix, group_id)
    }

    pub fn group_node(&self, group_id: &str) -> String {
        format!("{}:group:{}:node", self.prefix, group_id)
    }

    pub fn node_groups(&self, node_id: &str) -> String {
        format!("{}:node:{}:groups", self.prefix, node_id)
    }

    pub fn users(&self) -> String {
        format!("{}:users", self.prefix)
    }

    pub fn user(&self, user_id: &str) -> String {
        format!("{}:user:{}", self.prefix, user_id)
    }

    pub fn user_groups(&self, user_id: &str) -> String {
        format!("{}:user:{}:groups", self.prefix, user_id)
    }

    pub fn refresh(&self) -> String {
        format!("{}:refresh", self.prefix)
    }
}
