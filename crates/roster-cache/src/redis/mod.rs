//! Redis-backed coordination store
//!
//! Command batches run inside `MULTI/EXEC`; multi-key mutations run as Lua
//! scripts (`EVALSHA`, loaded on first use). Refresh notifications are
//! appended to a bounded list for polling nodes and published on a channel
//! of the same name for subscribed ones.

use anyhow::Context;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Script, ScriptInvocation};
use tracing::debug;

use roster_common::{DEFAULT_KEY_PREFIX, DEFAULT_REFRESH_BACKLOG};

use crate::command::{CacheCommand, CommandBatch, ProjectionScript};
use crate::keys::KeySpace;
use crate::notification::RefreshNotification;
use crate::traits::{CacheProjector, NodeNotifier};

const REMOVE_GROUP_LUA: &str = include_str!("lua/remove_group.lua");
const REMOVE_USER_LUA: &str = include_str!("lua/remove_user.lua");
const REPLACE_GROUP_MEMBERS_LUA: &str = include_str!("lua/replace_group_members.lua");

/// Redis connection settings
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
    /// Number of refresh notifications kept in the refresh list
    pub refresh_backlog: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            refresh_backlog: DEFAULT_REFRESH_BACKLOG,
        }
    }
}

struct Scripts {
    remove_group: Script,
    remove_user: Script,
    replace_group_members: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            remove_group: Script::new(REMOVE_GROUP_LUA),
            remove_user: Script::new(REMOVE_USER_LUA),
            replace_group_members: Script::new(REPLACE_GROUP_MEMBERS_LUA),
        }
    }
}

#[derive(Clone)]
pub struct RedisCoordinationStore {
    client: redis::Client,
    manager: ConnectionManager,
    keys: KeySpace,
    refresh_backlog: usize,
    scripts: std::sync::Arc<Scripts>,
}

impl RedisCoordinationStore {
    #[tracing::instrument(level = "debug", skip(cfg))]
    pub async fn connect(cfg: &RedisConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(cfg.url.clone()).context("invalid redis url")?;
        let manager = ConnectionManager::new(client.clone())
            .await
            .context("redis connect")?;
        Ok(Self {
            client,
            manager,
            keys: KeySpace::new(&cfg.key_prefix),
            refresh_backlog: cfg.refresh_backlog.max(1),
            scripts: std::sync::Arc::new(Scripts::load()),
        })
    }

    /// A new connection to the same server, separate from the one projections
    /// and notifications use. Blocking reads belong on one of these.
    pub async fn dedicated_connection(&self) -> anyhow::Result<ConnectionManager> {
        ConnectionManager::new(self.client.clone())
            .await
            .context("redis connect")
    }

    pub async fn health_check(&self) -> anyhow::Result<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("redis ping")?;
        Ok(())
    }

    fn invocation<'a>(&'a self, script: &ProjectionScript) -> ScriptInvocation<'a> {
        let prefix = self.keys.prefix();
        match script {
            ProjectionScript::RemoveGroup { group_id } => {
                let mut invocation = self.scripts.remove_group.prepare_invoke();
                invocation
                    .key(self.keys.groups())
                    .key(self.keys.group(group_id))
                    .key(self.keys.group_members(group_id))
                    .key(self.keys.group_node(group_id))
                    .arg(group_id)
                    .arg(prefix);
                invocation
            }
            ProjectionScript::RemoveUser { user_id } => {
                let mut invocation = self.scripts.remove_user.prepare_invoke();
                invocation
                    .key(self.keys.users())
                    .key(self.keys.user(user_id))
                    .key(self.keys.user_groups(user_id))
                    .arg(user_id)
                    .arg(prefix);
                invocation
            }
            ProjectionScript::ReplaceGroupMembers { group_id, members } => {
                let mut invocation = self.scripts.replace_group_members.prepare_invoke();
                invocation
                    .key(self.keys.group_members(group_id))
                    .arg(group_id)
                    .arg(prefix)
                    .arg(members.as_slice());
                invocation
            }
        }
    }
}

#[async_trait]
impl CacheProjector for RedisCoordinationStore {
    fn keys(&self) -> &KeySpace {
        &self.keys
    }

    #[tracing::instrument(level = "debug", skip_all, fields(commands = batch.len()))]
    async fn execute(&self, batch: &CommandBatch) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in batch.iter() {
            match command {
                CacheCommand::SetAdd { key, members } => {
                    pipe.sadd(key, members.as_slice()).ignore();
                }
                CacheCommand::HashSet { key, fields } => {
                    pipe.hset_multiple(key, fields.as_slice()).ignore();
                }
            }
        }

        let mut conn = self.manager.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .context("exec command batch")?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(script = script.name()))]
    async fn run_script(&self, script: &ProjectionScript) -> anyhow::Result<()> {
        let invocation = self.invocation(script);
        let mut conn = self.manager.clone();
        let touched: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .with_context(|| format!("run {} script", script.name()))?;
        debug!(script = script.name(), touched, "Projection script applied");
        Ok(())
    }
}

#[async_trait]
impl NodeNotifier for RedisCoordinationStore {
    #[tracing::instrument(level = "debug", skip_all, fields(scope = %notification.scope, target = %notification.target_id))]
    async fn notify(&self, notification: &RefreshNotification) -> anyhow::Result<()> {
        let payload = serde_json::to_string(notification).context("encode notification")?;
        let key = self.keys.refresh();
        let backlog = self.refresh_backlog as isize;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(&key, &payload)
            .ignore()
            .ltrim(&key, -backlog, -1)
            .ignore()
            .publish(&key, &payload)
            .ignore();

        let mut conn = self.manager.clone();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .context("publish refresh notification")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_reference_prefix_argument() {
        for source in [REMOVE_GROUP_LUA, REMOVE_USER_LUA, REPLACE_GROUP_MEMBERS_LUA] {
            assert!(source.contains("local prefix = ARGV[2]"));
        }
    }

    #[test]
    fn test_script_key_layout_matches_keyspace() {
        let keys = KeySpace::new("p");
        assert!(REMOVE_GROUP_LUA.contains("prefix .. ':user:' .. user .. ':groups'"));
        assert_eq!(keys.user_groups("u"), "p:user:u:groups");
        assert!(REMOVE_GROUP_LUA.contains("prefix .. ':node:' .. node .. ':groups'"));
        assert_eq!(keys.node_groups("n"), "p:node:n:groups");
        assert!(REMOVE_USER_LUA.contains("prefix .. ':group:' .. group .. ':members'"));
        assert_eq!(keys.group_members("g"), "p:group:g:members");
    }

    #[test]
    fn test_default_config() {
        let cfg = RedisConfig::default();
        assert_eq!(cfg.key_prefix, "roster");
        assert_eq!(cfg.refresh_backlog, 1024);
    }
}
