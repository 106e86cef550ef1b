use async_trait::async_trait;
use rimplog::debug;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use super::{
    ChatType, Command, CommandContext, CommandOutcome, Messenger, OwnerCleanup, PermissionSpec,
    PluginRegistry, RegistryError,
};
use crate::db::{CommandRecord, Database};

// 一次聊天调用
#[derive(Debug, Clone)]
pub struct Invocation {
    pub chat_type: ChatType,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Unknown { command: String },
    ChatTypeNotAllowed,
    Forbidden,
    CoolingDown { remaining_secs: u64 },
    Executed { outcome: CommandOutcome },
}

/// In-memory command table of one bot, backed by the host database.
pub struct CommandRegistry {
    bot_id: i64,
    db: Database,
    commands: RwLock<HashMap<String, Arc<dyn Command>>>,
    last_used: Mutex<HashMap<(String, String), Instant>>,
}

impl CommandRegistry {
    pub fn new(bot_id: i64, db: Database) -> Self {
        Self {
            bot_id,
            db,
            commands: RwLock::new(HashMap::new()),
            last_used: Mutex::new(HashMap::new()),
        }
    }

    pub fn bot_id(&self) -> i64 {
        self.bot_id
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Command>> {
        let commands = self.commands.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        commands.get(&name.to_lowercase()).cloned()
    }

    pub fn list(&self) -> Result<Vec<CommandRecord>, RegistryError> {
        Ok(self.db.list_commands(self.bot_id)?)
    }

    pub async fn dispatch(&self, invocation: Invocation, messenger: Arc<dyn Messenger>) -> DispatchOutcome {
        let (name, args) = parse_command(&invocation.text);

        debug!("处理命令: '{}', 用户: {}, 聊天类型: {}", name, invocation.username, invocation.chat_type);

        let Some(command) = self.find(&name) else {
            return DispatchOutcome::Unknown { command: name };
        };

        if !command.allowed_chat_types().contains(&invocation.chat_type) {
            return DispatchOutcome::ChatTypeNotAllowed;
        }

        if let Some(permission) = command.permission() {
            match self.db.user_has_permission(self.bot_id, &invocation.username, permission) {
                Ok(true) => {}
                Ok(false) => return DispatchOutcome::Forbidden,
                Err(e) => {
                    debug!("权限查询失败: {}", e);
                    return DispatchOutcome::Forbidden;
                }
            }
        }

        if let Some(remaining) = self.claim_cooldown(command.as_ref(), &invocation.username) {
            return DispatchOutcome::CoolingDown {
                remaining_secs: remaining.as_secs().max(1),
            };
        }

        let ctx = CommandContext {
            chat_type: invocation.chat_type,
            username: invocation.username,
            args,
            messenger,
        };
        let outcome = command.execute(ctx).await;

        DispatchOutcome::Executed { outcome }
    }

    // 冷却中返回剩余时间，否则记录本次调用时间
    fn claim_cooldown(&self, command: &dyn Command, username: &str) -> Option<Duration> {
        let cooldown = command.cooldown();
        if cooldown.is_zero() {
            return None;
        }

        let key = (command.name().to_string(), username.to_string());
        let now = Instant::now();
        let mut last_used = self.last_used.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = last_used.get(&key) {
            let elapsed = now.duration_since(*previous);
            if elapsed < cooldown {
                return Some(cooldown - elapsed);
            }
        }

        last_used.insert(key, now);
        None
    }

    fn ensure_permission(&self, name: &str) -> Result<(), RegistryError> {
        if self.db.permission_exists(self.bot_id, name)? {
            Ok(())
        } else {
            Err(RegistryError::UnknownPermission(name.to_string()))
        }
    }
}

// 注册命令及其别名的辅助函数
fn register_command(commands: &mut HashMap<String, Arc<dyn Command>>, command: Arc<dyn Command>) {
    commands.insert(command.name().to_lowercase(), Arc::clone(&command));

    for alias in command.aliases() {
        commands.insert(alias.to_lowercase(), Arc::clone(&command));
    }
}

// 解析命令并返回命令名称和参数，允许 "/" 或 "!" 前缀
pub fn parse_command(command_text: &str) -> (String, Vec<String>) {
    let parts: Vec<&str> = command_text.split_whitespace().collect();

    let Some((first, rest)) = parts.split_first() else {
        return (String::new(), Vec::new());
    };

    let command_name = first.trim_start_matches(['/', '!']).to_lowercase();
    let args = rest.iter().map(|s| s.to_string()).collect();

    (command_name, args)
}

#[async_trait]
impl PluginRegistry for CommandRegistry {
    async fn register_permissions(&self, permissions: &[PermissionSpec]) -> Result<(), RegistryError> {
        for permission in permissions {
            self.db.upsert_permission(self.bot_id, permission)?;
        }
        Ok(())
    }

    async fn add_permissions_to_group(&self, group: &str, permissions: &[&str]) -> Result<(), RegistryError> {
        for permission in permissions {
            self.ensure_permission(permission)?;
            self.db.grant_permission(self.bot_id, group, permission)?;
        }
        Ok(())
    }

    async fn register_command(&self, command: Arc<dyn Command>) -> Result<(), RegistryError> {
        if let Some(permission) = command.permission() {
            self.ensure_permission(permission)?;
        }

        self.db.upsert_command(self.bot_id, &CommandRecord::from_command(command.as_ref()))?;

        let mut commands = self.commands.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        register_command(&mut commands, command);
        Ok(())
    }
}

#[async_trait]
impl OwnerCleanup for CommandRegistry {
    async fn delete_commands(&self, bot_id: i64, owner: &str) -> Result<usize, RegistryError> {
        let deleted = self.db.delete_commands_by_owner(bot_id, owner)?;

        if bot_id == self.bot_id {
            let mut commands = self.commands.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            commands.retain(|_, command| command.owner() != owner);
        }

        Ok(deleted)
    }

    async fn delete_permissions(&self, bot_id: i64, owner: &str) -> Result<usize, RegistryError> {
        Ok(self.db.delete_permissions_by_owner(bot_id, owner)?)
    }
}
