use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

pub mod registry;

// 聊天类型，命令可以限制自己只在某些类型的聊天中被调用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Clan,
    Private,
    Chat,
}

impl ChatType {
    pub const ALL: [ChatType; 3] = [ChatType::Clan, ChatType::Private, ChatType::Chat];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Clan => "clan",
            ChatType::Private => "private",
            ChatType::Chat => "chat",
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// 命令执行上下文，包含一次调用的所有相关信息
pub struct CommandContext {
    pub chat_type: ChatType,
    pub username: String,
    pub args: Vec<String>,
    pub messenger: Arc<dyn Messenger>,
}

// 命令执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutcome {
    Replied { lines: usize },
    Fallback,
}

// 定义命令特性，所有命令都需要实现此特性
#[async_trait]
pub trait Command: Send + Sync {
    // 命令的主名称
    fn name(&self) -> &'static str;

    // 命令的别名列表
    fn aliases(&self) -> Vec<&'static str> {
        Vec::new()
    }

    // 命令的描述
    fn description(&self) -> &'static str;

    // 执行命令所需的权限，None 表示任何人都可以执行
    fn permission(&self) -> Option<&'static str> {
        None
    }

    // 命令所属的插件标识，用于卸载时按归属清理
    fn owner(&self) -> &'static str;

    // 同一用户两次调用之间的最小间隔
    fn cooldown(&self) -> Duration {
        Duration::ZERO
    }

    fn allowed_chat_types(&self) -> Vec<ChatType> {
        ChatType::ALL.to_vec()
    }

    // 执行命令的逻辑
    async fn execute(&self, ctx: CommandContext) -> CommandOutcome;
}

/// Outbound chat channel. Delivery is best-effort; callers never retry.
pub trait Messenger: Send + Sync {
    fn send_message(&self, chat_type: ChatType, text: &str, username: &str);
}

/// Diagnostic text sink handed to every plugin entry point.
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);

    fn error(&self, message: &str) {
        self.log(message);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionSpec {
    pub name: String,
    pub description: String,
    pub owner: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("unknown permission: {0}")]
    UnknownPermission(String),
}

// 宿主提供给插件的注册接口
#[async_trait]
pub trait PluginRegistry: Send + Sync {
    async fn register_permissions(&self, permissions: &[PermissionSpec]) -> Result<(), RegistryError>;

    async fn add_permissions_to_group(&self, group: &str, permissions: &[&str]) -> Result<(), RegistryError>;

    async fn register_command(&self, command: Arc<dyn Command>) -> Result<(), RegistryError>;
}

// 插件卸载时按归属标识删除记录
#[async_trait]
pub trait OwnerCleanup: Send + Sync {
    async fn delete_commands(&self, bot_id: i64, owner: &str) -> Result<usize, RegistryError>;

    async fn delete_permissions(&self, bot_id: i64, owner: &str) -> Result<usize, RegistryError>;
}

// 将发送的消息缓存起来，供 HTTP 接口一次性返回
#[derive(Default)]
pub struct BufferedMessenger {
    lines: Mutex<Vec<String>>,
}

impl BufferedMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_lines(&self) -> Vec<String> {
        let mut lines = self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *lines)
    }
}

impl Messenger for BufferedMessenger {
    fn send_message(&self, _chat_type: ChatType, text: &str, _username: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_type_uses_lowercase_wire_names() {
        let json = serde_json::to_string(&ChatType::ALL).unwrap();
        assert_eq!(json, r#"["clan","private","chat"]"#);

        let parsed: ChatType = serde_json::from_str(r#""private""#).unwrap();
        assert_eq!(parsed, ChatType::Private);
        assert_eq!(ChatType::Clan.to_string(), "clan");
    }

    #[test]
    fn buffered_messenger_keeps_send_order() {
        let messenger = BufferedMessenger::new();
        messenger.send_message(ChatType::Chat, "first", "alice");
        messenger.send_message(ChatType::Chat, "second", "alice");

        assert_eq!(messenger.take_lines(), vec!["first", "second"]);
        assert!(messenger.take_lines().is_empty());
    }
}
