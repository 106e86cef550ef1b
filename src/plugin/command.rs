use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::metrics::{fetch_snapshot, MetricsProvider};
use super::template::{render_lines, Placeholders};
use super::{PluginSettings, COMMAND_NAME, PERMISSION_NAME, PLUGIN_OWNER_ID};
use crate::host::{ChatType, Command, CommandContext, CommandOutcome, LogSink};

pub struct ServerInfoCommand {
    settings: Arc<PluginSettings>,
    provider: Arc<dyn MetricsProvider>,
    log: Arc<dyn LogSink>,
}

impl ServerInfoCommand {
    pub fn new(settings: Arc<PluginSettings>, provider: Arc<dyn MetricsProvider>, log: Arc<dyn LogSink>) -> Self {
        Self {
            settings,
            provider,
            log,
        }
    }
}

#[async_trait]
impl Command for ServerInfoCommand {
    fn name(&self) -> &'static str {
        COMMAND_NAME
    }

    fn aliases(&self) -> Vec<&'static str> {
        vec!["серверинфо"]
    }

    fn description(&self) -> &'static str {
        "Показывает информацию о сервере, где запущен бот."
    }

    fn permission(&self) -> Option<&'static str> {
        Some(PERMISSION_NAME)
    }

    fn owner(&self) -> &'static str {
        PLUGIN_OWNER_ID
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.settings.cooldown_secs)
    }

    fn allowed_chat_types(&self) -> Vec<ChatType> {
        vec![ChatType::Clan, ChatType::Private, ChatType::Chat]
    }

    async fn execute(&self, ctx: CommandContext) -> CommandOutcome {
        let limit = Duration::from_secs(self.settings.fetch_timeout_secs);

        match fetch_snapshot(self.provider.as_ref(), limit).await {
            Ok(snapshot) => {
                let values = Placeholders::from_snapshot(&snapshot, &self.settings.units);
                let lines = render_lines(&self.settings.message_lines, &values);

                // 按模板顺序逐行发送
                for line in &lines {
                    ctx.messenger.send_message(ctx.chat_type, line, &ctx.username);
                }

                CommandOutcome::Replied { lines: lines.len() }
            }
            Err(error) => {
                self.log.error(&format!(
                    "[{}] Ошибка при получении информации о сервере: {}",
                    PLUGIN_OWNER_ID, error
                ));
                ctx.messenger
                    .send_message(ctx.chat_type, &self.settings.fallback_message, &ctx.username);

                CommandOutcome::Fallback
            }
        }
    }
}
