use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod command;
pub mod metrics;
pub mod template;
pub mod uptime;

use crate::host::{LogSink, OwnerCleanup, PermissionSpec, PluginRegistry, RegistryError};
use command::ServerInfoCommand;
use metrics::MetricsProvider;
use template::unknown_placeholders;
use uptime::UnitSuffixes;

pub const COMMAND_NAME: &str = "serverinfo";
pub const PERMISSION_NAME: &str = "admin.serverinfo";
pub const PLUGIN_OWNER_ID: &str = "plugin:serverinfo-command";

// 插件配置，对应配置文件中的 [serverinfo] 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub message_lines: Vec<String>,
    pub fallback_message: String,
    pub fetch_timeout_secs: u64,
    pub admin_group: String,
    pub cooldown_secs: u64,
    pub units: UnitSuffixes,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            message_lines: vec![
                "Процессор: {cpuModel} ({cpuCores} ядер / {cpuThreads} потоков)".to_string(),
                "Загрузка CPU: {cpuLoad}%".to_string(),
                "Память: {usedMem} / {totalMem} МБ".to_string(),
                "Аптайм бота: {uptime}".to_string(),
            ],
            fallback_message: "Не удалось получить информацию о сервере.".to_string(),
            fetch_timeout_secs: 10,
            admin_group: "Admin".to_string(),
            cooldown_secs: 30,
            units: UnitSuffixes::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadReport {
    Loaded,
    Failed(String),
}

/// Registers the permission, grants it to the admin group and registers the command.
///
/// Failures are logged and reported, never returned as errors. Steps that
/// already succeeded are not rolled back.
pub async fn on_load(
    registry: &dyn PluginRegistry,
    settings: PluginSettings,
    provider: Arc<dyn MetricsProvider>,
    log: Arc<dyn LogSink>,
) -> LoadReport {
    for name in unknown_placeholders(&settings.message_lines) {
        log.log(&format!("[{}] Неизвестный плейсхолдер в шаблоне: {{{}}}", PLUGIN_OWNER_ID, name));
    }

    match register_all(registry, settings, provider, Arc::clone(&log)).await {
        Ok(()) => {
            log.log(&format!(
                "[{}] Команда '{}' успешно зарегистрирована.",
                PLUGIN_OWNER_ID, COMMAND_NAME
            ));
            LoadReport::Loaded
        }
        Err(error) => {
            log.error(&format!("[{}] Ошибка при загрузке: {}", PLUGIN_OWNER_ID, error));
            LoadReport::Failed(error.to_string())
        }
    }
}

async fn register_all(
    registry: &dyn PluginRegistry,
    settings: PluginSettings,
    provider: Arc<dyn MetricsProvider>,
    log: Arc<dyn LogSink>,
) -> Result<(), RegistryError> {
    registry
        .register_permissions(&[PermissionSpec {
            name: PERMISSION_NAME.to_string(),
            description: format!("Доступ к команде {}", COMMAND_NAME),
            owner: PLUGIN_OWNER_ID.to_string(),
        }])
        .await?;

    registry
        .add_permissions_to_group(&settings.admin_group, &[PERMISSION_NAME])
        .await?;

    let command = ServerInfoCommand::new(Arc::new(settings), provider, log);
    registry.register_command(Arc::new(command)).await
}

// 卸载时删除本插件登记的命令与权限，失败只记录不抛出
pub async fn on_unload(bot_id: i64, cleanup: &dyn OwnerCleanup, log: &dyn LogSink) {
    log.log(&format!("[{}] Удаление ресурсов для бота ID: {}", PLUGIN_OWNER_ID, bot_id));

    match remove_owned(bot_id, cleanup).await {
        Ok(()) => log.log(&format!("[{}] Команды и права плагина удалены.", PLUGIN_OWNER_ID)),
        Err(error) => log.error(&format!("[{}] Ошибка при очистке ресурсов: {}", PLUGIN_OWNER_ID, error)),
    }
}

async fn remove_owned(bot_id: i64, cleanup: &dyn OwnerCleanup) -> Result<(), RegistryError> {
    cleanup.delete_commands(bot_id, PLUGIN_OWNER_ID).await?;
    cleanup.delete_permissions(bot_id, PLUGIN_OWNER_ID).await?;
    Ok(())
}
