use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use rimplog::info;

use crate::plugin::PluginSettings;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bot_id: i64,
    pub db_path: String,
    // 启动时加入管理员组的用户
    pub admins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1111,
            bot_id: 1,
            db_path: "data/serverinfo.db".to_string(),
            admins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub serverinfo: PluginSettings,
}

// 读取配置文件，文件不存在时写入默认配置
pub fn load_config(config_path: &str) -> Result<Config, config::ConfigError> {
    if !Path::new(config_path).exists() {
        let default_config = Config::default();
        let toml = toml::to_string_pretty(&default_config)
            .map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;
        fs::write(config_path, toml).map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;

        info!("已写入默认配置文件: {}", config_path);
        return Ok(default_config);
    }

    config::Config::builder()
        .add_source(config::File::with_name(config_path).format(config::FileFormat::Toml))
        .build()
        .and_then(|settings| settings.try_deserialize::<Config>())
}
