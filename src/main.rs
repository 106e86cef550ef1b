use once_cell::sync::Lazy;
use rimplog::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use axum::Router;
use serverinfo_plugin::api::api_routes;
use serverinfo_plugin::config::load_config;
use serverinfo_plugin::db::Database;
use serverinfo_plugin::host::registry::CommandRegistry;
use serverinfo_plugin::host::LogSink;
use serverinfo_plugin::log::{init_log, RimplogSink};
use serverinfo_plugin::plugin::metrics::{SysinfoProvider, PROCESS_STARTED};
use serverinfo_plugin::plugin::{on_load, on_unload};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    // 记录进程启动时间，供 uptime 使用
    Lazy::force(&PROCESS_STARTED);
    init_log();

    let config = match load_config(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            error!("配置初始化失败: {}", e);
            return;
        }
    };
    let bot_id = config.server.bot_id;

    let database = match Database::open(&config.server.db_path) {
        Ok(database) => database,
        Err(e) => {
            error!("数据库初始化失败: {}", e);
            return;
        }
    };

    for admin in &config.server.admins {
        if let Err(e) = database.add_user_to_group(bot_id, admin, &config.serverinfo.admin_group) {
            error!("无法将用户 {} 加入管理员组: {}", admin, e);
        }
    }

    let registry = Arc::new(CommandRegistry::new(bot_id, database));
    let sink: Arc<dyn LogSink> = Arc::new(RimplogSink);

    let report = on_load(
        registry.as_ref(),
        config.serverinfo.clone(),
        Arc::new(SysinfoProvider),
        Arc::clone(&sink),
    )
    .await;
    info!("插件加载结果: {:?}", report);

    // 配置 CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", api_routes(Arc::clone(&registry)))
        .layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("服务器运行在: http://{}", addr);
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                error!("服务器异常退出: {}", e);
            }
        }
        Err(e) => error!("无法监听 {}: {}", addr, e),
    }

    on_unload(registry.bot_id(), registry.as_ref(), sink.as_ref()).await;
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("收到退出信号，正在卸载插件..."),
        Err(e) => error!("无法监听退出信号: {}", e),
    }
}
