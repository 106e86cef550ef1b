use axum::{extract::State, Json};
use rimplog::{debug, error};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::CommandRecord;
use crate::host::registry::{CommandRegistry, DispatchOutcome, Invocation};
use crate::host::{BufferedMessenger, ChatType};

// 命令请求结构体
#[derive(Deserialize)]
pub struct CommandRequest {
    pub command: String,
    pub chat_type: ChatType,
    pub username: String,
}

// 命令响应结构体
#[derive(Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub outcome: DispatchOutcome,
    pub notice: Option<String>,
    pub messages: Vec<String>,
}

// 宿主在命令未执行时给出的提示
fn notice_for(outcome: &DispatchOutcome) -> Option<String> {
    match outcome {
        DispatchOutcome::Unknown { command } => Some(format!("Неизвестная команда: {}", command)),
        DispatchOutcome::ChatTypeNotAllowed => Some("Эта команда недоступна в этом чате.".to_string()),
        DispatchOutcome::Forbidden => Some("У вас нет прав на выполнение этой команды.".to_string()),
        DispatchOutcome::CoolingDown { remaining_secs } => Some(format!(
            "Подождите {} сек. перед повторным использованием.",
            remaining_secs
        )),
        DispatchOutcome::Executed { .. } => None,
    }
}

pub async fn command_handler(
    State(registry): State<Arc<CommandRegistry>>,
    Json(request): Json<CommandRequest>,
) -> Json<CommandResponse> {
    debug!("收到命令请求: '{}', 用户: {}", request.command, request.username);

    let messenger = Arc::new(BufferedMessenger::new());
    let invocation = Invocation {
        chat_type: request.chat_type,
        username: request.username,
        text: request.command,
    };

    let outcome = registry.dispatch(invocation, messenger.clone()).await;

    Json(CommandResponse {
        success: matches!(outcome, DispatchOutcome::Executed { .. }),
        notice: notice_for(&outcome),
        outcome,
        messages: messenger.take_lines(),
    })
}

pub async fn commands_handler(State(registry): State<Arc<CommandRegistry>>) -> Json<Vec<CommandRecord>> {
    match registry.list() {
        Ok(commands) => Json(commands),
        Err(e) => {
            error!("读取命令列表失败: {}", e);
            Json(Vec::new())
        }
    }
}
