use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use rusqlite::types::Type;
use rimplog::info;
use serde::Serialize;

use crate::host::{ChatType, Command, PermissionSpec};

// 命令记录结构体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandRecord {
    pub name: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub permission: Option<String>,
    pub owner: String,
    pub cooldown_secs: u64,
    pub allowed_chat_types: Vec<ChatType>,
}

impl CommandRecord {
    pub fn from_command(command: &dyn Command) -> Self {
        Self {
            name: command.name().to_string(),
            description: command.description().to_string(),
            aliases: command.aliases().into_iter().map(str::to_string).collect(),
            permission: command.permission().map(str::to_string),
            owner: command.owner().to_string(),
            cooldown_secs: command.cooldown().as_secs(),
            allowed_chat_types: command.allowed_chat_types(),
        }
    }
}

// 宿主数据库，保存命令、权限以及用户组
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    // 打开数据库文件，必要时创建所在目录
    pub fn open(db_path: &str) -> SqliteResult<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return Err(rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error {
                            code: rusqlite::ffi::ErrorCode::CannotOpen,
                            extended_code: 0,
                        },
                        Some(format!("无法创建数据库目录: {}", e)),
                    ));
                }
            }
        }

        let conn = Connection::open(db_path)?;
        init_schema(&conn)?;
        info!("数据库初始化完成: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // 注册权限，已存在时更新描述与归属
    pub fn upsert_permission(&self, bot_id: i64, permission: &PermissionSpec) -> SqliteResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO permissions (bot_id, name, description, owner, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(bot_id, name) DO UPDATE SET
                description = excluded.description,
                owner = excluded.owner",
            params![
                bot_id,
                permission.name,
                permission.description,
                permission.owner,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn permission_exists(&self, bot_id: i64, name: &str) -> SqliteResult<bool> {
        let conn = self.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM permissions WHERE bot_id = ?1 AND name = ?2",
                params![bot_id, name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn grant_permission(&self, bot_id: i64, group: &str, permission: &str) -> SqliteResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO group_permissions (bot_id, group_name, permission) VALUES (?1, ?2, ?3)",
            params![bot_id, group, permission],
        )?;
        Ok(())
    }

    pub fn add_user_to_group(&self, bot_id: i64, username: &str, group: &str) -> SqliteResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO user_groups (bot_id, username, group_name) VALUES (?1, ?2, ?3)",
            params![bot_id, username, group],
        )?;
        Ok(())
    }

    // 用户所在的任意一个组拥有该权限即可
    pub fn user_has_permission(&self, bot_id: i64, username: &str, permission: &str) -> SqliteResult<bool> {
        let conn = self.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM user_groups ug
                 JOIN group_permissions gp
                   ON gp.bot_id = ug.bot_id AND gp.group_name = ug.group_name
                 WHERE ug.bot_id = ?1 AND ug.username = ?2 AND gp.permission = ?3
                 LIMIT 1",
                params![bot_id, username, permission],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn upsert_command(&self, bot_id: i64, command: &CommandRecord) -> SqliteResult<()> {
        let aliases = encode_json(&command.aliases)?;
        let chat_types = encode_json(&command.allowed_chat_types)?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO commands
             (bot_id, name, description, aliases, permission, owner, cooldown_secs, allowed_chat_types, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(bot_id, name) DO UPDATE SET
                description = excluded.description,
                aliases = excluded.aliases,
                permission = excluded.permission,
                owner = excluded.owner,
                cooldown_secs = excluded.cooldown_secs,
                allowed_chat_types = excluded.allowed_chat_types",
            params![
                bot_id,
                command.name,
                command.description,
                aliases,
                command.permission,
                command.owner,
                command.cooldown_secs,
                chat_types,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // 获取某个机器人的全部命令记录
    pub fn list_commands(&self, bot_id: i64) -> SqliteResult<Vec<CommandRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name, description, aliases, permission, owner, cooldown_secs, allowed_chat_types
             FROM commands WHERE bot_id = ?1 ORDER BY name",
        )?;

        let rows = stmt.query_map([bot_id], |row| {
            let aliases: String = row.get(2)?;
            let chat_types: String = row.get(6)?;
            Ok(CommandRecord {
                name: row.get(0)?,
                description: row.get(1)?,
                aliases: decode_json(2, &aliases)?,
                permission: row.get(3)?,
                owner: row.get(4)?,
                cooldown_secs: row.get(5)?,
                allowed_chat_types: decode_json(6, &chat_types)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }

        Ok(result)
    }

    pub fn delete_commands_by_owner(&self, bot_id: i64, owner: &str) -> SqliteResult<usize> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM commands WHERE bot_id = ?1 AND owner = ?2",
            params![bot_id, owner],
        )
    }

    // 删除权限时一并删除它们在用户组上的授权
    pub fn delete_permissions_by_owner(&self, bot_id: i64, owner: &str) -> SqliteResult<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM group_permissions
             WHERE bot_id = ?1 AND permission IN
                (SELECT name FROM permissions WHERE bot_id = ?1 AND owner = ?2)",
            params![bot_id, owner],
        )?;
        let deleted = tx.execute(
            "DELETE FROM permissions WHERE bot_id = ?1 AND owner = ?2",
            params![bot_id, owner],
        )?;
        tx.commit()?;
        Ok(deleted)
    }
}

fn init_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS permissions (
            bot_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            owner TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (bot_id, name)
        );
        CREATE TABLE IF NOT EXISTS group_permissions (
            bot_id INTEGER NOT NULL,
            group_name TEXT NOT NULL,
            permission TEXT NOT NULL,
            PRIMARY KEY (bot_id, group_name, permission)
        );
        CREATE TABLE IF NOT EXISTS user_groups (
            bot_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            group_name TEXT NOT NULL,
            PRIMARY KEY (bot_id, username, group_name)
        );
        CREATE TABLE IF NOT EXISTS commands (
            bot_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            aliases TEXT NOT NULL,
            permission TEXT,
            owner TEXT NOT NULL,
            cooldown_secs INTEGER NOT NULL DEFAULT 0,
            allowed_chat_types TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (bot_id, name)
        );",
    )
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> SqliteResult<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn decode_json<T: serde::de::DeserializeOwned>(column: usize, raw: &str) -> SqliteResult<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission(name: &str, owner: &str) -> PermissionSpec {
        PermissionSpec {
            name: name.to_string(),
            description: format!("{} description", name),
            owner: owner.to_string(),
        }
    }

    fn command(name: &str, owner: &str) -> CommandRecord {
        CommandRecord {
            name: name.to_string(),
            description: "test".to_string(),
            aliases: vec![format!("{}-alias", name)],
            permission: None,
            owner: owner.to_string(),
            cooldown_secs: 5,
            allowed_chat_types: vec![ChatType::Private],
        }
    }

    #[test]
    fn grants_flow_through_user_groups() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_permission(1, &permission("admin.x", "plugin:a")).unwrap();
        db.grant_permission(1, "Admin", "admin.x").unwrap();
        db.add_user_to_group(1, "alice", "Admin").unwrap();

        assert!(db.user_has_permission(1, "alice", "admin.x").unwrap());
        assert!(!db.user_has_permission(1, "bob", "admin.x").unwrap());
        // 不同机器人之间互不影响
        assert!(!db.user_has_permission(2, "alice", "admin.x").unwrap());
    }

    #[test]
    fn upserting_a_permission_twice_keeps_one_row() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_permission(1, &permission("admin.x", "plugin:a")).unwrap();
        db.upsert_permission(1, &permission("admin.x", "plugin:b")).unwrap();

        assert_eq!(db.delete_permissions_by_owner(1, "plugin:a").unwrap(), 0);
        assert_eq!(db.delete_permissions_by_owner(1, "plugin:b").unwrap(), 1);
        assert!(!db.permission_exists(1, "admin.x").unwrap());
    }

    #[test]
    fn command_rows_round_trip_json_columns() {
        let db = Database::open_in_memory().unwrap();
        let record = command("serverinfo", "plugin:a");
        db.upsert_command(7, &record).unwrap();

        assert_eq!(db.list_commands(7).unwrap(), vec![record]);
        assert!(db.list_commands(8).unwrap().is_empty());
    }

    #[test]
    fn owner_cleanup_is_scoped_by_bot_and_owner() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_command(1, &command("mine", "plugin:a")).unwrap();
        db.upsert_command(1, &command("theirs", "plugin:b")).unwrap();
        db.upsert_command(2, &command("mine", "plugin:a")).unwrap();
        db.upsert_permission(1, &permission("admin.mine", "plugin:a")).unwrap();
        db.grant_permission(1, "Admin", "admin.mine").unwrap();
        db.add_user_to_group(1, "alice", "Admin").unwrap();

        assert_eq!(db.delete_commands_by_owner(1, "plugin:a").unwrap(), 1);
        assert_eq!(db.delete_permissions_by_owner(1, "plugin:a").unwrap(), 1);

        let left: Vec<String> = db.list_commands(1).unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(left, vec!["theirs"]);
        assert_eq!(db.list_commands(2).unwrap().len(), 1);
        assert!(!db.user_has_permission(1, "alice", "admin.mine").unwrap());
    }

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("host.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        db.add_user_to_group(1, "alice", "Admin").unwrap();
        assert!(path.exists());
    }
}
