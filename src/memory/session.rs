//! 会话消息持久化
//!
//! SQLite（WAL）中的仅追加消息日志，按 (session_id, user_id) 键入；
//! 会话在首条消息时隐式创建，从不删除。

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::memory::{Message, Role};

/// 仅追加的会话存储
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// 打开（或创建）数据库文件并确保表结构；父目录不存在时自动创建
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id         TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                user_id    TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id         TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                user_id    TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// 追加一条消息
    pub fn append(
        &self,
        session_id: &str,
        user_id: &str,
        role: &Role,
        content: &str,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (id, session_id, user_id, role, content) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                session_id,
                user_id,
                role.as_str(),
                content
            ],
        )?;
        Ok(())
    }

    /// 加载最近 limit 条消息，按时间从旧到新返回
    pub fn load(&self, session_id: &str, user_id: &str, limit: usize) -> anyhow::Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT role, content FROM messages
             WHERE session_id = ?1 AND user_id = ?2
             ORDER BY created_at DESC, rowid DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![session_id, user_id, limit as i64], |row| {
            let role: String = row.get(0)?;
            let content: String = row.get(1)?;
            Ok(Message {
                role: Role::parse(&role),
                content,
            })
        })?;
        let mut messages: Vec<Message> = rows.collect::<Result<_, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_load_oldest_first() {
        let store = SessionStore::open_in_memory().unwrap();
        store.append("s1", "u1", &Role::User, "q1").unwrap();
        store.append("s1", "u1", &Role::Assistant, "a1").unwrap();
        store.append("s1", "u1", &Role::User, "q2").unwrap();

        let msgs = store.load("s1", "u1", 10).unwrap();
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].content, "q1");
        assert_eq!(msgs[2].content, "q2");
        assert_eq!(msgs[1].role, Role::Assistant);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::open_in_memory().unwrap();
        store.append("s1", "u1", &Role::User, "mine").unwrap();
        store.append("s2", "u1", &Role::User, "other session").unwrap();
        store.append("s1", "u2", &Role::User, "other user").unwrap();

        let msgs = store.load("s1", "u1", 10).unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "mine");
    }

    #[test]
    fn test_load_limit_keeps_most_recent() {
        let store = SessionStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .append("s1", "u1", &Role::User, &format!("m{}", i))
                .unwrap();
        }
        let msgs = store.load("s1", "u1", 2).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "m3");
        assert_eq!(msgs[1].content, "m4");
    }
}
