//! 会话存储 - 状态层
//!
//! 每用户一条短生命周期会话。所有操作都在同一把锁内完成，
//! 期望会话存在的修改操作在缺失时返回 `SessionExpired`，
//! 而不是内部错误

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::SessionError;
use crate::models::Session;

/// 会话存储
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取用户会话的副本
    pub fn get(&self, owner_id: i64) -> Option<Session> {
        self.sessions.lock().unwrap().get(&owner_id).cloned()
    }

    /// 写入（或替换）用户会话
    pub fn set(&self, owner_id: i64, session: Session) {
        self.sessions.lock().unwrap().insert(owner_id, session);
    }

    /// 原地修改用户会话
    ///
    /// 会话缺失时返回 `SessionExpired`，调用方据此提示用户重新开始
    pub fn update<F>(&self, owner_id: i64, mutator: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(&owner_id) {
            Some(session) => {
                mutator(session);
                Ok(())
            }
            None => Err(SessionError::Expired { owner_id }),
        }
    }

    /// 取走用户会话（投递流程消费会话时使用）
    pub fn take(&self, owner_id: i64) -> Option<Session> {
        self.sessions.lock().unwrap().remove(&owner_id)
    }

    /// 清除用户会话
    pub fn clear(&self, owner_id: i64) {
        self.sessions.lock().unwrap().remove(&owner_id);
    }

    /// 用户是否存在会话
    pub fn exists(&self, owner_id: i64) -> bool {
        self.sessions.lock().unwrap().contains_key(&owner_id)
    }
}
