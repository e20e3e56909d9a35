//! 用户目录服务 - 业务能力层
//!
//! 授权名单、管理员名单、用户偏好和可投递目标。
//! 读多写少，归属外部系统；默认实现为配置种子 + 内存表

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::Config;

/// 用户的测验格式偏好
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSettings {
    /// 附加在题干前的标记
    pub quiz_marker: String,
    /// 附加在解析后的标签
    pub explanation_tag: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            quiz_marker: "🎯".to_string(),
            explanation_tag: "#quiz".to_string(),
        }
    }
}

/// 一个可投递目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub chat_id: i64,
    pub name: String,
}

/// 用户的全部可投递目标
#[derive(Debug, Clone, Default)]
pub struct Destinations {
    pub channels: Vec<Destination>,
    pub groups: Vec<Destination>,
}

impl Destinations {
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.groups.is_empty()
    }
}

/// 授权名单条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub user_id: i64,
    pub is_sudo: bool,
}

/// 用户目录接口
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn is_authorized(&self, user_id: i64) -> bool;
    async fn is_sudo(&self, user_id: i64) -> bool;
    async fn get_user_settings(&self, user_id: i64) -> UserSettings;
    async fn get_destinations(&self, user_id: i64) -> Destinations;

    async fn authorize_user(&self, user_id: i64, by: i64);
    async fn revoke_user(&self, user_id: i64);
    async fn list_users(&self) -> Vec<AuthorizedUser>;

    async fn add_channel(&self, owner_id: i64, chat_id: i64, name: String);
    async fn add_group(&self, owner_id: i64, chat_id: i64, name: String);
    async fn remove_channel(&self, owner_id: i64, chat_id: i64);
    async fn remove_group(&self, owner_id: i64, chat_id: i64);
}

#[derive(Debug, Default)]
struct DirectoryInner {
    users: HashMap<i64, AuthorizedUser>,
    settings: HashMap<i64, UserSettings>,
    channels: HashMap<i64, Vec<Destination>>,
    groups: HashMap<i64, Vec<Destination>>,
}

/// 内存目录实现
pub struct MemoryDirectory {
    auth_enabled: bool,
    inner: Mutex<DirectoryInner>,
}

impl MemoryDirectory {
    /// 从配置创建目录：管理员自动进入授权名单
    pub fn from_config(config: &Config) -> Self {
        let mut inner = DirectoryInner::default();
        for &user_id in &config.sudo_user_ids {
            inner.users.insert(
                user_id,
                AuthorizedUser {
                    user_id,
                    is_sudo: true,
                },
            );
        }
        Self {
            auth_enabled: config.auth_enabled,
            inner: Mutex::new(inner),
        }
    }
}

#[async_trait]
impl DirectoryService for MemoryDirectory {
    async fn is_authorized(&self, user_id: i64) -> bool {
        if !self.auth_enabled {
            return true;
        }
        self.inner.lock().unwrap().users.contains_key(&user_id)
    }

    async fn is_sudo(&self, user_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .users
            .get(&user_id)
            .map(|u| u.is_sudo)
            .unwrap_or(false)
    }

    async fn get_user_settings(&self, user_id: i64) -> UserSettings {
        self.inner
            .lock()
            .unwrap()
            .settings
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn get_destinations(&self, user_id: i64) -> Destinations {
        let inner = self.inner.lock().unwrap();
        Destinations {
            channels: inner.channels.get(&user_id).cloned().unwrap_or_default(),
            groups: inner.groups.get(&user_id).cloned().unwrap_or_default(),
        }
    }

    async fn authorize_user(&self, user_id: i64, _by: i64) {
        self.inner.lock().unwrap().users.entry(user_id).or_insert(
            AuthorizedUser {
                user_id,
                is_sudo: false,
            },
        );
    }

    async fn revoke_user(&self, user_id: i64) {
        self.inner.lock().unwrap().users.remove(&user_id);
    }

    async fn list_users(&self) -> Vec<AuthorizedUser> {
        let mut users: Vec<AuthorizedUser> =
            self.inner.lock().unwrap().users.values().cloned().collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    async fn add_channel(&self, owner_id: i64, chat_id: i64, name: String) {
        self.inner
            .lock()
            .unwrap()
            .channels
            .entry(owner_id)
            .or_default()
            .push(Destination { chat_id, name });
    }

    async fn add_group(&self, owner_id: i64, chat_id: i64, name: String) {
        self.inner
            .lock()
            .unwrap()
            .groups
            .entry(owner_id)
            .or_default()
            .push(Destination { chat_id, name });
    }

    async fn remove_channel(&self, owner_id: i64, chat_id: i64) {
        if let Some(channels) = self.inner.lock().unwrap().channels.get_mut(&owner_id) {
            channels.retain(|c| c.chat_id != chat_id);
        }
    }

    async fn remove_group(&self, owner_id: i64, chat_id: i64) {
        if let Some(groups) = self.inner.lock().unwrap().groups.get_mut(&owner_id) {
            groups.retain(|g| g.chat_id != chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(auth_enabled: bool, sudo_ids: Vec<i64>) -> MemoryDirectory {
        let config = Config {
            auth_enabled,
            sudo_user_ids: sudo_ids,
            ..Config::default()
        };
        MemoryDirectory::from_config(&config)
    }

    #[tokio::test]
    async fn sudo_ids_are_seeded_as_authorized() {
        let dir = directory(true, vec![10]);
        assert!(dir.is_authorized(10).await);
        assert!(dir.is_sudo(10).await);
        assert!(!dir.is_authorized(11).await);
    }

    #[tokio::test]
    async fn disabled_auth_allows_everyone() {
        let dir = directory(false, vec![]);
        assert!(dir.is_authorized(999).await);
        assert!(!dir.is_sudo(999).await);
    }

    #[tokio::test]
    async fn authorize_and_revoke_roundtrip() {
        let dir = directory(true, vec![10]);
        dir.authorize_user(20, 10).await;
        assert!(dir.is_authorized(20).await);
        assert!(!dir.is_sudo(20).await);

        // 重复授权不会降级管理员
        dir.authorize_user(10, 10).await;
        assert!(dir.is_sudo(10).await);

        dir.revoke_user(20).await;
        assert!(!dir.is_authorized(20).await);

        let users = dir.list_users().await;
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, 10);
    }

    #[tokio::test]
    async fn destinations_are_per_owner() {
        let dir = directory(true, vec![]);
        dir.add_channel(1, -100, "资讯频道".to_string()).await;
        dir.add_group(1, -200, "练习群".to_string()).await;
        dir.add_channel(2, -300, "其他".to_string()).await;

        let destinations = dir.get_destinations(1).await;
        assert_eq!(destinations.channels.len(), 1);
        assert_eq!(destinations.groups.len(), 1);

        dir.remove_channel(1, -100).await;
        assert!(dir.get_destinations(1).await.channels.is_empty());
        assert_eq!(dir.get_destinations(2).await.channels.len(), 1);
    }
}
