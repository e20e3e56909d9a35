//! 授权守卫
//!
//! 显式的守卫函数，在每个命令处理器之前组合调用，
//! 返回结构化的判定结果，不做任何隐式控制流包装

use crate::services::DirectoryService;

/// 命令要求的访问级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    User,
    Sudo,
}

/// 授权判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// 放行
    Authorized,
    /// 未授权用户
    Denied,
    /// 已授权但缺少管理员权限
    SudoRequired,
}

/// 检查用户对给定级别的访问权限
pub async fn check(
    directory: &dyn DirectoryService,
    user_id: i64,
    level: AccessLevel,
) -> AuthDecision {
    if !directory.is_authorized(user_id).await {
        return AuthDecision::Denied;
    }
    match level {
        AccessLevel::User => AuthDecision::Authorized,
        AccessLevel::Sudo => {
            if directory.is_sudo(user_id).await {
                AuthDecision::Authorized
            } else {
                AuthDecision::SudoRequired
            }
        }
    }
}
