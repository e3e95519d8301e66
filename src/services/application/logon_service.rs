/// 登录服务
///
/// 校验操作员凭据并返回其权限等级。用户表来自配置，密码以 bcrypt 哈希保存。

use crate::models::enums::AccessLevel;
use crate::utils::config::{LogonConfig, UserAccount};
use crate::utils::error::{AppError, AppResult};

/// 凭据校验接口
pub trait CredentialVerifier: Send + Sync {
    /// 校验成功返回权限等级
    fn verify(&self, username: &str, password: &str) -> AppResult<AccessLevel>;

    /// 是否跳过登录
    fn logon_skipped(&self) -> bool {
        false
    }
}

/// 基于配置用户表的凭据校验
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentialStore {
    skip_logon: bool,
    users: Vec<UserAccount>,
}

impl ConfigCredentialStore {
    pub fn from_config(config: &LogonConfig) -> Self {
        Self {
            skip_logon: config.skip_logon,
            users: config.users.clone(),
        }
    }

    /// 添加用户（密码以给定代价做 bcrypt 哈希）
    pub fn add_user(
        &mut self,
        username: impl Into<String>,
        password: &str,
        access_level: AccessLevel,
        cost: u32,
    ) -> AppResult<()> {
        let password_hash = bcrypt::hash(password, cost)?;
        self.users.push(UserAccount {
            username: username.into(),
            password_hash,
            access_level,
        });
        Ok(())
    }
}

impl CredentialVerifier for ConfigCredentialStore {
    fn verify(&self, username: &str, password: &str) -> AppResult<AccessLevel> {
        if self.skip_logon {
            return Ok(AccessLevel::Production);
        }

        let account = self
            .users
            .iter()
            .find(|user| user.username == username)
            .ok_or_else(|| AppError::authentication_error(format!("用户 {} 不存在", username)))?;

        if bcrypt::verify(password, &account.password_hash)? {
            Ok(account.access_level)
        } else {
            Err(AppError::authentication_error(format!("用户 {} 密码错误", username)))
        }
    }

    fn logon_skipped(&self) -> bool {
        self.skip_logon
    }
}
