//! 奖励引擎错误类型
//!
//! 区分调用方需要处理的错误（参数非法、账本不可用）与引擎内部吸收的铸造类故障

use thiserror::Error;

use crate::mint::MintError;

/// 奖励引擎错误类型
#[derive(Debug, Error)]
pub enum RewardError {
    /// 钱包地址、证书引用等输入非法，任何写入发生前拒绝
    #[error("参数校验失败: {0}")]
    InvalidInput(String),

    /// 存储故障，通知未生效，可整体重试
    #[error("账本存储不可用: {0}")]
    LedgerUnavailable(String),

    #[error("机构不存在: wallet={0}")]
    InstitutionNotFound(String),

    /// 铸造能力未配置或不可达，里程碑与积分不受影响
    #[error("徽章铸造不可用: {0}")]
    MintUnavailable(String),

    /// 唯一约束冲突被转换为无操作，不是真正的失败
    #[error("重复记录已忽略: {entity} {key}")]
    DuplicateSuppressed { entity: &'static str, key: String },

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 奖励引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, RewardError>;

impl From<sqlx::Error> for RewardError {
    fn from(err: sqlx::Error) -> Self {
        Self::LedgerUnavailable(err.to_string())
    }
}

/// 铸造失败只推迟徽章，统一归为铸造不可用
impl From<MintError> for RewardError {
    fn from(err: MintError) -> Self {
        Self::MintUnavailable(err.to_string())
    }
}

impl RewardError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerUnavailable(_) | Self::MintUnavailable(_))
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::InstitutionNotFound(_) | Self::DuplicateSuppressed { .. }
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            Self::InstitutionNotFound(_) => "INSTITUTION_NOT_FOUND",
            Self::MintUnavailable(_) => "MINT_UNAVAILABLE",
            Self::DuplicateSuppressed { .. } => "DUPLICATE_SUPPRESSED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(RewardError::LedgerUnavailable("pool timed out".to_string()).is_retryable());
        assert!(RewardError::MintUnavailable("relay down".to_string()).is_retryable());
        assert!(!RewardError::InvalidInput("empty wallet".to_string()).is_retryable());
        assert!(!RewardError::InstitutionNotFound("0xabc".to_string()).is_retryable());
    }

    #[test]
    fn test_error_is_business_error() {
        assert!(RewardError::InvalidInput("x".to_string()).is_business_error());
        assert!(
            RewardError::DuplicateSuppressed {
                entity: "milestone",
                key: "1:10".to_string()
            }
            .is_business_error()
        );
        assert!(!RewardError::LedgerUnavailable("x".to_string()).is_business_error());
        assert!(!RewardError::Internal("x".to_string()).is_business_error());
    }

    #[test]
    fn test_sqlx_error_maps_to_ledger_unavailable() {
        let err: RewardError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, RewardError::LedgerUnavailable(_)));
        assert_eq!(err.error_code(), "LEDGER_UNAVAILABLE");
    }

    #[test]
    fn test_mint_error_maps_to_mint_unavailable() {
        let err: RewardError = MintError::Timeout { seconds: 120 }.into();
        assert!(matches!(err, RewardError::MintUnavailable(_)));
        assert!(err.to_string().contains("120"));
        assert_eq!(err.error_code(), "MINT_UNAVAILABLE");

        let err: RewardError = MintError::Rejected("bad tier".to_string()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = RewardError::DuplicateSuppressed {
            entity: "badge",
            key: "7:GOLD".to_string(),
        };
        assert!(err.to_string().contains("badge"));
        assert!(err.to_string().contains("7:GOLD"));
    }
}
