//! 合并引擎错误类型

use thiserror::Error;

/// 错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 调用方或数据形态问题，可跳过该记录
    InvalidArgument,
    /// 本地索引异常，当前批次中止
    StoreFault,
}

/// 合并引擎错误
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store fault: {0}")]
    StoreFault(String),
}

impl MergeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreFault(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            MergeError::StoreFault(_) => ErrorKind::StoreFault,
        }
    }

    pub fn is_store_fault(&self) -> bool {
        self.kind() == ErrorKind::StoreFault
    }
}

impl From<sqlx::Error> for MergeError {
    fn from(e: sqlx::Error) -> Self {
        MergeError::StoreFault(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for MergeError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        MergeError::StoreFault(format!("migration failed: {}", e))
    }
}

/// 云端记录字段读取错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("field `{0}` is missing")]
    Missing(String),

    #[error("field `{key}` is not a {expected}")]
    WrongType { key: String, expected: &'static str },
}

impl From<FieldError> for MergeError {
    fn from(e: FieldError) -> Self {
        MergeError::InvalidArgument(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
