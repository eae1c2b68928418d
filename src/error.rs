//! 调度错误定义
//!
//! 上下文创建、参数校验和后端选择过程中可能产生的所有错误

use std::fmt;

/// 调度错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// 无法分配上下文所需的资源（栈、线程等）
    ResourceExhausted {
        /// 分配的对象
        what: &'static str,
        /// 请求的大小（字节）
        requested: usize,
        /// 失败原因
        reason: String,
    },
    /// 参数非法
    InvalidArgument {
        /// 参数名
        name: &'static str,
        /// 原始值
        value: String,
    },
    /// 当前平台不支持请求的后端
    Unsupported(&'static str),
    /// 调度结束时仍有上下文未完成全部操作（例如入口 panic）
    Incomplete {
        completed: usize,
        expected: usize,
    },
}

impl SchedError {
    /// 构造资源耗尽错误
    pub fn exhausted(what: &'static str, requested: usize, reason: impl Into<String>) -> Self {
        SchedError::ResourceExhausted {
            what,
            requested,
            reason: reason.into(),
        }
    }

    /// 构造参数错误
    pub fn invalid(name: &'static str, value: impl fmt::Display) -> Self {
        SchedError::InvalidArgument {
            name,
            value: value.to_string(),
        }
    }

    /// 是否是资源耗尽
    #[cfg(test)]
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, SchedError::ResourceExhausted { .. })
    }

    /// 是否是参数错误
    #[cfg(test)]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, SchedError::InvalidArgument { .. })
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::ResourceExhausted { what, requested, reason } => {
                write!(f, "resource exhausted: cannot allocate {} of {} bytes ({})", what, requested, reason)
            }
            SchedError::InvalidArgument { name, value } => {
                write!(f, "invalid argument: {} = '{}'", name, value)
            }
            SchedError::Unsupported(what) => {
                write!(f, "unsupported on this platform: {}", what)
            }
            SchedError::Incomplete { completed, expected } => {
                write!(f, "only {} of {} contexts completed", completed, expected)
            }
        }
    }
}

impl std::error::Error for SchedError {}

/// 调度结果类型
pub type SchedResult<T> = Result<T, SchedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = SchedError::exhausted("stack", 1 << 40, "exceeds limit");
        assert!(e.is_resource_exhausted());
        assert!(e.to_string().contains("stack"));

        let e = SchedError::invalid("contextCount", 0);
        assert!(e.is_invalid_argument());
        assert_eq!(e.to_string(), "invalid argument: contextCount = '0'");
    }
}
