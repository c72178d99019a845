//! 运行时错误.

use std::fmt;

/// 分析流水线的运行时错误.
///
/// 配置与 I/O 错误会中止当前对象的整次分析; 算法级的退化输入
/// (如空区域, 空样本集) 通常以日志告警的方式柔性降级, 不会出现在这里.
#[derive(Debug)]
pub enum PqctError {
    /// 工作流编号不在 0..=4 范围内.
    UnknownWorkflow(u16),

    /// 配置错误 (如参数文件格式非法).
    Config(String),

    /// 来自协作方的 I/O 错误.
    Io(std::io::Error),

    /// 算法内部失败 (数值异常或无法继续的退化输入).
    Algorithm(String),
}

impl fmt::Display for PqctError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownWorkflow(id) => write!(f, "unknown workflow id: {id}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Algorithm(msg) => write!(f, "algorithm failure: {msg}"),
        }
    }
}

impl std::error::Error for PqctError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PqctError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// 分析流水线的运行时结果.
pub type PqctResult<T> = Result<T, PqctError>;
