//! 统一错误类型定义.
//!
//! 所有 h264nal crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// h264nal 统一错误类型
#[derive(Debug, Error)]
pub enum NalError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 无效数据 (字段越界、码流损坏等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 引用了未知或越界的参数集
    #[error("参数集引用无法解析: {0}")]
    UnresolvedReference(String),

    /// 流配置错误 (avcC 记录非法等), 重新配置前无法继续处理
    #[error("配置错误: {0}")]
    Config(String),

    /// 流尚未成功配置
    #[error("流未配置")]
    NotConfigured,

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 下游拒绝接收数据包
    #[error("下游错误: {0}")]
    Sink(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// h264nal 统一 Result 类型
pub type NalResult<T> = Result<T, NalError>;
