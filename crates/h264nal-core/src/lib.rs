//! # h264nal-core
//!
//! h264nal 核心库, 提供基础类型定义、错误处理和比特/字节级工具.
//!
//! - [`bitreader::BitReader`]: 自动去除防竞争字节的比特流读取器, 支持 Exp-Golomb
//! - [`adapter::Adapter`]: 输入字节累积器 (可用字节数 / 窥视 / 取出前 N 字节)
//! - [`Rational`] / [`Timestamp`]: 帧率与时间戳

pub mod adapter;
pub mod bitreader;
pub mod error;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use adapter::Adapter;
pub use bitreader::BitReader;
pub use error::{NalError, NalResult};
pub use rational::Rational;
pub use timestamp::Timestamp;
