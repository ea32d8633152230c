//! # h264nal
//!
//! 纯 Rust 实现的 H.264 NAL 单元解析与访问单元组装.
//!
//! - **NAL 定位**: Annex B 起始码与 avcC 长度前缀两种封装
//! - **参数集**: SPS / PPS / SEI / 切片头解析
//! - **组装**: 正向逐单元输出, 倒放按访问单元整理
//!
//! # 快速开始
//!
//! ```rust
//! use h264nal::codec::{H264Parser, Packet, ParserSettings};
//! use h264nal::core::Timestamp;
//!
//! let mut parser = H264Parser::new(ParserSettings::default());
//! let mut out: Vec<Packet> = Vec::new();
//! let data = bytes::Bytes::from_static(&[0, 0, 0, 1, 0x09, 0xF0]);
//! parser.push_chunk(data, Timestamp::none(), false, &mut out).unwrap();
//! parser.finish(&mut out).unwrap();
//! assert_eq!(out.len(), 1);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `h264nal-core` | 错误类型、比特读取器、字节累积器、时间戳 |
//! | `h264nal-codec` | NAL 分类、参数集表、正向 / 倒放组装器 |

/// 核心类型与工具
pub use h264nal_core as core;

/// NAL 解析与组装
pub use h264nal_codec as codec;

pub mod logging;

/// 获取 h264nal 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
