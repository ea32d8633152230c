//! # h264nal-codec
//!
//! H.264 码流解析库, 负责把任意切分的输入数据块整理成按 NAL 单元对齐的输出数据包.
//!
//! - 支持 Annex B 字节流 (`00 00 00 01` 起始码) 与 avcC 长度前缀两种封装
//! - 解析 SPS / PPS / SEI / 切片头, 维护参数集表
//! - 正向播放时逐个输出 NAL 单元, 倒放时按 GOP 缓存后再输出
//!
//! ## 使用示例
//!
//! ```rust
//! use bytes::Bytes;
//! use h264nal_codec::{H264Parser, Packet, ParserSettings};
//! use h264nal_core::Timestamp;
//!
//! let mut parser = H264Parser::new(ParserSettings::default());
//! parser.set_codec_data(None).unwrap();
//!
//! let mut out: Vec<Packet> = Vec::new();
//! let data = Bytes::from_static(&[0, 0, 0, 1, 0x09, 0xF0, 0, 0, 0, 1, 0x09, 0xF0]);
//! parser
//!     .push_chunk(data, Timestamp::none(), false, &mut out)
//!     .unwrap();
//! parser.finish(&mut out).unwrap();
//! assert_eq!(out.len(), 2);
//! ```

pub mod packet;
pub mod parsers;
pub mod sink;

// 重导出常用类型
pub use packet::Packet;
pub use parsers::h264::{
    H264Parser, NalUnitType, ParameterSetStore, ParserSettings, PlaybackDirection, StreamConfig,
};
pub use sink::PacketSink;
