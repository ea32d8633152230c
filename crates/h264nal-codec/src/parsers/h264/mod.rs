//! H.264/AVC 码流解析器.
//!
//! 把任意切分的输入整理成按 NAL 单元对齐的输出:
//! - NAL 单元定位 (Annex B 起始码 / avcC 长度前缀) 与类型识别
//! - SPS / PPS / SEI / 切片头解析, 参数集表维护
//! - 正向逐单元输出, 倒放按访问单元整理后输出

pub mod config;
pub mod context;
pub mod forward;
pub mod nal;
pub mod parser;
pub mod pps;
pub mod reverse;
pub mod sei;
pub mod slice;
pub mod sps;
pub mod store;

pub use config::{AvcConfig, ParserSettings, StreamConfig, build_avcc_config, parse_avcc_config};
pub use context::ParseContext;
pub use forward::{AssemblerState, ForwardAssembler};
pub use nal::{NalHeader, NalInfo, NalUnit, NalUnitType, UnitClass};
pub use parser::{H264Parser, PlaybackDirection};
pub use pps::Pps;
pub use reverse::{DecodeQueue, ReverseAssembler};
pub use sei::{SeiMessage, SeiPayloadType, SeiState};
pub use slice::{SliceHeader, SliceType};
pub use sps::{HrdParameters, Sps, Unparsed};
pub use store::ParameterSetStore;
