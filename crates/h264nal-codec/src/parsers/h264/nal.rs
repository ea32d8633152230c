//! H.264 NAL (Network Abstraction Layer) 单元定位与类型识别.
//!
//! # Annex B 字节流
//!
//! NAL 单元之间以 4 字节起始码 `00 00 00 01` 分隔, 每个输出单元从起始码开始,
//! 到下一个起始码之前结束.
//!
//! # 长度前缀 (avcC)
//!
//! 每个 NAL 单元前有 `nal_length_size` 字节的大端长度字段:
//! ```text
//! [length: 1..=4 bytes BE] [NAL data: length bytes]
//! ```
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```

use bytes::Bytes;
use h264nal_core::Timestamp;

use super::slice::SliceHeader;

/// 4 字节起始码
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// 非 IDR 图像切片
    Slice,
    /// 数据分区 A (DPA)
    SliceDpa,
    /// 数据分区 B (DPB)
    SliceDpb,
    /// 数据分区 C (DPC)
    SliceDpc,
    /// IDR 图像切片
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// 其它类型 (保留或扩展)
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否携带切片头 (类型 1..=5)
    pub fn is_slice(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为参数集 (SPS / PPS)
    pub fn is_parameter_set(&self) -> bool {
        matches!(self, Self::Sps | Self::Pps)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// NAL 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
}

impl NalHeader {
    /// 从头部字节解析
    ///
    /// forbidden_zero_bit 不做校验, 损坏的头部只影响分类结果.
    pub fn parse(byte: u8) -> Self {
        Self {
            nal_type: NalUnitType::from_type_id(byte & 0x1F),
            ref_idc: (byte & 0x60) >> 5,
        }
    }
}

/// 单个 NAL 的分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalInfo {
    /// NAL 头部
    pub header: NalHeader,
    /// 切片头 (仅切片类 NAL)
    pub slice: Option<SliceHeader>,
}

impl NalInfo {
    /// 是否为 I / SI 切片
    pub fn is_intra_slice(&self) -> bool {
        self.slice.as_ref().is_some_and(SliceHeader::is_intra)
    }

    /// 是否依赖其它帧
    pub fn is_delta_unit(&self) -> bool {
        !(self.is_intra_slice() || self.header.nal_type.is_parameter_set())
    }
}

/// 输出单元的分类汇总
///
/// 一个输出单元可能包含多个 NAL (长度前缀封装且未开启拆分时),
/// 这里汇总其中全部 NAL 的信息.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitClass {
    /// 首个 NAL 的类型
    pub nal_type: NalUnitType,
    /// 包含的 NAL 个数
    pub nal_count: usize,
    /// 是否包含切片
    pub has_slice: bool,
    /// 是否包含 I / SI 切片
    pub has_intra_slice: bool,
    /// 是否包含参数集
    pub has_parameter_set: bool,
}

impl UnitClass {
    /// 空单元 (没有可识别的 NAL)
    pub fn empty() -> Self {
        Self {
            nal_type: NalUnitType::Unknown(0),
            nal_count: 0,
            has_slice: false,
            has_intra_slice: false,
            has_parameter_set: false,
        }
    }

    /// 合并一个 NAL 的分类结果
    pub fn merge(&mut self, info: &NalInfo) {
        if self.nal_count == 0 {
            self.nal_type = info.header.nal_type;
        }
        self.nal_count += 1;
        self.has_slice |= info.slice.is_some();
        self.has_intra_slice |= info.is_intra_slice();
        self.has_parameter_set |= info.header.nal_type.is_parameter_set();
    }

    /// 是否依赖其它帧
    pub fn is_delta_unit(&self) -> bool {
        !(self.has_intra_slice || self.has_parameter_set)
    }
}

/// 倒放队列中的 NAL 单元
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// 单元数据 (从起始码或长度前缀开始)
    pub data: Bytes,
    /// 所属输入数据块的时间戳
    pub pts: Timestamp,
    /// 分类结果
    pub class: UnitClass,
}

/// 正向查找下一个起始码
///
/// 从偏移 1 开始搜索, 只接受其后至少还有 1 字节数据的起始码,
/// 返回起始码的偏移.
pub fn find_next_start_code(data: &[u8]) -> Option<usize> {
    let avail = data.len();
    (1..avail.saturating_sub(4)).find(|&i| data[i..i + 4] == START_CODE)
}

/// 反向查找起始码
///
/// 返回满足 `i + 4 <= data.len()` 的最大起始码偏移.
pub fn find_prev_start_code(data: &[u8]) -> Option<usize> {
    if data.len() < 4 {
        return None;
    }
    (0..=data.len() - 4).rev().find(|&i| data[i..i + 4] == START_CODE)
}

/// 读取大端长度前缀
pub fn read_length_prefix(data: &[u8], length_size: usize) -> usize {
    data.iter()
        .take(length_size)
        .fold(0usize, |acc, &b| (acc << 8) | usize::from(b))
}

/// 计算长度前缀封装下首个 NAL 的载荷大小
///
/// 长度字段不大于 1, 或超出剩余数据时, 视为 "剩余全部数据".
pub fn packetized_nal_size(data: &[u8], length_size: usize) -> usize {
    let remain = data.len().saturating_sub(length_size);
    let size = read_length_prefix(data, length_size);
    if size <= 1 || size > remain {
        remain
    } else {
        size
    }
}
