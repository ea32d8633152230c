//! H.264 切片头 (slice header) 前缀解析.
//!
//! 分类只需要 `first_mb_in_slice` 与 `slice_type`; 其后的 pps_id / frame_num /
//! 场标志需要查参数集表, 查表失败只影响这部分元数据.

use h264nal_core::bitreader::BitReader;
use h264nal_core::{NalError, NalResult};

use super::store::ParameterSetStore;

/// 切片类型 (slice_type mod 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    /// P 切片
    P,
    /// B 切片
    B,
    /// I 切片
    I,
    /// SP 切片
    Sp,
    /// SI 切片
    Si,
}

impl SliceType {
    /// 从 slice_type 语法元素转换 (0..=9)
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw > 9 {
            return None;
        }
        Some(match raw % 5 {
            0 => Self::P,
            1 => Self::B,
            2 => Self::I,
            3 => Self::Sp,
            _ => Self::Si,
        })
    }

    /// 是否为帧内切片 (I / SI)
    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I | Self::Si)
    }
}

impl std::fmt::Display for SliceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::P => write!(f, "P"),
            Self::B => write!(f, "B"),
            Self::I => write!(f, "I"),
            Self::Sp => write!(f, "SP"),
            Self::Si => write!(f, "SI"),
        }
    }
}

/// 切片头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    /// first_mb_in_slice
    pub first_mb_in_slice: u32,
    /// slice_type 原始值
    pub raw_slice_type: u32,
    /// 切片类型, 原始值非法时为 `None`
    pub slice_type: Option<SliceType>,
    /// pic_parameter_set_id, 未解析时为 `None`
    pub pps_id: Option<u32>,
    /// frame_num, 未解析时为 `None`
    pub frame_num: Option<u32>,
    /// field_pic_flag
    pub field_pic_flag: bool,
    /// bottom_field_flag
    pub bottom_field_flag: bool,
}

impl SliceHeader {
    /// 解析切片头前两个字段
    pub fn parse_prefix(br: &mut BitReader) -> Self {
        let first_mb_in_slice = br.read_ue();
        let raw_slice_type = br.read_ue();
        Self {
            first_mb_in_slice,
            raw_slice_type,
            slice_type: SliceType::from_raw(raw_slice_type),
            pps_id: None,
            frame_num: None,
            field_pic_flag: false,
            bottom_field_flag: false,
        }
    }

    /// 是否为帧内切片
    pub fn is_intra(&self) -> bool {
        self.slice_type.is_some_and(|t| t.is_intra())
    }

    /// 继续解析 pps_id 之后的字段
    ///
    /// 通过 PPS 找到 SPS 并设为当前 SPS, 再按 SPS 读取 frame_num 与场标志.
    pub fn resolve(
        &mut self,
        br: &mut BitReader,
        store: &mut ParameterSetStore,
    ) -> NalResult<()> {
        let pps_id = br.read_ue();
        self.pps_id = Some(pps_id);

        let Some(sps_id) = store.get_or_create_pps(pps_id).map(|pps| pps.sps_id) else {
            return Err(NalError::UnresolvedReference(format!(
                "H264: 切片引用的 PPS 无效, pps_id={}",
                pps_id
            )));
        };
        let Some(sps) = store.get_or_create_sps(u32::from(sps_id)) else {
            return Err(NalError::UnresolvedReference(format!(
                "H264: 切片引用的 SPS 无效, sps_id={}",
                sps_id
            )));
        };

        self.frame_num = Some(br.read(sps.frame_num_bits()));
        if !sps.frame_mbs_only_flag {
            self.field_pic_flag = br.read_flag();
            if self.field_pic_flag {
                self.bottom_field_flag = br.read_flag();
            }
        }
        Ok(())
    }
}
