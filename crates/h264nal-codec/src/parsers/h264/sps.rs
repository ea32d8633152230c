//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! 只解码访问单元组装与时序信息需要的字段:
//! - Profile / Level 与 sps_id
//! - `log2_max_frame_num_minus4`, `pic_order_cnt_type`, `frame_mbs_only_flag`
//! - VUI timing_info 与 NAL/VCL HRD 参数
//!
//! 图像尺寸、裁剪偏移、宽高比等字段读取后直接丢弃.
//! 遇到量化矩阵、POC type 1 或 bitstream_restriction 时停止解码,
//! 保留已解码的前缀并通过 [`Sps::unparsed`] 标记.

use h264nal_core::bitreader::BitReader;
use h264nal_core::{NalError, NalResult, Rational};
use log::{debug, warn};

/// SPS 表容量 (sps_id 取值 0..=31)
pub const MAX_SPS_COUNT: usize = 32;

/// 可识别但未解码的 SPS 字段段落
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unparsed {
    /// seq_scaling_matrix_present_flag = 1
    ScalingMatrix,
    /// pic_order_cnt_type = 1 的参考帧偏移列表
    PocType1,
    /// VUI 尾部的 bitstream_restriction 段
    BitstreamRestriction,
}

/// HRD (Hypothetical Reference Decoder) 参数
///
/// NAL HRD 与 VCL HRD 结构相同, 后解码的一组覆盖先解码的一组.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HrdParameters {
    /// cpb_cnt_minus1 (0..=31)
    pub cpb_cnt_minus1: u8,
    /// initial_cpb_removal_delay_length_minus1
    pub initial_cpb_removal_delay_length_minus1: u8,
    /// cpb_removal_delay_length_minus1
    pub cpb_removal_delay_length_minus1: u8,
    /// dpb_output_delay_length_minus1
    pub dpb_output_delay_length_minus1: u8,
    /// time_offset_length (位数, 可为 0)
    pub time_offset_length: u8,
}

/// SPS 解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sps {
    /// profile_idc (编码规格, 如 66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    /// level_idc (编码级别, 如 30=3.0, 41=4.1)
    pub level_idc: u8,
    /// seq_parameter_set_id
    pub sps_id: u8,
    /// log2_max_frame_num_minus4 (0..=12)
    pub log2_max_frame_num_minus4: u8,
    /// 图像顺序计数类型 (0, 1, 2)
    pub pic_order_cnt_type: u8,
    /// log2_max_pic_order_cnt_lsb_minus4 (仅 poc_type==0)
    pub log2_max_pic_order_cnt_lsb_minus4: u8,
    /// 是否为帧编码 (非场编码)
    pub frame_mbs_only_flag: bool,
    /// frame_cropping_flag (偏移本身不保存)
    pub frame_cropping_flag: bool,
    /// 是否存在 VUI 参数
    pub vui_parameters_present_flag: bool,
    /// timing_info_present_flag
    pub timing_info_present_flag: bool,
    /// num_units_in_tick (为 0 时 timing_info 被丢弃)
    pub num_units_in_tick: u32,
    /// time_scale (为 0 时 timing_info 被丢弃)
    pub time_scale: u32,
    /// fixed_frame_rate_flag
    pub fixed_frame_rate_flag: bool,
    /// nal_hrd_parameters_present_flag
    pub nal_hrd_parameters_present_flag: bool,
    /// vcl_hrd_parameters_present_flag
    pub vcl_hrd_parameters_present_flag: bool,
    /// HRD 参数
    pub hrd: HrdParameters,
    /// pic_struct_present_flag
    pub pic_struct_present_flag: bool,
    /// 未解码的段落, `None` 表示所需字段已全部解码
    pub unparsed: Option<Unparsed>,
}

impl Sps {
    /// 创建仅含 id 的空记录 (首次被引用时使用)
    pub fn empty(sps_id: u8) -> Self {
        Self {
            sps_id,
            ..Self::default()
        }
    }

    /// 是否存在任一组 HRD 参数
    pub fn has_hrd(&self) -> bool {
        self.nal_hrd_parameters_present_flag || self.vcl_hrd_parameters_present_flag
    }

    /// 帧率: time_scale / (2 * num_units_in_tick)
    pub fn frame_rate(&self) -> Option<Rational> {
        if !self.timing_info_present_flag || self.num_units_in_tick == 0 || self.time_scale == 0 {
            return None;
        }
        Rational::from_ratio(
            u64::from(self.time_scale),
            2 * u64::from(self.num_units_in_tick),
        )
    }

    /// 切片头中 frame_num 的位数
    pub fn frame_num_bits(&self) -> u32 {
        u32::from(self.log2_max_frame_num_minus4) + 4
    }
}

/// 从 SPS 载荷 (不含 NAL 头部字节) 解析
///
/// 解析结果是一条完整的新记录; 失败时调用方的参数集表保持不变.
pub fn parse_sps(br: &mut BitReader) -> NalResult<Sps> {
    let profile_idc = br.read(8) as u8;
    // constraint_set0..3 + reserved_zero_4bits
    br.skip(8);
    let level_idc = br.read(8) as u8;

    let sps_id = br.read_ue();
    if sps_id as usize >= MAX_SPS_COUNT {
        return Err(NalError::InvalidData(format!(
            "H264: sps_id 超出范围, sps_id={}",
            sps_id
        )));
    }

    let mut sps = Sps {
        profile_idc,
        level_idc,
        ..Sps::empty(sps_id as u8)
    };

    if has_chroma_info(profile_idc) {
        let chroma_format_idc = br.read_ue();
        if chroma_format_idc == 3 {
            br.skip(1); // separate_colour_plane_flag
        }
        br.read_ue(); // bit_depth_luma_minus8
        br.read_ue(); // bit_depth_chroma_minus8
        br.skip(1); // qpprime_y_zero_transform_bypass_flag
        if br.read_flag() {
            debug!(
                "H264: SPS 量化矩阵未解码, 停止解析, sps_id={}",
                sps.sps_id
            );
            sps.unparsed = Some(Unparsed::ScalingMatrix);
            return Ok(sps);
        }
    }

    let log2_max_frame_num_minus4 = br.read_ue();
    if log2_max_frame_num_minus4 > 12 {
        return Err(NalError::InvalidData(format!(
            "H264: log2_max_frame_num_minus4 超出范围, value={}",
            log2_max_frame_num_minus4
        )));
    }
    sps.log2_max_frame_num_minus4 = log2_max_frame_num_minus4 as u8;

    let poc_type = br.read_ue();
    match poc_type {
        0 => {
            let lsb_minus4 = br.read_ue();
            if lsb_minus4 > 12 {
                return Err(NalError::InvalidData(format!(
                    "H264: log2_max_pic_order_cnt_lsb_minus4 超出范围, value={}",
                    lsb_minus4
                )));
            }
            sps.pic_order_cnt_type = 0;
            sps.log2_max_pic_order_cnt_lsb_minus4 = lsb_minus4 as u8;
        }
        1 => {
            debug!(
                "H264: SPS pic_order_cnt_type=1 未解码, 停止解析, sps_id={}",
                sps.sps_id
            );
            sps.pic_order_cnt_type = 1;
            sps.unparsed = Some(Unparsed::PocType1);
            return Ok(sps);
        }
        2 => sps.pic_order_cnt_type = 2,
        _ => {
            return Err(NalError::InvalidData(format!(
                "H264: pic_order_cnt_type 非法, value={}",
                poc_type
            )));
        }
    }

    br.read_ue(); // max_num_ref_frames
    br.skip(1); // gaps_in_frame_num_value_allowed_flag
    br.read_ue(); // pic_width_in_mbs_minus1
    br.read_ue(); // pic_height_in_map_units_minus1

    sps.frame_mbs_only_flag = br.read_flag();
    if !sps.frame_mbs_only_flag {
        br.skip(1); // mb_adaptive_frame_field_flag
    }
    br.skip(1); // direct_8x8_inference_flag

    sps.frame_cropping_flag = br.read_flag();
    if sps.frame_cropping_flag {
        for _ in 0..4 {
            br.read_ue();
        }
    }

    sps.vui_parameters_present_flag = br.read_flag();
    if sps.vui_parameters_present_flag {
        parse_vui(br, &mut sps)?;
    }

    debug!(
        "H264: 解析 SPS, sps_id={}, profile_idc={}, level_idc={}, poc_type={}, frame_mbs_only={}",
        sps.sps_id,
        sps.profile_idc,
        sps.level_idc,
        sps.pic_order_cnt_type,
        sps.frame_mbs_only_flag
    );

    Ok(sps)
}

/// 解析 VUI 参数
fn parse_vui(br: &mut BitReader, sps: &mut Sps) -> NalResult<()> {
    // aspect_ratio_info_present_flag
    if br.read_flag() && br.read(8) == 255 {
        br.skip(32); // sar_width + sar_height
    }

    // overscan_info_present_flag
    if br.read_flag() {
        br.skip(1);
    }

    // video_signal_type_present_flag
    if br.read_flag() {
        br.skip(4); // video_format + video_full_range_flag
        if br.read_flag() {
            br.skip(24); // colour_primaries, transfer_characteristics, matrix_coefficients
        }
    }

    // chroma_loc_info_present_flag
    if br.read_flag() {
        br.read_ue();
        br.read_ue();
    }

    sps.timing_info_present_flag = br.read_flag();
    if sps.timing_info_present_flag {
        let num_units_in_tick = br.read(32);
        let time_scale = br.read(32);
        let fixed_frame_rate_flag = br.read_flag();

        if time_scale == 0 {
            warn!("H264: VUI time_scale 为 0, 丢弃 timing_info");
        } else if num_units_in_tick == 0 {
            warn!("H264: VUI num_units_in_tick 为 0, 丢弃 timing_info");
        } else {
            sps.num_units_in_tick = num_units_in_tick;
            sps.time_scale = time_scale;
            sps.fixed_frame_rate_flag = fixed_frame_rate_flag;
        }
    }

    sps.nal_hrd_parameters_present_flag = br.read_flag();
    if sps.nal_hrd_parameters_present_flag {
        sps.hrd = parse_hrd(br)?;
    }
    sps.vcl_hrd_parameters_present_flag = br.read_flag();
    if sps.vcl_hrd_parameters_present_flag {
        sps.hrd = parse_hrd(br)?;
    }
    if sps.has_hrd() {
        br.skip(1); // low_delay_hrd_flag
    }

    sps.pic_struct_present_flag = br.read_flag();

    if br.read_flag() {
        sps.unparsed = Some(Unparsed::BitstreamRestriction);
    }

    Ok(())
}

/// 解析 HRD 参数
fn parse_hrd(br: &mut BitReader) -> NalResult<HrdParameters> {
    let cpb_cnt_minus1 = br.read_ue();
    if cpb_cnt_minus1 > 31 {
        return Err(NalError::InvalidData(format!(
            "H264: cpb_cnt_minus1 超出范围, value={}",
            cpb_cnt_minus1
        )));
    }

    br.skip(4); // bit_rate_scale
    br.skip(4); // cpb_size_scale
    for _ in 0..=cpb_cnt_minus1 {
        br.read_ue(); // bit_rate_value_minus1
        br.read_ue(); // cpb_size_value_minus1
        br.skip(1); // cbr_flag
    }

    Ok(HrdParameters {
        cpb_cnt_minus1: cpb_cnt_minus1 as u8,
        initial_cpb_removal_delay_length_minus1: br.read(5) as u8,
        cpb_removal_delay_length_minus1: br.read(5) as u8,
        dpb_output_delay_length_minus1: br.read(5) as u8,
        time_offset_length: br.read(5) as u8,
    })
}

/// 携带色度格式 / 位深字段的 profile
fn has_chroma_info(profile_idc: u8) -> bool {
    matches!(profile_idc, 100 | 110 | 122 | 244 | 44 | 83 | 86)
}
