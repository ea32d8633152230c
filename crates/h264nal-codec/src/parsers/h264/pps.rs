//! H.264 PPS (Picture Parameter Set) 解析器.
//!
//! 只保留 pps_id 与其引用的 sps_id, 其余字段不解码.

use h264nal_core::bitreader::BitReader;
use h264nal_core::{NalError, NalResult};

use super::sps::MAX_SPS_COUNT;

/// PPS 表容量 (pps_id 取值 0..=255)
pub const MAX_PPS_COUNT: usize = 256;

/// PPS 解析结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pps {
    /// pic_parameter_set_id
    pub pps_id: u8,
    /// 引用的 seq_parameter_set_id (按 id 查表, 不持有 SPS)
    pub sps_id: u8,
}

/// 从 PPS 载荷 (不含 NAL 头部字节) 解析
pub fn parse_pps(br: &mut BitReader) -> NalResult<Pps> {
    let pps_id = br.read_ue();
    if pps_id as usize >= MAX_PPS_COUNT {
        return Err(NalError::InvalidData(format!(
            "H264: pps_id 超出范围, pps_id={}",
            pps_id
        )));
    }
    let sps_id = br.read_ue();
    if sps_id as usize >= MAX_SPS_COUNT {
        return Err(NalError::InvalidData(format!(
            "H264: PPS 引用的 sps_id 超出范围, pps_id={}, sps_id={}",
            pps_id, sps_id
        )));
    }

    Ok(Pps {
        pps_id: pps_id as u8,
        sps_id: sps_id as u8,
    })
}
