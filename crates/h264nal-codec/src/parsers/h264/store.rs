//! 参数集表.
//!
//! SPS / PPS 按流内 id 存放, 首次引用或首次解码时创建, 同 id 重复定义时整体覆盖.
//! 表中记录只在 [`ParameterSetStore::clear`] 时移除.

use std::collections::BTreeMap;

use h264nal_core::bitreader::BitReader;
use h264nal_core::NalResult;
use log::debug;

use super::pps::{self, MAX_PPS_COUNT, Pps};
use super::sps::{self, MAX_SPS_COUNT, Sps};

/// 参数集表
#[derive(Debug, Default)]
pub struct ParameterSetStore {
    sps: BTreeMap<u8, Sps>,
    pps: BTreeMap<u8, Pps>,
    /// 最近一次解析到的 SPS (切片头 / SPS / buffering period 设置)
    active_sps: Option<u8>,
}

impl ParameterSetStore {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建 SPS 记录, 并将其设为当前 SPS
    ///
    /// id 越界时返回 `None`.
    pub fn get_or_create_sps(&mut self, sps_id: u32) -> Option<&mut Sps> {
        if sps_id as usize >= MAX_SPS_COUNT {
            debug!("H264: sps_id 超出范围, 无法获取 SPS, sps_id={}", sps_id);
            return None;
        }
        let id = sps_id as u8;
        self.active_sps = Some(id);
        Some(self.sps.entry(id).or_insert_with(|| Sps::empty(id)))
    }

    /// 获取或创建 PPS 记录
    ///
    /// id 越界时返回 `None`.
    pub fn get_or_create_pps(&mut self, pps_id: u32) -> Option<&mut Pps> {
        if pps_id as usize >= MAX_PPS_COUNT {
            debug!("H264: pps_id 超出范围, 无法获取 PPS, pps_id={}", pps_id);
            return None;
        }
        let id = pps_id as u8;
        Some(self.pps.entry(id).or_insert_with(|| Pps {
            pps_id: id,
            sps_id: 0,
        }))
    }

    /// 按 id 查询 SPS
    pub fn sps(&self, sps_id: u8) -> Option<&Sps> {
        self.sps.get(&sps_id)
    }

    /// 按 id 查询 PPS
    pub fn pps(&self, pps_id: u8) -> Option<&Pps> {
        self.pps.get(&pps_id)
    }

    /// 当前 SPS
    pub fn active_sps(&self) -> Option<&Sps> {
        self.active_sps.and_then(|id| self.sps.get(&id))
    }

    /// 解析 SPS 并写入表中
    ///
    /// 解析失败时表保持不变.
    pub fn decode_sps(&mut self, br: &mut BitReader) -> NalResult<&Sps> {
        let parsed = sps::parse_sps(br)?;
        let id = parsed.sps_id;
        self.active_sps = Some(id);
        let slot = self.sps.entry(id).or_default();
        *slot = parsed;
        Ok(slot)
    }

    /// 解析 PPS 并写入表中
    pub fn decode_pps(&mut self, br: &mut BitReader) -> NalResult<&Pps> {
        let parsed = pps::parse_pps(br)?;
        debug!(
            "H264: 解析 PPS, pps_id={}, sps_id={}",
            parsed.pps_id, parsed.sps_id
        );
        let slot = self.pps.entry(parsed.pps_id).or_default();
        *slot = parsed;
        Ok(slot)
    }

    /// SPS 记录数
    pub fn sps_count(&self) -> usize {
        self.sps.len()
    }

    /// PPS 记录数
    pub fn pps_count(&self) -> usize {
        self.pps.len()
    }

    /// 表是否为空
    pub fn is_empty(&self) -> bool {
        self.sps.is_empty() && self.pps.is_empty()
    }

    /// 清空全部参数集
    pub fn clear(&mut self) {
        self.sps.clear();
        self.pps.clear();
        self.active_sps = None;
    }
}
