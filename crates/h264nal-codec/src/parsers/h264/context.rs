//! NAL 分类上下文.
//!
//! 正向与倒放两条路径共用同一个分类器: 读取 NAL 头部, 对切片解析切片头,
//! 对 SPS / PPS / SEI 解码并写入参数集表. 解码失败只记录日志, 单元照常输出.

use h264nal_core::bitreader::BitReader;
use h264nal_core::Timestamp;
use log::{debug, trace, warn};

use super::config::StreamConfig;
use super::nal::{self, NalHeader, NalInfo, NalUnitType, UnitClass};
use super::sei::{self, SeiState};
use super::slice::SliceHeader;
use super::store::ParameterSetStore;

/// 分类上下文 (每条流一个)
#[derive(Debug, Default)]
pub struct ParseContext {
    store: ParameterSetStore,
    sei: SeiState,
}

impl ParseContext {
    /// 创建空上下文
    pub fn new() -> Self {
        Self::default()
    }

    /// 参数集表
    pub fn store(&self) -> &ParameterSetStore {
        &self.store
    }

    /// SEI 时序状态
    pub fn sei_state(&self) -> &SeiState {
        &self.sei
    }

    /// 清空参数集表与 SEI 状态
    pub fn reset(&mut self) {
        self.store.clear();
        self.sei.reset();
    }

    /// 分类单个 NAL (从头部字节开始, 不含起始码或长度前缀)
    ///
    /// 数据为空时返回 `None`.
    pub fn classify_nal(&mut self, nal: &[u8], pts: Timestamp) -> Option<NalInfo> {
        let (&first, payload) = nal.split_first()?;
        let header = NalHeader::parse(first);
        let mut br = BitReader::new(payload);
        let mut slice = None;

        match header.nal_type {
            t if t.is_slice() => {
                let mut parsed = SliceHeader::parse_prefix(&mut br);
                if let Err(err) = parsed.resolve(&mut br, &mut self.store) {
                    debug!("H264: 切片头解析不完整, err={}", err);
                }
                slice = Some(parsed);
            }
            NalUnitType::Sps => {
                if let Err(err) = self.store.decode_sps(&mut br) {
                    warn!("H264: 忽略无法解析的 SPS, err={}", err);
                }
            }
            NalUnitType::Pps => {
                if let Err(err) = self.store.decode_pps(&mut br) {
                    warn!("H264: 忽略无法解析的 PPS, err={}", err);
                }
            }
            NalUnitType::Sei => {
                if let Err(err) = sei::decode_sei(&mut br, &mut self.store, &mut self.sei, pts) {
                    debug!("H264: SEI 解析失败, err={}", err);
                }
            }
            _ => {}
        }

        let info = NalInfo { header, slice };
        trace!(
            "H264: NAL 分类, type={}, ref_idc={}, size={}, delta={}",
            info.header.nal_type,
            info.header.ref_idc,
            nal.len(),
            info.is_delta_unit()
        );
        Some(info)
    }

    /// 分类一个输出单元
    ///
    /// 字节流单元以 4 字节起始码开头; 长度前缀单元可能包含多个 NAL, 逐个分类后汇总.
    pub fn classify_unit(
        &mut self,
        config: &StreamConfig,
        unit: &[u8],
        pts: Timestamp,
    ) -> UnitClass {
        let mut class = UnitClass::empty();

        if !config.packetized {
            if let Some(info) = unit
                .get(nal::START_CODE.len()..)
                .and_then(|nal| self.classify_nal(nal, pts))
            {
                class.merge(&info);
            }
            return class;
        }

        let length_size = config.nal_length_size;
        let mut rest = unit;
        while rest.len() > length_size {
            let size = nal::packetized_nal_size(rest, length_size);
            let body = &rest[length_size..length_size + size];
            if let Some(info) = self.classify_nal(body, pts) {
                class.merge(&info);
            }
            rest = &rest[length_size + size..];
        }
        class
    }
}
