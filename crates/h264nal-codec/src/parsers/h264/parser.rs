//! H.264 解析器入口.
//!
//! 持有一条流的全部状态: 流配置、分类上下文 (参数集表 + SEI 状态) 以及正向 / 倒放两个组装器.
//! 播放方向由 [`H264Parser::set_rate`] 决定, 负速率走倒放路径.

use bytes::Bytes;
use h264nal_core::{NalError, NalResult, Rational, Timestamp};
use log::{debug, error, info};

use super::config::{ParserSettings, StreamConfig, parse_avcc_config};
use super::context::ParseContext;
use super::forward::{AssemblerState, ForwardAssembler};
use super::reverse::{DecodeQueue, ReverseAssembler};
use super::sei::SeiState;
use super::store::ParameterSetStore;
use crate::sink::PacketSink;

/// 播放方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackDirection {
    /// 正向
    Forward,
    /// 倒放
    Reverse,
}

/// 配置状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigState {
    /// 尚未配置, 首个数据块到达时按字节流处理
    Unset,
    /// 已配置
    Ready(StreamConfig),
    /// 配置失败, 重新配置前拒绝输入
    Failed,
}

/// H.264 NAL 解析器
#[derive(Debug)]
pub struct H264Parser {
    settings: ParserSettings,
    config: ConfigState,
    direction: PlaybackDirection,
    ctx: ParseContext,
    forward: ForwardAssembler,
    reverse: ReverseAssembler,
}

impl H264Parser {
    /// 创建解析器
    pub fn new(settings: ParserSettings) -> Self {
        Self {
            settings,
            config: ConfigState::Unset,
            direction: PlaybackDirection::Forward,
            ctx: ParseContext::new(),
            forward: ForwardAssembler::new(),
            reverse: ReverseAssembler::new(),
        }
    }

    /// 设置流配置
    ///
    /// `codec_data` 为 avcC 记录时按长度前缀封装处理, 其中的 SPS / PPS 写入参数集表;
    /// 为 `None` 时按 Annex B 字节流处理. 配置失败后, 再次成功配置前所有输入都会被拒绝.
    pub fn set_codec_data(&mut self, codec_data: Option<&[u8]>) -> NalResult<()> {
        let Some(data) = codec_data else {
            let config = StreamConfig::byte_stream(&self.settings);
            debug!("H264: 未提供 codec_data, 按字节流处理");
            self.config = ConfigState::Ready(config);
            return Ok(());
        };

        let avc = match parse_avcc_config(data) {
            Ok(avc) => avc,
            Err(err) => {
                error!("H264: codec_data 无效, err={}", err);
                self.config = ConfigState::Failed;
                return Err(err);
            }
        };

        info!(
            "H264: 长度前缀封装, nal_length_size={}, sps_count={}, pps_count={}",
            avc.length_size,
            avc.sps_list.len(),
            avc.pps_list.len()
        );
        for nal in avc.sps_list.iter().chain(avc.pps_list.iter()) {
            self.ctx.classify_nal(nal, Timestamp::none());
        }
        let config = StreamConfig::packetized(avc.length_size, &self.settings);
        self.config = ConfigState::Ready(config);
        Ok(())
    }

    /// 设置播放速率, 负值进入倒放
    pub fn set_rate(&mut self, rate: f64) {
        let direction = if rate < 0.0 {
            PlaybackDirection::Reverse
        } else {
            PlaybackDirection::Forward
        };
        if direction != self.direction {
            debug!(
                "H264: 播放方向变化, rate={}, direction={:?}",
                rate, direction
            );
        }
        self.direction = direction;
    }

    /// 当前播放方向
    pub fn direction(&self) -> PlaybackDirection {
        self.direction
    }

    /// 修改设置, 已生效的配置同步更新
    pub fn set_split_packetized(&mut self, split: bool) {
        self.settings.split_packetized = split;
        if let ConfigState::Ready(config) = &mut self.config {
            config.split_packetized = split;
        }
    }

    /// 当前设置
    pub fn settings(&self) -> &ParserSettings {
        &self.settings
    }

    /// 当前流配置
    pub fn config(&self) -> Option<&StreamConfig> {
        match &self.config {
            ConfigState::Ready(config) => Some(config),
            ConfigState::Unset | ConfigState::Failed => None,
        }
    }

    /// 送入一个输入块
    ///
    /// 正向播放时立即输出所有已完整的单元; 倒放时只在 `discont` 为 true 时输出.
    pub fn push_chunk<S: PacketSink + ?Sized>(
        &mut self,
        data: Bytes,
        pts: Timestamp,
        discont: bool,
        sink: &mut S,
    ) -> NalResult<()> {
        let config = self.resolve_config()?;
        match self.direction {
            PlaybackDirection::Forward => {
                self.forward
                    .push(&mut self.ctx, &config, &data, pts, discont, sink)
            }
            PlaybackDirection::Reverse => {
                self.reverse
                    .push(&mut self.ctx, &config, Some(data), pts, discont, sink)
            }
        }
    }

    /// 流结束, 输出所有剩余单元
    pub fn finish<S: PacketSink + ?Sized>(&mut self, sink: &mut S) -> NalResult<()> {
        let config = match self.config {
            ConfigState::Ready(config) => config,
            // 从未收到数据, 没有可输出的内容
            ConfigState::Unset => return Ok(()),
            ConfigState::Failed => return Err(NalError::NotConfigured),
        };
        match self.direction {
            PlaybackDirection::Forward => self.forward.finish(&mut self.ctx, &config, sink),
            PlaybackDirection::Reverse => self.reverse.finish(&mut self.ctx, &config, sink),
        }
    }

    /// 清空全部流状态
    ///
    /// 丢弃残留字节、收集的数据块、解码队列、参数集表与 SEI 状态, 播放方向恢复为正向.
    /// 流配置保留. 重复调用与调用一次效果相同.
    pub fn flush(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.ctx.reset();
        self.direction = PlaybackDirection::Forward;
    }

    /// 参数集表
    pub fn parameter_sets(&self) -> &ParameterSetStore {
        self.ctx.store()
    }

    /// SEI 时序状态
    pub fn sei_state(&self) -> &SeiState {
        self.ctx.sei_state()
    }

    /// 倒放解码队列
    pub fn decode_queue(&self) -> &DecodeQueue {
        self.reverse.queue()
    }

    /// 正向组装器状态
    pub fn forward_state(&self) -> AssemblerState {
        self.forward.state()
    }

    /// 当前 SPS 给出的帧率
    pub fn frame_rate(&self) -> Option<Rational> {
        self.ctx.store().active_sps().and_then(|sps| sps.frame_rate())
    }

    fn resolve_config(&mut self) -> NalResult<StreamConfig> {
        match self.config {
            ConfigState::Ready(config) => Ok(config),
            ConfigState::Unset => {
                debug!("H264: 首个数据块前未配置, 默认按字节流处理");
                let config = StreamConfig::byte_stream(&self.settings);
                self.config = ConfigState::Ready(config);
                Ok(config)
            }
            ConfigState::Failed => Err(NalError::NotConfigured),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Packet;
    use crate::parsers::h264::NalUnitType;
    use crate::parsers::h264::config::build_avcc_config;
    use crate::parsers::h264::nal::START_CODE;
    use crate::parsers::h264::sps::tests::{BitWriter, TestVui, build_test_sps};

    fn sps_nal(sps_id: u32) -> Vec<u8> {
        let vui = TestVui {
            timing: Some((1001, 48000)),
            ..TestVui::default()
        };
        let mut out = vec![0x67];
        out.extend_from_slice(&build_test_sps(sps_id, 0, true, Some(vui)));
        out
    }

    fn pps_nal(pps_id: u32, sps_id: u32) -> Vec<u8> {
        let mut out = vec![0x68];
        out.extend_from_slice(&BitWriter::new().ue(pps_id).ue(sps_id).finish());
        out
    }

    fn slice_nal(header: u8, slice_type: u32) -> Vec<u8> {
        let mut out = vec![header];
        out.extend_from_slice(&BitWriter::new().ue(0).ue(slice_type).ue(0).bits(1, 4).finish());
        out
    }

    fn annexb(nals: &[Vec<u8>]) -> Bytes {
        let mut out = Vec::new();
        for nal in nals {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(nal);
        }
        Bytes::from(out)
    }

    #[test]
    fn test_parser_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<H264Parser>();
    }

    #[test]
    fn test_default_config_is_byte_stream() {
        let mut parser = H264Parser::new(ParserSettings::default());
        assert!(parser.config().is_none());

        let mut out: Vec<Packet> = Vec::new();
        let data = annexb(&[sps_nal(0), slice_nal(0x65, 7)]);
        parser
            .push_chunk(data, Timestamp::none(), false, &mut out)
            .unwrap();
        parser.finish(&mut out).unwrap();

        let config = parser.config().copied().unwrap();
        assert!(!config.packetized);
        assert_eq!(config.nal_length_size, 4);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| !p.is_delta_unit));
        assert_eq!(parser.frame_rate(), Some(Rational::new(24000, 1001)));
    }

    #[test]
    fn test_codec_data_populates_parameter_sets() {
        let mut parser = H264Parser::new(ParserSettings::default());
        let avcc = build_avcc_config(&[sps_nal(2)], &[pps_nal(1, 2)], 4).unwrap();
        parser.set_codec_data(Some(&avcc)).unwrap();

        let config = parser.config().copied().unwrap();
        assert!(config.packetized);
        assert_eq!(config.nal_length_size, 4);
        assert!(parser.parameter_sets().sps(2).is_some());
        assert_eq!(parser.parameter_sets().pps(1).map(|p| p.sps_id), Some(2));
    }

    #[test]
    fn test_bad_codec_data_is_fatal_until_reconfigured() {
        let mut parser = H264Parser::new(ParserSettings::default());
        let mut out: Vec<Packet> = Vec::new();

        let err = parser
            .set_codec_data(Some(&[2, 0x42, 0, 0x1E, 0xFF, 0xE0, 0]))
            .expect_err("版本号为 2 应失败");
        assert!(matches!(err, NalError::Config(_)));
        assert!(parser.config().is_none());

        let data = annexb(&[slice_nal(0x65, 2), slice_nal(0x41, 0)]);
        let err = parser
            .push_chunk(data.clone(), Timestamp::none(), false, &mut out)
            .expect_err("配置失败后应拒绝输入");
        assert!(matches!(err, NalError::NotConfigured));
        assert!(matches!(parser.finish(&mut out), Err(NalError::NotConfigured)));
        assert!(out.is_empty());

        parser.set_codec_data(None).unwrap();
        parser
            .push_chunk(data, Timestamp::none(), false, &mut out)
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_negative_rate_selects_reverse_path() {
        let mut parser = H264Parser::new(ParserSettings::default());
        parser.set_rate(-1.0);
        assert_eq!(parser.direction(), PlaybackDirection::Reverse);

        let mut out: Vec<Packet> = Vec::new();
        let data = annexb(&[slice_nal(0x65, 7), slice_nal(0x41, 0)]);
        parser
            .push_chunk(data, Timestamp::none(), false, &mut out)
            .unwrap();
        assert!(out.is_empty(), "倒放时数据块在不连续点之前只收集不输出");

        parser.finish(&mut out).unwrap();
        let types: Vec<_> = out.iter().map(|p| p.nal_type).collect();
        assert_eq!(types, vec![NalUnitType::SliceIdr, NalUnitType::Slice]);

        parser.set_rate(1.0);
        assert_eq!(parser.direction(), PlaybackDirection::Forward);
    }

    #[test]
    fn test_flush_twice_equals_flush_once() {
        let mut parser = H264Parser::new(ParserSettings::default());
        parser.set_rate(-2.0);
        let mut out: Vec<Packet> = Vec::new();

        let data = annexb(&[sps_nal(0), pps_nal(0, 0), slice_nal(0x65, 2)]);
        parser
            .push_chunk(data.clone(), Timestamp::none(), false, &mut out)
            .unwrap();
        parser
            .push_chunk(data, Timestamp::none(), true, &mut out)
            .unwrap();
        assert!(parser.decode_queue().have_i_frame());
        assert!(!parser.parameter_sets().is_empty());

        parser.flush();
        let after_once = (
            parser.parameter_sets().is_empty(),
            parser.decode_queue().is_empty(),
            parser.decode_queue().have_i_frame(),
            parser.direction(),
        );
        parser.flush();
        let after_twice = (
            parser.parameter_sets().is_empty(),
            parser.decode_queue().is_empty(),
            parser.decode_queue().have_i_frame(),
            parser.direction(),
        );
        assert_eq!(after_once, (true, true, false, PlaybackDirection::Forward));
        assert_eq!(after_once, after_twice);
        assert_eq!(parser.sei_state(), &SeiState::new());
        assert_eq!(parser.forward_state(), AssemblerState::Accumulating);

        // 配置保留
        assert!(parser.config().is_some());
    }

    #[test]
    fn test_split_packetized_toggle() {
        let mut parser = H264Parser::new(ParserSettings::default());
        let avcc = build_avcc_config(&[sps_nal(0)], &[pps_nal(0, 0)], 2).unwrap();
        parser.set_codec_data(Some(&avcc)).unwrap();
        parser.set_split_packetized(true);
        assert!(parser.settings().split_packetized);
        assert!(parser.config().is_some_and(|c| c.split_packetized));

        let mut data = Vec::new();
        for nal in [slice_nal(0x65, 7), slice_nal(0x41, 0)] {
            data.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            data.extend_from_slice(&nal);
        }
        let mut out: Vec<Packet> = Vec::new();
        parser
            .push_chunk(Bytes::from(data), Timestamp::none(), false, &mut out)
            .unwrap();
        assert_eq!(out.len(), 2);
        assert!(!out[0].is_delta_unit);
        assert!(out[1].is_delta_unit);
    }
}
