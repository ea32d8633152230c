//! 正向播放组装器.
//!
//! 按到达顺序累积输入, 每找到一个 NAL 边界就取出一个单元并立即输出.
//! 字节流以下一个起始码为边界; 长度前缀封装按长度字段拆分或整包输出.

use bytes::Bytes;
use h264nal_core::{Adapter, NalResult, Timestamp};
use log::trace;

use super::config::StreamConfig;
use super::context::ParseContext;
use super::nal;
use crate::packet::Packet;
use crate::sink::PacketSink;

/// 组装器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    /// 等待更多输入
    Accumulating,
    /// 正在输出已定位的单元
    Emitting,
}

/// 正向播放组装器
#[derive(Debug)]
pub struct ForwardAssembler {
    adapter: Adapter,
    state: AssemblerState,
    /// 下一个输出单元是否标记不连续
    discont: bool,
    /// 最近一个输入块的时间戳
    last_pts: Timestamp,
}

impl Default for ForwardAssembler {
    fn default() -> Self {
        Self {
            adapter: Adapter::new(),
            state: AssemblerState::Accumulating,
            discont: false,
            last_pts: Timestamp::none(),
        }
    }
}

impl ForwardAssembler {
    /// 创建空组装器
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前状态
    pub fn state(&self) -> AssemblerState {
        self.state
    }

    /// 尚未输出的字节数
    pub fn pending_bytes(&self) -> usize {
        self.adapter.available()
    }

    /// 送入一个输入块并输出所有已完整的单元
    ///
    /// `discont` 为 true 时先丢弃残留数据, 下一个输出单元带不连续标记.
    pub fn push<S: PacketSink + ?Sized>(
        &mut self,
        ctx: &mut ParseContext,
        config: &StreamConfig,
        data: &[u8],
        pts: Timestamp,
        discont: bool,
        sink: &mut S,
    ) -> NalResult<()> {
        if discont {
            trace!(
                "H264: 不连续点, 丢弃残留数据, pending={}",
                self.adapter.available()
            );
            self.adapter.clear();
            self.discont = true;
        }

        self.adapter.push(data);
        self.last_pts = pts;

        let result = self.emit_complete(ctx, config, sink);
        self.state = AssemblerState::Accumulating;
        result
    }

    /// 流结束: 输出最后一个不完整的单元
    ///
    /// 字节流的最后一个 NAL 后面没有起始码, 只有在流结束时才能确定其边界.
    pub fn finish<S: PacketSink + ?Sized>(
        &mut self,
        ctx: &mut ParseContext,
        config: &StreamConfig,
        sink: &mut S,
    ) -> NalResult<()> {
        let result = self.emit_complete(ctx, config, sink).and_then(|()| {
            let avail = self.adapter.available();
            if avail > config.nal_length_size {
                self.state = AssemblerState::Emitting;
                let unit = self.adapter.take(avail)?;
                self.emit(ctx, config, unit, sink)
            } else {
                Ok(())
            }
        });
        self.adapter.clear();
        self.state = AssemblerState::Accumulating;
        result
    }

    /// 丢弃所有残留数据
    pub fn clear(&mut self) {
        self.adapter.clear();
        self.state = AssemblerState::Accumulating;
        self.discont = false;
        self.last_pts = Timestamp::none();
    }

    fn emit_complete<S: PacketSink + ?Sized>(
        &mut self,
        ctx: &mut ParseContext,
        config: &StreamConfig,
        sink: &mut S,
    ) -> NalResult<()> {
        let length_size = config.nal_length_size;
        loop {
            let avail = self.adapter.available();
            if avail <= length_size {
                return Ok(());
            }
            let data = self.adapter.peek(avail)?;
            let next = if !config.packetized {
                nal::find_next_start_code(data)
            } else if config.split_packetized {
                Some(nal::packetized_nal_size(data, length_size) + length_size)
            } else {
                Some(avail)
            };
            let Some(next) = next else {
                return Ok(());
            };

            self.state = AssemblerState::Emitting;
            let unit = self.adapter.take(next)?;
            self.emit(ctx, config, unit, sink)?;
        }
    }

    fn emit<S: PacketSink + ?Sized>(
        &mut self,
        ctx: &mut ParseContext,
        config: &StreamConfig,
        unit: Bytes,
        sink: &mut S,
    ) -> NalResult<()> {
        let class = ctx.classify_unit(config, &unit, self.last_pts);
        let packet = Packet {
            data: unit,
            pts: self.last_pts,
            is_discont: std::mem::take(&mut self.discont),
            is_delta_unit: class.is_delta_unit(),
            nal_type: class.nal_type,
        };
        trace!(
            "H264: 输出单元, type={}, size={}, delta={}, discont={}",
            packet.nal_type,
            packet.size(),
            packet.is_delta_unit,
            packet.is_discont
        );
        sink.push_packet(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::h264::NalUnitType;
    use crate::parsers::h264::config::ParserSettings;
    use crate::parsers::h264::sps::tests::{BitWriter, build_test_sps};
    use h264nal_core::Rational;

    fn annexb(header: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = nal::START_CODE.to_vec();
        out.push(header);
        out.extend_from_slice(payload);
        out
    }

    fn slice(header: u8, slice_type: u32) -> Vec<u8> {
        let payload = BitWriter::new().ue(0).ue(slice_type).ue(0).bits(3, 4).finish();
        let mut out = vec![header];
        out.extend_from_slice(&payload);
        out
    }

    fn ts(v: i64) -> Timestamp {
        Timestamp::new(v, Rational::new(1, 90000))
    }

    #[test]
    fn test_sps_then_idr_emits_two_units() {
        let mut ctx = ParseContext::new();
        let config = StreamConfig::byte_stream(&ParserSettings::default());
        let mut asm = ForwardAssembler::new();
        let mut out: Vec<Packet> = Vec::new();

        let mut data = annexb(0x67, &build_test_sps(0, 0, true, None));
        let idr = slice(0x65, 7);
        data.extend_from_slice(&nal::START_CODE);
        data.extend_from_slice(&idr);

        asm.push(&mut ctx, &config, &data, ts(0), false, &mut out)
            .unwrap();
        assert_eq!(out.len(), 1, "IDR 后面没有起始码, 应等待更多数据");
        assert_eq!(asm.state(), AssemblerState::Accumulating);

        asm.finish(&mut ctx, &config, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].nal_type, NalUnitType::Sps);
        assert!(!out[0].is_delta_unit);
        assert_eq!(out[1].nal_type, NalUnitType::SliceIdr);
        assert!(!out[1].is_delta_unit);
        assert_eq!(&out[1].data[4..], &idr[..]);
        assert_eq!(asm.pending_bytes(), 0);
    }

    #[test]
    fn test_units_split_across_chunks() {
        let mut ctx = ParseContext::new();
        let config = StreamConfig::byte_stream(&ParserSettings::default());
        let mut asm = ForwardAssembler::new();
        let mut out: Vec<Packet> = Vec::new();

        let mut stream = annexb(0x09, &[0xF0]);
        stream.extend_from_slice(&annexb(0x41, &slice(0x41, 0)[1..]));
        stream.extend_from_slice(&annexb(0x09, &[0xF0]));

        // 逐字节送入
        for (i, b) in stream.iter().enumerate() {
            asm.push(&mut ctx, &config, &[*b], ts(i as i64), false, &mut out)
                .unwrap();
        }
        assert_eq!(out.len(), 2);
        asm.finish(&mut ctx, &config, &mut out).unwrap();

        let types: Vec<_> = out.iter().map(|p| p.nal_type).collect();
        assert_eq!(
            types,
            vec![NalUnitType::Aud, NalUnitType::Slice, NalUnitType::Aud]
        );
        assert!(out.iter().all(|p| p.is_delta_unit));
        let total: usize = out.iter().map(Packet::size).sum();
        assert_eq!(total, stream.len());
    }

    #[test]
    fn test_discont_drops_partial_data() {
        let mut ctx = ParseContext::new();
        let config = StreamConfig::byte_stream(&ParserSettings::default());
        let mut asm = ForwardAssembler::new();
        let mut out: Vec<Packet> = Vec::new();

        asm.push(&mut ctx, &config, &annexb(0x41, &[0x9A, 0x00]), ts(0), false, &mut out)
            .unwrap();
        assert_eq!(asm.pending_bytes(), 7);

        let mut data = annexb(0x09, &[0xF0]);
        data.extend_from_slice(&annexb(0x09, &[0x10]));
        data.extend_from_slice(&annexb(0x09, &[0x30]));
        asm.push(&mut ctx, &config, &data, ts(3000), true, &mut out)
            .unwrap();

        assert_eq!(out.len(), 2);
        assert!(out[0].is_discont);
        assert!(!out[1].is_discont);
        assert_eq!(out[0].pts, ts(3000));
        assert_eq!(out[0].nal_type, NalUnitType::Aud);
    }

    #[test]
    fn test_packetized_whole_buffer() {
        let mut ctx = ParseContext::new();
        let config = StreamConfig::packetized(4, &ParserSettings::default());
        let mut asm = ForwardAssembler::new();
        let mut out: Vec<Packet> = Vec::new();

        let mut data = Vec::new();
        for body in [slice(0x65, 2), slice(0x41, 0)] {
            data.extend_from_slice(&(body.len() as u32).to_be_bytes());
            data.extend_from_slice(&body);
        }
        asm.push(&mut ctx, &config, &data, ts(0), false, &mut out)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(&out[0].data[..], &data[..]);
        assert_eq!(out[0].nal_type, NalUnitType::SliceIdr);
        assert!(!out[0].is_delta_unit);
    }

    #[test]
    fn test_packetized_split_per_nal() {
        let mut ctx = ParseContext::new();
        let settings = ParserSettings {
            split_packetized: true,
        };
        let config = StreamConfig::packetized(2, &settings);
        let mut asm = ForwardAssembler::new();
        let mut out: Vec<Packet> = Vec::new();

        let bodies = [slice(0x65, 7), slice(0x41, 5), vec![0x09, 0xF0]];
        let mut data = Vec::new();
        for body in &bodies {
            data.extend_from_slice(&(body.len() as u16).to_be_bytes());
            data.extend_from_slice(body);
        }
        asm.push(&mut ctx, &config, &data, ts(0), false, &mut out)
            .unwrap();

        assert_eq!(out.len(), 3);
        for (pkt, body) in out.iter().zip(bodies.iter()) {
            assert_eq!(&pkt.data[2..], &body[..]);
        }
        let delta: Vec<_> = out.iter().map(|p| p.is_delta_unit).collect();
        assert_eq!(delta, vec![false, true, true]);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut ctx = ParseContext::new();
        let config = StreamConfig::byte_stream(&ParserSettings::default());
        let mut asm = ForwardAssembler::new();
        let mut out: Vec<Packet> = Vec::new();

        asm.push(&mut ctx, &config, &annexb(0x09, &[0xF0]), ts(0), true, &mut out)
            .unwrap();
        asm.clear();
        assert_eq!(asm.pending_bytes(), 0);
        asm.finish(&mut ctx, &config, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
