//! H.264 SEI (Supplemental Enhancement Information) 解析.
//!
//! 每个 SEI NAL 只解码第一条消息. 仅处理 buffering period 与 picture timing,
//! 其它类型只记录类型与大小.

use h264nal_core::bitreader::BitReader;
use h264nal_core::{NalError, NalResult, Rational, Timestamp};
use log::debug;

use super::store::ParameterSetStore;

/// initial_cpb_removal_delay 表容量 (cpb_cnt_minus1 <= 31)
pub const MAX_CPB_COUNT: usize = 32;

/// pic_struct 合法上限 (帧三倍重复)
const MAX_PIC_STRUCT: u8 = 8;

/// 各 pic_struct 对应的 NumClockTS (ITU-T H.264 表 D-1)
const NUM_CLOCK_TS: [u8; 9] = [1, 1, 1, 2, 2, 3, 3, 2, 3];

/// SEI 载荷类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeiPayloadType {
    /// buffering period (0)
    BufferingPeriod,
    /// picture timing (1)
    PictureTiming,
    /// 其它类型, 不解码
    Other(u32),
}

impl SeiPayloadType {
    /// 从 payloadType 数值转换
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::BufferingPeriod,
            1 => Self::PictureTiming,
            other => Self::Other(other),
        }
    }
}

/// SEI 消息头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeiMessage {
    /// 载荷类型
    pub payload_type: SeiPayloadType,
    /// 载荷大小 (字节)
    pub payload_size: u32,
}

/// SEI 解码得到的 HRD 时序状态
///
/// 跨数据块保留, 只在 [`SeiState::reset`] 时清零.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiState {
    /// 每个 SchedSelIdx 的 initial_cpb_removal_delay
    pub initial_cpb_removal_delay: [u32; MAX_CPB_COUNT],
    /// cpb_removal_delay
    pub cpb_removal_delay: u32,
    /// dpb_output_delay
    pub dpb_output_delay: u32,
    /// pic_struct, 尚未收到时为 `None`
    pub pic_struct: Option<u8>,
    /// 出现过的 ct_type 位图 (bit n 表示 ct_type=n)
    pub ct_type: u8,
    /// 最近一个 buffering period 对应的参考解码时间
    pub ts_trn_nb: Timestamp,
}

impl Default for SeiState {
    fn default() -> Self {
        Self {
            initial_cpb_removal_delay: [0; MAX_CPB_COUNT],
            cpb_removal_delay: 0,
            dpb_output_delay: 0,
            pic_struct: None,
            ct_type: 0,
            ts_trn_nb: Timestamp::none(),
        }
    }
}

impl SeiState {
    /// 创建初始状态
    pub fn new() -> Self {
        Self::default()
    }

    /// 恢复初始状态
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 解码 SEI 载荷 (不含 NAL 头部字节)
///
/// `dts` 为当前数据块的时间戳, buffering period 用它更新 `ts_trn_nb`.
pub fn decode_sei(
    br: &mut BitReader,
    store: &mut ParameterSetStore,
    state: &mut SeiState,
    dts: Timestamp,
) -> NalResult<SeiMessage> {
    let payload_type = read_ff_coded(br);
    let payload_size = read_ff_coded(br);
    let message = SeiMessage {
        payload_type: SeiPayloadType::from_raw(payload_type),
        payload_size,
    };
    debug!(
        "H264: 收到 SEI 消息, payload_type={}, payload_size={}",
        payload_type, payload_size
    );

    match message.payload_type {
        SeiPayloadType::BufferingPeriod => decode_buffering_period(br, store, state, dts)?,
        SeiPayloadType::PictureTiming => decode_picture_timing(br, store, state)?,
        SeiPayloadType::Other(_) => {}
    }
    Ok(message)
}

/// 读取以 0xFF 续接的累加值
fn read_ff_coded(br: &mut BitReader) -> u32 {
    let mut value = 0u32;
    loop {
        let byte = br.read(8);
        value = value.saturating_add(byte);
        if byte != 0xFF {
            return value;
        }
    }
}

fn decode_buffering_period(
    br: &mut BitReader,
    store: &mut ParameterSetStore,
    state: &mut SeiState,
    dts: Timestamp,
) -> NalResult<()> {
    let sps_id = br.read_ue();
    let Some(sps) = store.get_or_create_sps(sps_id) else {
        return Err(NalError::UnresolvedReference(format!(
            "H264: buffering period 引用的 SPS 无效, sps_id={}",
            sps_id
        )));
    };

    let delay_bits = u32::from(sps.hrd.initial_cpb_removal_delay_length_minus1) + 1;
    let cpb_count = usize::from(sps.hrd.cpb_cnt_minus1) + 1;
    for present in [
        sps.nal_hrd_parameters_present_flag,
        sps.vcl_hrd_parameters_present_flag,
    ] {
        if !present {
            continue;
        }
        for delay in state.initial_cpb_removal_delay.iter_mut().take(cpb_count) {
            *delay = br.read(delay_bits);
            br.skip(delay_bits); // initial_cpb_removal_delay_offset
        }
    }

    state.ts_trn_nb = if state.ts_trn_nb.is_valid() && dts.is_valid() {
        dts
    } else {
        let time_base = if dts.time_base.is_valid() {
            dts.time_base
        } else {
            Rational::NANO
        };
        Timestamp::new(0, time_base)
    };
    debug!("H264: ts_trn_nb 更新, ts_trn_nb={}", state.ts_trn_nb);
    Ok(())
}

fn decode_picture_timing(
    br: &mut BitReader,
    store: &ParameterSetStore,
    state: &mut SeiState,
) -> NalResult<()> {
    let Some(sps) = store.active_sps() else {
        return Err(NalError::UnresolvedReference(
            "H264: picture timing 之前没有可用的 SPS".into(),
        ));
    };

    if sps.has_hrd() {
        let cpb_bits = u32::from(sps.hrd.cpb_removal_delay_length_minus1) + 1;
        let dpb_bits = u32::from(sps.hrd.dpb_output_delay_length_minus1) + 1;
        state.cpb_removal_delay = br.read(cpb_bits);
        state.dpb_output_delay = br.read(dpb_bits);
    }

    if !sps.pic_struct_present_flag {
        return Ok(());
    }

    let pic_struct = br.read(4) as u8;
    state.pic_struct = Some(pic_struct);
    state.ct_type = 0;
    if pic_struct > MAX_PIC_STRUCT {
        return Err(NalError::InvalidData(format!(
            "H264: pic_struct 非法, value={}",
            pic_struct
        )));
    }

    let time_offset_bits = u32::from(sps.hrd.time_offset_length);
    for _ in 0..NUM_CLOCK_TS[usize::from(pic_struct)] {
        if !br.read_flag() {
            continue; // clock_timestamp_flag
        }
        state.ct_type |= 1 << br.read(2);
        br.skip(1); // nuit_field_based_flag
        br.skip(5); // counting_type
        let full_timestamp_flag = br.read_flag();
        br.skip(1); // discontinuity_flag
        br.skip(1); // cnt_dropped_flag
        br.skip(8); // n_frames
        if full_timestamp_flag {
            br.skip(6 + 6 + 5); // seconds, minutes, hours
        } else if br.read_flag() {
            br.skip(6);
            if br.read_flag() {
                br.skip(6);
                if br.read_flag() {
                    br.skip(5);
                }
            }
        }
        br.skip(time_offset_bits);
    }

    debug!(
        "H264: 解析 picture timing, pic_struct={}, ct_type={:#X}",
        pic_struct, state.ct_type
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::h264::sps::tests::{BitWriter, TestVui, build_test_sps};

    fn store_with_hrd_sps() -> ParameterSetStore {
        let mut store = ParameterSetStore::new();
        let vui = TestVui {
            timing: Some((1, 50)),
            nal_hrd: true,
            cpb_cnt_minus1: 1,
            pic_struct_present: true,
            ..TestVui::default()
        };
        let data = build_test_sps(0, 0, true, Some(vui));
        store.decode_sps(&mut BitReader::new(&data)).unwrap();
        store
    }

    fn decode(
        data: &[u8],
        store: &mut ParameterSetStore,
        state: &mut SeiState,
        dts: Timestamp,
    ) -> NalResult<SeiMessage> {
        decode_sei(&mut BitReader::new(data), store, state, dts)
    }

    #[test]
    fn test_payload_type_ff_continuation() {
        let data = [0xFF, 0xFF, 0x05, 0xFF, 0x01, 0x80];
        let mut store = ParameterSetStore::new();
        let mut state = SeiState::new();
        let msg = decode(&data, &mut store, &mut state, Timestamp::none()).unwrap();
        assert_eq!(msg.payload_type, SeiPayloadType::Other(515));
        assert_eq!(msg.payload_size, 256);
        assert_eq!(state, SeiState::new());
    }

    #[test]
    fn test_buffering_period_reads_delays() {
        let mut store = store_with_hrd_sps();
        let mut state = SeiState::new();
        let data = BitWriter::new()
            .bits(0, 8)
            .bits(8, 8)
            .ue(0)
            .bits(90000, 24)
            .bits(1, 24)
            .bits(45000, 24)
            .bits(2, 24)
            .finish();

        let dts = Timestamp::new(3600, Rational::new(1, 90000));
        let msg = decode(&data, &mut store, &mut state, dts).unwrap();
        assert_eq!(msg.payload_type, SeiPayloadType::BufferingPeriod);
        assert_eq!(state.initial_cpb_removal_delay[0], 90000);
        assert_eq!(state.initial_cpb_removal_delay[1], 45000);
        assert_eq!(state.initial_cpb_removal_delay[2], 0);
        // 首个 buffering period 以 0 作为参考时间
        assert_eq!(state.ts_trn_nb, Timestamp::new(0, Rational::new(1, 90000)));

        decode(&data, &mut store, &mut state, dts).unwrap();
        assert_eq!(state.ts_trn_nb, dts);

        // 时间戳未知时回到 0
        decode(&data, &mut store, &mut state, Timestamp::none()).unwrap();
        assert_eq!(state.ts_trn_nb, Timestamp::new(0, Rational::NANO));
    }

    #[test]
    fn test_buffering_period_unresolved_sps() {
        let mut store = ParameterSetStore::new();
        let mut state = SeiState::new();
        let data = BitWriter::new().bits(0, 8).bits(1, 8).ue(40).finish();
        let err = decode(&data, &mut store, &mut state, Timestamp::none())
            .expect_err("sps_id=40 应失败");
        assert!(matches!(err, NalError::UnresolvedReference(_)));
        assert!(!state.ts_trn_nb.is_valid());
    }

    #[test]
    fn test_picture_timing_requires_active_sps() {
        let mut store = ParameterSetStore::new();
        let mut state = SeiState::new();
        let data = BitWriter::new().bits(1, 8).bits(1, 8).bits(0, 8).finish();
        let err = decode(&data, &mut store, &mut state, Timestamp::none())
            .expect_err("没有 SPS 时 picture timing 应失败");
        assert!(matches!(err, NalError::UnresolvedReference(_)));
    }

    #[test]
    fn test_picture_timing_clock_timestamps() {
        let mut store = store_with_hrd_sps();
        let mut state = SeiState::new();
        let mut w = BitWriter::new();
        w.bits(1, 8).bits(20, 8);
        w.bits(7, 16).bits(3, 6); // cpb_removal_delay, dpb_output_delay
        w.bits(3, 4); // pic_struct=3, NumClockTS=2
        // 第一个时间戳: ct_type=1, full_timestamp
        w.flag(true).bits(1, 2).flag(false).bits(0, 5).flag(true);
        w.flag(false).flag(false).bits(12, 8).bits(30, 6).bits(15, 6).bits(1, 5);
        w.bits(0, 24);
        // 第二个时间戳: ct_type=2, 只有秒和分
        w.flag(true).bits(2, 2).flag(false).bits(0, 5).flag(false);
        w.flag(false).flag(false).bits(13, 8);
        w.flag(true).bits(31, 6).flag(true).bits(16, 6).flag(false);
        w.bits(0, 24);
        let data = w.finish();

        let msg = decode(&data, &mut store, &mut state, Timestamp::none()).unwrap();
        assert_eq!(msg.payload_type, SeiPayloadType::PictureTiming);
        assert_eq!(state.cpb_removal_delay, 7);
        assert_eq!(state.dpb_output_delay, 3);
        assert_eq!(state.pic_struct, Some(3));
        assert_eq!(state.ct_type, 0b110);
    }

    #[test]
    fn test_picture_timing_reject_pic_struct() {
        let mut store = store_with_hrd_sps();
        let mut state = SeiState::new();
        let data = BitWriter::new()
            .bits(1, 8)
            .bits(4, 8)
            .bits(1, 16)
            .bits(1, 6)
            .bits(9, 4)
            .finish();
        let err = decode(&data, &mut store, &mut state, Timestamp::none())
            .expect_err("pic_struct=9 应失败");
        assert!(matches!(err, NalError::InvalidData(_)));
        assert_eq!(state.cpb_removal_delay, 1);
    }

    #[test]
    fn test_state_reset() {
        let mut state = SeiState::new();
        state.cpb_removal_delay = 5;
        state.pic_struct = Some(2);
        state.reset();
        assert_eq!(state, SeiState::new());
    }
}
