//! 流配置.
//!
//! - [`ParserSettings`]: 用户可调参数
//! - [`AvcConfig`]: AVCDecoderConfigurationRecord (MP4 avcC box 内容)
//! - [`StreamConfig`]: 由 avcC 或默认值确定的封装方式

use h264nal_core::{NalError, NalResult};
use log::warn;

/// 字节流模式下起始码长度
pub const BYTE_STREAM_LENGTH_SIZE: usize = 4;

/// 解析器设置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserSettings {
    /// 长度前缀封装时是否按 NAL 拆分输出 (默认每个输入包整体输出)
    pub split_packetized: bool,
}

/// 流封装配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// 是否为长度前缀封装
    pub packetized: bool,
    /// 长度前缀字节数 (1..=4), 字节流模式固定为 4
    pub nal_length_size: usize,
    /// 长度前缀封装时是否按 NAL 拆分
    pub split_packetized: bool,
}

impl StreamConfig {
    /// Annex B 字节流
    pub fn byte_stream(settings: &ParserSettings) -> Self {
        Self {
            packetized: false,
            nal_length_size: BYTE_STREAM_LENGTH_SIZE,
            split_packetized: settings.split_packetized,
        }
    }

    /// 长度前缀封装
    pub fn packetized(nal_length_size: usize, settings: &ParserSettings) -> Self {
        Self {
            packetized: true,
            nal_length_size,
            split_packetized: settings.split_packetized,
        }
    }
}

/// avcC 配置解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    /// AVCProfileIndication
    pub profile_indication: u8,
    /// profile_compatibility
    pub profile_compatibility: u8,
    /// AVCLevelIndication
    pub level_indication: u8,
    /// NAL 长度前缀大小 (字节)
    pub length_size: usize,
    /// SPS 列表 (含 NAL 头部字节)
    pub sps_list: Vec<Vec<u8>>,
    /// PPS 列表 (含 NAL 头部字节)
    pub pps_list: Vec<Vec<u8>>,
}

/// 解析 AVCDecoderConfigurationRecord
///
/// 长度不足 7 字节或版本号不为 1 时返回配置错误.
/// 参数集列表截断时保留已读出的部分.
pub fn parse_avcc_config(data: &[u8]) -> NalResult<AvcConfig> {
    if data.len() < 7 {
        return Err(NalError::Config(format!(
            "H264: avcC 数据太短, len={}",
            data.len()
        )));
    }
    if data[0] != 1 {
        return Err(NalError::Config(format!(
            "H264: avcC 版本号不支持, version={}",
            data[0]
        )));
    }

    let mut config = AvcConfig {
        profile_indication: data[1],
        profile_compatibility: data[2],
        level_indication: data[3],
        length_size: usize::from(data[4] & 0x03) + 1,
        sps_list: Vec::new(),
        pps_list: Vec::new(),
    };

    let num_sps = usize::from(data[5] & 0x1F);
    let mut pos = 6;
    if !read_parameter_sets(data, &mut pos, num_sps, &mut config.sps_list, "SPS") {
        return Ok(config);
    }

    let Some(&num_pps) = data.get(pos) else {
        warn!("H264: avcC 缺少 numOfPictureParameterSets 字段");
        return Ok(config);
    };
    pos += 1;
    read_parameter_sets(
        data,
        &mut pos,
        usize::from(num_pps),
        &mut config.pps_list,
        "PPS",
    );

    Ok(config)
}

/// 读取 `count` 个 16 位长度前缀的参数集, 截断时返回 false
fn read_parameter_sets(
    data: &[u8],
    pos: &mut usize,
    count: usize,
    out: &mut Vec<Vec<u8>>,
    kind: &str,
) -> bool {
    for i in 0..count {
        let Some(len_bytes) = data.get(*pos..*pos + 2) else {
            warn!("H264: avcC {} 长度字段截断, index={}", kind, i);
            return false;
        };
        let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        *pos += 2;
        let Some(body) = data.get(*pos..*pos + len) else {
            warn!(
                "H264: avcC {} 数据截断, index={}, declared_len={}, remain={}",
                kind,
                i,
                len,
                data.len().saturating_sub(*pos)
            );
            return false;
        };
        out.push(body.to_vec());
        *pos += len;
    }
    true
}

/// 构建 AVCDecoderConfigurationRecord
pub fn build_avcc_config(
    sps_list: &[Vec<u8>],
    pps_list: &[Vec<u8>],
    length_size: usize,
) -> NalResult<Vec<u8>> {
    if !(1..=4).contains(&length_size) {
        return Err(NalError::InvalidArgument(format!(
            "H264: 长度前缀大小非法, length_size={}",
            length_size
        )));
    }
    let Some(sps0) = sps_list.first().filter(|sps| sps.len() >= 4) else {
        return Err(NalError::InvalidArgument(
            "H264: 构建 avcC 需要至少一个完整的 SPS".into(),
        ));
    };

    let mut out = vec![
        1,                                // configurationVersion
        sps0[1],                          // profile_idc
        sps0[2],                          // profile_compatibility
        sps0[3],                          // level_idc
        0xFC | ((length_size as u8) - 1), // lengthSizeMinusOne
        0xE0 | (sps_list.len() as u8),    // numOfSPS
    ];
    for sps in sps_list {
        out.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        out.extend_from_slice(sps);
    }
    out.push(pps_list.len() as u8);
    for pps in pps_list {
        out.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        out.extend_from_slice(pps);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avcc_roundtrip() {
        let sps = vec![0x67, 0x42, 0xC0, 0x1E, 0xAB];
        let pps = vec![0x68, 0xCE, 0x38, 0x80];
        let data = build_avcc_config(&[sps.clone()], &[pps.clone()], 2).unwrap();

        let config = parse_avcc_config(&data).unwrap();
        assert_eq!(config.length_size, 2);
        assert_eq!(config.profile_indication, 0x42);
        assert_eq!(config.level_indication, 0x1E);
        assert_eq!(config.sps_list, vec![sps]);
        assert_eq!(config.pps_list, vec![pps]);
    }

    #[test]
    fn test_avcc_reject_short_or_bad_version() {
        let err = parse_avcc_config(&[1, 0x42, 0, 0x1E, 0xFF, 0xE0])
            .expect_err("少于 7 字节应失败");
        assert!(matches!(err, NalError::Config(_)));

        let err = parse_avcc_config(&[0, 0x42, 0, 0x1E, 0xFF, 0xE0, 0])
            .expect_err("版本号为 0 应失败");
        assert!(matches!(err, NalError::Config(_)));
    }

    #[test]
    fn test_avcc_minimal_record() {
        let config = parse_avcc_config(&[1, 0x4D, 0x40, 0x1F, 0xFC, 0xE0, 0]).unwrap();
        assert_eq!(config.length_size, 1);
        assert!(config.sps_list.is_empty());
        assert!(config.pps_list.is_empty());
    }

    #[test]
    fn test_avcc_truncated_lists_keep_prefix() {
        let sps = vec![0x67, 0x42, 0xC0, 0x1E];
        let pps = vec![0x68, 0xCE];
        let mut data = build_avcc_config(&[sps.clone()], &[pps], 4).unwrap();
        data.truncate(data.len() - 1);

        let config = parse_avcc_config(&data).unwrap();
        assert_eq!(config.length_size, 4);
        assert_eq!(config.sps_list, vec![sps]);
        assert!(config.pps_list.is_empty());
    }

    #[test]
    fn test_build_avcc_reject_invalid_input() {
        assert!(build_avcc_config(&[], &[], 4).is_err());
        assert!(build_avcc_config(&[vec![0x67, 0x42, 0, 0x1E]], &[], 5).is_err());
    }

    #[test]
    fn test_stream_config_defaults() {
        let settings = ParserSettings::default();
        assert!(!settings.split_packetized);

        let config = StreamConfig::byte_stream(&settings);
        assert!(!config.packetized);
        assert_eq!(config.nal_length_size, 4);

        let settings = ParserSettings {
            split_packetized: true,
        };
        let config = StreamConfig::packetized(2, &settings);
        assert!(config.packetized);
        assert!(config.split_packetized);
        assert_eq!(config.nal_length_size, 2);
    }
}
