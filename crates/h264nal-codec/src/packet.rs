//! 输出数据包 (Packet).
//!
//! 解析器每输出一个 NAL 单元 (或一整段长度前缀数据) 就产生一个 Packet.

use bytes::Bytes;
use h264nal_core::Timestamp;

use crate::parsers::h264::NalUnitType;

/// 输出数据包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 数据, 从起始码 (或长度前缀) 开始
    pub data: Bytes,
    /// 时间戳, 取自包含该单元的输入数据块
    pub pts: Timestamp,
    /// 是否为不连续点之后的第一个数据包
    pub is_discont: bool,
    /// 是否依赖其它帧才能解码
    pub is_delta_unit: bool,
    /// 首个 NAL 单元的类型
    pub nal_type: NalUnitType,
}

impl Packet {
    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>, nal_type: NalUnitType) -> Self {
        Self {
            data: data.into(),
            pts: Timestamp::none(),
            is_discont: false,
            is_delta_unit: true,
            nal_type,
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否可独立解码 (I 切片或参数集)
    pub fn is_keyframe(&self) -> bool {
        !self.is_delta_unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_from_data() {
        let pkt = Packet::from_data(vec![0, 0, 0, 1, 0x67], NalUnitType::Sps);
        assert_eq!(pkt.size(), 5);
        assert!(!pkt.pts.is_valid());
        assert!(!pkt.is_discont);
        assert!(!pkt.is_keyframe());
        assert_eq!(pkt.nal_type, NalUnitType::Sps);
    }
}
