//! 下游数据包接收端.

use h264nal_core::NalResult;

use crate::packet::Packet;

/// 下游接收端
///
/// 解析器按顺序把数据包交给接收端; 返回错误时解析器停止当前批次的输出并把错误向上传播.
pub trait PacketSink {
    /// 接收一个数据包
    fn push_packet(&mut self, packet: Packet) -> NalResult<()>;
}

impl PacketSink for Vec<Packet> {
    fn push_packet(&mut self, packet: Packet) -> NalResult<()> {
        self.push(packet);
        Ok(())
    }
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn push_packet(&mut self, packet: Packet) -> NalResult<()> {
        (**self).push_packet(packet)
    }
}
