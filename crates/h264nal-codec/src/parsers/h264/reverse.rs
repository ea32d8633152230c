//! 倒放组装器.
//!
//! 倒放时上游按时间倒序送入数据块 (块内字节仍为正序). 组装器先把数据块收集起来,
//! 遇到不连续点时从最近到达的块开始向前回溯, 在块内从后向前按起始码切分单元,
//! 再通过解码队列按访问单元整理后输出.
//!
//! 块开头没有起始码的片段属于更早的块中最后一个 NAL, 暂存后接在下一个 (更早的) 块之后重新扫描.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use h264nal_core::{NalResult, Timestamp};
use log::{debug, trace};

use super::config::StreamConfig;
use super::context::ParseContext;
use super::nal::{self, NalUnit};
use crate::packet::Packet;
use crate::sink::PacketSink;

/// 收集中的输入块
#[derive(Debug, Clone)]
struct Chunk {
    data: Bytes,
    pts: Timestamp,
}

/// 解码队列
///
/// 保存一个尚未完成的访问单元, 队首为码流顺序中最早的单元.
#[derive(Debug, Default)]
pub struct DecodeQueue {
    units: VecDeque<NalUnit>,
    have_i_frame: bool,
}

impl DecodeQueue {
    /// 队列长度
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// 队列是否为空
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// 队列中是否已有 I 切片
    pub fn have_i_frame(&self) -> bool {
        self.have_i_frame
    }

    /// 按码流顺序遍历队列
    pub fn iter(&self) -> impl Iterator<Item = &NalUnit> {
        self.units.iter()
    }

    fn clear(&mut self) {
        self.units.clear();
        self.have_i_frame = false;
    }
}

/// 倒放组装器
#[derive(Debug, Default)]
pub struct ReverseAssembler {
    /// 按到达顺序保存的输入块
    gather: Vec<Chunk>,
    /// 尚未找到起始码的前导片段
    prev: Option<Chunk>,
    queue: DecodeQueue,
}

impl ReverseAssembler {
    /// 创建空组装器
    pub fn new() -> Self {
        Self::default()
    }

    /// 解码队列
    pub fn queue(&self) -> &DecodeQueue {
        &self.queue
    }

    /// 已收集的输入块个数
    pub fn gathered(&self) -> usize {
        self.gather.len()
    }

    /// 暂存的前导片段字节数
    pub fn carried_bytes(&self) -> usize {
        self.prev.as_ref().map_or(0, |prev| prev.data.len())
    }

    /// 送入一个输入块
    ///
    /// `discont` 为 true 时先处理已收集的块, 再收集本块. `data` 为 `None` 时只处理.
    pub fn push<S: PacketSink + ?Sized>(
        &mut self,
        ctx: &mut ParseContext,
        config: &StreamConfig,
        data: Option<Bytes>,
        pts: Timestamp,
        discont: bool,
        sink: &mut S,
    ) -> NalResult<()> {
        if discont {
            self.process_gathered(ctx, config, sink)?;
        }
        if let Some(data) = data {
            trace!("H264: 收集倒放数据块, size={}", data.len());
            self.gather.push(Chunk { data, pts });
        }
        Ok(())
    }

    /// 流结束: 处理剩余的块并输出队列
    pub fn finish<S: PacketSink + ?Sized>(
        &mut self,
        ctx: &mut ParseContext,
        config: &StreamConfig,
        sink: &mut S,
    ) -> NalResult<()> {
        self.push(ctx, config, None, Timestamp::none(), true, sink)?;
        self.flush_queue(sink)
    }

    /// 丢弃所有收集的块、暂存片段与队列
    pub fn clear(&mut self) {
        self.gather.clear();
        self.prev = None;
        self.queue.clear();
    }

    fn process_gathered<S: PacketSink + ?Sized>(
        &mut self,
        ctx: &mut ParseContext,
        config: &StreamConfig,
        sink: &mut S,
    ) -> NalResult<()> {
        while let Some(chunk) = self.gather.pop() {
            if config.packetized {
                self.queue_unit(ctx, config, chunk.data, chunk.pts, sink)?;
                continue;
            }

            let chunk = match self.prev.take() {
                Some(prev) => join(chunk, prev),
                None => chunk,
            };
            let mut last = chunk.data.len();
            while last > 0 {
                match nal::find_prev_start_code(&chunk.data[..last]) {
                    Some(start) => {
                        let unit = chunk.data.slice(start..last);
                        last = start;
                        self.queue_unit(ctx, config, unit, chunk.pts, sink)?;
                    }
                    None => {
                        trace!("H264: 暂存无起始码的前导片段, size={}", last);
                        self.prev = Some(Chunk {
                            data: chunk.data.slice(..last),
                            pts: chunk.pts,
                        });
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn queue_unit<S: PacketSink + ?Sized>(
        &mut self,
        ctx: &mut ParseContext,
        config: &StreamConfig,
        data: Bytes,
        pts: Timestamp,
        sink: &mut S,
    ) -> NalResult<()> {
        let class = ctx.classify_unit(config, &data, pts);

        if self.queue.have_i_frame && !class.has_intra_slice && class.has_slice {
            debug!(
                "H264: 队列中已有 I 切片, 收到非 I 切片, 输出队列, queued={}",
                self.queue.len()
            );
            self.flush_queue(sink)?;
        }
        if class.has_intra_slice {
            self.queue.have_i_frame = true;
        }

        trace!(
            "H264: 单元入队, type={}, size={}, i_frame={}",
            class.nal_type,
            data.len(),
            class.has_intra_slice
        );
        self.queue.units.push_front(NalUnit { data, pts, class });
        Ok(())
    }

    fn flush_queue<S: PacketSink + ?Sized>(&mut self, sink: &mut S) -> NalResult<()> {
        let units = std::mem::take(&mut self.queue.units);
        self.queue.have_i_frame = false;

        for (i, unit) in units.into_iter().enumerate() {
            sink.push_packet(Packet {
                pts: unit.pts,
                is_discont: i == 0,
                is_delta_unit: unit.class.is_delta_unit(),
                nal_type: unit.class.nal_type,
                data: unit.data,
            })?;
        }
        Ok(())
    }
}

/// 把较早的块与其后暂存的前导片段拼接, 时间戳取较早的块
fn join(older: Chunk, prev: Chunk) -> Chunk {
    let mut buf = BytesMut::with_capacity(older.data.len() + prev.data.len());
    buf.extend_from_slice(&older.data);
    buf.extend_from_slice(&prev.data);
    Chunk {
        data: buf.freeze(),
        pts: older.pts,
    }
}
