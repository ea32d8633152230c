//! 输入字节累积器.
//!
//! 上游送入的数据块大小任意, 解析器需要在字节数足够时才能定位 NAL 边界.
//! `Adapter` 按顺序累积数据, 提供 "可用字节数 / 窥视 / 取出前 N 字节" 三个操作.

use bytes::{Bytes, BytesMut};

use crate::{NalError, NalResult};

/// 字节累积器
#[derive(Debug, Default)]
pub struct Adapter {
    buf: BytesMut,
}

impl Adapter {
    /// 创建空累积器
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加数据到末尾
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// 当前可用字节数
    pub fn available(&self) -> usize {
        self.buf.len()
    }

    /// 窥视前 `size` 字节, 不消费
    pub fn peek(&self, size: usize) -> NalResult<&[u8]> {
        if self.buf.len() < size {
            return Err(NalError::NeedMoreData);
        }
        Ok(&self.buf[..size])
    }

    /// 取出前 `size` 字节
    pub fn take(&mut self, size: usize) -> NalResult<Bytes> {
        if self.buf.len() < size {
            return Err(NalError::NeedMoreData);
        }
        Ok(self.buf.split_to(size).freeze())
    }

    /// 丢弃全部数据
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
