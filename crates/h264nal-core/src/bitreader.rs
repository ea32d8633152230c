//! NAL 载荷比特流读取器.
//!
//! 按大端位序 (MSB first) 读取, 在填充内部 64 位缓存的同时自动跳过
//! emulation prevention 字节: 当缓存中最近的两个字节均为 `0x00` 时, 紧随其后的
//! `0x03` 被丢弃, 且再下一个字节无条件进入缓存 (即使它也是 `0x03`).
//!
//! 读取越过数据末尾时不会报错, 读取位数会被截断为实际可用的位数,
//! 这与参数集解析 "尽力而为" 的需求一致: 截断的输入只会降低元数据质量.

/// 比特流读取器
///
/// # 示例
/// ```
/// use h264nal_core::bitreader::BitReader;
///
/// // 00 00 03 01: 中间的 0x03 为防竞争字节
/// let data = [0x00, 0x00, 0x03, 0x01];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read(24), 0x000001);
/// assert!(br.eos());
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 下一个待读入缓存的字节索引
    pos: usize,
    /// 缓存中尚未消费的位数
    head: u32,
    /// 已读入的字节缓存
    cache: u64,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            head: 0,
            // 初始值不能为 0, 否则开头的 0x03 会被误判为防竞争字节
            cache: 0xFFFF_FFFF,
        }
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 数据不足时返回实际可读的位, `n` 被截断.
    pub fn read(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        let mut n = n.min(32);

        while self.head < n {
            match self.next_byte() {
                Some(byte) => {
                    self.cache = (self.cache << 8) | u64::from(byte);
                    self.head += 8;
                }
                None => {
                    // 已到末尾, 最多只能提供 head 个位
                    n = self.head;
                    break;
                }
            }
        }

        let shift = self.head - n;
        let mask = (1u64 << n) - 1;
        self.head = shift;
        ((self.cache >> shift) & mask) as u32
    }

    /// 读取 1 位并转换为布尔值
    pub fn read_flag(&mut self) -> bool {
        self.read(1) == 1
    }

    /// 跳过 N 个位
    pub fn skip(&mut self, mut n: u32) {
        while n > 0 {
            let step = n.min(32);
            self.read(step);
            n -= step;
        }
    }

    /// 是否已到达末尾 (源数据耗尽且缓存为空)
    pub fn eos(&self) -> bool {
        self.pos >= self.data.len() && self.head == 0
    }

    /// 读取无符号 Exp-Golomb 编码值 ue(v)
    ///
    /// 前导零个数上限为 32, 防止损坏数据导致无界循环.
    pub fn read_ue(&mut self) -> u32 {
        let mut leading_zeros = 0u32;
        while self.read(1) == 0 && !self.eos() && leading_zeros < 32 {
            leading_zeros += 1;
        }

        let suffix = u64::from(self.read(leading_zeros));
        let value = (1u64 << leading_zeros) - 1 + suffix;
        u32::try_from(value).unwrap_or(u32::MAX)
    }

    /// 取出下一个有效字节, 跳过防竞争字节
    fn next_byte(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;

        if byte == 0x03 && self.cache & 0xFFFF == 0 {
            // 其后的字节无条件进入缓存
            let next = *self.data.get(self.pos)?;
            self.pos += 1;
            return Some(next);
        }

        Some(byte)
    }
}
