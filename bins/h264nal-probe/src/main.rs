//! h264nal-probe - H.264 码流探测工具
//!
//! 读取 Annex B 字节流或 avcC 长度前缀数据, 经解析器切分后列出每个输出单元,
//! 并汇总参数集与帧率信息. `--reverse` 模式按倒放方式从文件末尾向前送入数据块.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::process;

use h264nal_codec::{H264Parser, Packet, PacketSink, ParserSettings};
use h264nal_core::{NalResult, Rational, Timestamp};

/// H.264 码流探测工具
#[derive(Parser, Debug)]
#[command(name = "h264nal-probe", version, about = "H.264 NAL 单元探测工具")]
struct Cli {
    /// 输入文件路径
    input: Option<String>,

    /// avcC 配置记录文件, 提供时输入按长度前缀封装处理
    #[arg(long)]
    avcc: Option<String>,

    /// 每次送入解析器的数据块大小
    #[arg(long, default_value_t = 4096)]
    chunk_size: usize,

    /// 倒放模式: 从文件末尾开始逐块送入, 每块都标记不连续
    #[arg(long)]
    reverse: bool,

    /// 长度前缀封装时按 NAL 拆分输出
    #[arg(long)]
    split_packetized: bool,

    /// 列出每个输出单元
    #[arg(long)]
    show_packets: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 静默模式 (只输出探测结果)
    #[arg(short, long)]
    quiet: bool,
}

// ============================================================
// 输出结构体
// ============================================================

/// 完整探测结果
#[derive(Serialize)]
struct ProbeOutput {
    stream: StreamInfo,
    summary: PacketSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    packets: Option<Vec<PacketInfo>>,
}

/// 流信息
#[derive(Serialize)]
struct StreamInfo {
    filename: String,
    packetized: bool,
    nal_length_size: usize,
    direction: String,
    sps_count: usize,
    pps_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    frame_rate: Option<String>,
}

/// 输出单元统计
#[derive(Serialize, Default, Debug, PartialEq, Eq)]
struct PacketSummary {
    total_packets: u64,
    total_bytes: u64,
    keyframes: u64,
    discont: u64,
    by_type: BTreeMap<String, u64>,
}

/// 单个输出单元
#[derive(Serialize, Debug)]
struct PacketInfo {
    index: u64,
    nal_type: String,
    size: usize,
    keyframe: bool,
    discont: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk: Option<i64>,
}

/// 统计输出单元的接收端
struct ProbeSink {
    summary: PacketSummary,
    packets: Option<Vec<PacketInfo>>,
}

impl ProbeSink {
    fn new(keep_packets: bool) -> Self {
        Self {
            summary: PacketSummary::default(),
            packets: keep_packets.then(Vec::new),
        }
    }
}

impl PacketSink for ProbeSink {
    fn push_packet(&mut self, packet: Packet) -> NalResult<()> {
        let nal_type = packet.nal_type.to_string();
        if let Some(packets) = &mut self.packets {
            packets.push(PacketInfo {
                index: self.summary.total_packets,
                nal_type: nal_type.clone(),
                size: packet.size(),
                keyframe: packet.is_keyframe(),
                discont: packet.is_discont,
                chunk: packet.pts.is_valid().then_some(packet.pts.pts),
            });
        }

        self.summary.total_packets += 1;
        self.summary.total_bytes += packet.size() as u64;
        self.summary.keyframes += u64::from(packet.is_keyframe());
        self.summary.discont += u64::from(packet.is_discont);
        *self.summary.by_type.entry(nal_type).or_insert(0) += 1;
        Ok(())
    }
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let Some(input_path) = cli.input.as_deref() else {
        print_banner();
        return;
    };

    if !cli.quiet {
        eprintln!(
            "h264nal-probe 版本 {} -- H.264 NAL 单元探测工具",
            env!("CARGO_PKG_VERSION")
        );
        eprintln!("输入文件: {input_path}");
    }

    let result = probe(&cli, input_path).and_then(|output| print_output(&cli, &output));
    if let Err(e) = result {
        eprintln!("错误: {e:#}");
        process::exit(1);
    }
}

/// 读取输入并运行解析器
fn probe(cli: &Cli, input_path: &str) -> Result<ProbeOutput> {
    if cli.chunk_size == 0 {
        anyhow::bail!("数据块大小必须大于 0");
    }

    let data = Bytes::from(
        fs::read(input_path).with_context(|| format!("无法读取输入文件 '{input_path}'"))?,
    );

    let mut parser = H264Parser::new(ParserSettings {
        split_packetized: cli.split_packetized,
    });
    let codec_data = match &cli.avcc {
        Some(path) => {
            Some(fs::read(path).with_context(|| format!("无法读取 avcC 文件 '{path}'"))?)
        }
        None => None,
    };
    parser
        .set_codec_data(codec_data.as_deref())
        .context("解析 avcC 配置失败")?;
    if cli.reverse {
        parser.set_rate(-1.0);
    }

    let mut sink = ProbeSink::new(cli.show_packets);
    let chunk_base = Rational::new(1, 1);
    let offsets: Vec<usize> = (0..data.len()).step_by(cli.chunk_size).collect();
    log::debug!(
        "开始解析, size={}, chunks={}, reverse={}",
        data.len(),
        offsets.len(),
        cli.reverse
    );

    if cli.reverse {
        for (index, &start) in offsets.iter().enumerate().rev() {
            let end = (start + cli.chunk_size).min(data.len());
            let pts = Timestamp::new(index as i64, chunk_base);
            parser
                .push_chunk(data.slice(start..end), pts, true, &mut sink)
                .with_context(|| format!("处理数据块 #{index} 失败"))?;
        }
    } else {
        for (index, &start) in offsets.iter().enumerate() {
            let end = (start + cli.chunk_size).min(data.len());
            let pts = Timestamp::new(index as i64, chunk_base);
            parser
                .push_chunk(data.slice(start..end), pts, false, &mut sink)
                .with_context(|| format!("处理数据块 #{index} 失败"))?;
        }
    }
    parser.finish(&mut sink).context("结束流失败")?;

    let config = parser.config().copied().context("解析器未配置")?;
    let stream = StreamInfo {
        filename: input_path.to_string(),
        packetized: config.packetized,
        nal_length_size: config.nal_length_size,
        direction: if cli.reverse { "reverse" } else { "forward" }.to_string(),
        sps_count: parser.parameter_sets().sps_count(),
        pps_count: parser.parameter_sets().pps_count(),
        frame_rate: parser.frame_rate().map(|r| format!("{}/{}", r.num, r.den)),
    };

    Ok(ProbeOutput {
        stream,
        summary: sink.summary,
        packets: sink.packets,
    })
}

fn print_output(cli: &Cli, output: &ProbeOutput) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(output).context("序列化 JSON 失败")?;
        println!("{json}");
        return Ok(());
    }

    print_stream_text(&output.stream);
    if let Some(packets) = &output.packets {
        print_packets_text(packets);
    }
    print_summary_text(&output.summary);
    Ok(())
}

/// 文本输出: 流信息
fn print_stream_text(info: &StreamInfo) {
    println!("[STREAM]");
    println!("  文件名       : {}", info.filename);
    if info.packetized {
        println!("  封装         : 长度前缀 ({} 字节)", info.nal_length_size);
    } else {
        println!("  封装         : Annex B 字节流");
    }
    println!("  方向         : {}", info.direction);
    println!("  SPS 数量     : {}", info.sps_count);
    println!("  PPS 数量     : {}", info.pps_count);
    if let Some(ref fr) = info.frame_rate {
        println!("  帧率         : {fr}");
    }
    println!("[/STREAM]");
    println!();
}

/// 文本输出: 单元列表
fn print_packets_text(packets: &[PacketInfo]) {
    for packet in packets {
        println!(
            "#{:<6} {:<10} size={:<8} key={} discont={} chunk={}",
            packet.index,
            packet.nal_type,
            packet.size,
            u8::from(packet.keyframe),
            u8::from(packet.discont),
            packet
                .chunk
                .map_or_else(|| "-".to_string(), |c| c.to_string())
        );
    }
    println!();
}

/// 文本输出: 统计
fn print_summary_text(summary: &PacketSummary) {
    println!("[PACKETS]");
    println!("  单元总数     : {}", summary.total_packets);
    println!(
        "  数据总量     : {} 字节 ({:.2} KB)",
        summary.total_bytes,
        summary.total_bytes as f64 / 1024.0
    );
    println!("  关键单元     : {}", summary.keyframes);
    println!("  不连续点     : {}", summary.discont);
    for (nal_type, count) in &summary.by_type {
        println!("  {:<12} : {}", nal_type, count);
    }
    println!("[/PACKETS]");
    println!();
}

/// 打印版本横幅
fn print_banner() {
    println!(
        "h264nal-probe 版本 {} -- H.264 NAL 单元探测工具",
        env!("CARGO_PKG_VERSION")
    );
    println!();
    println!("用法: h264nal-probe [选项] <输入文件>");
    println!();
    println!("选项:");
    println!("  --avcc <文件>          avcC 配置记录, 输入按长度前缀封装处理");
    println!("  --chunk-size <字节>    每次送入的数据块大小 (默认 4096)");
    println!("  --reverse              倒放模式");
    println!("  --split-packetized     长度前缀封装时按 NAL 拆分输出");
    println!("  --show-packets         列出每个输出单元");
    println!("  --json                 输出 JSON 格式");
    println!("  -q, --quiet            静默模式");
}
