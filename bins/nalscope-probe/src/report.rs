//! 单个文件的探测与结果结构.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use bytes::Bytes;
use nalscope_syntax::{Codec, StreamSummary, create_parser, split_units};
use serde::Serialize;
use tracing::{debug, warn};

/// 探测选项
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    /// `None` 表示按扩展名识别
    pub codec: Option<Codec>,
    pub fields: bool,
    pub max_units: Option<usize>,
}

/// 单个文件的探测结果
#[derive(Debug, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub codec: String,
    pub total_units: usize,
    pub failed_units: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryInfo>,
    pub units: Vec<UnitInfo>,
}

#[derive(Debug, Serialize)]
pub struct SummaryInfo {
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<String>,
    pub chroma_format: String,
    pub bit_depth: u32,
    pub profile: String,
}

impl From<StreamSummary> for SummaryInfo {
    fn from(s: StreamSummary) -> Self {
        Self {
            width: s.width,
            height: s.height,
            frame_rate: s.frame_rate.map(|r| r.to_string()),
            chroma_format: s.chroma_format.to_string(),
            bit_depth: s.bit_depth,
            profile: s.profile,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UnitInfo {
    pub index: usize,
    pub offset: usize,
    pub size: usize,
    pub type_code: u32,
    pub type_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

/// 按扩展名识别编解码器
pub fn detect_codec(path: &Path) -> Result<Codec> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| anyhow!("文件没有扩展名, 请使用 --codec 指定: {}", path.display()))?;
    Codec::from_extension(ext)
        .ok_or_else(|| anyhow!("无法根据扩展名 .{ext} 识别编解码器, 请使用 --codec 指定"))
}

/// 解析一个文件的全部单元, 单元级错误记入结果而不中止
pub fn probe_file(path: &Path, opts: ProbeOptions) -> Result<FileReport> {
    let codec = match opts.codec {
        Some(codec) => codec,
        None => detect_codec(path)?,
    };
    let data = std::fs::read(path).with_context(|| format!("读取文件失败: {}", path.display()))?;
    let data = Bytes::from(data);

    let units = split_units(&data, codec);
    debug!("{}: {} 个单元, codec={}", path.display(), units.len(), codec);

    let mut parser = create_parser(codec, opts.fields);
    let limit = opts.max_units.unwrap_or(usize::MAX);
    let mut infos = Vec::with_capacity(units.len().min(limit));
    let mut failed_units = 0;

    for (index, unit) in units.iter().enumerate().take(limit) {
        let mut info = UnitInfo {
            index,
            offset: unit.offset,
            size: unit.len(),
            type_code: 0,
            type_name: String::new(),
            description: String::new(),
            error: None,
            fields: Vec::new(),
        };
        match parser.parse_unit(&unit.data) {
            Ok(report) => {
                info.type_code = report.type_code;
                info.type_name = report.type_name.to_string();
                info.description = report.description;
                if opts.fields {
                    info.fields = report.annotations.iter().map(ToString::to_string).collect();
                }
            }
            Err(err) => {
                failed_units += 1;
                info.error = Some(err.to_string());
            }
        }
        infos.push(info);
    }

    if failed_units > 0 {
        warn!("{}: {} 个单元解析失败", path.display(), failed_units);
    }

    Ok(FileReport {
        filename: path.display().to_string(),
        codec: codec.name().to_string(),
        total_units: units.len(),
        failed_units,
        summary: parser.summary().map(SummaryInfo::from),
        units: infos,
    })
}

/// 文本输出
pub fn print_text(report: &FileReport, quiet: bool) {
    println!("[FILE] {} ({})", report.filename, report.codec);
    if let Some(s) = &report.summary {
        print!("  {}x{} {} {}bit {}", s.width, s.height, s.chroma_format, s.bit_depth, s.profile);
        if let Some(rate) = &s.frame_rate {
            print!(" {rate} fps");
        }
        println!();
    }
    if !quiet {
        for unit in &report.units {
            match &unit.error {
                Some(err) => println!("  #{:<5} @{:<8} ! {}", unit.index, unit.offset, err),
                None => println!(
                    "  #{:<5} @{:<8} {:>3} {:<24} {}",
                    unit.index, unit.offset, unit.type_code, unit.type_name, unit.description
                ),
            }
            for field in &unit.fields {
                println!("        {field}");
            }
        }
    }
    println!(
        "  单元总数: {}, 已输出: {}, 失败: {}",
        report.total_units,
        report.units.len(),
        report.failed_units
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalscope_core::BitWriter;
    use tempfile::TempDir;

    /// 176x144 Baseline SPS + 损坏的 PPS
    fn write_avc_stream(dir: &TempDir) -> std::path::PathBuf {
        let mut bw = BitWriter::new();
        bw.write_bits(66, 8);
        bw.write_bits(0, 8);
        bw.write_bits(30, 8);
        bw.write_ue(0); // seq_parameter_set_id
        bw.write_ue(0); // log2_max_frame_num_minus4
        bw.write_ue(2); // pic_order_cnt_type
        bw.write_ue(1); // max_num_ref_frames
        bw.write_flag(false);
        bw.write_ue(10); // pic_width_in_mbs_minus1
        bw.write_ue(8); // pic_height_in_map_units_minus1
        bw.write_flag(true); // frame_mbs_only_flag
        bw.write_flag(true);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_trailing_bits();
        let sps = bw.finish();

        let mut stream = vec![0x00, 0x00, 0x00, 0x01, 0x67];
        stream.extend_from_slice(&sps);
        stream.extend_from_slice(&[0x00, 0x00, 0x01, 0x68, 0x00]);
        stream.extend_from_slice(&[0x00, 0x00, 0x01, 0x09, 0xF0]);

        let path = dir.path().join("clip.264");
        std::fs::write(&path, stream).expect("写入测试码流失败");
        path
    }

    #[test]
    fn test_detect_codec_by_extension() {
        assert_eq!(detect_codec(Path::new("a/b.h265")).ok(), Some(Codec::Hevc));
        assert_eq!(detect_codec(Path::new("clip.M2V")).ok(), Some(Codec::Mpeg2));
        let err = detect_codec(Path::new("clip.mp4")).expect_err("mp4 不应被识别");
        assert!(err.to_string().contains("--codec"));
        assert!(detect_codec(Path::new("noext")).is_err());
    }

    #[test]
    fn test_probe_file_collects_units_and_errors() {
        let dir = TempDir::new().expect("创建临时目录失败");
        let path = write_avc_stream(&dir);
        let report = probe_file(
            &path,
            ProbeOptions {
                codec: None,
                fields: true,
                max_units: None,
            },
        )
        .expect("探测应成功");

        assert_eq!(report.codec, "AVC");
        assert_eq!(report.total_units, 3);
        assert_eq!(report.failed_units, 1, "截断的 PPS 应失败");
        assert_eq!(report.units[0].type_code, 7);
        assert!(!report.units[0].fields.is_empty(), "--fields 时应输出注释");
        assert!(report.units[1].error.is_some());
        assert_eq!(report.units[2].type_code, 9);

        let summary = report.summary.expect("应生成流概要");
        assert_eq!((summary.width, summary.height), (176, 144));

        let json = serde_json::to_string(&report.units[1]).expect("序列化失败");
        assert!(json.contains("\"error\""));
        assert!(!json.contains("\"fields\""));
    }

    #[test]
    fn test_probe_file_max_units() {
        let dir = TempDir::new().expect("创建临时目录失败");
        let path = write_avc_stream(&dir);
        let report = probe_file(
            &path,
            ProbeOptions {
                codec: Some(Codec::Avc),
                fields: false,
                max_units: Some(1),
            },
        )
        .expect("探测应成功");
        assert_eq!(report.total_units, 3);
        assert_eq!(report.units.len(), 1);
        assert!(report.units[0].fields.is_empty());
    }

    #[test]
    fn test_probe_missing_file() {
        let err = probe_file(
            Path::new("/nonexistent/clip.264"),
            ProbeOptions {
                codec: None,
                fields: false,
                max_units: None,
            },
        )
        .expect_err("不存在的文件应失败");
        assert!(format!("{err:#}").contains("读取文件失败"));
    }
}
