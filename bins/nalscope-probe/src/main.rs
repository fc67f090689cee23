//! nalscope-probe - 视频基本流语法检查工具
//!
//! 把 Annex B 基本流切分为单元, 逐个解析并输出类型、概要与 (可选) 全部字段注释.

mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use nalscope::logging::{self, LoggingConfig};
use nalscope_syntax::Codec;
use rayon::prelude::*;
use tracing::{error, info};

use report::{FileReport, ProbeOptions, print_text, probe_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CodecArg {
    Avc,
    Hevc,
    Vvc,
    Mpeg2,
    /// 按文件扩展名识别
    Auto,
}

impl CodecArg {
    fn codec(self) -> Option<Codec> {
        match self {
            Self::Avc => Some(Codec::Avc),
            Self::Hevc => Some(Codec::Hevc),
            Self::Vvc => Some(Codec::Vvc),
            Self::Mpeg2 => Some(Codec::Mpeg2),
            Self::Auto => None,
        }
    }
}

/// nalscope 基本流语法检查工具
#[derive(Parser, Debug)]
#[command(name = "nalscope-probe", version, about = "视频基本流 (AVC/HEVC/VVC/MPEG-2) 语法检查工具")]
struct Cli {
    /// 输入文件, 多个文件并行处理
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// 编解码器
    #[arg(long, value_enum, default_value_t = CodecArg::Auto)]
    codec: CodecArg,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 输出每个单元的全部字段注释
    #[arg(long)]
    fields: bool,

    /// 每个文件最多输出的单元数
    #[arg(long)]
    max_units: Option<usize>,

    /// 静默模式 (只输出概要)
    #[arg(short, long)]
    quiet: bool,

    /// 同时写入按天切分的日志文件
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// 返回是否全部文件都处理成功
fn run(cli: &Cli) -> Result<bool> {
    // 文件日志的维护任务需要 tokio 运行时, 运行时须存活到进程结束
    let _runtime = init_logging(cli)?;

    let opts = ProbeOptions {
        codec: cli.codec.codec(),
        fields: cli.fields,
        max_units: cli.max_units,
    };
    info!("nalscope-probe {}: {} 个文件", nalscope::version(), cli.files.len());

    let results: Vec<Result<FileReport>> = cli
        .files
        .par_iter()
        .map(|path| probe_file(path, opts))
        .collect();

    let mut all_ok = true;
    let mut reports = Vec::with_capacity(results.len());
    for (path, result) in cli.files.iter().zip(results) {
        match result {
            Ok(report) => {
                all_ok &= report.failed_units == 0;
                reports.push(report);
            }
            Err(err) => {
                error!("{}: {:#}", path.display(), err);
                eprintln!("错误: {err:#}");
                all_ok = false;
            }
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&reports).context("序列化 JSON 失败")?;
        println!("{json}");
    } else {
        for report in &reports {
            print_text(report, cli.quiet);
        }
    }
    Ok(all_ok)
}

fn init_logging(cli: &Cli) -> Result<Option<tokio::runtime::Runtime>> {
    let console_level = if cli.quiet { "error" } else { "warn" };
    let Some(dir) = &cli.log_dir else {
        logging::init_console(console_level)?;
        return Ok(None);
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_time()
        .build()
        .context("创建日志运行时失败")?;
    {
        let _guard = runtime.enter();
        logging::init(LoggingConfig {
            console_level: console_level.to_string(),
            file_prefix: "nalscope-probe".to_string(),
            ..LoggingConfig::with_directory(dir.to_string_lossy().to_string())
        })?;
    }
    Ok(Some(runtime))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_options() {
        let cli = Cli::try_parse_from([
            "nalscope-probe",
            "a.264",
            "b.bin",
            "--codec",
            "hevc",
            "--json",
            "--max-units",
            "10",
        ])
        .expect("参数应可解析");
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.codec.codec(), Some(Codec::Hevc));
        assert!(cli.json);
        assert_eq!(cli.max_units, Some(10));
        assert!(cli.log_dir.is_none());
    }

    #[test]
    fn test_cli_requires_files() {
        assert!(Cli::try_parse_from(["nalscope-probe"]).is_err(), "缺少输入文件应失败");
        let cli = Cli::try_parse_from(["nalscope-probe", "x.m2v"]).expect("默认参数应可解析");
        assert_eq!(cli.codec, CodecArg::Auto);
        assert_eq!(cli.codec.codec(), None);
    }
}
