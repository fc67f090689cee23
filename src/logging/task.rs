//! 日志维护任务: 跨日切换、历史日志压缩与过期清理.

use super::{LoggingConfig, build_current_log_path};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, error};

pub(super) fn spawn_maintenance(config: LoggingConfig, rotate_requested: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut cleanup_interval =
            tokio::time::interval(Duration::from_secs(config.cleanup_interval_seconds.max(1)));

        if let Err(err) = touch_current_log(&config) {
            error!("初始化当前日志文件失败: {}", err);
        }
        if let Err(err) = cleanup_logs(&config, Local::now().date_naive()) {
            error!("启动时清理日志失败: {}", err);
        }

        let mut next_rollover_at = next_rollover_or_soon(Local::now());

        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    if let Err(err) = cleanup_logs(&config, Local::now().date_naive()) {
                        error!("清理日志失败: {}", err);
                    }
                }
                _ = tokio::time::sleep_until(next_rollover_at) => {
                    match touch_current_log(&config) {
                        Ok(path) => {
                            rotate_requested.store(true, Ordering::Release);
                            debug!("日志切换到 {}", path.display());
                        }
                        Err(err) => error!("日志翻滚失败: {}", err),
                    }
                    if let Err(err) = cleanup_logs(&config, Local::now().date_naive()) {
                        error!("翻滚后清理日志失败: {}", err);
                    }
                    next_rollover_at = next_rollover_or_soon(Local::now());
                }
            }
        }
    });
}

/// 确保当天日志文件存在
fn touch_current_log(config: &LoggingConfig) -> Result<PathBuf> {
    let directory = Path::new(&config.directory);
    fs::create_dir_all(directory)?;
    let current_path =
        build_current_log_path(directory, &config.file_prefix, Local::now().date_naive());
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&current_path)
        .with_context(|| format!("创建当前日志文件失败, path={}", current_path.display()))?;
    Ok(current_path)
}

/// 删除过期日志, 压缩 `today` 之前的未压缩日志
fn cleanup_logs(config: &LoggingConfig, today: NaiveDate) -> Result<()> {
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(());
    }

    let cutoff = today - ChronoDuration::days(config.retention_days);

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some((date, compressed)) = parse_rotated_log_name(&file_name, &config.file_prefix)
        else {
            continue;
        };

        let file_path = entry.path();
        if date < cutoff {
            if let Err(err) = fs::remove_file(&file_path) {
                error!("删除过期日志失败, path={}, err={}", file_path.display(), err);
            }
            continue;
        }

        if config.compress_history && !compressed && date < today {
            if let Err(err) = compress_to_gz(&file_path) {
                error!("压缩日志失败, path={}, err={}", file_path.display(), err);
            }
        }
    }

    Ok(())
}

fn compress_to_gz(path: &Path) -> Result<()> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if gz_path.exists() {
        return Ok(());
    }

    let mut input =
        File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
    let output = File::create(&gz_path)
        .with_context(|| format!("创建压缩日志失败, path={}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(path)
        .with_context(|| format!("删除已压缩日志失败, path={}", path.display()))?;
    Ok(())
}

fn parse_rotated_log_name(file_name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('.')?;
    let (date_part, compressed) = match rest.strip_suffix(".log.gz") {
        Some(date_part) => (date_part, true),
        None => (rest.strip_suffix(".log")?, false),
    };
    if date_part.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some((date, compressed))
}

fn next_rollover_or_soon(now: DateTime<Local>) -> tokio::time::Instant {
    compute_next_rollover(now).unwrap_or_else(|err| {
        error!("计算下一次翻滚时间失败: {}", err);
        tokio::time::Instant::now() + Duration::from_secs(1)
    })
}

fn compute_next_rollover(now: DateTime<Local>) -> Result<tokio::time::Instant> {
    let next_date = now.date_naive() + ChronoDuration::days(1);
    let next_midnight = next_date
        .and_hms_opt(0, 0, 0)
        .context("计算下一次日志翻滚时间失败")?;
    let next_local = Local
        .from_local_datetime(&next_midnight)
        .earliest()
        .context("转换本地时间失败")?;
    let system_time = SystemTime::from(next_local.with_timezone(&Utc));
    let duration = system_time
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Ok(tokio::time::Instant::now() + duration)
}
