use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use pdfner_config::{AppConfig, ConfigError};
use pdfner_frontend::RunOptions;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

/// 抽取选中文本中的学术实体，并生成页面高亮注释。
#[derive(Debug, Parser)]
#[command(name = "pdfner", version)]
struct Cli {
    /// 配置文件路径，缺省时读取 `PDFNER_CONFIG` 或 `./config/default.toml`。
    #[arg(long)]
    config: Option<PathBuf>,

    /// 高亮请求 JSON，缺省时读取 `PDFNER_REQUEST`，再缺省则运行内置示例。
    #[arg(long)]
    request: Option<PathBuf>,

    /// 注释 JSON Lines 输出文件。
    #[arg(long)]
    output: Option<PathBuf>,

    /// 覆盖配置中的日志等级。
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (mut config, config_error) = load_configuration(cli.config.as_deref());
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.llm = config.llm.with_env_overrides();
    let level_accepted = init_logging(&config.logging.level);
    // 日志就绪后再报告配置与日志等级的问题，避免警告丢失。
    if let Some(err) = &config_error {
        report_config_error(err);
    }
    if !level_accepted {
        warn!(level = %config.logging.level, "无法识别的日志等级，改用 info");
    }
    info!("启动 pdfner");

    let options = RunOptions {
        request: cli.request,
        output: cli.output,
    };
    if let Err(err) = pdfner_frontend::run_cli(&config, &options).await {
        error!(error = %err, "执行高亮流程失败");
        std::process::exit(1);
    }
}

/// 读取 `--config` 指定的文件，或按 `PDFNER_CONFIG` 与 `./config/default.toml` 自动发现。
/// 任何失败都退回内建默认配置，错误留给日志初始化之后报告。
fn load_configuration(explicit: Option<&Path>) -> (AppConfig, Option<ConfigError>) {
    let loaded = match explicit {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::discover(),
    };
    match loaded {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    }
}

fn report_config_error(err: &ConfigError) {
    match err {
        ConfigError::Io { path, source } if source.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "配置文件不存在，使用内建默认值");
        }
        ConfigError::Io { path, source } => {
            warn!(path = %path.display(), error = %source, "配置文件无法读取，使用内建默认值");
        }
        ConfigError::Parse { path, source } => {
            warn!(
                path = %path.display(),
                span = ?source.span(),
                error = %source.message(),
                "配置文件格式有误，使用内建默认值"
            );
        }
        ConfigError::Context { message, source } => {
            warn!(error = %source, "{message}，使用内建默认值");
        }
    }
}

/// 返回给定等级是否被接受；无法解析时退回 `info`。
fn log_filter(level: &str) -> (EnvFilter, bool) {
    match EnvFilter::try_new(level) {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new("info"), false),
    }
}

/// 日志写到 stderr，stdout 留给注释输出。
fn init_logging(level: &str) -> bool {
    let (filter, accepted) = log_filter(level);
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, err) = load_configuration(Some(&dir.path().join("absent.toml")));
        assert!(matches!(err, Some(ConfigError::Io { .. })));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.llm.max_attempts, 3);
    }

    #[test]
    fn malformed_config_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[llm\nmax_attempts = ").unwrap();
        let (config, err) = load_configuration(Some(&path));
        assert!(matches!(err, Some(ConfigError::Parse { .. })));
        assert_eq!(config.llm.max_attempts, 3);
    }

    #[test]
    fn explicit_config_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pdfner.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\n[llm]\nmax_attempts = 5\n").unwrap();
        let (config, err) = load_configuration(Some(&path));
        assert!(err.is_none());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.llm.max_attempts, 5);
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        assert!(log_filter("pdfner=debug,warn").1);
        assert!(!log_filter("pdfner=loud").1);
    }
}
