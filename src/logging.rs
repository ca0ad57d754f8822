use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// 実験ディレクトリに書き出す診断ログのファイル名
pub const LOG_FILE_NAME: &str = "ocsvm-rs.log";

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error)。`RUST_LOG` が優先される
    pub level: String,
    /// ログディレクトリ（通常は xp_dir）
    pub log_dir: Option<PathBuf>,
    /// コンソール出力有効
    pub console_enabled: bool,
    /// ファイル出力有効
    pub file_enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            console_enabled: true,
            file_enabled: true,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// カスタムログディレクトリを設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// コンソール出力制御
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    /// ファイル出力制御
    pub fn with_file(mut self, enabled: bool) -> Self {
        self.file_enabled = enabled;
        self
    }

    /// ファイル出力先（ディレクトリが存在する場合のみ）
    fn file_target(&self) -> Option<&Path> {
        self.log_dir
            .as_deref()
            .filter(|dir| self.file_enabled && dir.is_dir())
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// ログシステムを初期化
///
/// ファイル出力時は `WorkerGuard` を返す。呼び出し側は実行終了まで保持すること。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = build_filter(&config.level);

    let guard = match (config.console_enabled, config.file_target()) {
        (console, Some(dir)) => {
            ensure_log_dir(dir)?;
            let (writer, guard) = non_blocking(rolling::never(dir, LOG_FILE_NAME));
            let builder = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            let result = if console {
                builder.with_writer(std::io::stderr.and(writer)).try_init()
            } else {
                builder.with_ansi(false).with_writer(writer).try_init()
            };
            result.map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;
            Some(guard)
        }
        (true, None) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;
            None
        }
        (false, None) => {
            // 最低限のコンソール出力
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::WARN)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))?;
            None
        }
    };

    tracing::debug!("Log level: {}", config.level);
    if let Some(dir) = config.file_target() {
        tracing::debug!("Log file: {}", dir.join(LOG_FILE_NAME).display());
    }
    Ok(guard)
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create log directory {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builder() {
        let config = LogConfig::default()
            .with_level("debug")
            .with_log_dir("/tmp/xp")
            .with_console(false)
            .with_file(false);
        assert_eq!(config.level, "debug");
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/xp")));
        assert!(!config.console_enabled);
        assert!(config.file_target().is_none());
    }

    #[test]
    fn test_file_target_requires_existing_dir() {
        let dir = tempdir().unwrap();
        let config = LogConfig::default().with_log_dir(dir.path());
        assert_eq!(config.file_target(), Some(dir.path()));

        let missing = LogConfig::default().with_log_dir(dir.path().join("missing"));
        assert!(missing.file_target().is_none());
    }
}
