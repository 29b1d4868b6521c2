//! Ingestion 错误类型

use std::path::PathBuf;

use thiserror::Error;

/// Ingestion 错误
#[derive(Debug, Error)]
pub enum IngestionError {
    /// 模拟分布参数非法
    #[error("invalid distribution for {source_name}: {message}")]
    InvalidDistribution {
        /// 数据源名称
        source_name: String,
        /// 错误消息
        message: String,
    },

    /// 采样频率非法
    #[error("invalid sampling rate for {source_name}: {rate_hz} Hz")]
    InvalidRate {
        /// 数据源名称
        source_name: String,
        /// 配置的频率
        rate_hz: f64,
    },

    /// 设备打开失败
    #[error("failed to open device {}: {source}", path.display())]
    DeviceOpen {
        /// 设备路径
        path: PathBuf,
        /// 底层 IO 错误
        #[source]
        source: std::io::Error,
    },

    /// 读取线程启动失败
    #[error("failed to start reader thread for {source_name}: {source}")]
    ReaderSpawn {
        /// 数据源名称
        source_name: String,
        /// 底层 IO 错误
        #[source]
        source: std::io::Error,
    },

    /// 生产者已在运行
    #[error("producer {name} is already running")]
    AlreadyRunning {
        /// 生产者名称
        name: String,
    },
}

impl IngestionError {
    pub fn invalid_distribution(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDistribution {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

/// Ingestion Result 类型别名
pub type Result<T> = std::result::Result<T, IngestionError>;
