use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Sentiment analysis demo with feedback collection and Prometheus metrics
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Address both servers listen on
    #[arg(long, env = "SENTIMENT_MONITOR_HOST", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// Port of the interactive UI
    #[arg(short, long, env = "SENTIMENT_MONITOR_PORT", default_value_t = 8501)]
    pub port: u16,

    /// Port of the Prometheus metrics endpoint
    #[arg(long, env = "SENTIMENT_MONITOR_METRICS_PORT", default_value_t = 8001)]
    pub metrics_port: u16,

    /// Force a fresh download of the model files
    #[arg(short, long)]
    pub fresh: bool,

    /// Custom ONNX sequence-classification model (requires --tokenizer-path)
    #[arg(long, requires = "tokenizer_path")]
    pub model_path: Option<PathBuf>,

    /// tokenizer.json for the custom model
    #[arg(long, requires = "model_path")]
    pub tokenizer_path: Option<PathBuf>,

    /// Output labels of the custom model, in logit order
    #[arg(long, value_delimiter = ',', default_value = "NEGATIVE,POSITIVE")]
    pub labels: Vec<String>,

    /// Inputs are truncated to this many tokens
    #[arg(long, default_value_t = 512)]
    pub max_sequence_length: usize,

    /// Seconds a session may sit idle before it is dropped
    #[arg(long, env = "SENTIMENT_MONITOR_SESSION_TTL", default_value_t = 1800)]
    pub session_ttl_secs: u64,

    /// Expected SHA-256 of the builtin model.onnx
    #[arg(long, env = "SENTIMENT_MONITOR_MODEL_SHA256")]
    pub model_sha256: Option<String>,

    /// Expected SHA-256 of the builtin tokenizer.json
    #[arg(long, env = "SENTIMENT_MONITOR_TOKENIZER_SHA256")]
    pub tokenizer_sha256: Option<String>,

    /// ONNX Runtime intra-op threads (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    pub intra_threads: usize,
}

impl AppConfig {
    pub fn ui_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.metrics_port)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Both custom paths, when a custom model was requested.
    pub fn custom_model(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.model_path.as_ref().zip(self.tokenizer_path.as_ref())
    }
}
