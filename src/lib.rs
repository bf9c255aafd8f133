// src/lib.rs
pub mod cli;
pub mod cluster;
pub mod common;
pub mod detector;
pub mod fingerprint;
pub mod matcher;
pub mod output;
pub mod scanner;

// 导出常用结构体和函数
pub use cluster::{cluster_fingerprints, ClusterPartition, PortSet};
pub use detector::{build_feature_map, load_or_generate_feature_map, FeatureDetector, FeatureMap};
pub use fingerprint::{load_fingerprints, Fingerprint};
pub use matcher::{HttpResponse, MatchResult, TcpResponse};
pub use scanner::{
    drop_status_only, unique_results, ConfidenceConfig, ScanResult, Scanner, ScannerConfig,
};
