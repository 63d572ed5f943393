use thiserror::Error;

/// Rejected construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("octree fan-out must be at least 1")]
    ZeroFanOut,
    #[error("octree maximum depth {max_depth} exceeds the supported limit of {limit}")]
    MaxDepthTooLarge { max_depth: usize, limit: usize },
}
