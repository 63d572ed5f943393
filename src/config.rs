use crate::error::ConfigError;

/// Deepest subdivision level accepted by [`OctreeConfig::validate`](struct.OctreeConfig.html#method.validate).
///
/// Halving an `f32` extent more often than this does not produce smaller boxes
/// for coordinates of ordinary magnitude.
pub const MAX_SUPPORTED_DEPTH: usize = 32;

/// Tuning of a [`PointOctree`](struct.PointOctree.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OctreeConfig {
    /// Number of points a leaf holds before it is split into octants.
    pub fan_out: usize,
    /// Leaves at this depth never split. Their points are treated as coincident.
    pub max_depth: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        OctreeConfig {
            fan_out: 8,
            max_depth: 16,
        }
    }
}

impl OctreeConfig {
    pub fn with_fan_out(self, fan_out: usize) -> Self {
        OctreeConfig { fan_out, ..self }
    }

    pub fn with_max_depth(self, max_depth: usize) -> Self {
        OctreeConfig { max_depth, ..self }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fan_out == 0 {
            return Err(ConfigError::ZeroFanOut);
        }

        if self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(ConfigError::MaxDepthTooLarge {
                max_depth: self.max_depth,
                limit: MAX_SUPPORTED_DEPTH,
            });
        }

        Ok(())
    }
}
