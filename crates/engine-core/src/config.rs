//! Configuration for the engine boundary runtime

use serde::{Deserialize, Serialize};

/// Retention tuning for the scratch-buffer pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPoolConfig {
    /// Idle buffers kept per capacity class; excess releases are dropped
    pub max_retained_per_class: usize,
    /// Smallest capacity class handed out, regardless of rental size
    pub min_class_bytes: usize,
}

impl Default for MemoryPoolConfig {
    fn default() -> Self {
        Self {
            max_retained_per_class: 32,
            min_class_bytes: 64,
        }
    }
}

impl MemoryPoolConfig {
    /// Set the per-class retention limit
    pub fn with_max_retained_per_class(mut self, max: usize) -> Self {
        self.max_retained_per_class = max;
        self
    }

    /// Set the smallest capacity class
    pub fn with_min_class_bytes(mut self, bytes: usize) -> Self {
        self.min_class_bytes = bytes;
        self
    }
}

/// Configuration for an [`crate::EngineClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scratch-buffer pool tuning
    pub memory_pool: MemoryPoolConfig,
    /// Ask the engine to forward its internal log records
    pub capture_engine_logs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_pool: MemoryPoolConfig::default(),
            capture_engine_logs: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory pool configuration
    pub fn with_memory_pool(mut self, memory_pool: MemoryPoolConfig) -> Self {
        self.memory_pool = memory_pool;
        self
    }

    /// Enable engine log capture
    pub fn with_engine_log_capture(mut self) -> Self {
        self.capture_engine_logs = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods_compose() {
        let config = EngineConfig::new()
            .with_engine_log_capture()
            .with_memory_pool(MemoryPoolConfig::default().with_max_retained_per_class(4));
        assert!(config.capture_engine_logs);
        assert_eq!(config.memory_pool.max_retained_per_class, 4);
    }
}
