//! Configuration, read from the environment once at first use.
//!
//! Follows the same pattern as [`crate::os::page_size`]'s lazily-initialized
//! static: a process-wide value computed once and cached for the rest of
//! the process's life. Parsing is limited to the five keys below — general
//! environment-variable parsing is out of scope.

use crate::block;
use crate::os;
use crate::region;

const ENV_REGION_SIZE: &str = "MEMALLOC_REGION_SIZE";
const ENV_MAX_BLOCK_SIZE: &str = "MEMALLOC_MAX_BLOCK_SIZE";
const ENV_RESERVE_CAPACITY: &str = "MEMALLOC_RESERVE_CAPACITY";
const ENV_MIN_SPLIT_SIZE: &str = "MEMALLOC_MIN_SPLIT_SIZE";
const ENV_SCRIBBLE_CHAR: &str = "MEMALLOC_SCRIBBLE_CHAR";

const DEFAULT_REGION_SIZE: usize = 4096;
/// Tuned so the common case (many small objects) stays on the region path
/// while anything that would eat a large fraction of a region on its own
/// goes straight to its own mapping instead of fragmenting the region.
const DEFAULT_MAX_BLOCK_SIZE: usize = 3072;
const DEFAULT_RESERVE_CAPACITY: usize = 0;
const DEFAULT_MIN_SPLIT_SIZE: usize = block::MIN_BLOCK_SIZE;
const DEFAULT_SCRIBBLE_CHAR: u8 = 0;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Config {
    pub region_size: usize,
    pub max_block_size: usize,
    pub reserve_capacity: usize,
    pub min_split_size: usize,
    pub scribble_char: u8,
}

impl Config {
    /// Reads configuration from the environment, falling back to tuned
    /// defaults for anything absent or unparsable.
    pub(crate) fn from_env() -> Self {
        let page_size = os::page_size();

        let region_size = env_usize(ENV_REGION_SIZE)
            .filter(|&v| v > 0 && v.is_power_of_two() && v % page_size == 0)
            .unwrap_or_else(|| DEFAULT_REGION_SIZE.max(page_size));

        let reserve_capacity = env_usize(ENV_RESERVE_CAPACITY)
            .map(|v| block::round_up(v, block::ALIGN))
            .unwrap_or(DEFAULT_RESERVE_CAPACITY);

        let min_split_size = env_usize(ENV_MIN_SPLIT_SIZE)
            .filter(|&v| v >= block::MIN_BLOCK_SIZE)
            .unwrap_or(DEFAULT_MIN_SPLIT_SIZE);

        let max_block_size = env_usize(ENV_MAX_BLOCK_SIZE)
            .filter(|&v| v > 0)
            .unwrap_or_else(|| DEFAULT_MAX_BLOCK_SIZE.min(region_size.saturating_sub(region::min_region_size() / 4)));

        let scribble_char = std::env::var(ENV_SCRIBBLE_CHAR)
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .unwrap_or(DEFAULT_SCRIBBLE_CHAR);

        let config = Config {
            region_size: region_size.max(region::min_region_size()),
            max_block_size,
            reserve_capacity,
            min_split_size,
            scribble_char,
        };

        debug_assert!(config.region_size >= region::min_region_size());
        debug_assert_eq!(config.region_size % page_size, 0);
        debug_assert_eq!(config.reserve_capacity % block::ALIGN, 0);
        config
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let config = Config::from_env();
        assert!(config.region_size >= region::min_region_size());
        assert_eq!(config.region_size % os::page_size(), 0);
        assert!(config.region_size.is_power_of_two());
        assert!(config.min_split_size >= block::MIN_BLOCK_SIZE);
        assert_eq!(config.reserve_capacity % block::ALIGN, 0);
    }
}
