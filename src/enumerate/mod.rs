//! Work unit enumerators.
//!
//! Each enumerator builds the complete, finite list of units upfront from
//! its input; nothing is enqueued until enumeration has finished.
//!
//! - [`files`]: recursive directory scan producing `(file, directory)` units
//! - [`pairs`]: town loading and pairwise combination with a locality filter

pub mod files;
pub mod pairs;

pub use files::{find_mwms, scan_data_dirs, MwmUnit, EXCLUDED_MWMS, MWM_SUFFIX};
pub use pairs::{
    each_to_each, keep_pair, load_towns, parse_towns, road_pairs, Town, TownPair,
    DEFAULT_ROAD_DELTA,
};
