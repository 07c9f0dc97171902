//! Town loading and pairwise route enumeration for the world road map.

use std::fmt;
use std::path::Path;

use tracing::warn;

use crate::error::EnumerationError;
use crate::scheduler::{Category, WorkUnit};

/// Squared planar distance below which two towns get a road between them.
pub const DEFAULT_ROAD_DELTA: f64 = 200.0;

/// A town point. Capitals are priority endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Town {
    pub lat: f64,
    pub lon: f64,
    pub is_capital: bool,
}

impl Town {
    pub fn new(lat: f64, lon: f64, is_capital: bool) -> Self {
        Self {
            lat,
            lon,
            is_capital,
        }
    }

    /// Squared planar distance in coordinate units.
    pub fn distance_sq(&self, other: &Town) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        dlat * dlat + dlon * dlon
    }
}

impl fmt::Display for Town {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}", self.lat, self.lon)?;
        if self.is_capital {
            f.write_str(", capital")?;
        }
        f.write_str(")")
    }
}

/// An unordered pair of towns to route between.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TownPair {
    pub from: Town,
    pub to: Town,
}

impl TownPair {
    pub fn new(from: Town, to: Town) -> Self {
        Self { from, to }
    }

    pub fn both_capitals(&self) -> bool {
        self.from.is_capital && self.to.is_capital
    }
}

impl fmt::Display for TownPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

impl WorkUnit for TownPair {
    fn category(&self) -> Category {
        if self.both_capitals() {
            Category::Priority
        } else {
            Category::Secondary
        }
    }
}

/// Parses `towns.csv` content: `lat;lon;<unused>;<t|f>` per line.
///
/// Blank lines are skipped. `path` is only used in error messages.
pub fn parse_towns(content: &str, path: &Path) -> Result<Vec<Town>, EnumerationError> {
    let malformed = |line: usize, reason: String| EnumerationError::MalformedLine {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut towns = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() < 4 {
            return Err(malformed(
                line_no,
                format!("expected at least 4 fields, found {}", fields.len()),
            ));
        }

        let lat = fields[0]
            .trim()
            .parse::<f64>()
            .map_err(|e| malformed(line_no, format!("bad latitude '{}': {e}", fields[0])))?;
        let lon = fields[1]
            .trim()
            .parse::<f64>()
            .map_err(|e| malformed(line_no, format!("bad longitude '{}': {e}", fields[1])))?;
        let is_capital = fields[3].trim().eq_ignore_ascii_case("t");

        towns.push(Town::new(lat, lon, is_capital));
    }

    Ok(towns)
}

/// Loads towns from `path`. A missing file yields no towns.
pub fn load_towns(path: &Path) -> Result<Vec<Town>, EnumerationError> {
    if !path.is_file() {
        warn!(path = %path.display(), "File with towns not found");
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    parse_towns(&content, path)
}

/// Every unordered pair `(towns[i], towns[j])` with `i < j`, in index order.
pub fn each_to_each(towns: &[Town]) -> Vec<TownPair> {
    let mut pairs = Vec::with_capacity(towns.len() * towns.len().saturating_sub(1) / 2);
    for (i, from) in towns.iter().enumerate() {
        for to in &towns[i + 1..] {
            pairs.push(TownPair::new(*from, *to));
        }
    }
    pairs
}

/// Locality filter: capitals are always linked, other towns only when
/// closer than `road_delta` (squared distance).
pub fn keep_pair(pair: &TownPair, road_delta: f64) -> bool {
    pair.both_capitals() || pair.from.distance_sq(&pair.to) < road_delta
}

/// All pairs surviving [`keep_pair`].
pub fn road_pairs(towns: &[Town], road_delta: f64) -> Vec<TownPair> {
    each_to_each(towns)
        .into_iter()
        .filter(|pair| keep_pair(pair, road_delta))
        .collect()
}
