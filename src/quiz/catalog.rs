use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::error::{QuizError, Result};
use crate::quiz::provider::RawCountry;
use crate::quiz::OPTION_COUNT;

/// Sentinel region name meaning "every region".
pub const WORLDWIDE: &str = "Worldwide";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRecord {
    pub name: String,
    /// Scalable (SVG) flag image.
    pub flag_image_ref: String,
    /// Raster (PNG) flag image, when the provider has one.
    pub flag_raster_ref: Option<String>,
    pub region: String,
    pub subregion: Option<String>,
    pub capital: String,
    pub population: u64,
}

impl CountryRecord {
    /// Validates a raw provider record. Records without a name, SVG flag,
    /// region or capital are rejected.
    pub fn from_raw(raw: RawCountry) -> Option<Self> {
        let name = non_empty(raw.name.and_then(|n| n.common))?;
        let flags = raw.flags.unwrap_or_default();
        let flag_image_ref = non_empty(flags.svg)?;
        let region = non_empty(raw.region)?;
        let capital = non_empty(raw.capital.unwrap_or_default().into_iter().next())?;

        Some(Self {
            name,
            flag_image_ref,
            flag_raster_ref: non_empty(flags.png),
            region,
            subregion: non_empty(raw.subregion),
            capital,
            population: raw.population.unwrap_or(0),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Every validated country, loaded once per process.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    countries: Vec<CountryRecord>,
}

impl Catalog {
    #[cfg(test)]
    pub fn new(countries: Vec<CountryRecord>) -> Self {
        Self { countries }
    }

    pub fn from_raw(raw: Vec<RawCountry>) -> Self {
        let total = raw.len();
        let countries: Vec<CountryRecord> =
            raw.into_iter().filter_map(CountryRecord::from_raw).collect();
        if countries.len() < total {
            log::debug!(
                "Dropped {} country records with missing fields",
                total - countries.len()
            );
        }
        Self { countries }
    }

    #[cfg(test)]
    pub fn countries(&self) -> &[CountryRecord] {
        &self.countries
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    /// Distinct region names, sorted.
    pub fn regions(&self) -> Vec<String> {
        self.countries
            .iter()
            .map(|c| c.region.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Derives the working subset for a region.
    ///
    /// Fails with [`QuizError::UnplayableRegion`] when fewer than
    /// [`OPTION_COUNT`] distinct names remain.
    pub fn active_set(&self, filter: &RegionFilter) -> Result<ActiveSet> {
        let countries: Vec<CountryRecord> = self
            .countries
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();

        let distinct = countries
            .iter()
            .map(|c| c.name.as_str())
            .collect::<HashSet<_>>()
            .len();
        if distinct < OPTION_COUNT {
            return Err(QuizError::UnplayableRegion {
                region: filter.to_string(),
            });
        }

        Ok(ActiveSet { countries })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegionFilter {
    #[default]
    Worldwide,
    Only(String),
}

impl RegionFilter {
    /// Parses user input. "Worldwide" and "all" select every region; any other
    /// value is matched case-insensitively against the catalog's regions.
    pub fn parse(input: &str, catalog: &Catalog) -> Self {
        let input = input.trim();
        if input.is_empty()
            || input.eq_ignore_ascii_case(WORLDWIDE)
            || input.eq_ignore_ascii_case("all")
        {
            return RegionFilter::Worldwide;
        }

        let region = catalog
            .regions()
            .into_iter()
            .find(|r| r.eq_ignore_ascii_case(input))
            .unwrap_or_else(|| input.to_string());
        RegionFilter::Only(region)
    }

    pub fn matches(&self, country: &CountryRecord) -> bool {
        match self {
            RegionFilter::Worldwide => true,
            RegionFilter::Only(region) => &country.region == region,
        }
    }
}

impl fmt::Display for RegionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionFilter::Worldwide => f.write_str(WORLDWIDE),
            RegionFilter::Only(region) => f.write_str(region),
        }
    }
}

/// Region-filtered view of the catalog with at least [`OPTION_COUNT`]
/// distinct names. Only [`Catalog::active_set`] can build one.
#[derive(Debug, Clone)]
pub struct ActiveSet {
    countries: Vec<CountryRecord>,
}

impl ActiveSet {
    pub fn countries(&self) -> &[CountryRecord] {
        &self.countries
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }
}
