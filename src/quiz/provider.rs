use crate::error::{QuizError, Result};
use crate::quiz::catalog::Catalog;

/// A country as the reference service returns it. Everything is optional;
/// validation happens in [`Catalog::from_raw`].
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawCountry {
    pub name: Option<RawName>,
    pub flags: Option<RawFlags>,
    pub region: Option<String>,
    pub subregion: Option<String>,
    pub capital: Option<Vec<String>>,
    pub population: Option<u64>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawName {
    pub common: Option<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RawFlags {
    pub svg: Option<String>,
    pub png: Option<String>,
}

/// Source of country records.
pub trait CountryProvider {
    async fn fetch(&self) -> Result<Vec<RawCountry>>;
}

/// Loads the catalog with a single best-effort fetch.
pub async fn load_catalog(provider: &impl CountryProvider) -> Result<Catalog> {
    let raw = provider.fetch().await?;
    Ok(Catalog::from_raw(raw))
}

/// REST Countries (https://restcountries.com) client.
pub struct RestCountries {
    client: reqwest::Client,
    url: String,
}

impl RestCountries {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

impl CountryProvider for RestCountries {
    async fn fetch(&self) -> Result<Vec<RawCountry>> {
        log::debug!("Fetching countries from {}", self.url);
        let resp = self.client.get(&self.url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(QuizError::Fetch(format!("HTTP error! status: {}", status)));
        }

        let countries: Vec<RawCountry> = resp.json().await?;
        Ok(countries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl CountryProvider for Fixed {
        async fn fetch(&self) -> Result<Vec<RawCountry>> {
            serde_json::from_str(self.0).map_err(|e| QuizError::Fetch(e.to_string()))
        }
    }

    struct Offline;

    impl CountryProvider for Offline {
        async fn fetch(&self) -> Result<Vec<RawCountry>> {
            Err(QuizError::Fetch("connection refused".to_string()))
        }
    }

    const PAYLOAD: &str = r#"[
        {
            "name": {"common": "Peru", "official": "Republic of Peru"},
            "flags": {"png": "https://flagcdn.com/w320/pe.png", "svg": "https://flagcdn.com/pe.svg"},
            "region": "Americas",
            "subregion": "South America",
            "capital": ["Lima"],
            "population": 32971846
        },
        {
            "name": {"common": "Bouvet Island"},
            "flags": {"svg": "https://flagcdn.com/bv.svg"},
            "region": "Antarctic",
            "capital": [],
            "population": 0
        },
        {
            "name": {"common": "Macau"},
            "flags": {"svg": "https://flagcdn.com/mo.svg"},
            "region": "Asia"
        }
    ]"#;

    #[tokio::test]
    async fn decodes_service_payload_and_drops_incomplete_records() {
        let catalog = load_catalog(&Fixed(PAYLOAD)).await.unwrap();

        assert_eq!(catalog.len(), 1);
        let peru = &catalog.countries()[0];
        assert_eq!(peru.name, "Peru");
        assert_eq!(peru.capital, "Lima");
        assert_eq!(peru.population, 32_971_846);
        assert_eq!(peru.subregion.as_deref(), Some("South America"));
        assert_eq!(peru.flag_raster_ref.as_deref(), Some("https://flagcdn.com/w320/pe.png"));
    }

    #[tokio::test]
    async fn fetch_errors_are_surfaced() {
        let err = load_catalog(&Offline).await.unwrap_err();
        assert!(matches!(err, QuizError::Fetch(_)));
    }
}
