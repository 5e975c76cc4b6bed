use super::types::{ConstituencyInfo, DistrictInfo, Jurisdiction, LanguageGroup, PartInfo, StateInfo};
use crate::crawler::{ApiClient, ConstituencyQuery, Failure, Outcome, RetryPolicy};
use crate::layout::{write_atomic, DataLayout};
use crate::{HarvestError, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Reads a cached listing, returning `None` when it was never fetched
pub fn read_cached<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_listing<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> Outcome<Vec<T>> {
    serde_json::from_value(value)
        .map_err(|e| Failure::DelayedRetry(format!("malformed {}: {}", what, e)))
}

/// Catalog listings, fetched from the network at most once per data directory
///
/// Each level is written verbatim under `raw/` the first time it is fetched
/// and read back from disk afterwards.
#[derive(Debug, Clone)]
pub struct CatalogCache {
    api: ApiClient,
    layout: DataLayout,
    retry: RetryPolicy,
}

impl CatalogCache {
    pub fn new(api: ApiClient, layout: DataLayout, retry: RetryPolicy) -> Self {
        Self { api, layout, retry }
    }

    pub async fn states(&self) -> Result<Vec<StateInfo>> {
        let path = self.api.source().endpoints.states.clone();
        self.cached_get(self.layout.state_list_file(), &path, "state list")
            .await
    }

    pub async fn districts(&self, state_code: &str) -> Result<Vec<DistrictInfo>> {
        let path = self
            .api
            .source()
            .endpoints
            .districts
            .replace("{state}", state_code);
        self.cached_get(
            self.layout.district_list_file(state_code),
            &path,
            &format!("district list of {}", state_code),
        )
        .await
    }

    pub async fn constituencies(&self, state_code: &str) -> Result<Vec<ConstituencyInfo>> {
        let path = self
            .api
            .source()
            .endpoints
            .constituencies
            .replace("{state}", state_code);
        self.cached_get(
            self.layout.constituency_list_file(state_code),
            &path,
            &format!("constituency list of {}", state_code),
        )
        .await
    }

    /// Language codes the constituency's rolls are published in
    pub async fn languages(&self, constituency: &ConstituencyInfo) -> Result<Vec<String>> {
        let path = self.api.source().endpoints.languages.clone();
        self.cached_post(
            self.layout
                .languages_file(&constituency.state_code, constituency.number),
            &path,
            constituency,
            &format!("language list of {}", constituency.jurisdiction()),
        )
        .await
    }

    pub async fn parts(&self, constituency: &ConstituencyInfo) -> Result<Vec<PartInfo>> {
        let path = self.api.source().endpoints.parts.clone();
        self.cached_post(
            self.layout
                .parts_file(&constituency.state_code, constituency.number),
            &path,
            constituency,
            &format!("part list of {}", constituency.jurisdiction()),
        )
        .await
    }

    async fn cached_get<T: DeserializeOwned>(&self, file: PathBuf, path: &str, what: &str) -> Result<Vec<T>> {
        if let Some(items) = read_cached(&file)? {
            tracing::debug!("Using cached {}", what);
            return Ok(items);
        }

        let (body, items) = self
            .retry
            .execute(what, || async move {
                let body = self.api.get_listing(path).await?;
                let items = serde_json::from_str::<Vec<T>>(&body)
                    .map_err(|e| Failure::DelayedRetry(format!("malformed {}: {}", what, e)))?;
                Ok::<_, Failure>((body, items))
            })
            .await?
            .into_done(what)?;

        write_atomic(&file, body.as_bytes())?;
        tracing::info!("Fetched {} ({} entries)", what, items.len());
        Ok(items)
    }

    async fn cached_post<T: DeserializeOwned>(
        &self,
        file: PathBuf,
        path: &str,
        constituency: &ConstituencyInfo,
        what: &str,
    ) -> Result<Vec<T>> {
        if let Some(items) = read_cached(&file)? {
            tracing::debug!("Using cached {}", what);
            return Ok(items);
        }

        let query = &ConstituencyQuery::from(constituency);
        let (payload, items) = self
            .retry
            .execute(what, || async move {
                let payload = self.api.post_listing(path, query).await?;
                let items = parse_listing::<T>(payload.clone(), what)?;
                Ok::<_, Failure>((payload, items))
            })
            .await?
            .into_done(what)?;

        write_atomic(&file, serde_json::to_string(&payload)?.as_bytes())?;
        tracing::info!("Fetched {} ({} entries)", what, items.len());
        Ok(items)
    }
}

/// Language groups derivable from the catalog files already on disk
///
/// Levels that were never fetched are skipped; no network call is made.
pub fn cached_groups(layout: &DataLayout) -> Result<Vec<LanguageGroup>> {
    let Some(states) = read_cached::<Vec<StateInfo>>(&layout.state_list_file())? else {
        return Err(HarvestError::Catalog(format!(
            "no cached state list at {}",
            layout.state_list_file().display()
        )));
    };

    let mut groups = Vec::new();
    for state in states {
        let Some(constituencies) =
            read_cached::<Vec<ConstituencyInfo>>(&layout.constituency_list_file(&state.state_code))?
        else {
            tracing::debug!("No cached constituencies for {}", state.state_code);
            continue;
        };

        for constituency in constituencies {
            let languages = read_cached::<Vec<String>>(
                &layout.languages_file(&constituency.state_code, constituency.number),
            )?;
            let parts = read_cached::<Vec<PartInfo>>(
                &layout.parts_file(&constituency.state_code, constituency.number),
            )?;
            let (Some(languages), Some(parts)) = (languages, parts) else {
                continue;
            };

            let part_numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();
            let jurisdiction: Jurisdiction = constituency.jurisdiction();
            for language in languages {
                groups.push(LanguageGroup::new(
                    jurisdiction.clone(),
                    language,
                    part_numbers.clone(),
                ));
            }
        }
    }

    Ok(groups)
}
