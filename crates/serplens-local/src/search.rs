use serde::Deserialize;
use serplens_core::{
    Error, Location, OrganicResult, Result, SearchProvider, SearchQuery, SearchResponse,
};
use std::collections::BTreeMap;
use std::time::Instant;

/// Results requested per search unless the caller asks otherwise.
pub const DEFAULT_NUM_RESULTS: usize = 30;
/// ValueSERP refuses `num` above this.
const MAX_NUM_RESULTS: usize = 100;

const DEFAULT_ENDPOINT: &str = "https://api.valueserp.com";

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

pub fn valueserp_api_key_from_env() -> Option<String> {
    std::env::var("SERPLENS_VALUESERP_API_KEY")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            std::env::var("VALUESERP_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
}

pub fn valueserp_endpoint_from_env() -> Option<String> {
    std::env::var("SERPLENS_VALUESERP_ENDPOINT")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct ValueSerpProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ValueSerpProvider {
    pub fn new(client: reqwest::Client, api_key: &str, endpoint: Option<String>) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(Error::NotConfigured(
                "missing ValueSERP API key (SERPLENS_VALUESERP_API_KEY or VALUESERP_API_KEY)"
                    .to_string(),
            ));
        }
        let endpoint = endpoint
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint,
        })
    }

    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = valueserp_api_key_from_env().unwrap_or_default();
        Self::new(client, &api_key, valueserp_endpoint_from_env())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout_ms: u64,
    ) -> Result<T> {
        let url = format!("{}{path}", self.endpoint);
        let resp = self
            .client
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            // ValueSERP explains failures in `request_info.message`.
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ValueSerpEnvelope>(&body)
                .ok()
                .and_then(|e| e.request_info)
                .and_then(|ri| ri.message);
            return Err(match (status.as_u16(), message) {
                (401, Some(m)) => Error::NotConfigured(format!("valueserp rejected api key: {m}")),
                (401, None) => Error::NotConfigured("valueserp rejected api key".to_string()),
                (_, Some(m)) => Error::Search(format!("valueserp HTTP {status}: {m}")),
                (_, None) => Error::Search(format!("valueserp HTTP {status}")),
            });
        }

        resp.json().await.map_err(|e| Error::Search(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ValueSerpEnvelope {
    request_info: Option<ValueSerpRequestInfo>,
}

#[derive(Debug, Deserialize)]
struct ValueSerpRequestInfo {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueSerpSearchResponse {
    organic_results: Option<Vec<ValueSerpOrganic>>,
}

#[derive(Debug, Deserialize)]
struct ValueSerpOrganic {
    link: Option<String>,
    title: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValueSerpLocationsResponse {
    locations: Option<Vec<ValueSerpLocation>>,
}

#[derive(Debug, Deserialize)]
struct ValueSerpLocation {
    name: Option<String>,
    full_name: Option<String>,
    country_code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn organic_from_response(parsed: ValueSerpSearchResponse) -> Vec<OrganicResult> {
    let mut out = Vec::new();
    for r in parsed.organic_results.unwrap_or_default() {
        let Some(url) = r.link.filter(|s| !s.trim().is_empty()) else {
            continue;
        };
        out.push(OrganicResult {
            url,
            title: r.title,
            snippet: r.snippet,
            rank: out.len(),
        });
    }
    out
}

fn locations_from_response(parsed: ValueSerpLocationsResponse) -> Vec<Location> {
    parsed
        .locations
        .unwrap_or_default()
        .into_iter()
        .filter_map(|l| {
            let full_name = l.full_name.filter(|s| !s.trim().is_empty())?;
            Some(Location {
                name: l.name.unwrap_or_else(|| full_name.clone()),
                full_name,
                country_code: l.country_code,
                kind: l.kind,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl SearchProvider for ValueSerpProvider {
    fn name(&self) -> &'static str {
        "valueserp"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let num = q
            .max_results
            .unwrap_or(DEFAULT_NUM_RESULTS)
            .clamp(1, MAX_NUM_RESULTS);

        let mut params = vec![("q", q.keyword.clone()), ("num", num.to_string())];
        if let Some(loc) = q.location.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("location", loc.to_string()));
        }

        tracing::debug!(keyword = %q.keyword, location = ?q.location, num, "valueserp search");
        let parsed: ValueSerpSearchResponse = self
            .get_json("/search", &params, timeout_ms_from_query(q))
            .await?;
        let mut results = organic_from_response(parsed);
        results.truncate(num);

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());

        Ok(SearchResponse {
            results,
            provider: "valueserp".to_string(),
            timings_ms,
        })
    }

    async fn locations(&self, query: &str) -> Result<Vec<Location>> {
        tracing::debug!(query, "valueserp locations");
        let parsed: ValueSerpLocationsResponse = self
            .get_json("/locations", &[("q", query.to_string())], 20_000)
            .await?;
        Ok(locations_from_response(parsed))
    }
}
