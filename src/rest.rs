// Backend implementation over a PostgREST-style HTTP API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{
    Backend, BackendError, PackageQuery, DESTINATIONS_TABLE, ITINERARY_TABLE, PACKAGES_TABLE,
};
use crate::model::{Destination, Itinerary, NewPackage, Package, PackageChanges};

pub const ENV_API_URL: &str = "PACKAGES_API_URL";
pub const ENV_API_KEY: &str = "PACKAGES_API_KEY";
pub const ENV_API_TIMEOUT_MS: &str = "PACKAGES_API_TIMEOUT_MS";

const REST_PATH: &str = "rest/v1";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            timeout_ms: 10_000,
        }
    }
}

impl RestConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_API_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_API_URL))?;
        let api_key = lookup(ENV_API_KEY)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_API_KEY))?;

        let timeout_ms = match lookup(ENV_API_TIMEOUT_MS) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::Invalid {
                    name: ENV_API_TIMEOUT_MS,
                    value,
                })?,
            None => Self::default().timeout_ms,
        };

        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            timeout_ms,
        })
    }
}

// Error body returned by the API on non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    #[allow(dead_code)]
    code: Option<String>,
}

#[derive(Debug, Serialize)]
struct ItineraryUpdate<'a> {
    descriptions: &'a [String],
    day_count: u32,
}

pub struct RestBackend {
    client: reqwest::Client,
    config: RestConfig,
    headers: HeaderMap,
}

impl RestBackend {
    pub fn new(config: RestConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| BackendError::InvalidConfig(e.to_string()))?;

        Self::with_client(client, config)
    }

    // Custom HTTP client; the auth headers are attached to every request
    pub fn with_client(client: reqwest::Client, config: RestConfig) -> Result<Self, BackendError> {
        let headers = Self::default_headers(&config)?;
        Ok(Self {
            client,
            config,
            headers,
        })
    }

    fn default_headers(config: &RestConfig) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.api_key)
                .map_err(|_| BackendError::InvalidConfig("Invalid API key".to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|_| BackendError::InvalidConfig("Invalid API key".to_string()))?,
        );
        // Writes return the affected rows
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        Ok(headers)
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.config.base_url, REST_PATH, table)
    }

    fn eq_filter(column: &str, value: &str) -> (String, String) {
        (column.to_string(), format!("eq.{}", value))
    }

    // Query parameters for a package select
    pub fn package_query_params(query: &PackageQuery) -> Vec<(String, String)> {
        let mut params = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "created_at.desc".to_string()),
        ];
        if let Some(destination_id) = &query.destination_id {
            params.push(Self::eq_filter("destination_id", destination_id));
        }
        params
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.headers(self.headers.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&error_text)
                .ok()
                .and_then(|body| body.message)
                .unwrap_or(error_text);

            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    // Writes with `return=representation` answer with an array of affected rows
    async fn send_single<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        table: &'static str,
        key: &str,
    ) -> Result<T, BackendError> {
        let rows: Vec<T> = self.send(request).await?;
        rows.into_iter().next().ok_or_else(|| BackendError::NotFound {
            table,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn select_packages(&self, query: &PackageQuery) -> Result<Vec<Package>, BackendError> {
        let request = self
            .client
            .get(self.table_url(PACKAGES_TABLE))
            .query(&Self::package_query_params(query));
        self.send(request).await
    }

    async fn select_package(&self, id: &str) -> Result<Option<Package>, BackendError> {
        let request = self
            .client
            .get(self.table_url(PACKAGES_TABLE))
            .query(&[
                ("select".to_string(), "*".to_string()),
                Self::eq_filter("id", id),
                ("limit".to_string(), "1".to_string()),
            ]);
        let rows: Vec<Package> = self.send(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_package(&self, package: &NewPackage) -> Result<Package, BackendError> {
        let request = self
            .client
            .post(self.table_url(PACKAGES_TABLE))
            .json(&[package]);
        self.send_single(request, PACKAGES_TABLE, &package.title)
            .await
    }

    async fn update_package(
        &self,
        id: &str,
        changes: &PackageChanges,
    ) -> Result<Package, BackendError> {
        let request = self
            .client
            .patch(self.table_url(PACKAGES_TABLE))
            .query(&[Self::eq_filter("id", id)])
            .json(changes);
        self.send_single(request, PACKAGES_TABLE, id).await
    }

    async fn delete_package(&self, id: &str) -> Result<(), BackendError> {
        let request = self
            .client
            .delete(self.table_url(PACKAGES_TABLE))
            .query(&[Self::eq_filter("id", id)]);
        let _: Vec<Package> = self.send(request).await?;
        Ok(())
    }

    async fn select_itinerary(&self, package_id: &str) -> Result<Option<Itinerary>, BackendError> {
        let request = self
            .client
            .get(self.table_url(ITINERARY_TABLE))
            .query(&[
                ("select".to_string(), "*".to_string()),
                Self::eq_filter("package_id", package_id),
                ("limit".to_string(), "1".to_string()),
            ]);
        let rows: Vec<Itinerary> = self.send(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_itinerary(&self, itinerary: &Itinerary) -> Result<Itinerary, BackendError> {
        let request = self
            .client
            .post(self.table_url(ITINERARY_TABLE))
            .json(&[itinerary]);
        self.send_single(request, ITINERARY_TABLE, &itinerary.package_id)
            .await
    }

    async fn update_itinerary(
        &self,
        package_id: &str,
        descriptions: &[String],
        day_count: u32,
    ) -> Result<Itinerary, BackendError> {
        let request = self
            .client
            .patch(self.table_url(ITINERARY_TABLE))
            .query(&[Self::eq_filter("package_id", package_id)])
            .json(&ItineraryUpdate {
                descriptions,
                day_count,
            });
        self.send_single(request, ITINERARY_TABLE, package_id).await
    }

    async fn select_destinations(&self) -> Result<Vec<Destination>, BackendError> {
        let request = self
            .client
            .get(self.table_url(DESTINATIONS_TABLE))
            .query(&[("select", "id,name"), ("order", "name.asc")]);
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn package_row(id: &str, title: &str) -> Value {
        json!({
            "id": id,
            "destination_id": "d1",
            "title": title,
            "description": "Island tour",
            "duration": 3,
            "price": 499.99,
            "image_url": "https://x/y.jpg",
            "rating": 0.0,
            "created_at": "2025-06-01T10:00:00Z",
            "updated_at": "2025-06-01T10:00:00Z"
        })
    }

    fn backend_for(server: &MockServer) -> RestBackend {
        RestBackend::new(RestConfig {
            base_url: server.uri(),
            api_key: "anon".to_string(),
            timeout_ms: 2000,
        })
        .unwrap()
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_config_from_lookup() {
        let config = RestConfig::from_lookup(lookup_from(&[
            (ENV_API_URL, "https://abc.example.co/"),
            (ENV_API_KEY, " anon-key "),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://abc.example.co");
        assert_eq!(config.api_key, "anon-key");
        assert_eq!(config.timeout_ms, 10_000);
    }

    #[test]
    fn test_config_missing_and_invalid_values() {
        let missing_key = RestConfig::from_lookup(lookup_from(&[(ENV_API_URL, "https://a")]));
        assert_eq!(missing_key.unwrap_err(), ConfigError::Missing(ENV_API_KEY));

        let blank_url = RestConfig::from_lookup(lookup_from(&[
            (ENV_API_URL, "  "),
            (ENV_API_KEY, "k"),
        ]));
        assert_eq!(blank_url.unwrap_err(), ConfigError::Missing(ENV_API_URL));

        let bad_timeout = RestConfig::from_lookup(lookup_from(&[
            (ENV_API_URL, "https://a"),
            (ENV_API_KEY, "k"),
            (ENV_API_TIMEOUT_MS, "soon"),
        ]));
        assert!(matches!(
            bad_timeout,
            Err(ConfigError::Invalid { name: ENV_API_TIMEOUT_MS, .. })
        ));
    }

    #[test]
    fn test_table_url_and_query_params() {
        let backend = RestBackend::new(RestConfig {
            base_url: "https://abc.example.co".to_string(),
            api_key: "anon".to_string(),
            timeout_ms: 1000,
        })
        .unwrap();

        assert_eq!(
            backend.table_url(PACKAGES_TABLE),
            "https://abc.example.co/rest/v1/packages"
        );

        let all = RestBackend::package_query_params(&PackageQuery::all());
        assert!(all.contains(&("order".to_string(), "created_at.desc".to_string())));
        assert!(!all.iter().any(|(k, _)| k == "destination_id"));

        let filtered = RestBackend::package_query_params(&PackageQuery::for_destination("d1"));
        assert!(filtered.contains(&("destination_id".to_string(), "eq.d1".to_string())));
    }

    #[test]
    fn test_invalid_api_key_is_rejected() {
        let result = RestBackend::new(RestConfig {
            api_key: "bad\nkey".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(BackendError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_select_sends_auth_headers_and_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/packages"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer anon"))
            .and(header("prefer", "return=representation"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("destination_id", "eq.d1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([package_row("p1", "Bali")])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let packages = backend
            .select_packages(&PackageQuery::for_destination("d1"))
            .await
            .unwrap();

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].title, "Bali");
    }

    #[tokio::test]
    async fn test_insert_posts_single_row_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/packages"))
            .and(body_json(json!([{
                "destination_id": "d1",
                "title": "Bali",
                "description": "Island tour",
                "duration": 3,
                "price": 499.99,
                "image_url": "https://x/y.jpg",
                "rating": 0.0
            }])))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([package_row("p9", "Bali")])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let created = backend
            .insert_package(&NewPackage {
                destination_id: "d1".to_string(),
                title: "Bali".to_string(),
                description: "Island tour".to_string(),
                duration: 3,
                price: 499.99,
                image_url: "https://x/y.jpg".to_string(),
                rating: 0.0,
            })
            .await
            .unwrap();

        assert_eq!(created.id, "p9");
    }

    #[tokio::test]
    async fn test_update_and_delete_filter_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/packages"))
            .and(query_param("id", "eq.p1"))
            .and(body_json(json!({"title": "Renamed"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([package_row("p1", "Renamed")])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/packages"))
            .and(query_param("id", "eq.p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let changes = PackageChanges {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let updated = backend.update_package("p1", &changes).await.unwrap();
        assert_eq!(updated.title, "Renamed");

        backend.delete_package("p1").await.unwrap();
    }

    #[tokio::test]
    async fn test_select_package_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/packages"))
            .and(query_param("id", "eq.p1"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([package_row("p1", "Bali")])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/packages"))
            .and(query_param("id", "eq.missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let found = backend.select_package("p1").await.unwrap();
        assert_eq!(found.map(|p| p.title), Some("Bali".to_string()));
        assert_eq!(backend.select_package("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_results_map_to_none_and_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/package_itinerary"))
            .and(query_param("package_id", "eq.p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/package_itinerary"))
            .and(query_param("package_id", "eq.p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        assert_eq!(backend.select_itinerary("p1").await.unwrap(), None);

        let result = backend
            .update_itinerary("p1", &["Day1".to_string()], 1)
            .await;
        assert!(matches!(
            result,
            Err(BackendError::NotFound { table: ITINERARY_TABLE, .. })
        ));
    }

    #[tokio::test]
    async fn test_error_responses_use_message_or_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/packages"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"message": "column does not exist", "code": "42703"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/destinations"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let backend = backend_for(&server);

        match backend.select_packages(&PackageQuery::all()).await {
            Err(BackendError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "column does not exist");
            }
            other => panic!("Expected API error, got {:?}", other),
        }

        match backend.select_destinations().await {
            Err(BackendError::Api { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream down");
            }
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_reports_network_error() {
        let backend = RestBackend::new(RestConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "anon".to_string(),
            timeout_ms: 500,
        })
        .unwrap();

        let result = backend.select_packages(&PackageQuery::all()).await;
        assert!(matches!(result, Err(BackendError::Network(_))));
    }
}
