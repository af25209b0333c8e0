//! Spreadsheet service client.
//!
//! [`SheetsApi`] is the handful of calls the sync needs. [`GoogleSheets`]
//! talks to the Google Sheets v4 REST API with a service account;
//! [`MemorySheets`] keeps tabs in process.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::model::SheetsConfig;

/// OAuth scope granting read/write access to spreadsheets.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Tokens are refreshed this long before they expire.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

/// Calls against one spreadsheet document.
///
/// `range` arguments use A1 notation, e.g. `'Volunteer 1 - Ada'!A1`.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Titles of all tabs in the document.
    async fn tab_titles(&self, config: &SheetsConfig) -> Result<Vec<String>>;
    /// Append an empty tab.
    async fn add_tab(&self, config: &SheetsConfig, title: &str) -> Result<()>;
    /// Remove every value in `range`.
    async fn clear(&self, config: &SheetsConfig, range: &str) -> Result<()>;
    /// Write `rows` starting at the top-left of `range`.
    async fn write(&self, config: &SheetsConfig, range: &str, rows: &[Vec<String>]) -> Result<()>;
    /// Read the values in `range`; trailing empty cells are omitted.
    async fn read(&self, config: &SheetsConfig, range: &str) -> Result<Vec<Vec<String>>>;
}

/// A1 range covering a whole tab.
#[must_use]
pub fn tab_range(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// A1 range starting at the first cell of a tab.
#[must_use]
pub fn tab_origin(title: &str) -> String {
    format!("{}!A1", tab_range(title))
}

/// Tab title named by a range built with [`tab_range`] or [`tab_origin`].
fn title_of(range: &str) -> String {
    let sheet = range.rsplit_once('!').map_or(range, |(sheet, _)| sheet);
    match sheet.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(quoted) => quoted.replace("''", "'"),
        None => sheet.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Google Sheets v4 client authenticated as a service account.
pub struct GoogleSheets {
    http: reqwest::Client,
    api_base: String,
    token_uri: String,
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl std::fmt::Debug for GoogleSheets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheets")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GoogleSheets {
    /// Client using the endpoints from `config`.
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.sheets_api_base.trim_end_matches('/').to_string(),
            token_uri: config.token_uri.clone(),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Bearer token for the service account, from cache when still fresh.
    async fn access_token(&self, config: &SheetsConfig) -> Result<String> {
        let key = config.service_account_key()?;
        let mut tokens = self.tokens.lock().await;
        if let Some(cached) = tokens.get(&key.client_email) {
            if cached.expires_at > Instant::now() + TOKEN_SLACK {
                return Ok(cached.token.clone());
            }
        }

        let token_uri = key.token_uri.as_deref().unwrap_or(&self.token_uri);
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &key.client_email,
            scope: SHEETS_SCOPE,
            aud: token_uri,
            iat: now,
            exp: now + 3600,
        };
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| Error::ServiceAccount(e.to_string()))?;
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &signing_key)?;

        let response = self
            .http
            .post(token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;
        let response = check(response).await?;
        let token: TokenResponse = response.json().await?;

        tracing::debug!(client = %key.client_email, "obtained sheets access token");
        tokens.insert(
            key.client_email.clone(),
            CachedToken {
                token: token.access_token.clone(),
                expires_at: Instant::now() + Duration::from_secs(token.expires_in),
            },
        );
        Ok(token.access_token)
    }

    fn document_url(&self, config: &SheetsConfig) -> String {
        format!(
            "{}/spreadsheets/{}",
            self.api_base,
            urlencoding::encode(&config.sheet_id)
        )
    }

    fn values_url(&self, config: &SheetsConfig, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.document_url(config),
            urlencoding::encode(range)
        )
    }
}

/// Turn a non-2xx response into [`Error::Sheets`] carrying the body text.
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Sheets(format!("{status}: {body}")))
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl SheetsApi for GoogleSheets {
    async fn tab_titles(&self, config: &SheetsConfig) -> Result<Vec<String>> {
        let token = self.access_token(config).await?;
        let response = self
            .http
            .get(self.document_url(config))
            .query(&[("fields", "sheets.properties.title")])
            .bearer_auth(token)
            .send()
            .await?;
        let meta: SpreadsheetMeta = check(response).await?.json().await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn add_tab(&self, config: &SheetsConfig, title: &str) -> Result<()> {
        let token = self.access_token(config).await?;
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });
        let response = self
            .http
            .post(format!("{}:batchUpdate", self.document_url(config)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn clear(&self, config: &SheetsConfig, range: &str) -> Result<()> {
        let token = self.access_token(config).await?;
        let response = self
            .http
            .post(format!("{}:clear", self.values_url(config, range)))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn write(&self, config: &SheetsConfig, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let token = self.access_token(config).await?;
        let response = self
            .http
            .put(self.values_url(config, range))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn read(&self, config: &SheetsConfig, range: &str) -> Result<Vec<Vec<String>>> {
        let token = self.access_token(config).await?;
        let response = self
            .http
            .get(self.values_url(config, range))
            .bearer_auth(token)
            .send()
            .await?;
        let values: ValueRange = check(response).await?.json().await?;
        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }
}

/// Tabs held in memory, keyed by sheet id then tab title.
///
/// Only whole-tab ranges are understood: a write replaces the tab contents
/// from `A1`, a read returns the whole tab.
#[derive(Debug, Default)]
pub struct MemorySheets {
    documents: Mutex<HashMap<String, BTreeMap<String, Vec<Vec<String>>>>>,
    order: Mutex<HashMap<String, Vec<String>>>,
}

impl MemorySheets {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a tab's contents directly, creating the tab if needed.
    pub async fn put_tab(&self, sheet_id: &str, title: &str, rows: Vec<Vec<String>>) {
        let mut order = self.order.lock().await;
        let titles = order.entry(sheet_id.to_string()).or_default();
        if !titles.iter().any(|t| t == title) {
            titles.push(title.to_string());
        }
        self.documents
            .lock()
            .await
            .entry(sheet_id.to_string())
            .or_default()
            .insert(title.to_string(), rows);
    }

    /// Contents of a tab, if it exists.
    pub async fn tab(&self, sheet_id: &str, title: &str) -> Option<Vec<Vec<String>>> {
        self.documents
            .lock()
            .await
            .get(sheet_id)
            .and_then(|tabs| tabs.get(title))
            .cloned()
    }

    async fn existing_tab(&self, config: &SheetsConfig, range: &str) -> Result<String> {
        let title = title_of(range);
        let documents = self.documents.lock().await;
        let exists = documents
            .get(&config.sheet_id)
            .is_some_and(|tabs| tabs.contains_key(&title));
        if exists {
            Ok(title)
        } else {
            Err(Error::Sheets(format!("400: Unable to parse range: {range}")))
        }
    }
}

#[async_trait]
impl SheetsApi for MemorySheets {
    async fn tab_titles(&self, config: &SheetsConfig) -> Result<Vec<String>> {
        Ok(self
            .order
            .lock()
            .await
            .get(&config.sheet_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_tab(&self, config: &SheetsConfig, title: &str) -> Result<()> {
        if self.tab(&config.sheet_id, title).await.is_some() {
            return Err(Error::Sheets(format!(
                "400: A sheet with the name \"{title}\" already exists"
            )));
        }
        self.put_tab(&config.sheet_id, title, Vec::new()).await;
        Ok(())
    }

    async fn clear(&self, config: &SheetsConfig, range: &str) -> Result<()> {
        let title = self.existing_tab(config, range).await?;
        self.put_tab(&config.sheet_id, &title, Vec::new()).await;
        Ok(())
    }

    async fn write(&self, config: &SheetsConfig, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let title = self.existing_tab(config, range).await?;
        self.put_tab(&config.sheet_id, &title, rows.to_vec()).await;
        Ok(())
    }

    async fn read(&self, config: &SheetsConfig, range: &str) -> Result<Vec<Vec<String>>> {
        let title = self.existing_tab(config, range).await?;
        let rows = self.tab(&config.sheet_id, &title).await.unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|mut row| {
                while row.last().is_some_and(String::is_empty) {
                    row.pop();
                }
                row
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SheetsConfig {
        SheetsConfig {
            sheet_id: "doc".into(),
            service_account: "{}".into(),
        }
    }

    #[test]
    fn test_ranges_quote_titles() {
        assert_eq!(tab_origin("Volunteer 1 - Ada"), "'Volunteer 1 - Ada'!A1");
        assert_eq!(tab_range("O'Hara"), "'O''Hara'");
        assert_eq!(title_of("'O''Hara'!A1"), "O'Hara");
        assert_eq!(title_of("Volunteers"), "Volunteers");
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(json!("a")), "a");
        assert_eq!(cell_text(json!(3)), "3");
        assert_eq!(cell_text(serde_json::Value::Null), "");
    }

    #[tokio::test]
    async fn test_memory_sheets_round_trip() {
        let sheets = MemorySheets::new();
        let cfg = config();
        sheets.add_tab(&cfg, "Volunteers").await.unwrap();
        assert!(sheets.add_tab(&cfg, "Volunteers").await.is_err());

        let rows = vec![vec!["a".to_string(), String::new()], vec![]];
        sheets.write(&cfg, &tab_origin("Volunteers"), &rows).await.unwrap();
        let read = sheets.read(&cfg, &tab_range("Volunteers")).await.unwrap();
        assert_eq!(read, vec![vec!["a".to_string()], vec![]]);

        sheets.clear(&cfg, &tab_range("Volunteers")).await.unwrap();
        assert!(sheets.read(&cfg, "Volunteers").await.unwrap().is_empty());
        assert_eq!(sheets.tab_titles(&cfg).await.unwrap(), ["Volunteers"]);
    }

    #[tokio::test]
    async fn test_memory_sheets_unknown_tab() {
        let sheets = MemorySheets::new();
        assert!(sheets.read(&config(), "'Nope'!A1").await.is_err());
    }

    #[tokio::test]
    async fn test_google_rejects_bad_key_before_network() {
        let client = GoogleSheets::new(&SyncConfig::default());
        let cfg = SheetsConfig {
            sheet_id: "doc".into(),
            service_account: r#"{"client_email":"svc@x","private_key":"not pem"}"#.into(),
        };
        assert!(matches!(
            client.tab_titles(&cfg).await,
            Err(Error::ServiceAccount(_))
        ));
    }
}
