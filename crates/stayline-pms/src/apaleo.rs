//! Apaleo connector: OAuth2 client-credentials plus the booking API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::contract::{NormalizedReservation, PmsConnector, ReservationLifecycle, SyncWindow};
use crate::token_cache::BearerTokenCache;

const DEFAULT_TOKEN_URL: &str = "https://identity.apaleo.com/connect/token";
const DEFAULT_API_BASE: &str = "https://api.apaleo.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApaleoGuest {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApaleoUnit {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApaleoReservation {
    id: String,
    status: String,
    #[serde(default)]
    primary_guest: Option<ApaleoGuest>,
    #[serde(default)]
    unit: Option<ApaleoUnit>,
    #[serde(default)]
    arrival: Option<DateTime<Utc>>,
    #[serde(default)]
    departure: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ReservationListResponse {
    #[serde(default)]
    reservations: Vec<ApaleoReservation>,
}

/// Connector for Apaleo's booking API. Bearer tokens come from the shared
/// [`BearerTokenCache`]; a 401 invalidates the token and retries exactly
/// once with a fresh one.
pub struct ApaleoConnector {
    tenant_id: i64,
    client_id: String,
    client_secret: String,
    property_id: String,
    token_url: String,
    api_base: String,
    http: Client,
}

impl ApaleoConnector {
    /// `api_key` carries the OAuth client as `client_id:client_secret`.
    pub fn new(tenant_id: i64, api_key: &str, property_id: &str) -> Result<Self> {
        let Some((client_id, client_secret)) = api_key.split_once(':') else {
            bail!("apaleo credentials must be 'client_id:client_secret'");
        };
        Ok(Self {
            tenant_id,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            property_id: property_id.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            http: Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .context("building http client")?,
        })
    }

    /// Points the connector at alternate endpoints (staging, local mocks).
    pub fn with_endpoints(mut self, token_url: &str, api_base: &str) -> Self {
        self.token_url = token_url.to_string();
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn bearer_token(&self) -> Result<String> {
        if let Some(token) = BearerTokenCache::global().get(self.tenant_id) {
            return Ok(token);
        }
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .context("requesting apaleo token")?;
        if !response.status().is_success() {
            bail!("apaleo token endpoint returned {}", response.status());
        }
        let token: TokenResponse = response.json().context("decoding apaleo token")?;
        debug!(
            tenant_id = self.tenant_id,
            expires_in = token.expires_in,
            "acquired apaleo bearer token"
        );
        BearerTokenCache::global().put(
            self.tenant_id,
            token.access_token.clone(),
            Duration::from_secs(token.expires_in),
        );
        Ok(token.access_token)
    }

    fn list_reservations(&self, window: SyncWindow) -> Result<ReservationListResponse> {
        let url = format!("{}/booking/v1/reservations", self.api_base);
        let from = window.from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let to = window.to.to_rfc3339_opts(SecondsFormat::Secs, true);
        let request = |token: &str| {
            self.http
                .get(&url)
                .bearer_auth(token)
                .query(&[
                    ("propertyId", self.property_id.as_str()),
                    ("from", from.as_str()),
                    ("to", to.as_str()),
                    ("status", "InHouse,CheckedOut"),
                ])
                .send()
        };

        let token = self.bearer_token()?;
        let mut response = request(&token).context("listing apaleo reservations")?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // Token revoked server-side before its advertised expiry.
            warn!(tenant_id = self.tenant_id, "apaleo rejected bearer token, retrying once");
            BearerTokenCache::global().invalidate(self.tenant_id);
            let fresh = self.bearer_token()?;
            response = request(&fresh).context("retrying apaleo reservations")?;
        }
        if !response.status().is_success() {
            bail!("apaleo reservations endpoint returned {}", response.status());
        }
        response.json().context("decoding apaleo reservations")
    }
}

fn normalize(reservation: ApaleoReservation) -> Option<NormalizedReservation> {
    let lifecycle = match reservation.status.as_str() {
        "InHouse" => ReservationLifecycle::InHouse,
        "CheckedOut" => ReservationLifecycle::CheckedOut,
        other => {
            debug!(status = other, id = reservation.id, "skipping reservation status");
            return None;
        }
    };
    let guest = reservation.primary_guest?;
    let phone = guest.phone?;
    let name = [guest.first_name, guest.last_name]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    Some(NormalizedReservation {
        external_reservation_id: reservation.id,
        lifecycle,
        guest_name: name,
        guest_phone: phone,
        guest_email: guest.email,
        guest_language: None,
        room_label: reservation.unit.map(|unit| unit.name),
        checkin: reservation.arrival,
        checkout: reservation.departure,
    })
}

impl PmsConnector for ApaleoConnector {
    fn name(&self) -> &'static str {
        "apaleo"
    }

    fn fetch_reservations(&self, window: SyncWindow) -> Result<Vec<NormalizedReservation>> {
        let listing = self.list_reservations(window)?;
        Ok(listing.reservations.into_iter().filter_map(normalize).collect())
    }

    fn test_connection(&self) -> Result<()> {
        self.bearer_token().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn mock_connector(tenant_id: i64, server: &MockServer) -> ApaleoConnector {
        ApaleoConnector::new(tenant_id, "client:secret", "PROP1")
            .expect("connector")
            .with_endpoints(&server.url("/connect/token"), &server.base_url())
    }

    #[test]
    fn functional_fetch_acquires_token_and_normalizes_reservations() {
        let server = MockServer::start();
        let token_mock = server.mock(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "tok-1", "expires_in": 3600}));
        });
        let list_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/booking/v1/reservations")
                .header("authorization", "Bearer tok-1")
                .query_param("propertyId", "PROP1");
            then.status(200).json_body(serde_json::json!({
                "reservations": [
                    {
                        "id": "R-1",
                        "status": "InHouse",
                        "primaryGuest": {
                            "firstName": "Ana",
                            "lastName": "Pop",
                            "phone": "+40721000111",
                            "email": "ana@example.com"
                        },
                        "unit": {"name": "101"},
                        "arrival": "2026-08-22T14:00:00Z",
                        "departure": "2026-08-25T11:00:00Z"
                    },
                    {"id": "R-2", "status": "Canceled"}
                ]
            }));
        });

        let connector = mock_connector(9001, &server);
        let reservations = connector
            .fetch_reservations(SyncWindow::around(Utc::now()))
            .expect("fetch");
        token_mock.assert();
        list_mock.assert();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].external_reservation_id, "R-1");
        assert_eq!(reservations[0].guest_name, "Ana Pop");
        assert_eq!(reservations[0].room_label.as_deref(), Some("101"));
    }

    #[test]
    fn functional_unauthorized_response_retries_once_with_fresh_token() {
        let server = MockServer::start();
        // Seed a token the API will reject.
        BearerTokenCache::global().put(
            9002,
            "stale".to_string(),
            Duration::from_secs(3600),
        );
        let token_mock = server.mock(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200)
                .json_body(serde_json::json!({"access_token": "fresh", "expires_in": 3600}));
        });
        let stale_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/booking/v1/reservations")
                .header("authorization", "Bearer stale");
            then.status(401);
        });
        let fresh_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/booking/v1/reservations")
                .header("authorization", "Bearer fresh");
            then.status(200).json_body(serde_json::json!({"reservations": []}));
        });

        let connector = mock_connector(9002, &server);
        let reservations = connector
            .fetch_reservations(SyncWindow::around(Utc::now()))
            .expect("fetch");
        assert!(reservations.is_empty());
        stale_mock.assert();
        token_mock.assert();
        fresh_mock.assert();
    }
}
