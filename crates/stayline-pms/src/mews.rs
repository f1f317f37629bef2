//! Mews connector: token-pair authenticated JSON-RPC style API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::contract::{NormalizedReservation, PmsConnector, ReservationLifecycle, SyncWindow};

const DEFAULT_API_BASE: &str = "https://api.mews.com";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MewsCustomer {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MewsReservation {
    id: String,
    state: String,
    #[serde(default)]
    customer: Option<MewsCustomer>,
    #[serde(default)]
    resource_name: Option<String>,
    #[serde(default)]
    started_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    ended_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MewsReservationList {
    #[serde(default)]
    reservations: Vec<MewsReservation>,
}

/// Connector for the Mews reservations API. Mews authenticates each call
/// with a client/access token pair in the request body, so there is no
/// bearer cache to manage.
pub struct MewsConnector {
    client_token: String,
    access_token: String,
    property_id: String,
    api_base: String,
    http: Client,
}

impl MewsConnector {
    /// `api_key` carries the pair as `client_token:access_token`.
    pub fn new(api_key: &str, property_id: &str) -> Result<Self> {
        let Some((client_token, access_token)) = api_key.split_once(':') else {
            bail!("mews credentials must be 'client_token:access_token'");
        };
        Ok(Self {
            client_token: client_token.to_string(),
            access_token: access_token.to_string(),
            property_id: property_id.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            http: Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .context("building http client")?,
        })
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::blocking::Response> {
        let mut payload = body;
        payload["ClientToken"] = json!(self.client_token);
        payload["AccessToken"] = json!(self.access_token);
        let response = self
            .http
            .post(format!("{}{path}", self.api_base))
            .json(&payload)
            .send()
            .with_context(|| format!("calling mews {path}"))?;
        if !response.status().is_success() {
            bail!("mews {path} returned {}", response.status());
        }
        Ok(response)
    }
}

fn normalize(reservation: MewsReservation) -> Option<NormalizedReservation> {
    let lifecycle = match reservation.state.as_str() {
        "Started" => ReservationLifecycle::InHouse,
        "Processed" => ReservationLifecycle::CheckedOut,
        other => {
            debug!(state = other, id = reservation.id, "skipping reservation state");
            return None;
        }
    };
    let customer = reservation.customer?;
    let phone = customer.phone?;
    Some(NormalizedReservation {
        external_reservation_id: reservation.id,
        lifecycle,
        guest_name: customer.full_name.unwrap_or_default(),
        guest_phone: phone,
        guest_email: customer.email,
        guest_language: None,
        room_label: reservation.resource_name,
        checkin: reservation.started_utc,
        checkout: reservation.ended_utc,
    })
}

impl PmsConnector for MewsConnector {
    fn name(&self) -> &'static str {
        "mews"
    }

    fn fetch_reservations(&self, window: SyncWindow) -> Result<Vec<NormalizedReservation>> {
        let response = self.post(
            "/api/connector/v1/reservations/getAll",
            json!({
                "EnterpriseIds": [self.property_id],
                "CollidingUtc": {"StartUtc": window.from, "EndUtc": window.to},
            }),
        )?;
        let listing: MewsReservationList =
            response.json().context("decoding mews reservations")?;
        Ok(listing.reservations.into_iter().filter_map(normalize).collect())
    }

    fn test_connection(&self) -> Result<()> {
        self.post("/api/connector/v1/configuration/get", json!({}))
            .map(|_| ())
    }
}
