//! Cloudbeds connector: refresh-token OAuth plus the myfrontdesk API.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::contract::{NormalizedReservation, PmsConnector, ReservationLifecycle, SyncWindow};
use crate::token_cache::BearerTokenCache;

const DEFAULT_API_BASE: &str = "https://hotels.cloudbeds.com/api/v1.1";
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Every Cloudbeds endpoint wraps its payload in `{success, data}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudbedsRoom {
    #[serde(default)]
    room_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudbedsReservation {
    #[serde(rename = "reservationID")]
    reservation_id: String,
    status: String,
    #[serde(rename = "guestID", default)]
    guest_id: Option<String>,
    #[serde(default)]
    guest_name: Option<String>,
    #[serde(default)]
    rooms: Vec<CloudbedsRoom>,
    #[serde(default)]
    assigned: Vec<CloudbedsRoom>,
    #[serde(default)]
    start_date: Option<NaiveDate>,
    #[serde(default)]
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudbedsGuest {
    #[serde(default)]
    cell_phone: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Connector for the Cloudbeds API. Access tokens come from a long-lived
/// refresh token and live in the shared [`BearerTokenCache`]; a 401
/// invalidates the token and retries exactly once with a fresh one.
pub struct CloudbedsConnector {
    tenant_id: i64,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    property_id: String,
    api_base: String,
    http: Client,
}

impl CloudbedsConnector {
    /// `api_key` carries the OAuth app and its refresh token as
    /// `client_id:client_secret:refresh_token`.
    pub fn new(tenant_id: i64, api_key: &str, property_id: &str) -> Result<Self> {
        let mut parts = api_key.splitn(3, ':');
        let (Some(client_id), Some(client_secret), Some(refresh_token)) =
            (parts.next(), parts.next(), parts.next())
        else {
            bail!("cloudbeds credentials must be 'client_id:client_secret:refresh_token'");
        };
        Ok(Self {
            tenant_id,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
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

    fn bearer_token(&self) -> Result<String> {
        if let Some(token) = BearerTokenCache::global().get(self.tenant_id) {
            return Ok(token);
        }
        let response = self
            .http
            .post(format!("{}/access_token", self.api_base))
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .context("requesting cloudbeds token")?;
        if !response.status().is_success() {
            bail!("cloudbeds token endpoint returned {}", response.status());
        }
        let token: TokenResponse = response.json().context("decoding cloudbeds token")?;
        debug!(
            tenant_id = self.tenant_id,
            expires_in = token.expires_in,
            "acquired cloudbeds bearer token"
        );
        BearerTokenCache::global().put(
            self.tenant_id,
            token.access_token.clone(),
            Duration::from_secs(token.expires_in),
        );
        Ok(token.access_token)
    }

    fn get_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = format!("{}{path}", self.api_base);
        let request = |token: &str| self.http.get(&url).bearer_auth(token).query(query).send();

        let token = self.bearer_token()?;
        let mut response = request(&token).with_context(|| format!("calling cloudbeds {path}"))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(tenant_id = self.tenant_id, "cloudbeds rejected bearer token, retrying once");
            BearerTokenCache::global().invalidate(self.tenant_id);
            let fresh = self.bearer_token()?;
            response = request(&fresh).with_context(|| format!("retrying cloudbeds {path}"))?;
        }
        if !response.status().is_success() {
            bail!("cloudbeds {path} returned {}", response.status());
        }
        let envelope: Envelope<T> = response
            .json()
            .with_context(|| format!("decoding cloudbeds {path}"))?;
        if !envelope.success {
            bail!("cloudbeds {path} reported failure");
        }
        Ok(envelope.data)
    }

    fn guest_detail(&self, guest_id: &str) -> Result<Option<CloudbedsGuest>> {
        self.get_data(
            "/getGuest",
            &[
                ("propertyID", self.property_id.clone()),
                ("guestID", guest_id.to_string()),
            ],
        )
    }
}

fn lifecycle_for(status: &str) -> Option<ReservationLifecycle> {
    match status {
        "checked_in" => Some(ReservationLifecycle::InHouse),
        "checked_out" => Some(ReservationLifecycle::CheckedOut),
        _ => None,
    }
}

/// Cloudbeds reports missing phone fields as empty strings or the literal
/// "N/A"; the cell number wins over the landline.
fn usable_phone(guest: &CloudbedsGuest) -> Option<String> {
    [guest.cell_phone.as_deref(), guest.phone.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|phone| !phone.is_empty() && !phone.eq_ignore_ascii_case("n/a"))
        .map(str::to_string)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn normalize(
    reservation: CloudbedsReservation,
    lifecycle: ReservationLifecycle,
    guest: CloudbedsGuest,
) -> Option<NormalizedReservation> {
    let phone = usable_phone(&guest)?;
    // The booked room list is authoritative; `assigned` covers properties
    // that only fill room assignments at the desk.
    let room_label = reservation
        .rooms
        .into_iter()
        .chain(reservation.assigned)
        .find_map(|room| room.room_name);
    Some(NormalizedReservation {
        external_reservation_id: reservation.reservation_id,
        lifecycle,
        guest_name: reservation.guest_name.unwrap_or_default(),
        guest_phone: phone,
        guest_email: guest.email,
        guest_language: Some("en".to_string()),
        room_label,
        checkin: reservation.start_date.map(start_of_day),
        checkout: reservation.end_date.map(start_of_day),
    })
}

impl PmsConnector for CloudbedsConnector {
    fn name(&self) -> &'static str {
        "cloudbeds"
    }

    fn fetch_reservations(&self, window: SyncWindow) -> Result<Vec<NormalizedReservation>> {
        let listing: Vec<CloudbedsReservation> = self
            .get_data(
                "/getReservations",
                &[
                    ("propertyID", self.property_id.clone()),
                    ("modifiedSince", window.from.format("%Y-%m-%d").to_string()),
                    ("includeGuestInfo", "true".to_string()),
                ],
            )?
            .unwrap_or_default();
        let mut reservations = Vec::new();
        for reservation in listing {
            let Some(lifecycle) = lifecycle_for(&reservation.status) else {
                debug!(
                    status = reservation.status,
                    id = reservation.reservation_id,
                    "skipping reservation status"
                );
                continue;
            };
            // Phone and email live on the guest record, not the listing.
            let guest = match reservation.guest_id.as_deref() {
                Some(guest_id) => self.guest_detail(guest_id)?.unwrap_or_default(),
                None => CloudbedsGuest::default(),
            };
            if let Some(normalized) = normalize(reservation, lifecycle, guest) {
                reservations.push(normalized);
            }
        }
        Ok(reservations)
    }

    fn test_connection(&self) -> Result<()> {
        let _: Option<serde_json::Value> = self.get_data(
            "/getHotelDetails",
            &[("propertyID", self.property_id.clone())],
        )?;
        Ok(())
    }
}
