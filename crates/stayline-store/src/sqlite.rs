//! SQLite-backed persistence with per-operation connections.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::model::*;
use crate::{StoreError, StoreResult};

/// Maximum registered room-code tokens per tenant.
const ROOM_CODE_TOKEN_CAP: usize = 500;
/// How many of the oldest tokens are evicted when the cap is hit.
const ROOM_CODE_TOKEN_EVICTION_BATCH: usize = 50;
/// Bounded attempts when generating a fresh unique token.
const ROOM_CODE_TOKEN_ATTEMPTS: usize = 32;

const TENANT_COLUMNS: &str = "tenant_id, name, active, country_code, pms_kind, pms_api_key, \
     pms_property_id, webhook_secret, settings_json, created_at";
const GUEST_COLUMNS: &str =
    "guest_id, tenant_id, identifier_hash, channel_user_id, preferred_language, created_at";
const ROOM_COLUMNS: &str = "room_id, tenant_id, label, active";
const STAY_COLUMNS: &str = "stay_id, tenant_id, guest_id, room_id, checkin, checkout, status, \
     opted_out, external_reservation_id, created_at, updated_at";
const CONVERSATION_COLUMNS: &str = "conversation_id, tenant_id, guest_id, stay_id, room_id, \
     channel, status, handler, last_link_scan_at, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "message_id, conversation_id, sender, direction, text, provider_message_id, created_at";
const JOURNEY_COLUMNS: &str =
    "journey_id, tenant_id, trigger_kind, delay_minutes, active, template_text";
const JOURNEY_EVENT_COLUMNS: &str =
    "event_id, tenant_id, journey_id, guest_id, stay_id, run_at, status, created_at";
const TASK_COLUMNS: &str =
    "task_id, tenant_id, stay_id, task_type, status, summary, priority, created_at";

/// Authoritative store for all Stayline state.
///
/// Holds only the database path; every operation opens its own connection so
/// concurrently dispatched worker jobs never contend on shared handles.
#[derive(Debug, Clone)]
pub struct StayStore {
    db_path: PathBuf,
}

impl StayStore {
    /// Opens (and if needed creates) the store at `path`.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                tenant_id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                country_code TEXT NOT NULL,
                pms_kind TEXT NULL,
                pms_api_key TEXT NULL,
                pms_property_id TEXT NULL,
                webhook_secret TEXT NULL,
                settings_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS guests (
                guest_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL REFERENCES tenants(tenant_id),
                identifier_hash TEXT NOT NULL,
                channel_user_id TEXT NULL,
                preferred_language TEXT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (tenant_id, identifier_hash),
                UNIQUE (tenant_id, channel_user_id)
            );

            CREATE TABLE IF NOT EXISTS guest_contacts (
                guest_id INTEGER PRIMARY KEY REFERENCES guests(guest_id),
                full_name TEXT NULL,
                phone TEXT NULL,
                email TEXT NULL
            );

            CREATE TABLE IF NOT EXISTS rooms (
                room_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL REFERENCES tenants(tenant_id),
                label TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                UNIQUE (tenant_id, label)
            );

            CREATE TABLE IF NOT EXISTS stays (
                stay_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL REFERENCES tenants(tenant_id),
                guest_id INTEGER NOT NULL REFERENCES guests(guest_id),
                room_id INTEGER NULL REFERENCES rooms(room_id),
                checkin TEXT NULL,
                checkout TEXT NULL,
                status TEXT NOT NULL,
                opted_out INTEGER NOT NULL DEFAULT 0,
                external_reservation_id TEXT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_stays_guest_status ON stays (guest_id, status);
            CREATE INDEX IF NOT EXISTS idx_stays_room_status ON stays (room_id, status);
            CREATE INDEX IF NOT EXISTS idx_stays_reservation
                ON stays (tenant_id, external_reservation_id);

            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL REFERENCES tenants(tenant_id),
                guest_id INTEGER NOT NULL REFERENCES guests(guest_id),
                stay_id INTEGER NULL REFERENCES stays(stay_id),
                room_id INTEGER NULL REFERENCES rooms(room_id),
                channel TEXT NOT NULL,
                status TEXT NOT NULL,
                handler TEXT NOT NULL,
                last_link_scan_at TEXT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_lookup
                ON conversations (tenant_id, guest_id, channel, status);

            CREATE TABLE IF NOT EXISTS messages (
                message_id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL REFERENCES conversations(conversation_id),
                sender TEXT NOT NULL,
                direction TEXT NOT NULL,
                text TEXT NOT NULL,
                provider_message_id TEXT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages (conversation_id, direction, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_provider ON messages (provider_message_id);

            CREATE TABLE IF NOT EXISTS journeys (
                journey_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL REFERENCES tenants(tenant_id),
                trigger_kind TEXT NOT NULL,
                delay_minutes INTEGER,
                active INTEGER NOT NULL DEFAULT 1,
                template_text TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS journey_events (
                event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL REFERENCES tenants(tenant_id),
                journey_id INTEGER NOT NULL REFERENCES journeys(journey_id),
                guest_id INTEGER NOT NULL REFERENCES guests(guest_id),
                stay_id INTEGER NOT NULL REFERENCES stays(stay_id),
                run_at TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_journey_events_due ON journey_events (status, run_at);
            CREATE INDEX IF NOT EXISTS idx_journey_events_stay
                ON journey_events (journey_id, stay_id, status);

            CREATE TABLE IF NOT EXISTS tasks (
                task_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_id INTEGER NOT NULL REFERENCES tenants(tenant_id),
                stay_id INTEGER NULL REFERENCES stays(stay_id),
                task_type TEXT NOT NULL,
                status TEXT NOT NULL,
                summary TEXT NOT NULL,
                priority TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_dedup
                ON tasks (tenant_id, task_type, created_at);

            CREATE TABLE IF NOT EXISTS room_code_tokens (
                tenant_id INTEGER NOT NULL REFERENCES tenants(tenant_id),
                token TEXT NOT NULL,
                room_label TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, token)
            );
            "#,
        )?;
        Ok(())
    }

    // ----- tenants -----

    pub fn create_tenant(&self, new: NewTenant) -> StoreResult<Tenant> {
        let connection = self.open_connection()?;
        let settings = new.settings.unwrap_or_default().normalized();
        connection.execute(
            r#"
            INSERT INTO tenants (
                name, active, country_code, pms_kind, pms_api_key, pms_property_id,
                webhook_secret, settings_json, created_at
            ) VALUES (?1, 1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                new.name,
                new.country_code,
                new.pms_kind.map(PmsKind::as_str),
                new.pms_api_key,
                new.pms_property_id,
                new.webhook_secret,
                serde_json::to_string(&settings)?,
                timestamp_to_db(Utc::now()),
            ],
        )?;
        let tenant_id = connection.last_insert_rowid();
        self.get_tenant(tenant_id)?
            .ok_or(StoreError::TenantNotFound(tenant_id))
    }

    pub fn get_tenant(&self, tenant_id: i64) -> StoreResult<Option<Tenant>> {
        let connection = self.open_connection()?;
        let tenant = connection
            .query_row(
                &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE tenant_id = ?1"),
                params![tenant_id],
                tenant_from_row,
            )
            .optional()?;
        Ok(tenant)
    }

    pub fn list_active_tenants(&self) -> StoreResult<Vec<Tenant>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE active = 1 ORDER BY tenant_id"
        ))?;
        let tenants = statement
            .query_map([], tenant_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tenants)
    }

    /// Active tenants carrying usable PMS credentials.
    pub fn list_pms_tenants(&self) -> StoreResult<Vec<Tenant>> {
        Ok(self
            .list_active_tenants()?
            .into_iter()
            .filter(Tenant::has_pms)
            .collect())
    }

    // ----- guests -----

    /// Race-tolerant get-or-create keyed by (tenant, identifier hash).
    /// Returns the guest and whether this call created it.
    pub fn get_or_create_guest(
        &self,
        tenant_id: i64,
        identifier_hash: &str,
    ) -> StoreResult<(Guest, bool)> {
        let connection = self.open_connection()?;
        let inserted = connection.execute(
            r#"
            INSERT INTO guests (tenant_id, identifier_hash, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (tenant_id, identifier_hash) DO NOTHING
            "#,
            params![tenant_id, identifier_hash, timestamp_to_db(Utc::now())],
        )?;
        let guest = connection.query_row(
            &format!(
                "SELECT {GUEST_COLUMNS} FROM guests \
                 WHERE tenant_id = ?1 AND identifier_hash = ?2"
            ),
            params![tenant_id, identifier_hash],
            guest_from_row,
        )?;
        Ok((guest, inserted == 1))
    }

    pub fn get_guest(&self, guest_id: i64) -> StoreResult<Option<Guest>> {
        let connection = self.open_connection()?;
        let guest = connection
            .query_row(
                &format!("SELECT {GUEST_COLUMNS} FROM guests WHERE guest_id = ?1"),
                params![guest_id],
                guest_from_row,
            )
            .optional()?;
        Ok(guest)
    }

    /// Finds a guest in one tenant matching any of the identifier hashes.
    pub fn find_guest_by_hashes(
        &self,
        tenant_id: i64,
        hashes: &[String],
    ) -> StoreResult<Option<Guest>> {
        if hashes.is_empty() {
            return Ok(None);
        }
        let connection = self.open_connection()?;
        let sql = format!(
            "SELECT {GUEST_COLUMNS} FROM guests \
             WHERE tenant_id = ?1 AND identifier_hash IN ({}) LIMIT 1",
            placeholders(hashes.len(), 2)
        );
        let mut values: Vec<rusqlite::types::Value> = vec![tenant_id.into()];
        values.extend(hashes.iter().map(|hash| hash.clone().into()));
        let guest = connection
            .query_row(&sql, params_from_iter(values), guest_from_row)
            .optional()?;
        Ok(guest)
    }

    pub fn find_guest_by_channel_user(
        &self,
        tenant_id: i64,
        channel_user_id: &str,
    ) -> StoreResult<Option<Guest>> {
        let connection = self.open_connection()?;
        let guest = connection
            .query_row(
                &format!(
                    "SELECT {GUEST_COLUMNS} FROM guests \
                     WHERE tenant_id = ?1 AND channel_user_id = ?2"
                ),
                params![tenant_id, channel_user_id],
                guest_from_row,
            )
            .optional()?;
        Ok(guest)
    }

    /// Global discovery across all tenants: the guest with a matching hash
    /// and an IN_HOUSE stay, most recent check-in first.
    pub fn find_in_house_guest_globally(
        &self,
        hashes: &[String],
    ) -> StoreResult<Option<(Guest, Tenant, Stay)>> {
        if hashes.is_empty() {
            return Ok(None);
        }
        let connection = self.open_connection()?;
        let sql = format!(
            "SELECT s.stay_id FROM stays s \
             JOIN guests g ON g.guest_id = s.guest_id \
             WHERE s.status = 'in_house' AND g.identifier_hash IN ({}) \
             ORDER BY s.checkin DESC LIMIT 1",
            placeholders(hashes.len(), 1)
        );
        let values: Vec<rusqlite::types::Value> =
            hashes.iter().map(|hash| hash.clone().into()).collect();
        let stay_id: Option<i64> = connection
            .query_row(&sql, params_from_iter(values), |row| row.get(0))
            .optional()?;
        drop(connection);
        let Some(stay_id) = stay_id else {
            return Ok(None);
        };
        let Some(stay) = self.get_stay(stay_id)? else {
            return Ok(None);
        };
        let guest = self
            .get_guest(stay.guest_id)?
            .ok_or(StoreError::GuestNotFound(stay.guest_id))?;
        let tenant = self
            .get_tenant(stay.tenant_id)?
            .ok_or(StoreError::TenantNotFound(stay.tenant_id))?;
        Ok(Some((guest, tenant, stay)))
    }

    /// Commits an opaque channel-user link after a confirmed exchange.
    pub fn link_channel_user(&self, guest_id: i64, channel_user_id: &str) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let tx = connection.transaction()?;
        // A channel user can only ever point at one guest per tenant.
        tx.execute(
            "UPDATE guests SET channel_user_id = NULL \
             WHERE channel_user_id = ?2 AND guest_id <> ?1 \
               AND tenant_id = (SELECT tenant_id FROM guests WHERE guest_id = ?1)",
            params![guest_id, channel_user_id],
        )?;
        tx.execute(
            "UPDATE guests SET channel_user_id = ?2 WHERE guest_id = ?1",
            params![guest_id, channel_user_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn set_preferred_language_if_unset(
        &self,
        guest_id: i64,
        language: &str,
    ) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "UPDATE guests SET preferred_language = ?2 \
             WHERE guest_id = ?1 AND preferred_language IS NULL",
            params![guest_id, language],
        )?;
        Ok(())
    }

    /// Guests are never deleted; anonymization strips contact details and
    /// the channel link while keeping the hashed identity row.
    pub fn anonymize_guest(&self, guest_id: i64) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "DELETE FROM guest_contacts WHERE guest_id = ?1",
            params![guest_id],
        )?;
        connection.execute(
            "UPDATE guests SET channel_user_id = NULL, preferred_language = NULL \
             WHERE guest_id = ?1",
            params![guest_id],
        )?;
        Ok(())
    }

    // ----- guest contact details -----

    pub fn get_contact(&self, guest_id: i64) -> StoreResult<Option<GuestContact>> {
        let connection = self.open_connection()?;
        let contact = connection
            .query_row(
                "SELECT guest_id, full_name, phone, email FROM guest_contacts \
                 WHERE guest_id = ?1",
                params![guest_id],
                |row| {
                    Ok(GuestContact {
                        guest_id: row.get(0)?,
                        full_name: row.get(1)?,
                        phone: row.get(2)?,
                        email: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(contact)
    }

    /// Channel-first-contact hint: stores the phone once, never overwriting
    /// an already-populated value.
    pub fn ensure_contact_phone(&self, guest_id: i64, phone: &str) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO guest_contacts (guest_id, phone) VALUES (?1, ?2)
            ON CONFLICT (guest_id)
            DO UPDATE SET phone = COALESCE(guest_contacts.phone, excluded.phone)
            "#,
            params![guest_id, phone],
        )?;
        Ok(())
    }

    /// Display-name hint from a channel profile; populate-once like the
    /// phone hint.
    pub fn ensure_contact_name(&self, guest_id: i64, full_name: &str) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO guest_contacts (guest_id, full_name) VALUES (?1, ?2)
            ON CONFLICT (guest_id)
            DO UPDATE SET full_name = COALESCE(guest_contacts.full_name, excluded.full_name)
            "#,
            params![guest_id, full_name],
        )?;
        Ok(())
    }

    /// PMS data is authoritative: name and phone always overwrite, email
    /// overwrites when the PMS supplied one.
    pub fn upsert_contact_from_pms(
        &self,
        guest_id: i64,
        full_name: &str,
        phone: &str,
        email: Option<&str>,
    ) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO guest_contacts (guest_id, full_name, phone, email)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (guest_id) DO UPDATE SET
                full_name = excluded.full_name,
                phone = excluded.phone,
                email = COALESCE(excluded.email, guest_contacts.email)
            "#,
            params![guest_id, full_name, phone, email],
        )?;
        Ok(())
    }

    // ----- rooms -----

    /// Race-tolerant get-or-create keyed by (tenant, label).
    pub fn get_or_create_room(&self, tenant_id: i64, label: &str) -> StoreResult<Room> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO rooms (tenant_id, label) VALUES (?1, ?2)
            ON CONFLICT (tenant_id, label) DO NOTHING
            "#,
            params![tenant_id, label],
        )?;
        let room = connection.query_row(
            &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE tenant_id = ?1 AND label = ?2"),
            params![tenant_id, label],
            room_from_row,
        )?;
        Ok(room)
    }

    pub fn get_room(&self, room_id: i64) -> StoreResult<Option<Room>> {
        let connection = self.open_connection()?;
        let room = connection
            .query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE room_id = ?1"),
                params![room_id],
                room_from_row,
            )
            .optional()?;
        Ok(room)
    }

    // ----- stays -----

    pub fn insert_stay(&self, new: NewStay) -> StoreResult<Stay> {
        let connection = self.open_connection()?;
        let now = timestamp_to_db(Utc::now());
        connection.execute(
            r#"
            INSERT INTO stays (
                tenant_id, guest_id, room_id, checkin, checkout, status,
                external_reservation_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
            params![
                new.tenant_id,
                new.guest_id,
                new.room_id,
                new.checkin.map(timestamp_to_db),
                new.checkout.map(timestamp_to_db),
                new.status.as_str(),
                new.external_reservation_id,
                now,
            ],
        )?;
        let stay_id = connection.last_insert_rowid();
        drop(connection);
        self.get_stay(stay_id)?
            .ok_or_else(|| StoreError::InvalidPersistedValue {
                field: "stay_id",
                value: stay_id.to_string(),
            })
    }

    pub fn get_stay(&self, stay_id: i64) -> StoreResult<Option<Stay>> {
        let connection = self.open_connection()?;
        let stay = connection
            .query_row(
                &format!("SELECT {STAY_COLUMNS} FROM stays WHERE stay_id = ?1"),
                params![stay_id],
                stay_from_row,
            )
            .optional()?;
        Ok(stay)
    }

    pub fn find_stay_by_reservation(
        &self,
        tenant_id: i64,
        external_reservation_id: &str,
    ) -> StoreResult<Option<Stay>> {
        let connection = self.open_connection()?;
        let stay = connection
            .query_row(
                &format!(
                    "SELECT {STAY_COLUMNS} FROM stays \
                     WHERE tenant_id = ?1 AND external_reservation_id = ?2 LIMIT 1"
                ),
                params![tenant_id, external_reservation_id],
                stay_from_row,
            )
            .optional()?;
        Ok(stay)
    }

    pub fn find_in_house_stay_by_reservation(
        &self,
        tenant_id: i64,
        external_reservation_id: &str,
    ) -> StoreResult<Option<Stay>> {
        let connection = self.open_connection()?;
        let stay = connection
            .query_row(
                &format!(
                    "SELECT {STAY_COLUMNS} FROM stays \
                     WHERE tenant_id = ?1 AND external_reservation_id = ?2 \
                       AND status = 'in_house' LIMIT 1"
                ),
                params![tenant_id, external_reservation_id],
                stay_from_row,
            )
            .optional()?;
        Ok(stay)
    }

    /// Re-applies an in_house reservation onto an existing stay: refreshed
    /// room/dates and forced IN_HOUSE status. Idempotent by design.
    pub fn update_stay_for_checkin(
        &self,
        stay_id: i64,
        room_id: Option<i64>,
        checkin: Option<DateTime<Utc>>,
        checkout: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            UPDATE stays SET room_id = ?2, checkin = ?3, checkout = ?4,
                status = 'in_house', updated_at = ?5
            WHERE stay_id = ?1
            "#,
            params![
                stay_id,
                room_id,
                checkin.map(timestamp_to_db),
                checkout.map(timestamp_to_db),
                timestamp_to_db(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn set_stay_status(&self, stay_id: i64, status: StayStatus) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "UPDATE stays SET status = ?2, updated_at = ?3 WHERE stay_id = ?1",
            params![stay_id, status.as_str(), timestamp_to_db(Utc::now())],
        )?;
        Ok(())
    }

    pub fn set_stay_opt_out(&self, stay_id: i64, opted_out: bool) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "UPDATE stays SET opted_out = ?2, updated_at = ?3 WHERE stay_id = ?1",
            params![stay_id, opted_out, timestamp_to_db(Utc::now())],
        )?;
        Ok(())
    }

    /// Closes the guest's lingering IN_HOUSE stays (missed checkout events).
    pub fn close_in_house_stays_for_guest(&self, guest_id: i64) -> StoreResult<usize> {
        let connection = self.open_connection()?;
        let closed = connection.execute(
            "UPDATE stays SET status = 'post_stay', updated_at = ?2 \
             WHERE guest_id = ?1 AND status = 'in_house'",
            params![guest_id, timestamp_to_db(Utc::now())],
        )?;
        Ok(closed)
    }

    /// Room turnover: closes any other guest's IN_HOUSE stay in this room.
    pub fn close_in_house_stays_for_room(
        &self,
        room_id: i64,
        except_guest_id: i64,
    ) -> StoreResult<usize> {
        let connection = self.open_connection()?;
        let closed = connection.execute(
            "UPDATE stays SET status = 'post_stay', updated_at = ?3 \
             WHERE room_id = ?1 AND status = 'in_house' AND guest_id != ?2",
            params![room_id, except_guest_id, timestamp_to_db(Utc::now())],
        )?;
        Ok(closed)
    }

    /// Most recent stay for a guest, newest check-in first.
    pub fn latest_stay_for_guest(&self, guest_id: i64) -> StoreResult<Option<Stay>> {
        let connection = self.open_connection()?;
        let stay = connection
            .query_row(
                &format!(
                    "SELECT {STAY_COLUMNS} FROM stays WHERE guest_id = ?1 \
                     ORDER BY checkin DESC, stay_id DESC LIMIT 1"
                ),
                params![guest_id],
                stay_from_row,
            )
            .optional()?;
        Ok(stay)
    }

    pub fn in_house_stay_for_guest(&self, guest_id: i64) -> StoreResult<Option<Stay>> {
        let connection = self.open_connection()?;
        let stay = connection
            .query_row(
                &format!(
                    "SELECT {STAY_COLUMNS} FROM stays \
                     WHERE guest_id = ?1 AND status = 'in_house' \
                     ORDER BY checkin DESC, stay_id DESC LIMIT 1"
                ),
                params![guest_id],
                stay_from_row,
            )
            .optional()?;
        Ok(stay)
    }

    /// IN_HOUSE stay for a room label within one tenant, for room-scan
    /// linking against PMS-backed occupancy.
    pub fn find_in_house_stay_for_room_label(
        &self,
        tenant_id: i64,
        label: &str,
    ) -> StoreResult<Option<Stay>> {
        let connection = self.open_connection()?;
        let stay_id: Option<i64> = connection
            .query_row(
                "SELECT s.stay_id FROM stays s \
                 JOIN rooms r ON r.room_id = s.room_id \
                 WHERE s.tenant_id = ?1 AND r.label = ?2 AND s.status = 'in_house' \
                 ORDER BY s.checkin DESC LIMIT 1",
                params![tenant_id, label],
                |row| row.get(0),
            )
            .optional()?;
        drop(connection);
        match stay_id {
            Some(stay_id) => self.get_stay(stay_id),
            None => Ok(None),
        }
    }

    /// Safety-net sweep: force-closes IN_HOUSE stays whose checkout already
    /// passed. Returns the stays that were closed.
    pub fn close_expired_stays(&self, now: DateTime<Utc>) -> StoreResult<Vec<Stay>> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let expired = {
            let mut statement = transaction.prepare(&format!(
                "SELECT {STAY_COLUMNS} FROM stays \
                 WHERE status = 'in_house' AND checkout IS NOT NULL AND checkout < ?1"
            ))?;
            let rows = statement
                .query_map(params![timestamp_to_db(now)], stay_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        for stay in &expired {
            transaction.execute(
                "UPDATE stays SET status = 'post_stay', updated_at = ?2 WHERE stay_id = ?1",
                params![stay.id, timestamp_to_db(now)],
            )?;
        }
        transaction.commit()?;
        Ok(expired)
    }

    // ----- conversations -----

    /// Latest OPEN conversation for (tenant, guest, channel), created when
    /// absent. When the guest's active stay differs from the stored one the
    /// conversation is repointed rather than duplicated.
    pub fn open_conversation(
        &self,
        tenant_id: i64,
        guest_id: i64,
        channel: Channel,
        active_stay: Option<&Stay>,
    ) -> StoreResult<Conversation> {
        let existing = self.find_open_conversation(tenant_id, guest_id, channel)?;
        let Some(conversation) = existing else {
            let connection = self.open_connection()?;
            let now = timestamp_to_db(Utc::now());
            connection.execute(
                r#"
                INSERT INTO conversations (
                    tenant_id, guest_id, stay_id, room_id, channel, status, handler,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, 'open', 'bot', ?6, ?6)
                "#,
                params![
                    tenant_id,
                    guest_id,
                    active_stay.map(|stay| stay.id),
                    active_stay.and_then(|stay| stay.room_id),
                    channel.as_str(),
                    now,
                ],
            )?;
            drop(connection);
            // Soft uniqueness: a concurrent create may have won; the latest
            // open row is authoritative either way.
            return self
                .find_open_conversation(tenant_id, guest_id, channel)?
                .ok_or(StoreError::ConversationNotFound(0));
        };
        if let Some(stay) = active_stay {
            if conversation.stay_id != Some(stay.id) {
                let connection = self.open_connection()?;
                connection.execute(
                    "UPDATE conversations SET stay_id = ?2, \
                     room_id = COALESCE(?3, room_id), updated_at = ?4 \
                     WHERE conversation_id = ?1",
                    params![
                        conversation.id,
                        stay.id,
                        stay.room_id,
                        timestamp_to_db(Utc::now())
                    ],
                )?;
                debug!(
                    conversation_id = conversation.id,
                    stay_id = stay.id,
                    "repointed conversation to new stay"
                );
                drop(connection);
                return self
                    .get_conversation(conversation.id)?
                    .ok_or(StoreError::ConversationNotFound(conversation.id));
            }
        }
        Ok(conversation)
    }

    pub fn find_open_conversation(
        &self,
        tenant_id: i64,
        guest_id: i64,
        channel: Channel,
    ) -> StoreResult<Option<Conversation>> {
        let connection = self.open_connection()?;
        let conversation = connection
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE tenant_id = ?1 AND guest_id = ?2 AND channel = ?3 \
                       AND status = 'open' \
                     ORDER BY created_at DESC, conversation_id DESC LIMIT 1"
                ),
                params![tenant_id, guest_id, channel.as_str()],
                conversation_from_row,
            )
            .optional()?;
        Ok(conversation)
    }

    pub fn get_conversation(&self, conversation_id: i64) -> StoreResult<Option<Conversation>> {
        let connection = self.open_connection()?;
        let conversation = connection
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE conversation_id = ?1"
                ),
                params![conversation_id],
                conversation_from_row,
            )
            .optional()?;
        Ok(conversation)
    }

    /// Shared-endpoint ambiguity probe: newest OPEN conversation on this
    /// channel across all tenants whose guest matches one of the hashes.
    pub fn find_open_conversation_by_hashes(
        &self,
        channel: Channel,
        hashes: &[String],
    ) -> StoreResult<Option<Conversation>> {
        if hashes.is_empty() {
            return Ok(None);
        }
        let connection = self.open_connection()?;
        let sql = format!(
            "SELECT c.conversation_id FROM conversations c \
             JOIN guests g ON g.guest_id = c.guest_id \
             WHERE c.channel = ?1 AND c.status = 'open' AND g.identifier_hash IN ({}) \
             ORDER BY c.updated_at DESC, c.conversation_id DESC LIMIT 1",
            placeholders(hashes.len(), 2)
        );
        let mut values: Vec<rusqlite::types::Value> = vec![channel.as_str().to_string().into()];
        values.extend(hashes.iter().map(|hash| hash.clone().into()));
        let conversation_id: Option<i64> = connection
            .query_row(&sql, params_from_iter(values), |row| row.get(0))
            .optional()?;
        drop(connection);
        match conversation_id {
            Some(conversation_id) => self.get_conversation(conversation_id),
            None => Ok(None),
        }
    }

    /// Links a room to the conversation after a valid code scan and stamps
    /// the session start.
    pub fn set_conversation_room(
        &self,
        conversation_id: i64,
        room_id: i64,
        scan_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "UPDATE conversations SET room_id = ?2, last_link_scan_at = ?3, updated_at = ?3 \
             WHERE conversation_id = ?1",
            params![conversation_id, room_id, timestamp_to_db(scan_at)],
        )?;
        Ok(())
    }

    /// Repoints a conversation at a different guest (pending-link commit).
    pub fn set_conversation_guest(&self, conversation_id: i64, guest_id: i64) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "UPDATE conversations SET guest_id = ?2, updated_at = ?3 \
             WHERE conversation_id = ?1",
            params![conversation_id, guest_id, timestamp_to_db(Utc::now())],
        )?;
        Ok(())
    }

    /// Force-expires a linked session: closes the conversation and clears
    /// its room so the next inbound message requires a fresh scan.
    pub fn expire_conversation(&self, conversation_id: i64) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "UPDATE conversations SET status = 'closed', room_id = NULL, updated_at = ?2 \
             WHERE conversation_id = ?1",
            params![conversation_id, timestamp_to_db(Utc::now())],
        )?;
        Ok(())
    }

    // ----- messages -----

    pub fn insert_message(
        &self,
        conversation_id: i64,
        sender: MessageSender,
        direction: MessageDirection,
        text: &str,
        provider_message_id: Option<&str>,
    ) -> StoreResult<MessageRecord> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO messages (
                conversation_id, sender, direction, text, provider_message_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                conversation_id,
                sender.as_str(),
                direction.as_str(),
                text,
                provider_message_id,
                timestamp_to_db(Utc::now()),
            ],
        )?;
        let message_id = connection.last_insert_rowid();
        let message = connection.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE message_id = ?1"),
            params![message_id],
            message_from_row,
        )?;
        Ok(message)
    }

    /// Inbound webhook dedup: has this provider message id been recorded?
    pub fn has_incoming_with_provider_id(&self, provider_message_id: &str) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found: Option<i64> = connection
            .query_row(
                "SELECT 1 FROM messages \
                 WHERE direction = 'incoming' AND provider_message_id = ?1 LIMIT 1",
                params![provider_message_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn has_recent_incoming_text(
        &self,
        conversation_id: i64,
        text: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.has_recent_text(conversation_id, MessageDirection::Incoming, text, since)
    }

    /// Outbound idempotency probe used by the journey dispatcher.
    pub fn has_recent_outgoing_text(
        &self,
        conversation_id: i64,
        text: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.has_recent_text(conversation_id, MessageDirection::Outgoing, text, since)
    }

    fn has_recent_text(
        &self,
        conversation_id: i64,
        direction: MessageDirection,
        text: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found: Option<i64> = connection
            .query_row(
                "SELECT 1 FROM messages \
                 WHERE conversation_id = ?1 AND direction = ?2 AND text = ?3 \
                   AND created_at >= ?4 LIMIT 1",
                params![
                    conversation_id,
                    direction.as_str(),
                    text,
                    timestamp_to_db(since)
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ----- journeys -----

    pub fn create_journey(
        &self,
        tenant_id: i64,
        trigger: JourneyTrigger,
        delay_minutes: Option<i64>,
        template_text: &str,
    ) -> StoreResult<Journey> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO journeys (tenant_id, trigger_kind, delay_minutes, active, template_text)
            VALUES (?1, ?2, ?3, 1, ?4)
            "#,
            params![tenant_id, trigger.as_str(), delay_minutes, template_text],
        )?;
        let journey_id = connection.last_insert_rowid();
        let journey = connection.query_row(
            &format!("SELECT {JOURNEY_COLUMNS} FROM journeys WHERE journey_id = ?1"),
            params![journey_id],
            journey_from_row,
        )?;
        Ok(journey)
    }

    pub fn find_active_journey(
        &self,
        tenant_id: i64,
        trigger: JourneyTrigger,
    ) -> StoreResult<Option<Journey>> {
        let connection = self.open_connection()?;
        let journey = connection
            .query_row(
                &format!(
                    "SELECT {JOURNEY_COLUMNS} FROM journeys \
                     WHERE tenant_id = ?1 AND trigger_kind = ?2 AND active = 1 LIMIT 1"
                ),
                params![tenant_id, trigger.as_str()],
                journey_from_row,
            )
            .optional()?;
        Ok(journey)
    }

    pub fn get_journey(&self, journey_id: i64) -> StoreResult<Option<Journey>> {
        let connection = self.open_connection()?;
        let journey = connection
            .query_row(
                &format!("SELECT {JOURNEY_COLUMNS} FROM journeys WHERE journey_id = ?1"),
                params![journey_id],
                journey_from_row,
            )
            .optional()?;
        Ok(journey)
    }

    /// True when a PENDING or SENT event already exists for (journey, stay),
    /// upholding the at-most-one-live-event invariant.
    pub fn has_live_journey_event(&self, journey_id: i64, stay_id: i64) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found: Option<i64> = connection
            .query_row(
                "SELECT 1 FROM journey_events \
                 WHERE journey_id = ?1 AND stay_id = ?2 AND status IN ('pending', 'sent') \
                 LIMIT 1",
                params![journey_id, stay_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn insert_journey_event(
        &self,
        tenant_id: i64,
        journey_id: i64,
        guest_id: i64,
        stay_id: i64,
        run_at: DateTime<Utc>,
    ) -> StoreResult<JourneyEvent> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO journey_events (
                tenant_id, journey_id, guest_id, stay_id, run_at, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
            "#,
            params![
                tenant_id,
                journey_id,
                guest_id,
                stay_id,
                timestamp_to_db(run_at),
                timestamp_to_db(Utc::now()),
            ],
        )?;
        let event_id = connection.last_insert_rowid();
        let event = connection.query_row(
            &format!("SELECT {JOURNEY_EVENT_COLUMNS} FROM journey_events WHERE event_id = ?1"),
            params![event_id],
            journey_event_from_row,
        )?;
        Ok(event)
    }

    /// Staleness pass: cancels PENDING events scheduled before `cutoff`.
    pub fn cancel_stale_journey_events(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let connection = self.open_connection()?;
        let cancelled = connection.execute(
            "UPDATE journey_events SET status = 'cancelled' \
             WHERE status = 'pending' AND run_at <= ?1",
            params![timestamp_to_db(cutoff)],
        )?;
        Ok(cancelled)
    }

    pub fn list_due_journey_events(&self, now: DateTime<Utc>) -> StoreResult<Vec<JourneyEvent>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {JOURNEY_EVENT_COLUMNS} FROM journey_events \
             WHERE status = 'pending' AND run_at <= ?1 ORDER BY run_at, event_id"
        ))?;
        let events = statement
            .query_map(params![timestamp_to_db(now)], journey_event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn set_journey_event_status(
        &self,
        event_id: i64,
        status: JourneyEventStatus,
    ) -> StoreResult<()> {
        let connection = self.open_connection()?;
        connection.execute(
            "UPDATE journey_events SET status = ?2 WHERE event_id = ?1",
            params![event_id, status.as_str()],
        )?;
        Ok(())
    }

    // ----- tasks -----

    /// Dedup probe: newest task with identical (tenant, type, summary)
    /// created at or after `since`.
    pub fn find_recent_task(
        &self,
        tenant_id: i64,
        task_type: TaskType,
        summary: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Task>> {
        let connection = self.open_connection()?;
        let task = connection
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks \
                     WHERE tenant_id = ?1 AND task_type = ?2 AND summary = ?3 \
                       AND created_at >= ?4 \
                     ORDER BY created_at DESC, task_id DESC LIMIT 1"
                ),
                params![
                    tenant_id,
                    task_type.as_str(),
                    summary,
                    timestamp_to_db(since)
                ],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    pub fn insert_task(
        &self,
        tenant_id: i64,
        stay_id: Option<i64>,
        task_type: TaskType,
        summary: &str,
        priority: TaskPriority,
    ) -> StoreResult<Task> {
        let connection = self.open_connection()?;
        connection.execute(
            r#"
            INSERT INTO tasks (tenant_id, stay_id, task_type, status, summary, priority, created_at)
            VALUES (?1, ?2, ?3, 'open', ?4, ?5, ?6)
            "#,
            params![
                tenant_id,
                stay_id,
                task_type.as_str(),
                summary,
                priority.as_str(),
                timestamp_to_db(Utc::now()),
            ],
        )?;
        let task_id = connection.last_insert_rowid();
        let task = connection.query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"),
            params![task_id],
            task_from_row,
        )?;
        Ok(task)
    }

    /// Cancels actionable tasks whose stay has already departed.
    /// Lost-and-found reports outlive the stay and are left alone.
    pub fn cancel_open_tasks_for_departed_stays(&self) -> StoreResult<usize> {
        let connection = self.open_connection()?;
        let cancelled = connection.execute(
            "UPDATE tasks SET status = 'cancelled' \
             WHERE status IN ('open', 'in_progress') \
               AND task_type != 'lost_and_found' \
               AND stay_id IN (SELECT stay_id FROM stays WHERE status = 'post_stay')",
            [],
        )?;
        Ok(cancelled)
    }

    /// Cancels unclaimed food or housekeeping requests created before
    /// `cutoff`.
    pub fn cancel_stale_service_tasks(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let connection = self.open_connection()?;
        let cancelled = connection.execute(
            "UPDATE tasks SET status = 'cancelled' \
             WHERE status = 'open' \
               AND task_type IN ('food_beverage', 'housekeeping') \
               AND created_at < ?1",
            params![timestamp_to_db(cutoff)],
        )?;
        Ok(cancelled)
    }

    // ----- room-code token registry -----

    /// Registers a fresh anti-spoofing token for a room. The per-tenant
    /// registry is capped; the oldest batch is evicted at the cap.
    pub fn register_room_code_token(
        &self,
        tenant_id: i64,
        room_label: &str,
    ) -> StoreResult<String> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let count: i64 = transaction.query_row(
            "SELECT COUNT(*) FROM room_code_tokens WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        if count as usize >= ROOM_CODE_TOKEN_CAP {
            let evicted = transaction.execute(
                "DELETE FROM room_code_tokens WHERE tenant_id = ?1 AND token IN ( \
                     SELECT token FROM room_code_tokens WHERE tenant_id = ?1 \
                     ORDER BY created_at ASC LIMIT ?2)",
                params![tenant_id, ROOM_CODE_TOKEN_EVICTION_BATCH as i64],
            )?;
            debug!(tenant_id, evicted, "evicted oldest room-code tokens");
        }
        let mut rng = rand::thread_rng();
        let mut token = None;
        for _ in 0..ROOM_CODE_TOKEN_ATTEMPTS {
            let candidate = format!("{:06x}", rng.gen_range(0..0x100_0000u32));
            let inserted = transaction.execute(
                "INSERT INTO room_code_tokens (tenant_id, token, room_label, created_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (tenant_id, token) DO NOTHING",
                params![
                    tenant_id,
                    candidate,
                    room_label,
                    timestamp_to_db(Utc::now())
                ],
            )?;
            if inserted == 1 {
                token = Some(candidate);
                break;
            }
        }
        let Some(token) = token else {
            return Err(StoreError::TokenSpaceExhausted(tenant_id));
        };
        transaction.commit()?;
        Ok(token)
    }

    /// Whether this tenant enforces tokens at all. A tenant with zero
    /// registered tokens accepts codes without one.
    pub fn tenant_has_room_code_tokens(&self, tenant_id: i64) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found: Option<i64> = connection
            .query_row(
                "SELECT 1 FROM room_code_tokens WHERE tenant_id = ?1 LIMIT 1",
                params![tenant_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn room_for_token(&self, tenant_id: i64, token: &str) -> StoreResult<Option<String>> {
        let connection = self.open_connection()?;
        let room_label = connection
            .query_row(
                "SELECT room_label FROM room_code_tokens WHERE tenant_id = ?1 AND token = ?2",
                params![tenant_id, token],
                |row| row.get(0),
            )
            .optional()?;
        Ok(room_label)
    }
}

// ----- row conversion helpers -----

fn placeholders(count: usize, first_index: usize) -> String {
    (0..count)
        .map(|offset| format!("?{}", first_index + offset))
        .collect::<Vec<_>>()
        .join(", ")
}

fn timestamp_to_db(value: DateTime<Utc>) -> String {
    // Fixed-width RFC3339 so lexicographic comparison in SQL matches
    // chronological order.
    value.to_rfc3339_opts(SecondsFormat::Millis, false)
}

fn bad_value(field: &'static str, value: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        Type::Text,
        Box::new(StoreError::InvalidPersistedValue { field, value }),
    )
}

fn timestamp_from_db(field: &'static str, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| bad_value(field, raw))
}

fn option_timestamp_from_db(
    field: &'static str,
    raw: Option<String>,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|raw| timestamp_from_db(field, raw)).transpose()
}

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    let pms_kind: Option<String> = row.get(4)?;
    let pms_kind = pms_kind
        .map(|raw| PmsKind::parse(&raw).ok_or_else(|| bad_value("pms_kind", raw)))
        .transpose()?;
    let settings_json: String = row.get(8)?;
    let settings: TenantSettings = serde_json::from_str(&settings_json)
        .map_err(|_| bad_value("settings_json", settings_json))?;
    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        active: row.get(2)?,
        country_code: row.get(3)?,
        pms_kind,
        pms_api_key: row.get(5)?,
        pms_property_id: row.get(6)?,
        webhook_secret: row.get(7)?,
        settings: settings.normalized(),
        created_at: timestamp_from_db("created_at", row.get(9)?)?,
    })
}

fn guest_from_row(row: &Row<'_>) -> rusqlite::Result<Guest> {
    Ok(Guest {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        identifier_hash: row.get(2)?,
        channel_user_id: row.get(3)?,
        preferred_language: row.get(4)?,
        created_at: timestamp_from_db("created_at", row.get(5)?)?,
    })
}

fn room_from_row(row: &Row<'_>) -> rusqlite::Result<Room> {
    Ok(Room {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        label: row.get(2)?,
        active: row.get(3)?,
    })
}

fn stay_from_row(row: &Row<'_>) -> rusqlite::Result<Stay> {
    let status: String = row.get(6)?;
    Ok(Stay {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        guest_id: row.get(2)?,
        room_id: row.get(3)?,
        checkin: option_timestamp_from_db("checkin", row.get(4)?)?,
        checkout: option_timestamp_from_db("checkout", row.get(5)?)?,
        status: StayStatus::parse(&status).ok_or_else(|| bad_value("status", status))?,
        opted_out: row.get(7)?,
        external_reservation_id: row.get(8)?,
        created_at: timestamp_from_db("created_at", row.get(9)?)?,
        updated_at: timestamp_from_db("updated_at", row.get(10)?)?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let channel: String = row.get(5)?;
    let status: String = row.get(6)?;
    let handler: String = row.get(7)?;
    Ok(Conversation {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        guest_id: row.get(2)?,
        stay_id: row.get(3)?,
        room_id: row.get(4)?,
        channel: Channel::parse(&channel).ok_or_else(|| bad_value("channel", channel))?,
        status: ConversationStatus::parse(&status).ok_or_else(|| bad_value("status", status))?,
        handler: ConversationHandler::parse(&handler)
            .ok_or_else(|| bad_value("handler", handler))?,
        last_link_scan_at: option_timestamp_from_db("last_link_scan_at", row.get(8)?)?,
        created_at: timestamp_from_db("created_at", row.get(9)?)?,
        updated_at: timestamp_from_db("updated_at", row.get(10)?)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    let sender: String = row.get(2)?;
    let direction: String = row.get(3)?;
    Ok(MessageRecord {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender: MessageSender::parse(&sender).ok_or_else(|| bad_value("sender", sender))?,
        direction: MessageDirection::parse(&direction)
            .ok_or_else(|| bad_value("direction", direction))?,
        text: row.get(4)?,
        provider_message_id: row.get(5)?,
        created_at: timestamp_from_db("created_at", row.get(6)?)?,
    })
}

fn journey_from_row(row: &Row<'_>) -> rusqlite::Result<Journey> {
    let trigger: String = row.get(2)?;
    Ok(Journey {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        trigger: JourneyTrigger::parse(&trigger).ok_or_else(|| bad_value("trigger_kind", trigger))?,
        delay_minutes: row.get(3)?,
        active: row.get(4)?,
        template_text: row.get(5)?,
    })
}

fn journey_event_from_row(row: &Row<'_>) -> rusqlite::Result<JourneyEvent> {
    let status: String = row.get(6)?;
    Ok(JourneyEvent {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        journey_id: row.get(2)?,
        guest_id: row.get(3)?,
        stay_id: row.get(4)?,
        run_at: timestamp_from_db("run_at", row.get(5)?)?,
        status: JourneyEventStatus::parse(&status).ok_or_else(|| bad_value("status", status))?,
        created_at: timestamp_from_db("created_at", row.get(7)?)?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let task_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    let priority: String = row.get(6)?;
    Ok(Task {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        stay_id: row.get(2)?,
        task_type: TaskType::parse(&task_type).ok_or_else(|| bad_value("task_type", task_type))?,
        status: TaskStatus::parse(&status).ok_or_else(|| bad_value("status", status))?,
        summary: row.get(5)?,
        priority: TaskPriority::parse(&priority).ok_or_else(|| bad_value("priority", priority))?,
        created_at: timestamp_from_db("created_at", row.get(7)?)?,
    })
}
