//! Entity model shared by every Stayline engine.
//!
//! Enums carry stable snake_case wire forms (`as_str`/`parse`) used both for
//! SQLite persistence and for structured log payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TENANT_SETTINGS_SCHEMA_VERSION: u32 = 1;

fn tenant_settings_schema_version() -> u32 {
    TENANT_SETTINGS_SCHEMA_VERSION
}

fn default_session_expiry_enabled() -> bool {
    true
}

fn default_session_idle_hours() -> i64 {
    48
}

fn default_welcome_delay_minutes() -> i64 {
    20
}

/// Lifecycle of an occupancy record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StayStatus {
    PreStay,
    InHouse,
    PostStay,
    Cancelled,
}

impl StayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreStay => "pre_stay",
            Self::InHouse => "in_house",
            Self::PostStay => "post_stay",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pre_stay" => Some(Self::PreStay),
            "in_house" => Some(Self::InHouse),
            "post_stay" => Some(Self::PostStay),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Dialogue-session status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    AssignedToStaff,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::AssignedToStaff => "assigned_to_staff",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(Self::Open),
            "assigned_to_staff" => Some(Self::AssignedToStaff),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Which side currently answers the guest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationHandler {
    Bot,
    Staff,
}

impl ConversationHandler {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "bot",
            Self::Staff => "staff",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bot" => Some(Self::Bot),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

/// The two inbound channel regimes Stayline routes.
///
/// `SharedPhone` endpoints serve many tenants behind one phone number and
/// identify senders by phone hash; `DirectChat` endpoints hand us an opaque
/// per-platform user token that must be linked explicitly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    SharedPhone,
    DirectChat,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SharedPhone => "shared_phone",
            Self::DirectChat => "direct_chat",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "shared_phone" => Some(Self::SharedPhone),
            "direct_chat" => Some(Self::DirectChat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    Guest,
    Bot,
    Staff,
}

impl MessageSender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Bot => "bot",
            Self::Staff => "staff",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "guest" => Some(Self::Guest),
            "bot" => Some(Self::Bot),
            "staff" => Some(Self::Staff),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

impl MessageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "incoming" => Some(Self::Incoming),
            "outgoing" => Some(Self::Outgoing),
            _ => None,
        }
    }
}

/// Lifecycle milestone that triggers a journey.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JourneyTrigger {
    AfterCheckinWelcome,
    AfterCheckoutFeedback,
}

impl JourneyTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AfterCheckinWelcome => "after_checkin_welcome",
            Self::AfterCheckoutFeedback => "after_checkout_feedback",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "after_checkin_welcome" => Some(Self::AfterCheckinWelcome),
            "after_checkout_feedback" => Some(Self::AfterCheckoutFeedback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JourneyEventStatus {
    Pending,
    Sent,
    Cancelled,
}

impl JourneyEventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Housekeeping,
    Maintenance,
    LostAndFound,
    FoodBeverage,
    Other,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Housekeeping => "housekeeping",
            Self::Maintenance => "maintenance",
            Self::LostAndFound => "lost_and_found",
            Self::FoodBeverage => "food_beverage",
            Self::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "housekeeping" => Some(Self::Housekeeping),
            "maintenance" => Some(Self::Maintenance),
            "lost_and_found" => Some(Self::LostAndFound),
            "food_beverage" => Some(Self::FoodBeverage),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Normal,
    Urgent,
    Critical,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Urgent => "urgent",
            Self::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "normal" => Some(Self::Normal),
            "urgent" => Some(Self::Urgent),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Priorities above normal always notify staff regardless of task type.
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::Urgent | Self::Critical)
    }
}

/// Typed PMS vendor discriminant, parsed once at the sync boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PmsKind {
    Apaleo,
    Cloudbeds,
    Mews,
    Simulation,
}

impl PmsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apaleo => "apaleo",
            Self::Cloudbeds => "cloudbeds",
            Self::Mews => "mews",
            Self::Simulation => "simulation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "apaleo" => Some(Self::Apaleo),
            "cloudbeds" => Some(Self::Cloudbeds),
            "mews" => Some(Self::Mews),
            "simulation" | "demo" => Some(Self::Simulation),
            _ => None,
        }
    }
}

/// Versioned per-tenant configuration with named fields and validated
/// defaults. Stored as JSON on the tenant row; unknown historic keys are
/// dropped on read instead of silently surviving as typo'd lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantSettings {
    #[serde(default = "tenant_settings_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_session_expiry_enabled")]
    pub session_expiry_enabled: bool,
    #[serde(default = "default_session_idle_hours")]
    pub session_idle_hours: i64,
    #[serde(default = "default_welcome_delay_minutes")]
    pub welcome_delay_minutes: i64,
    #[serde(default)]
    pub staff_language: Option<String>,
}

impl Default for TenantSettings {
    fn default() -> Self {
        Self {
            schema_version: TENANT_SETTINGS_SCHEMA_VERSION,
            session_expiry_enabled: default_session_expiry_enabled(),
            session_idle_hours: default_session_idle_hours(),
            welcome_delay_minutes: default_welcome_delay_minutes(),
            staff_language: None,
        }
    }
}

impl TenantSettings {
    /// Clamps out-of-range values back to safe defaults.
    pub fn normalized(mut self) -> Self {
        if self.session_idle_hours < 1 {
            self.session_idle_hours = default_session_idle_hours();
        }
        if self.welcome_delay_minutes < 0 {
            self.welcome_delay_minutes = default_welcome_delay_minutes();
        }
        self
    }
}

/// Isolation boundary; almost every other entity is scoped to one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub active: bool,
    pub country_code: String,
    pub pms_kind: Option<PmsKind>,
    pub pms_api_key: Option<String>,
    pub pms_property_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub settings: TenantSettings,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// A tenant is syncable when it is active and carries PMS credentials.
    pub fn has_pms(&self) -> bool {
        self.active && self.pms_kind.is_some() && self.pms_api_key.is_some()
    }
}

/// Parameters for creating a tenant.
#[derive(Debug, Clone, Default)]
pub struct NewTenant {
    pub name: String,
    pub country_code: String,
    pub pms_kind: Option<PmsKind>,
    pub pms_api_key: Option<String>,
    pub pms_property_id: Option<String>,
    pub webhook_secret: Option<String>,
    pub settings: Option<TenantSettings>,
}

/// Tenant-scoped sender identity, keyed only by hashed identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Guest {
    pub id: i64,
    pub tenant_id: i64,
    pub identifier_hash: String,
    pub channel_user_id: Option<String>,
    pub preferred_language: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Guest {
    /// Placeholder guests hold an opaque-channel hash but no committed link.
    pub fn is_linked(&self) -> bool {
        self.channel_user_id.is_some()
    }
}

/// Display contact details, kept apart from the hashed identity row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GuestContact {
    pub guest_id: i64,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: i64,
    pub tenant_id: i64,
    pub label: String,
    pub active: bool,
}

/// Occupancy interval binding a guest (and optionally a room) to a tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stay {
    pub id: i64,
    pub tenant_id: i64,
    pub guest_id: i64,
    pub room_id: Option<i64>,
    pub checkin: Option<DateTime<Utc>>,
    pub checkout: Option<DateTime<Utc>>,
    pub status: StayStatus,
    pub opted_out: bool,
    pub external_reservation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a stay.
#[derive(Debug, Clone)]
pub struct NewStay {
    pub tenant_id: i64,
    pub guest_id: i64,
    pub room_id: Option<i64>,
    pub checkin: Option<DateTime<Utc>>,
    pub checkout: Option<DateTime<Utc>>,
    pub status: StayStatus,
    pub external_reservation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: i64,
    pub tenant_id: i64,
    pub guest_id: i64,
    pub stay_id: Option<i64>,
    pub room_id: Option<i64>,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub handler: ConversationHandler,
    pub last_link_scan_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: MessageSender,
    pub direction: MessageDirection,
    pub text: String,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-tenant journey configuration: one delayed message rule per milestone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Journey {
    pub id: i64,
    pub tenant_id: i64,
    pub trigger: JourneyTrigger,
    /// Minutes between the trigger and the send. `None` defers to the
    /// tenant's settings.
    pub delay_minutes: Option<i64>,
    pub active: bool,
    pub template_text: String,
}

/// One scheduled journey instance for a specific stay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JourneyEvent {
    pub id: i64,
    pub tenant_id: i64,
    pub journey_id: i64,
    pub guest_id: i64,
    pub stay_id: i64,
    pub run_at: DateTime<Utc>,
    pub status: JourneyEventStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub tenant_id: i64,
    pub stay_id: Option<i64>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub summary: String,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
}
