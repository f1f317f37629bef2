//! Operational task intake.
//!
//! Guest requests become staff tasks through one gate, [`submit_task`],
//! which owns duplicate collapsing and the staff notification policy.
//! Creation must never fail because a notifier is down: the task row is
//! the source of truth and notification is best effort on top.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use stayline_store::{StayStore, Task, TaskPriority, TaskType};

/// Repeated identical requests inside this window collapse onto the
/// existing task instead of creating a duplicate.
const TASK_DEDUP_WINDOW: Duration = Duration::seconds(60);

/// How long an unclaimed food or housekeeping request stays actionable.
const SERVICE_TASK_TTL: Duration = Duration::hours(24);

/// A guest-originated request for staff action.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub tenant_id: i64,
    pub stay_id: Option<i64>,
    pub task_type: TaskType,
    pub summary: String,
    pub priority: TaskPriority,
    /// Room the request came from, prefixed onto the staff summary.
    pub room_label: Option<String>,
}

/// Result of submitting a request through the gate.
#[derive(Debug, Clone)]
pub struct TaskSubmission {
    pub task: Task,
    /// True when the request collapsed onto an existing recent task.
    pub deduplicated: bool,
    /// Guest-facing acknowledgement matching the task type.
    pub ack_text: &'static str,
}

/// Staff-facing notification seam (chat ops channel, pager, dashboard).
pub trait TaskNotifier: Send + Sync {
    fn notify(&self, task: &Task) -> Result<()>;
}

/// Notifier that drops everything, for tenants with no staff channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTaskNotifier;

impl TaskNotifier for NullTaskNotifier {
    fn notify(&self, _task: &Task) -> Result<()> {
        Ok(())
    }
}

/// Whether a task warrants an immediate staff ping.
///
/// Time-critical task types always notify; anything else only at elevated
/// priority, so housekeeping noise stays out of the staff channel.
pub fn should_notify(task_type: TaskType, priority: TaskPriority) -> bool {
    priority.is_elevated()
        || matches!(task_type, TaskType::Maintenance | TaskType::FoodBeverage)
}

/// Room prefix in the language the tenant's staff reads.
fn room_prefix(staff_language: Option<&str>) -> &'static str {
    match staff_language {
        Some("ro") => "Camera",
        Some("th") => "ห้อง",
        _ => "Room",
    }
}

fn ack_text(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Housekeeping => "Housekeeping has been informed and will stop by.",
        TaskType::Maintenance => "Maintenance has been notified and is on the way.",
        TaskType::LostAndFound => "We logged your lost item report and will search for it.",
        TaskType::FoodBeverage => "Your order has been passed to our restaurant team.",
        TaskType::Other => "Your request has been passed to our team.",
    }
}

/// Submits a request: dedup first, then creation, then best-effort
/// notification.
pub fn submit_task(
    store: &StayStore,
    notifier: &dyn TaskNotifier,
    request: &TaskRequest,
    now: DateTime<Utc>,
) -> Result<TaskSubmission> {
    let summary = match request.room_label.as_deref() {
        Some(room) => {
            let staff_language = store
                .get_tenant(request.tenant_id)
                .context("loading tenant for staff summary")?
                .and_then(|tenant| tenant.settings.staff_language);
            format!(
                "{} {room}: {}",
                room_prefix(staff_language.as_deref()),
                request.summary.trim()
            )
        }
        None => request.summary.trim().to_string(),
    };
    if let Some(existing) = store
        .find_recent_task(
            request.tenant_id,
            request.task_type,
            &summary,
            now - TASK_DEDUP_WINDOW,
        )
        .context("task dedup probe")?
    {
        debug!(
            tenant_id = request.tenant_id,
            task_id = existing.id,
            "collapsed duplicate task request"
        );
        return Ok(TaskSubmission {
            ack_text: ack_text(existing.task_type),
            task: existing,
            deduplicated: true,
        });
    }

    let task = store
        .insert_task(
            request.tenant_id,
            request.stay_id,
            request.task_type,
            &summary,
            request.priority,
        )
        .context("creating task")?;
    info!(
        tenant_id = request.tenant_id,
        task_id = task.id,
        task_type = task.task_type.as_str(),
        priority = task.priority.as_str(),
        "task created"
    );
    if should_notify(task.task_type, task.priority) {
        if let Err(error) = notifier.notify(&task) {
            // The task exists either way; staff will see it on the board.
            warn!(task_id = task.id, error = %error, "staff notification failed");
        }
    }
    Ok(TaskSubmission {
        ack_text: ack_text(task.task_type),
        task,
        deduplicated: false,
    })
}

/// Counters from one task cleanup pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    /// Tasks cancelled because their stay already departed.
    pub closed_checkout: usize,
    /// Service requests cancelled after sitting unclaimed for a day.
    pub closed_stale: usize,
}

/// Retires tasks nobody will act on: requests tied to a departed stay
/// (lost-and-found excepted, those outlive the stay) and food or
/// housekeeping requests older than [`SERVICE_TASK_TTL`].
pub fn run_task_cleanup(store: &StayStore, now: DateTime<Utc>) -> Result<CleanupStats> {
    let closed_checkout = store
        .cancel_open_tasks_for_departed_stays()
        .context("cancelling tasks for departed stays")?;
    let closed_stale = store
        .cancel_stale_service_tasks(now - SERVICE_TASK_TTL)
        .context("cancelling stale service tasks")?;
    if closed_checkout > 0 || closed_stale > 0 {
        info!(closed_checkout, closed_stale, "task cleanup pass cancelled tasks");
    }
    Ok(CleanupStats {
        closed_checkout,
        closed_stale,
    })
}
