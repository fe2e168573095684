//! Scheduled priority recalculation.
//!
//! Two loops on opposite half-hour offsets rescore open work per department
//! by age, explicit priority and deadline proximity, then renumber 1..N with
//! blind writes. The scheduler is the last writer by design; a concurrent
//! manual reorder bumps versions and clients resync via the emitted event.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::auth::tokens;
use crate::db::Database;
use crate::directory::store as directory;
use crate::error::Result;
use crate::hub::{HubHandle, WsEvent};
use crate::ticket::{job, store as ticket_store, OpenJob, OpenTicket};

/// Tickets rescore at :00/:30, jobs at :01/:31.
const TICKET_OFFSET_MINUTES: u32 = 0;
const JOB_OFFSET_MINUTES: u32 = 1;

pub fn age_weight(days: f64) -> f64 {
    if days <= 7.0 {
        return 1.0;
    }
    if days <= 14.0 {
        return 1.5;
    }
    days.sqrt() * 0.5
}

pub fn deadline_weight(deadline: Option<NaiveDate>, now: DateTime<Utc>) -> f64 {
    let Some(deadline) = deadline else {
        // No deadline: a flat mid-range weight.
        return 10.0;
    };

    let deadline_instant = deadline.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let days_remaining = (deadline_instant - now).num_seconds() as f64 / 86_400.0;

    const STEEPNESS_FACTOR: f64 = 3.0;
    const BASE_SCORE: f64 = 100.0;
    const MIN_SCORE: f64 = 5.0;

    if days_remaining >= 0.0 {
        (BASE_SCORE - MIN_SCORE) * (-days_remaining / STEEPNESS_FACTOR).exp() + MIN_SCORE
    } else {
        const PENALTY_PER_DAY: f64 = 15.0;
        BASE_SCORE + (-days_remaining * PENALTY_PER_DAY)
    }
}

fn ticket_score(ticket: &OpenTicket, now: DateTime<Utc>) -> f64 {
    let age_days = (now - ticket.created_at).num_seconds() as f64 / 86_400.0;
    let priority_weight = 2.0 / ticket.ticket_priority as f64;
    let deadline = deadline_weight(ticket.deadline, now);

    (age_days * age_weight(age_days) * 1.0) + (priority_weight * 1.5) + (deadline * 2.0)
}

fn job_score(open_job: &OpenJob, now: DateTime<Utc>) -> f64 {
    let age_days = (now - open_job.ticket.created_at).num_seconds() as f64 / 86_400.0;
    let job_priority_weight = 2.0 / open_job.job_priority as f64;
    let ticket_priority_weight = (2.0 / open_job.ticket.ticket_priority as f64) * 2.0;
    let deadline = deadline_weight(open_job.ticket.deadline, now);

    (age_days * age_weight(age_days)) + deadline + job_priority_weight + ticket_priority_weight
}

/// Seconds until the next `offset_minutes` mark within a half hour.
fn duration_until_next_slot(now: DateTime<Utc>, offset_minutes: u32) -> Duration {
    let period: i64 = 30 * 60;
    let within = (now.minute() % 30) as i64 * 60 + now.second() as i64;
    let offset = offset_minutes as i64 * 60;
    let mut delta = offset - within;
    if delta <= 0 {
        delta += period;
    }
    Duration::from_secs(delta as u64)
}

pub struct PriorityScheduler {
    db: Database,
    hub: HubHandle,
    shutdown_tx: broadcast::Sender<()>,
}

impl PriorityScheduler {
    pub fn new(db: Database, hub: HubHandle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            db,
            hub,
            shutdown_tx,
        }
    }

    /// Spawn both recalculation loops.
    pub fn start(&self) {
        info!("Priority scheduler started");
        self.spawn_loop(TICKET_OFFSET_MINUTES, Pass::Tickets);
        self.spawn_loop(JOB_OFFSET_MINUTES, Pass::Jobs);
    }

    pub fn stop(&self) {
        info!("Priority scheduler stopping");
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_loop(&self, offset_minutes: u32, pass: Pass) {
        let db = self.db.clone();
        let hub = self.hub.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("{} recalculation loop started", pass.label());
            loop {
                let delay = duration_until_next_slot(Utc::now(), offset_minutes);
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("{} recalculation loop received shutdown signal", pass.label());
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {
                        let result = match pass {
                            Pass::Tickets => recalculate_tickets(&db, &hub),
                            Pass::Jobs => recalculate_jobs(&db, &hub),
                        };
                        if let Err(e) = result {
                            error!("{} recalculation pass failed: {}", pass.label(), e);
                        }
                    }
                }
            }
            info!("{} recalculation loop stopped", pass.label());
        });
    }

    /// One full ticket pass, callable outside the loop (tests, manual runs).
    pub fn recalculate_tickets_once(&self) -> Result<()> {
        recalculate_tickets(&self.db, &self.hub)
    }

    /// One full job pass.
    pub fn recalculate_jobs_once(&self) -> Result<()> {
        recalculate_jobs(&self.db, &self.hub)
    }
}

#[derive(Clone, Copy)]
enum Pass {
    Tickets,
    Jobs,
}

impl Pass {
    fn label(self) -> &'static str {
        match self {
            Pass::Tickets => "Ticket priority",
            Pass::Jobs => "Job priority",
        }
    }
}

fn recalculate_tickets(db: &Database, hub: &HubHandle) -> Result<()> {
    info!("Starting ticket priority recalculation pass");

    let department_ids = {
        let conn = db.conn();

        // WS tickets expire after seconds but are only deleted on handshake;
        // sweep the leftovers with the half-hourly pass.
        match tokens::purge_expired_ws_tickets(&conn) {
            Ok(0) => {}
            Ok(purged) => info!("Purged {} expired websocket tickets", purged),
            Err(e) => warn!("Failed to purge expired websocket tickets: {}", e),
        }

        directory::active_receiving_department_ids(&conn)?
    };

    for department_id in department_ids {
        // One bad department never halts the pass.
        if let Err(e) = recalculate_tickets_for_department(db, department_id) {
            warn!(
                "Failed to recalculate ticket priorities for department {}: {}",
                department_id, e
            );
        }
    }

    hub.try_broadcast(WsEvent::TicketPriorityRecalculated {
        message: "Ticket priorities have been recalculated by the system.".to_string(),
    });
    info!("Ticket priority recalculation pass finished");
    Ok(())
}

fn recalculate_tickets_for_department(db: &Database, department_id: i64) -> Result<()> {
    let mut conn = db.conn();
    let tx = conn.transaction()?;

    let tickets = ticket_store::open_tickets_for_scheduling(&tx, department_id)?;
    if tickets.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let mut scored: Vec<(i64, f64)> = tickets
        .iter()
        .map(|t| (t.id, ticket_score(t, now)))
        .collect();
    // Descending by score; ties break on id for determinism.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

    for (index, (ticket_id, _)) in scored.iter().enumerate() {
        ticket_store::force_update_priority(&tx, *ticket_id, index as i64 + 1)?;
    }

    tx.commit()?;
    Ok(())
}

fn recalculate_jobs(db: &Database, hub: &HubHandle) -> Result<()> {
    info!("Starting job priority recalculation pass");

    let department_ids = {
        let conn = db.conn();
        directory::active_receiving_department_ids(&conn)?
    };

    for department_id in department_ids {
        if let Err(e) = recalculate_jobs_for_department(db, department_id) {
            warn!(
                "Failed to recalculate job priorities for department {}: {}",
                department_id, e
            );
        }
    }

    hub.try_broadcast(WsEvent::JobPriorityRecalculated {
        message: "Job priorities have been recalculated by the system.".to_string(),
    });
    info!("Job priority recalculation pass finished");
    Ok(())
}

fn recalculate_jobs_for_department(db: &Database, department_id: i64) -> Result<()> {
    let mut conn = db.conn();
    let tx = conn.transaction()?;

    let jobs = job::open_jobs_for_scheduling(&tx, department_id)?;
    if jobs.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    let mut scored: Vec<(i64, f64)> = jobs.iter().map(|j| (j.id, job_score(j, now))).collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));

    for (index, (job_id, _)) in scored.iter().enumerate() {
        job::force_update_priority(&tx, *job_id, index as i64 + 1)?;
    }

    tx.commit()?;
    Ok(())
}
