//! HTTP surface of the lottery coordinator.

use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::Config;
use crate::contract::LotteryGateway;
use crate::database::Store;
use crate::error::Error;
use crate::scheduler;
use crate::timer::LotteryTimers;
use crate::types::{CreateEventRequest, EventReport};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub gateway: Arc<dyn LotteryGateway>,
    pub timers: LotteryTimers,
    pub config: Config,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        ErrorBody {
            success: false,
            error: error.into(),
        }
    }
}

fn internal_error(err: Error) -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorBody::new(err.to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemainingResponse {
    event_id: String,
    remaining_ms: Option<i64>,
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

/// Intake: create a disaster record and start tracking its lottery.
#[post("/events")]
pub async fn create_event(
    req: web::Json<CreateEventRequest>,
    data: web::Data<AppState>,
) -> impl Responder {
    let event = match data.store.create_event(req.into_inner()) {
        Ok(event) => event,
        Err(err) => return internal_error(err),
    };
    if let Err(err) = data.timers.watch(&event).await {
        // the record exists either way; the next scheduler pass picks it up
        error!(event_id = %event.id, "failed to start lottery tracking: {err}");
    }
    HttpResponse::Created().json(event)
}

#[derive(Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[get("/events")]
pub async fn list_events(
    query: web::Query<ListQuery>,
    data: web::Data<AppState>,
) -> impl Responder {
    let events = match query.status.as_deref() {
        None => data.store.all_events(),
        Some("active") => data.store.active_events(),
        Some(other) => {
            return HttpResponse::BadRequest()
                .json(ErrorBody::new(format!("unsupported status filter: {other}")))
        }
    };
    match events {
        Ok(events) => HttpResponse::Ok().json(events),
        Err(err) => internal_error(err),
    }
}

#[get("/events/{id}")]
pub async fn get_event(path: web::Path<String>, data: web::Data<AppState>) -> impl Responder {
    match data.store.get_event(&path) {
        Ok(Some(event)) => HttpResponse::Ok().json(event),
        Ok(None) => HttpResponse::NotFound().json(ErrorBody::new("event not found")),
        Err(err) => internal_error(err),
    }
}

/// Scheduler entry point, hit by an external cron every few minutes.
#[post("/scheduler/run")]
pub async fn run_scheduler(data: web::Data<AppState>) -> impl Responder {
    let check = scheduler::run_scheduled_check(
        &data.store,
        data.gateway.as_ref(),
        data.config.default_lottery_duration_hours,
    )
    .await;
    match check {
        Ok(summary) => HttpResponse::Ok().json(summary),
        Err(err) => internal_error(err),
    }
}

/// Manual entry point: check one event and execute its lottery if expired.
#[post("/events/{id}/lottery")]
pub async fn trigger_lottery(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> impl Responder {
    let event = match data.store.get_event(&path) {
        Ok(Some(event)) => event,
        Ok(None) => return HttpResponse::NotFound().json(ErrorBody::new("event not found")),
        Err(err) => return internal_error(err),
    };
    let outcome = scheduler::check_event(
        &data.store,
        data.gateway.as_ref(),
        data.config.default_lottery_duration_hours,
        &event,
    )
    .await;
    HttpResponse::Ok().json(EventReport {
        event_id: event.id,
        outcome,
    })
}

#[get("/events/{id}/lottery/remaining")]
pub async fn lottery_remaining(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> impl Responder {
    let remaining_ms = data.timers.remaining_ms(&path).await;
    HttpResponse::Ok().json(RemainingResponse {
        event_id: path.into_inner(),
        remaining_ms,
    })
}
