// Care Home Registry - Web Server
// REST API with Axum over the shared SQLite store

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use carehome::entities::bed::{get_beds, get_vacant_beds, insert_bed};
use carehome::entities::checkup::{get_checkups, get_resident_checkups, insert_checkup};
use carehome::entities::document::{get_documents, get_resident_documents, insert_document};
use carehome::entities::event::{get_events, insert_event};
use carehome::entities::medication::{get_resident_medications, insert_medication};
use carehome::entities::resident::{
    get_recent_residents, get_resident, get_residents, insert_resident, search_residents,
    update_resident,
};
use carehome::entities::{NewDocument, ResidentUpdate};
use carehome::{
    assign_bed, dashboard_stats_with_window, delete_resident, init_logging, local_now, local_today,
    open_database, release_bed, todays_birthdays, todays_checkups, upcoming_birthdays,
    upcoming_events, CareError, Config, NewBed, NewCheckup, NewEvent, NewMedication, NewResident,
};

const DEFAULT_PAGE_LIMIT: u32 = 100;
const DEFAULT_RECENT_LIMIT: u32 = 10;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Deserialize)]
struct WindowQuery {
    days: Option<u32>,
}

#[derive(Deserialize)]
struct PageQuery {
    skip: Option<u32>,
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct SearchQuery {
    query: String,
}

/// Body of a successful release.
#[derive(Serialize)]
struct ReleaseResponse {
    bed_id: i64,
    released_resident_id: Option<i64>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::failure(message))).into_response()
}

/// Map a store error onto a status code: missing records are 404, refused
/// transitions and rejected input are 400, anything else is a 500.
fn care_error_response(context: &str, e: CareError) -> Response {
    if e.is_not_found() {
        error_response(StatusCode::NOT_FOUND, e.to_string())
    } else if e.is_invalid_state() || e.is_rejected_input() {
        error_response(StatusCode::BAD_REQUEST, e.to_string())
    } else {
        error!(error = %e, "{}", context);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

fn respond<T: Serialize>(context: &str, result: carehome::Result<T>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(e) => care_error_response(context, e),
    }
}

fn lock_db(state: &AppState) -> Result<MutexGuard<'_, Connection>, Response> {
    state.db.lock().map_err(|_| {
        error!("database lock poisoned");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable")
    })
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/dashboard/stats - Headline counts
async fn get_dashboard_stats(State(state): State<AppState>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond(
        "Error getting dashboard stats",
        dashboard_stats_with_window(&conn, local_today(), state.config.birthday_window_days),
    )
}

// ----------------------------------------------------------------------------
// Residents
// ----------------------------------------------------------------------------

/// POST /api/residents - Admit a resident
async fn create_resident(
    State(state): State<AppState>,
    Json(resident): Json<NewResident>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    let created = insert_resident(&conn, &resident);
    if let Ok(r) = &created {
        info!(resident_id = r.id, "resident admitted");
    }
    respond("Error creating resident", created)
}

/// GET /api/residents?skip=&limit= - Residents in id order
async fn list_residents(State(state): State<AppState>, Query(page): Query<PageQuery>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond(
        "Error getting residents",
        get_residents(&conn, page.skip.unwrap_or(0), page.limit.unwrap_or(DEFAULT_PAGE_LIMIT)),
    )
}

/// GET /api/residents/recent?limit= - Most recent admissions
async fn list_recent_residents(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond(
        "Error getting recent residents",
        get_recent_residents(&conn, page.limit.unwrap_or(DEFAULT_RECENT_LIMIT)),
    )
}

/// GET /api/residents/search?query= - Name, room or phone match
async fn find_residents(
    State(state): State<AppState>,
    Query(search): Query<SearchQuery>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error searching residents", search_residents(&conn, &search.query))
}

/// GET /api/residents/:id - One resident
async fn show_resident(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    let found = get_resident(&conn, id)
        .and_then(|r| r.ok_or_else(|| CareError::not_found("resident", id)));
    respond("Error getting resident", found)
}

/// PUT /api/residents/:id - Partial update; bed and room are not touched
async fn edit_resident(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ResidentUpdate>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error updating resident", update_resident(&conn, id, &update))
}

/// DELETE /api/residents/:id - Remove a resident without dependent records
async fn remove_resident(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let mut conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error deleting resident", delete_resident(&mut conn, id).map(|()| id))
}

// ----------------------------------------------------------------------------
// Medications, checkups, events, documents
// ----------------------------------------------------------------------------

/// POST /api/medications - Prescribe a medication
async fn create_medication(
    State(state): State<AppState>,
    Json(medication): Json<NewMedication>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error creating medication", insert_medication(&conn, &medication))
}

/// GET /api/medications/resident/:id - Active medications of a resident
async fn list_resident_medications(
    State(state): State<AppState>,
    Path(resident_id): Path<i64>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting medications", get_resident_medications(&conn, resident_id))
}

/// GET /api/birthdays/upcoming?days=N - Birthdays within the window
async fn get_upcoming_birthdays(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Response {
    let days = query.days.unwrap_or(state.config.birthday_window_days);
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting upcoming birthdays", upcoming_birthdays(&conn, local_today(), days))
}

/// GET /api/birthdays/today - Birthdays falling today
async fn get_todays_birthdays(State(state): State<AppState>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting today's birthdays", todays_birthdays(&conn, local_today()))
}

/// POST /api/checkups - Schedule a checkup
async fn create_checkup(
    State(state): State<AppState>,
    Json(checkup): Json<NewCheckup>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error scheduling checkup", insert_checkup(&conn, &checkup))
}

/// GET /api/checkups?skip=&limit= - Checkups in id order
async fn list_checkups(State(state): State<AppState>, Query(page): Query<PageQuery>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond(
        "Error getting checkups",
        get_checkups(&conn, page.skip.unwrap_or(0), page.limit.unwrap_or(DEFAULT_PAGE_LIMIT)),
    )
}

/// GET /api/checkups/today - Checkups scheduled for today
async fn get_todays_checkups(State(state): State<AppState>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting today's checkups", todays_checkups(&conn, local_today()))
}

/// GET /api/checkups/resident/:id - Checkups of a resident
async fn list_resident_checkups(
    State(state): State<AppState>,
    Path(resident_id): Path<i64>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting resident checkups", get_resident_checkups(&conn, resident_id))
}

/// POST /api/events - Create an event
async fn create_event(State(state): State<AppState>, Json(event): Json<NewEvent>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error creating event", insert_event(&conn, &event))
}

/// GET /api/events?skip=&limit= - Events in id order
async fn list_events(State(state): State<AppState>, Query(page): Query<PageQuery>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond(
        "Error getting events",
        get_events(&conn, page.skip.unwrap_or(0), page.limit.unwrap_or(DEFAULT_PAGE_LIMIT)),
    )
}

/// GET /api/events/upcoming?days=N - Open events within the window
async fn get_upcoming_events(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Response {
    let days = query.days.unwrap_or(state.config.event_window_days);
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting upcoming events", upcoming_events(&conn, local_now(), days))
}

/// POST /api/documents - Record document metadata
async fn create_document(
    State(state): State<AppState>,
    Json(document): Json<NewDocument>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error recording document", insert_document(&conn, &document))
}

/// GET /api/documents?skip=&limit= - Documents in id order
async fn list_documents(State(state): State<AppState>, Query(page): Query<PageQuery>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond(
        "Error getting documents",
        get_documents(&conn, page.skip.unwrap_or(0), page.limit.unwrap_or(DEFAULT_PAGE_LIMIT)),
    )
}

/// GET /api/documents/resident/:id - Documents of a resident
async fn list_resident_documents(
    State(state): State<AppState>,
    Path(resident_id): Path<i64>,
) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting resident documents", get_resident_documents(&conn, resident_id))
}

// ----------------------------------------------------------------------------
// Beds
// ----------------------------------------------------------------------------

/// POST /api/beds - Add a bed (always vacant)
async fn create_bed(State(state): State<AppState>, Json(bed): Json<NewBed>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error creating bed", insert_bed(&conn, &bed))
}

/// GET /api/beds - All beds
async fn list_beds(State(state): State<AppState>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting beds", get_beds(&conn))
}

/// GET /api/beds/vacant - Vacant beds only
async fn list_vacant_beds(State(state): State<AppState>) -> Response {
    let conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error getting vacant beds", get_vacant_beds(&conn))
}

/// PUT /api/beds/:bed_id/assign/:resident_id - Put a resident into a vacant bed
async fn put_assign_bed(
    State(state): State<AppState>,
    Path((bed_id, resident_id)): Path<(i64, i64)>,
) -> Response {
    let mut conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    respond("Error assigning bed", assign_bed(&mut conn, bed_id, resident_id))
}

/// PUT /api/beds/:bed_id/release - Vacate a bed
async fn put_release_bed(State(state): State<AppState>, Path(bed_id): Path<i64>) -> Response {
    let mut conn = match lock_db(&state) {
        Ok(conn) => conn,
        Err(resp) => return resp,
    };

    let released = release_bed(&mut conn, bed_id).map(|released_resident_id| ReleaseResponse {
        bed_id,
        released_resident_id,
    });
    respond("Error releasing bed", released)
}

// ============================================================================
// Main Server
// ============================================================================

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/dashboard/stats", get(get_dashboard_stats))
        .route("/residents", get(list_residents).post(create_resident))
        .route("/residents/recent", get(list_recent_residents))
        .route("/residents/search", get(find_residents))
        .route(
            "/residents/:id",
            get(show_resident).put(edit_resident).delete(remove_resident),
        )
        .route("/medications", post(create_medication))
        .route("/medications/resident/:id", get(list_resident_medications))
        .route("/birthdays/upcoming", get(get_upcoming_birthdays))
        .route("/birthdays/today", get(get_todays_birthdays))
        .route("/checkups", get(list_checkups).post(create_checkup))
        .route("/checkups/today", get(get_todays_checkups))
        .route("/checkups/resident/:id", get(list_resident_checkups))
        .route("/events", get(list_events).post(create_event))
        .route("/events/upcoming", get(get_upcoming_events))
        .route("/documents", get(list_documents).post(create_document))
        .route("/documents/resident/:id", get(list_resident_documents))
        .route("/beds", get(list_beds).post(create_bed))
        .route("/beds/vacant", get(list_vacant_beds))
        .route("/beds/:bed_id/assign/:resident_id", put(put_assign_bed))
        .route("/beds/:bed_id/release", put(put_release_bed))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;

    init_logging();

    let config = Config::from_env().context("invalid configuration")?;
    let conn = open_database(&config.db_path)
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    info!(path = %config.db_path.display(), "database opened");

    let bind = config.bind.clone();
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind to {}", bind))?;
    info!(addr = %bind, "server running");

    axum::serve(listener, app(state))
        .await
        .context("server error")?;

    Ok(())
}
