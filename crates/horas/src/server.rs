use anyhow::Context;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::extract::Form;
use chrono::Local;
use rusqlite::Connection;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{self, FlashLevel, SessionData, SessionStore, SESSION_COOKIE};
use crate::config::Config;
use crate::db;
use crate::error::{AppError, Result};
use crate::forms::{LoginForm, MonthForm, ServiceForm};
use crate::html::{self, PageContext};
use crate::month::YearMonth;
use crate::report::{MonthlyReport, ReportFormat};

/// Application state shared across requests
pub struct AppState {
    pub db: Mutex<Connection>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(conn: Connection, session_lifetime: Duration) -> Arc<Self> {
        Arc::new(Self {
            db: Mutex::new(conn),
            sessions: SessionStore::new(session_lifetime),
        })
    }
}

/// Start the web server
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let conn = db::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    if db::count_users(&conn)? == 0 {
        warn!("No users yet, create one with `horas create-user <username>`");
    }

    let app = router(AppState::new(conn, config.session_lifetime));

    let addr = SocketAddr::new(config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(address = %addr, database = %config.database.display(), "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout))
        .route("/", get(index))
        .route("/month", post(select_month))
        .route("/month/{month}", get(goto_month))
        .route("/services/new", get(new_service_page).post(create_service))
        .route(
            "/services/{id}/edit",
            get(edit_service_page).post(update_service),
        )
        .route("/services/{id}/delete", post(delete_service))
        .route("/report.pdf", get(report_pdf))
        .route("/report/preview", get(report_preview))
        .route("/report.csv", get(report_csv))
        .route("/api/services", get(api_services))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A logged-in user's session. Requests without a live session are sent
/// to the login page.
pub struct AuthSession {
    pub id: String,
    pub data: SessionData,
}

impl FromRequestParts<Arc<AppState>> for AuthSession {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let id = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| Redirect::to("/login"))?;
        let data = state
            .sessions
            .touch(&id)
            .await
            .ok_or_else(|| Redirect::to("/login"))?;
        Ok(Self { id, data })
    }
}

// ========== login ==========

#[derive(Debug, Deserialize)]
struct LoginQuery {
    logged_out: Option<String>,
}

async fn login_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.touch(cookie.value()).await.is_some() {
            return Redirect::to("/").into_response();
        }
    }
    let notice = query
        .logged_out
        .is_some()
        .then_some("You have been logged out.");
    Html(html::render_login(None, notice, "").into_string()).into_response()
}

async fn login_submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let username = form.username.trim();
    let user = {
        let conn = state.db.lock().await;
        db::find_user_by_username(&conn, username)?
    };

    let verified = match user {
        Some(user) => {
            // Argon2 verification blocks; run it off the async workers
            let password = form.password.clone();
            let hash = user.password_hash.clone();
            let valid =
                tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
                    .await
                    .map_err(|e| AppError::PasswordHash(e.to_string()))??;
            valid.then_some(user)
        }
        None => None,
    };
    let Some(user) = verified else {
        warn!(username = %username, "Failed login attempt");
        let page = html::render_login(Some("Invalid username or password."), None, username);
        return Ok((StatusCode::UNAUTHORIZED, Html(page.into_string())).into_response());
    };

    let id = state.sessions.create(user.id, &user.username).await;
    info!(user = %user.username, "User logged in");

    let cookie = Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    Ok((jar.add(cookie), Redirect::to("/")).into_response())
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.remove(cookie.value()).await {
            info!("User logged out");
        }
    }
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login?logged_out=1"),
    )
}

// ========== month listing ==========

async fn load_report(
    state: &AppState,
    session: &SessionData,
    month: YearMonth,
) -> Result<MonthlyReport> {
    let conn = state.db.lock().await;
    let services = db::list_services_for_month(&conn, session.user_id, month)?;
    Ok(MonthlyReport::new(&session.username, month, services))
}

async fn index(State(state): State<Arc<AppState>>, session: AuthSession) -> Result<Html<String>> {
    let report = load_report(&state, &session.data, session.data.selected_month).await?;
    let flashes = state.sessions.take_flashes(&session.id).await;
    let ctx = PageContext {
        username: &session.data.username,
        flashes: &flashes,
    };
    Ok(Html(html::render_index(&ctx, &report).into_string()))
}

async fn change_month(state: &AppState, session: &AuthSession, raw: &str) {
    match raw.parse::<YearMonth>() {
        Ok(month) => {
            state.sessions.set_month(&session.id, month).await;
            state
                .sessions
                .flash(
                    &session.id,
                    FlashLevel::Info,
                    format!("Showing {}.", month.label()),
                )
                .await
        }
        Err(_) => {
            state
                .sessions
                .flash(
                    &session.id,
                    FlashLevel::Warning,
                    format!("'{}' is not a valid month, expected YYYY-MM.", raw.trim()),
                )
                .await
        }
    }
}

async fn select_month(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Form(form): Form<MonthForm>,
) -> Redirect {
    change_month(&state, &session, &form.selected_month).await;
    Redirect::to("/")
}

async fn goto_month(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(month): Path<String>,
) -> Redirect {
    change_month(&state, &session, &month).await;
    Redirect::to("/")
}

// ========== services ==========

async fn form_page(
    state: &AppState,
    session: &AuthSession,
    heading: &str,
    action: &str,
    form: &ServiceForm,
    error: Option<&str>,
) -> Html<String> {
    let flashes = state.sessions.take_flashes(&session.id).await;
    let ctx = PageContext {
        username: &session.data.username,
        flashes: &flashes,
    };
    Html(html::render_service_form(&ctx, heading, action, form, error).into_string())
}

async fn new_service_page(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Html<String> {
    // Default to today when browsing the current month
    let month = session.data.selected_month;
    let today = Local::now().date_naive();
    let date = if month.contains(today) {
        today
    } else {
        month.first_day()
    };
    let form = ServiceForm::for_date(date);
    form_page(&state, &session, "Add service", "/services/new", &form, None).await
}

async fn create_service(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Form(form): Form<ServiceForm>,
) -> Result<Response> {
    let parsed = match form.parse() {
        Ok(parsed) => parsed,
        Err(AppError::Validation(msg)) => {
            let page =
                form_page(&state, &session, "Add service", "/services/new", &form, Some(msg.as_str()))
                    .await;
            return Ok((StatusCode::BAD_REQUEST, page).into_response());
        }
        Err(e) => return Err(e),
    };

    let id = {
        let conn = state.db.lock().await;
        db::insert_service(&conn, session.data.user_id, &parsed.input)?
    };
    info!(
        id = id,
        date = %parsed.input.date,
        hours = parsed.input.worked_hours,
        "Service added"
    );

    finish_save(&state, &session, parsed.input.date, parsed.warnings, "Service added.").await;
    Ok(Redirect::to("/").into_response())
}

/// Flash the outcome of a save and show the month the service landed in
async fn finish_save(
    state: &AppState,
    session: &AuthSession,
    date: chrono::NaiveDate,
    warnings: Vec<String>,
    message: &str,
) {
    for warning in warnings {
        state
            .sessions
            .flash(&session.id, FlashLevel::Warning, warning)
            .await;
    }
    state
        .sessions
        .flash(&session.id, FlashLevel::Success, message)
        .await;
    state
        .sessions
        .set_month(&session.id, YearMonth::of(date))
        .await;
}

async fn edit_service_page(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(id): Path<i64>,
) -> Result<Html<String>> {
    let service = {
        let conn = state.db.lock().await;
        db::get_service(&conn, session.data.user_id, id)?
    }
    .ok_or_else(|| AppError::not_found(format!("service {}", id)))?;

    let form = ServiceForm::from_service(&service);
    let action = format!("/services/{}/edit", id);
    Ok(form_page(&state, &session, "Edit service", &action, &form, None).await)
}

async fn update_service(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(id): Path<i64>,
    Form(form): Form<ServiceForm>,
) -> Result<Response> {
    let owned = {
        let conn = state.db.lock().await;
        db::get_service(&conn, session.data.user_id, id)?.is_some()
    };
    if !owned {
        return Err(AppError::not_found(format!("service {}", id)));
    }

    let parsed = match form.parse() {
        Ok(parsed) => parsed,
        Err(AppError::Validation(msg)) => {
            let action = format!("/services/{}/edit", id);
            let page =
                form_page(&state, &session, "Edit service", &action, &form, Some(msg.as_str())).await;
            return Ok((StatusCode::BAD_REQUEST, page).into_response());
        }
        Err(e) => return Err(e),
    };

    let updated = {
        let conn = state.db.lock().await;
        db::update_service(&conn, session.data.user_id, id, &parsed.input)?
    };
    if !updated {
        return Err(AppError::not_found(format!("service {}", id)));
    }
    info!(id = id, hours = parsed.input.worked_hours, "Service updated");

    finish_save(&state, &session, parsed.input.date, parsed.warnings, "Service updated.").await;
    Ok(Redirect::to("/").into_response())
}

async fn delete_service(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Path(id): Path<i64>,
) -> Result<Redirect> {
    let deleted = {
        let conn = state.db.lock().await;
        db::delete_service(&conn, session.data.user_id, id)?
    };
    if !deleted {
        return Err(AppError::not_found(format!("service {}", id)));
    }
    info!(id = id, "Service deleted");

    state
        .sessions
        .flash(&session.id, FlashLevel::Success, "Service deleted.")
        .await;
    Ok(Redirect::to("/"))
}

// ========== reports ==========

async fn send_report(
    state: &AppState,
    session: &AuthSession,
    format: ReportFormat,
    disposition: &str,
) -> Result<Response> {
    let report = load_report(state, &session.data, session.data.selected_month).await?;

    match report.render(format) {
        Ok(bytes) => {
            let file_name = report.file_name(format);
            info!(file = %file_name, bytes = bytes.len(), "Report generated");
            let headers = [
                (header::CONTENT_TYPE, format.content_type().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("{}; filename=\"{}\"", disposition, file_name),
                ),
            ];
            Ok((headers, bytes).into_response())
        }
        Err(e) => {
            error!(error = %e, month = %report.month, "Report generation failed");
            state
                .sessions
                .flash(
                    &session.id,
                    FlashLevel::Danger,
                    "The report could not be generated.",
                )
                .await;
            Ok(Redirect::to("/").into_response())
        }
    }
}

async fn report_pdf(State(state): State<Arc<AppState>>, session: AuthSession) -> Result<Response> {
    send_report(&state, &session, ReportFormat::Pdf, "attachment").await
}

async fn report_preview(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
) -> Result<Response> {
    send_report(&state, &session, ReportFormat::Pdf, "inline").await
}

async fn report_csv(State(state): State<Arc<AppState>>, session: AuthSession) -> Result<Response> {
    send_report(&state, &session, ReportFormat::Csv, "attachment").await
}

#[derive(Debug, Deserialize)]
struct ApiQuery {
    month: Option<String>,
}

/// Return a month's services and totals as JSON
async fn api_services(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Query(query): Query<ApiQuery>,
) -> Result<Json<MonthlyReport>> {
    let month = match query.month.as_deref() {
        Some(raw) => raw.parse()?,
        None => session.data.selected_month,
    };
    Ok(Json(load_report(&state, &session.data, month).await?))
}

async fn not_found() -> AppError {
    AppError::not_found("page")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::hours::parse_clock;
    use crate::types::{ServiceInput, SubTaskInput};

    fn test_state() -> Arc<AppState> {
        let conn = db::open_in_memory().unwrap();
        let hash = auth::hash_password("secret").unwrap();
        db::create_user(&conn, "ana", &hash).unwrap();
        db::create_user(&conn, "bob", &hash).unwrap();
        AppState::new(conn, Duration::from_secs(600))
    }

    async fn add_service(state: &AppState, username: &str, place: &str, day: &str) -> i64 {
        let conn = state.db.lock().await;
        let user = db::find_user_by_username(&conn, username).unwrap().unwrap();
        let input = ServiceInput::new(
            place,
            chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
            parse_clock("09:00").unwrap(),
            parse_clock("17:00").unwrap(),
            30,
            true,
            "",
            vec![SubTaskInput::new("Inventory", 2.0).unwrap()],
        )
        .unwrap();
        db::insert_service(&conn, user.id, &input).unwrap()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        cookie: Option<&str>,
        form: Option<&str>,
    ) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let body = match form {
            Some(form) => {
                request = request.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    /// Log in and return the `Cookie` header value for the session
    async fn login(app: &Router, username: &str) -> String {
        let form = format!("username={}&password=secret", username);
        let response = send(app, "POST", "/login", None, Some(&form)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn select(app: &Router, cookie: &str, month: &str) {
        let uri = format!("/month/{}", month);
        let response = send(app, "GET", &uri, Some(cookie), None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    // ========== auth tests ==========

    #[tokio::test]
    async fn test_protected_routes_redirect_to_login() {
        let app = router(test_state());
        for uri in ["/", "/services/new", "/report.csv", "/api/services"] {
            let response = send(&app, "GET", uri, None, None).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
            assert_eq!(location(&response), "/login");
        }

        let response = send(&app, "GET", "/", Some("horas_session=bogus"), None).await;
        assert_eq!(location(&response), "/login");
    }

    #[tokio::test]
    async fn test_bad_credentials() {
        let app = router(test_state());
        let response = send(
            &app,
            "POST",
            "/login",
            None,
            Some("username=ana&password=nope"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(body_text(response).await.contains("Invalid username or password."));

        let response = send(
            &app,
            "POST",
            "/login",
            None,
            Some("username=nobody&password=secret"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_corrupt_password_hash_is_a_server_error() {
        let state = test_state();
        {
            let conn = state.db.lock().await;
            db::create_user(&conn, "carla", "not-a-hash").unwrap();
        }
        let app = router(state);
        let response = send(
            &app,
            "POST",
            "/login",
            None,
            Some("username=carla&password=secret"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(!body_text(response).await.contains("not-a-hash"));
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let app = router(test_state());
        let cookie = login(&app, "ana").await;

        let response = send(&app, "GET", "/", Some(&cookie), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("ana"));

        // Already logged in
        let response = send(&app, "GET", "/login", Some(&cookie), None).await;
        assert_eq!(location(&response), "/");

        let response = send(&app, "GET", "/logout", Some(&cookie), None).await;
        assert_eq!(location(&response), "/login?logged_out=1");

        let response = send(&app, "GET", "/", Some(&cookie), None).await;
        assert_eq!(location(&response), "/login");

        let response = send(&app, "GET", "/login?logged_out=1", None, None).await;
        assert!(body_text(response).await.contains("You have been logged out."));
    }

    // ========== service tests ==========

    #[tokio::test]
    async fn test_add_service_with_subtasks() {
        let state = test_state();
        let app = router(state.clone());
        let cookie = login(&app, "ana").await;

        let form = "place=Warehouse&date=2025-01-15&entry_time=09%3A00&exit_time=17%3A00\
                    &break_duration=30&observations=Stocktake\
                    &subtask_description%5B%5D=Inventory&subtask_hours%5B%5D=2%2C5\
                    &subtask_description%5B%5D=Loading&subtask_hours%5B%5D=lots\
                    &subtask_description%5B%5D=&subtask_hours%5B%5D=";
        let response = send(&app, "POST", "/services/new", Some(&cookie), Some(form)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        // The list jumps to the month of the new service
        let page = body_text(send(&app, "GET", "/", Some(&cookie), None).await).await;
        assert!(page.contains("January 2025"));
        assert!(page.contains("Warehouse"));
        assert!(page.contains("7.50"));
        assert!(page.contains("Inventory: 2.50 h"));
        assert!(page.contains("Service added."));
        assert!(page.contains("Loading"));
        assert!(page.contains("flash flash-warning"));

        let conn = state.db.lock().await;
        let ana = db::find_user_by_username(&conn, "ana").unwrap().unwrap();
        let services =
            db::list_services_for_month(&conn, ana.id, "2025-01".parse().unwrap()).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].subtasks.len(), 1);
        assert_eq!(services[0].observations, "Stocktake");
    }

    #[tokio::test]
    async fn test_invalid_service_form_keeps_input() {
        let state = test_state();
        let app = router(state.clone());
        let cookie = login(&app, "ana").await;

        let form = "place=Warehouse&date=2025-01-15&entry_time=nine&exit_time=17%3A00\
                    &break_duration=30";
        let response = send(&app, "POST", "/services/new", Some(&cookie), Some(form)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let page = body_text(response).await;
        assert!(page.contains("value=\"Warehouse\""));
        assert!(page.contains("flash flash-danger"));

        let conn = state.db.lock().await;
        assert_eq!(db::count_services(&conn, 1).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_edit_service() {
        let state = test_state();
        let id = add_service(&state, "ana", "Office", "2025-01-10").await;
        let app = router(state.clone());
        let cookie = login(&app, "ana").await;

        let uri = format!("/services/{}/edit", id);
        let page = body_text(send(&app, "GET", &uri, Some(&cookie), None).await).await;
        assert!(page.contains("value=\"Office\""));
        assert!(page.contains("value=\"Inventory\""));

        let form = "place=Depot&date=2025-01-10&entry_time=22%3A00&exit_time=06%3A00\
                    &break_duration=60&no_discount_break=on";
        let response = send(&app, "POST", &uri, Some(&cookie), Some(form)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let conn = state.db.lock().await;
        let service = db::get_service(&conn, 1, id).unwrap().unwrap();
        assert_eq!(service.place, "Depot");
        assert_eq!(service.worked_hours, 8.0);
        assert!(!service.discount_break);
        assert!(service.subtasks.is_empty());
    }

    #[tokio::test]
    async fn test_other_users_services_are_not_found() {
        let state = test_state();
        let id = add_service(&state, "bob", "Bob's place", "2025-01-10").await;
        let app = router(state.clone());
        let cookie = login(&app, "ana").await;

        let edit = format!("/services/{}/edit", id);
        let response = send(&app, "GET", &edit, Some(&cookie), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let form = "place=Mine&date=2025-01-10&entry_time=09%3A00&exit_time=10%3A00";
        let response = send(&app, "POST", &edit, Some(&cookie), Some(form)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Ownership is checked before the form is validated
        let invalid = "place=&date=2025-01-10&entry_time=nine&exit_time=10%3A00";
        let response = send(&app, "POST", &edit, Some(&cookie), Some(invalid)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let delete = format!("/services/{}/delete", id);
        let response = send(&app, "POST", &delete, Some(&cookie), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let conn = state.db.lock().await;
        assert_eq!(db::count_services(&conn, 2).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_service() {
        let state = test_state();
        let id = add_service(&state, "ana", "Office", "2025-01-10").await;
        let app = router(state.clone());
        let cookie = login(&app, "ana").await;

        let uri = format!("/services/{}/delete", id);
        let response = send(&app, "POST", &uri, Some(&cookie), None).await;
        assert_eq!(location(&response), "/");

        let conn = state.db.lock().await;
        assert_eq!(db::count_services(&conn, 1).unwrap(), 0);
    }

    // ========== month tests ==========

    #[tokio::test]
    async fn test_select_month() {
        let state = test_state();
        add_service(&state, "ana", "Office", "2024-11-05").await;
        let app = router(state);
        let cookie = login(&app, "ana").await;

        let response = send(
            &app,
            "POST",
            "/month",
            Some(&cookie),
            Some("selected_month=2024-11"),
        )
        .await;
        assert_eq!(location(&response), "/");
        let page = body_text(send(&app, "GET", "/", Some(&cookie), None).await).await;
        assert!(page.contains("November 2024"));
        assert!(page.contains("Office"));
        assert!(page.contains("flash flash-info"));
        assert!(page.contains("Showing November 2024."));

        send(
            &app,
            "POST",
            "/month",
            Some(&cookie),
            Some("selected_month=2024-13"),
        )
        .await;
        let page = body_text(send(&app, "GET", "/", Some(&cookie), None).await).await;
        assert!(page.contains("not a valid month"));
        assert!(page.contains("November 2024"));
    }

    // ========== report tests ==========

    #[tokio::test]
    async fn test_csv_download() {
        let state = test_state();
        add_service(&state, "ana", "Office", "2025-01-10").await;
        let app = router(state);
        let cookie = login(&app, "ana").await;
        select(&app, &cookie, "2025-01").await;

        let response = send(&app, "GET", "/report.csv", Some(&cookie), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"worked_hours_ana_2025-01.csv\""
        );
        let body = body_text(response).await;
        assert!(body.starts_with("Date,Place,Entry"));
        assert!(body.contains("Office"));
    }

    #[tokio::test]
    async fn test_pdf_preview_is_inline() {
        let state = test_state();
        add_service(&state, "ana", "Office", "2025-01-10").await;
        let app = router(state);
        let cookie = login(&app, "ana").await;
        select(&app, &cookie, "2025-01").await;

        let response = send(&app, "GET", "/report/preview", Some(&cookie), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "inline; filename=\"worked_hours_ana_2025-01.pdf\""
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_api_services() {
        let state = test_state();
        add_service(&state, "ana", "Office", "2025-01-10").await;
        add_service(&state, "bob", "Elsewhere", "2025-01-11").await;
        let app = router(state);
        let cookie = login(&app, "ana").await;

        let response = send(&app, "GET", "/api/services?month=2025-01", Some(&cookie), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["month"], "2025-01");
        assert_eq!(json["total_hours"], 7.5);
        assert_eq!(json["services"].as_array().unwrap().len(), 1);
        assert_eq!(json["services"][0]["subtasks"][0]["description"], "Inventory");

        let response = send(&app, "GET", "/api/services?month=jan", Some(&cookie), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = router(test_state());
        let response = send(&app, "GET", "/nope", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
