use std::future::Future;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::aggregator::{Aggregator, LoadOutcome};
use crate::render::{
    grid_for_outcome, DisplayClock, NewsGrid, StatusLine, StoryCard, FETCH_ERROR_MESSAGE,
    NO_STORIES_MESSAGE,
};

pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub clock: DisplayClock,
    pub branding_image: String,
}

pub struct Notice {
    pub class: &'static str,
    pub text: String,
    /// Re-request the panel until the running cycle finishes
    pub poll: bool,
}

impl Notice {
    fn new(class: &'static str, text: impl Into<String>) -> Option<Self> {
        Some(Self {
            class,
            text: text.into(),
            poll: false,
        })
    }

    fn polling(text: impl Into<String>) -> Option<Self> {
        Some(Self {
            class: "loading",
            text: text.into(),
            poll: true,
        })
    }
}

/// Everything the status line and grid need.
pub struct NewsPanel {
    pub status_text: String,
    pub status_class: &'static str,
    pub cards: Vec<StoryCard>,
    /// Shown instead of cards
    pub notice: Option<Notice>,
    pub branding_image: String,
}

impl NewsPanel {
    pub fn from_outcome(outcome: &LoadOutcome, state: &AppState) -> Self {
        let status = StatusLine::from_outcome(outcome, &state.clock);
        let settings = state.aggregator.settings();
        let grid = grid_for_outcome(
            outcome,
            &settings.placeholder_image,
            state.aggregator.feeds().len(),
        );

        let (cards, notice) = match grid {
            NewsGrid::Cards(cards) => (cards, None),
            NewsGrid::Empty => (Vec::new(), Notice::new("error", NO_STORIES_MESSAGE)),
            NewsGrid::Error => (Vec::new(), Notice::new("error", FETCH_ERROR_MESSAGE)),
            NewsGrid::Loading { source_count } => (
                Vec::new(),
                Notice::polling(format!("Fetching from {} sources...", source_count)),
            ),
        };

        let status_class = status.css_class();
        Self {
            status_text: status.text,
            status_class,
            cards,
            notice,
            branding_image: state.branding_image.clone(),
        }
    }
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub panel: NewsPanel,
    pub refreshing: bool,
}

#[derive(Template)]
#[template(path = "news_panel.html")]
pub struct NewsPanelTemplate {
    pub panel: NewsPanel,
}

#[derive(Template)]
#[template(path = "refresh_button.html")]
pub struct RefreshButtonTemplate {
    pub refreshing: bool,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .route("/cache/clear", post(clear_cache))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs a load on its own task so a dropped request cannot cut it short.
async fn run_detached<F>(cycle: F) -> LoadOutcome
where
    F: Future<Output = LoadOutcome> + Send + 'static,
{
    match tokio::spawn(cycle).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("News load task failed: {}", e);
            LoadOutcome::Failed {
                message: e.to_string(),
            }
        }
    }
}

// Route handlers
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let aggregator = state.aggregator.clone();
    let outcome = run_detached(async move { aggregator.load_news().await }).await;
    let refreshing = state.aggregator.is_refreshing();

    HtmlTemplate(IndexTemplate {
        panel: NewsPanel::from_outcome(&outcome, &state),
        refreshing,
    })
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let aggregator = state.aggregator.clone();
    let outcome = run_detached(async move { aggregator.load_news().await }).await;
    HtmlTemplate(NewsPanelTemplate {
        panel: NewsPanel::from_outcome(&outcome, &state),
    })
}

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let aggregator = state.aggregator.clone();
    let outcome = run_detached(async move { aggregator.clear_cache().await }).await;
    HtmlTemplate(NewsPanelTemplate {
        panel: NewsPanel::from_outcome(&outcome, &state),
    })
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let refreshing = state.aggregator.is_refreshing();
    HtmlTemplate(RefreshButtonTemplate { refreshing })
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
