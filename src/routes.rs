use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, warn};

use crate::cache::ResultCache;
use crate::comments::{Comment, CommentStore, NewComment};
use crate::config::Config;
use crate::error::StoreError;
use crate::news::{Article, NewsClient, SearchMode};

pub struct AppState {
    pub news: ResultCache<NewsClient>,
    pub comments: CommentStore,
    pub config: Config,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/comments", get(comments_feed).post(submit_comment))
        .route("/health", get(health))
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Inline message; `kind` doubles as the CSS class.
pub struct Notice {
    pub kind: &'static str,
    pub text: String,
}

impl Notice {
    fn info(text: impl Into<String>) -> Self {
        Self { kind: "info", text: text.into() }
    }

    fn success(text: impl Into<String>) -> Self {
        Self { kind: "success", text: text.into() }
    }

    fn warning(text: impl Into<String>) -> Self {
        Self { kind: "warning", text: text.into() }
    }

    fn error(text: impl Into<String>) -> Self {
        Self { kind: "error", text: text.into() }
    }
}

pub struct ArticleView {
    pub title: String,
    pub source_name: String,
    pub author: String,
    pub published: String,
    pub description: String,
    pub url: String,
}

impl From<&Article> for ArticleView {
    fn from(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            source_name: article.source_name.clone(),
            author: article.author.clone().unwrap_or_default(),
            published: article
                .published_at
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            description: article.description.clone().unwrap_or_default(),
            url: article.url.clone(),
        }
    }
}

pub struct CommentView {
    pub name: String,
    pub body: String,
    pub created: String,
    pub created_unknown: bool,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            created: comment.created_at.to_string(),
            created_unknown: comment.created_at.is_unknown(),
            name: comment.name,
            body: comment.body,
        }
    }
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub query: String,
    pub title_only: bool,
    pub search_notices: Vec<Notice>,
    pub articles: Vec<ArticleView>,
    pub comments: Vec<CommentView>,
    pub comment_notices: Vec<Notice>,
}

#[derive(Template)]
#[template(path = "comments.html")]
pub struct CommentsTemplate {
    pub comments: Vec<CommentView>,
    pub comment_notices: Vec<Notice>,
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

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub mode: SearchMode,
}

#[derive(Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub comment: String,
}

// Route handlers
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let mut search_notices = Vec::new();
    let mut articles = Vec::new();

    let typed = query.q.as_deref().map(str::trim);
    match typed {
        None => {}
        Some("") => search_notices.push(Notice::warning("Please enter a search query.")),
        Some(q) => match state.news.get(q, query.mode).await {
            Ok(found) if found.is_empty() => {
                search_notices.push(Notice::info(format!("No news found for '{}'.", q)));
            }
            Ok(found) => {
                let shown = found.len().min(state.config.top_n);
                search_notices.push(Notice::success(format!(
                    "Found {} articles. Showing the top {}:",
                    found.len(),
                    shown
                )));
                articles = found
                    .iter()
                    .take(state.config.top_n)
                    .map(ArticleView::from)
                    .collect();
            }
            Err(e) => {
                warn!("News search for '{}' failed: {}", q, e);
                search_notices.push(Notice::error(e.user_message()));
            }
        },
    }

    let (comments, comment_notices) = load_comments(&state.comments, Vec::new()).await;

    HtmlTemplate(IndexTemplate {
        query: typed
            .map(str::to_string)
            .unwrap_or_else(|| state.config.default_query.clone()),
        title_only: query.mode == SearchMode::TitleOnly,
        search_notices,
        articles,
        comments,
        comment_notices,
    })
}

pub async fn comments_feed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (comments, comment_notices) = load_comments(&state.comments, Vec::new()).await;
    HtmlTemplate(CommentsTemplate {
        comments,
        comment_notices,
    })
}

pub async fn submit_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<CommentForm>,
) -> Response {
    let notice = match NewComment::new(&form.name, &form.comment) {
        Err(e) => Notice::warning(e.to_string()),
        Ok(comment) => match state.comments.insert(&comment).await {
            Ok(_) => Notice::success("Thanks! Your comment was posted."),
            Err(e) => {
                error!("Failed to store comment: {}", e);
                Notice::error(store_message(&e))
            }
        },
    };

    let (comments, comment_notices) = load_comments(&state.comments, vec![notice]).await;

    // A plain form post (no htmx) gets the whole page back
    if !headers.contains_key("hx-request") {
        return HtmlTemplate(IndexTemplate {
            query: state.config.default_query.clone(),
            title_only: false,
            search_notices: Vec::new(),
            articles: Vec::new(),
            comments,
            comment_notices,
        })
        .into_response();
    }

    HtmlTemplate(CommentsTemplate {
        comments,
        comment_notices,
    })
    .into_response()
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

/// Comment list plus any notices to show above it. Store failures become a
/// notice so the rest of the page still renders.
async fn load_comments(
    store: &CommentStore,
    mut notices: Vec<Notice>,
) -> (Vec<CommentView>, Vec<Notice>) {
    match store.list_all().await {
        Ok(comments) => {
            if comments.is_empty() {
                notices.push(Notice::info("No comments yet. Be the first!"));
            }
            (comments.into_iter().map(CommentView::from).collect(), notices)
        }
        Err(e) => {
            // Skip repeating the same failure the submit already reported
            if notices.iter().all(|n| n.kind != "error") {
                warn!("Failed to load comments: {}", e);
                notices.push(Notice::error(store_message(&e)));
            }
            (Vec::new(), notices)
        }
    }
}

fn store_message(err: &StoreError) -> String {
    match err {
        StoreError::Config(e) => format!("Comments are unavailable. {}", e),
        StoreError::ConnectionFailed(_) => {
            "Could not reach the comment database. Please try again later.".to_string()
        }
        StoreError::Query(_) => "The comment database returned an error.".to_string(),
    }
}
