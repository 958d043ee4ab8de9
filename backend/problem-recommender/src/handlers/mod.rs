use crate::error::AppError;
use crate::models::{RecommendationFilters, RecommendedProblem};
use crate::services::{Recommender, RecommenderStatus};
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub struct AppState {
    pub recommender: Arc<Recommender>,
    pub default_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct RecommendQuery {
    pub handle: Option<String>,
    pub count: Option<usize>,
    pub min_rating: Option<i32>,
    pub max_rating: Option<i32>,
    /// Comma-separated tag list
    pub tags: Option<String>,
}

impl RecommendQuery {
    pub fn filters(&self) -> RecommendationFilters {
        RecommendationFilters {
            min_rating: self.min_rating,
            max_rating: self.max_rating,
            tags: self
                .tags
                .as_deref()
                .map(split_tags)
                .filter(|tags| !tags.is_empty()),
        }
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<RecommendedProblem>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub recommender: RecommenderStatus,
}

/// GET /recommend
/// Unsolved problems ranked by similarity to the user's profile
#[get("/recommend")]
pub async fn recommend(
    state: web::Data<AppState>,
    query: web::Query<RecommendQuery>,
) -> Result<HttpResponse, AppError> {
    let handle = match query.handle.as_deref().map(str::trim) {
        Some(handle) if !handle.is_empty() => handle,
        _ => return Err(AppError::BadRequest("User handle is required".into())),
    };

    let count = query.count.unwrap_or(state.default_count);
    let filters = query.filters();
    info!(
        handle = %handle,
        count,
        min_rating = ?filters.min_rating,
        max_rating = ?filters.max_rating,
        tags = ?filters.tags,
        "Recommendation request"
    );

    let recommendations = state.recommender.recommend(handle, count, &filters).await;
    Ok(HttpResponse::Ok().json(RecommendResponse { recommendations }))
}

/// POST /refresh
/// Refetch the problem corpus immediately
#[post("/refresh")]
pub async fn refresh(state: web::Data<AppState>) -> HttpResponse {
    match state.recommender.refresh().await {
        Ok(summary) => {
            info!(problems = summary.problems, "Manual refresh completed");
            HttpResponse::Ok().json(json!({
                "status": "success",
                "message": "Problem data refreshed"
            }))
        }
        Err(e) => {
            error!(error = %e, "Manual refresh failed");
            HttpResponse::InternalServerError().json(json!({
                "status": "error",
                "message": "Failed to refresh problem data"
            }))
        }
    }
}

/// GET /health
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        recommender: state.recommender.status().await,
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(recommend).service(refresh).service(health);
}
