//! Effect listing.

use axum::Json;
use serde::Serialize;

use backdrop_models::{Effect, EffectInfo};

#[derive(Serialize)]
pub struct FiltersResponse {
    pub filters: Vec<EffectInfo>,
}

/// List the available background effects.
pub async fn list_filters() -> Json<FiltersResponse> {
    Json(FiltersResponse {
        filters: Effect::ALL.iter().map(Effect::info).collect(),
    })
}
