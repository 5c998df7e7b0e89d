use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::features::reports::models::ReportCategory;

/// Report counts per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusCountsDto {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CategoryCountDto {
    pub category: ReportCategory,
    pub count: usize,
}

/// Staff dashboard aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardStatsDto {
    #[serde(flatten)]
    pub counts: StatusCountsDto,
    /// Categories with at least one report, in declaration order
    pub categories: Vec<CategoryCountDto>,
    /// Percentage of reports resolved, one decimal place
    pub resolution_rate: f64,
    /// Mean days from creation to last update over resolved reports, one
    /// decimal place
    pub average_resolution_days: f64,
}

/// A citizen's own report counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CitizenSummaryDto {
    pub citizen_id: String,
    #[serde(flatten)]
    pub counts: StatusCountsDto,
}
