//! Dashboard aggregations

use qcflow_common::validation::safe_average;
use qcflow_common::{Result, Role};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::db;
use crate::models::{ModelPerformance, RootCauseCategory};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOverview {
    pub total: i64,
    pub fabricated: i64,
    pub lab_tested: i64,
    pub analyzed: i64,
    /// Registered but not yet analyzed
    pub pending_analysis: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackOverview {
    pub total: i64,
    pub correct: i64,
    pub incorrect: i64,
    /// Share confirmed correct, 0..1
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub processes: ProcessOverview,
    pub predictions: i64,
    pub average_confidence: f64,
    pub feedback: FeedbackOverview,
    /// Active users keyed by role name
    pub active_users: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: RootCauseCategory,
    pub label: &'static str,
    pub responsible_role: Role,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCauseCount {
    pub root_cause: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCauseBreakdown {
    pub categories: Vec<CategoryCount>,
    pub top_root_causes: Vec<RootCauseCount>,
}

pub async fn overview(pool: &SqlitePool) -> Result<Overview> {
    let counts = db::statistics::process_counts(pool).await?;
    let confidences = db::statistics::prediction_confidences(pool).await?;
    let (total_feedback, incorrect) = db::feedback::totals(pool).await?;
    let active_users = db::statistics::active_users_by_role(pool)
        .await?
        .into_iter()
        .map(|(role, count)| (role.to_string(), count))
        .collect();

    Ok(Overview {
        processes: ProcessOverview {
            total: counts.total,
            fabricated: counts.fabricated,
            lab_tested: counts.lab_tested,
            analyzed: counts.analyzed,
            pending_analysis: counts.total - counts.analyzed,
        },
        predictions: confidences.len() as i64,
        average_confidence: safe_average(&confidences),
        feedback: FeedbackOverview {
            total: total_feedback,
            correct: total_feedback - incorrect,
            incorrect,
            accuracy: ModelPerformance::accuracy_of(total_feedback, incorrect),
        },
        active_users,
    })
}

pub async fn root_cause_breakdown(pool: &SqlitePool, top: i64) -> Result<RootCauseBreakdown> {
    let categories = db::statistics::category_counts(pool)
        .await?
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category,
            label: category.label(),
            responsible_role: category.responsible_role(),
            count,
        })
        .collect();

    let top_root_causes = db::statistics::top_root_causes(pool, top)
        .await?
        .into_iter()
        .map(|(root_cause, count)| RootCauseCount { root_cause, count })
        .collect();

    Ok(RootCauseBreakdown {
        categories,
        top_root_causes,
    })
}
