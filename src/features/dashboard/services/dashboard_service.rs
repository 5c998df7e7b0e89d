use std::sync::Arc;

use crate::features::dashboard::dtos::*;
use crate::features::reports::models::{Report, ReportCategory, ReportStatus};
use crate::features::reports::services::ReportStore;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Read-only aggregates over the report mirror
pub struct DashboardService {
    store: Arc<ReportStore>,
}

impl DashboardService {
    pub fn new(store: Arc<ReportStore>) -> Self {
        Self { store }
    }

    pub fn stats(&self) -> DashboardStatsDto {
        compute_stats(&self.store.snapshot())
    }

    pub fn citizen_summary(&self, citizen_id: &str) -> CitizenSummaryDto {
        let snapshot = self.store.snapshot();
        let own: Vec<&Report> = snapshot
            .iter()
            .filter(|r| r.citizen_id == citizen_id)
            .collect();
        CitizenSummaryDto {
            citizen_id: citizen_id.to_string(),
            counts: status_counts(own.iter().copied()),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub(crate) fn status_counts<'a>(
    reports: impl IntoIterator<Item = &'a Report>,
) -> StatusCountsDto {
    reports
        .into_iter()
        .fold(StatusCountsDto::default(), |mut counts, report| {
            counts.total += 1;
            match report.status {
                ReportStatus::Pending => counts.pending += 1,
                ReportStatus::InProgress => counts.in_progress += 1,
                ReportStatus::Resolved => counts.resolved += 1,
            }
            counts
        })
}

pub(crate) fn compute_stats(reports: &[Report]) -> DashboardStatsDto {
    let counts = status_counts(reports);

    let categories = ReportCategory::ALL
        .iter()
        .map(|&category| CategoryCountDto {
            category,
            count: reports.iter().filter(|r| r.category == category).count(),
        })
        .filter(|c| c.count > 0)
        .collect();

    let resolution_rate = if counts.total == 0 {
        0.0
    } else {
        counts.resolved as f64 / counts.total as f64 * 100.0
    };

    let resolution_days: Vec<f64> = reports
        .iter()
        .filter(|r| r.status == ReportStatus::Resolved)
        .map(|r| {
            let open = r.updated_at - r.created_at;
            open.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
        })
        .collect();
    let average_resolution_days = if resolution_days.is_empty() {
        0.0
    } else {
        resolution_days.iter().sum::<f64>() / resolution_days.len() as f64
    };

    DashboardStatsDto {
        counts,
        categories,
        resolution_rate: round1(resolution_rate),
        average_resolution_days: round1(average_resolution_days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::reports::models::{ReportLocation, SyncState};
    use chrono::{Duration, TimeZone, Utc};

    fn report(category: ReportCategory, status: ReportStatus, open_days: i64) -> Report {
        let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Report {
            id: format!("r-{}-{}", category, open_days),
            title: "Issue".to_string(),
            description: "Something is broken".to_string(),
            category,
            status,
            citizen_id: "u1".to_string(),
            citizen_name: "Jane".to_string(),
            location: ReportLocation {
                lat: 40.7128,
                lng: -74.006,
                address: String::new(),
            },
            photos: vec![],
            created_at,
            updated_at: created_at + Duration::days(open_days),
            client_ref: None,
            sync_state: SyncState::Synced,
        }
    }

    #[test]
    fn test_empty_mirror() {
        let stats = compute_stats(&[]);
        assert_eq!(stats.counts, StatusCountsDto::default());
        assert!(stats.categories.is_empty());
        assert_eq!(stats.resolution_rate, 0.0);
        assert_eq!(stats.average_resolution_days, 0.0);
    }

    #[test]
    fn test_counts_and_rates() {
        let reports = vec![
            report(ReportCategory::Infrastructure, ReportStatus::Resolved, 2),
            report(ReportCategory::Infrastructure, ReportStatus::Pending, 0),
            report(ReportCategory::Safety, ReportStatus::Resolved, 5),
        ];
        let stats = compute_stats(&reports);

        assert_eq!(stats.counts.total, 3);
        assert_eq!(stats.counts.pending, 1);
        assert_eq!(stats.counts.in_progress, 0);
        assert_eq!(stats.counts.resolved, 2);
        assert_eq!(stats.resolution_rate, 66.7);
        assert_eq!(stats.average_resolution_days, 3.5);
        assert_eq!(
            stats.categories,
            vec![
                CategoryCountDto {
                    category: ReportCategory::Infrastructure,
                    count: 2
                },
                CategoryCountDto {
                    category: ReportCategory::Safety,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_unresolved_reports_do_not_count_towards_resolution_time() {
        let reports = vec![
            report(ReportCategory::Other, ReportStatus::InProgress, 30),
            report(ReportCategory::Other, ReportStatus::Resolved, 1),
        ];
        let stats = compute_stats(&reports);
        assert_eq!(stats.average_resolution_days, 1.0);
        assert_eq!(stats.resolution_rate, 50.0);
    }
}
