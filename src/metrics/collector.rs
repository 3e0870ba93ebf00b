/// Bounded ring of graph-query records (S1). Read-only aggregation, O(1)
/// insert with oldest-first eviction.
use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    GetDependencies,
    GetDependents,
    GetPath,
    GetArchitecture,
}

impl QueryType {
    const ALL: [QueryType; 4] = [
        QueryType::GetDependencies,
        QueryType::GetDependents,
        QueryType::GetPath,
        QueryType::GetArchitecture,
    ];
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphQueryRecord {
    pub query_type: QueryType,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub result_count: usize,
    pub depth: Option<u32>,
    pub from_cache: bool,
    pub repository: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct QueryAggregate {
    pub count: usize,
    pub avg_ms: f64,
    pub max_ms: u64,
    pub min_ms: u64,
    pub cache_hit_rate: f64,
    pub avg_result_count: f64,
    pub error_count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MetricsSnapshot {
    pub total_count: usize,
    pub by_query_type: Vec<(QueryType, QueryAggregate)>,
    pub trend_7d_count: usize,
}

pub struct MetricsCollector {
    capacity: usize,
    records: Mutex<VecDeque<GraphQueryRecord>>,
}

impl MetricsCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, rec: GraphQueryRecord) {
        let mut records = self.records.lock().expect("metrics ring poisoned");
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(rec);
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("metrics ring poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let records = self.records.lock().expect("metrics ring poisoned");
        let total_count = records.len();
        let cutoff = Utc::now() - ChronoDuration::days(7);
        let trend_7d_count = records.iter().filter(|r| r.timestamp >= cutoff).count();

        let by_query_type = QueryType::ALL
            .iter()
            .map(|&qt| {
                let matching: Vec<&GraphQueryRecord> =
                    records.iter().filter(|r| r.query_type == qt).collect();
                (qt, aggregate(&matching))
            })
            .collect();

        MetricsSnapshot {
            total_count,
            by_query_type,
            trend_7d_count,
        }
    }
}

fn aggregate(records: &[&GraphQueryRecord]) -> QueryAggregate {
    if records.is_empty() {
        return QueryAggregate::default();
    }
    let count = records.len();
    let total_ms: u64 = records.iter().map(|r| r.duration_ms).sum();
    let max_ms = records.iter().map(|r| r.duration_ms).max().unwrap_or(0);
    let min_ms = records.iter().map(|r| r.duration_ms).min().unwrap_or(0);
    let cache_hits = records.iter().filter(|r| r.from_cache).count();
    let total_results: usize = records.iter().map(|r| r.result_count).sum();
    let error_count = records.iter().filter(|r| r.error.is_some()).count();

    QueryAggregate {
        count,
        avg_ms: total_ms as f64 / count as f64,
        max_ms,
        min_ms,
        cache_hit_rate: cache_hits as f64 / count as f64,
        avg_result_count: total_results as f64 / count as f64,
        error_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(repo: &str) -> GraphQueryRecord {
        GraphQueryRecord {
            query_type: QueryType::GetDependencies,
            timestamp: Utc::now(),
            duration_ms: 10,
            result_count: 1,
            depth: Some(1),
            from_cache: false,
            repository: repo.to_owned(),
            error: None,
        }
    }

    #[test]
    fn ring_evicts_oldest_first_beyond_capacity() {
        let collector = MetricsCollector::new(3);
        for i in 0..5 {
            collector.record(sample(&format!("repo-{i}")));
        }
        assert_eq!(collector.len(), 3);
        let records = collector.records.lock().unwrap();
        let repos: Vec<&str> = records.iter().map(|r| r.repository.as_str()).collect();
        assert_eq!(repos, vec!["repo-2", "repo-3", "repo-4"]);
    }

    #[test]
    fn aggregation_is_read_only() {
        let collector = MetricsCollector::new(10);
        collector.record(sample("a"));
        let before = collector.len();
        let _ = collector.snapshot();
        let _ = collector.snapshot();
        assert_eq!(collector.len(), before);
    }

    #[test]
    fn snapshot_computes_avg_and_cache_hit_rate() {
        let collector = MetricsCollector::new(10);
        let mut a = sample("repo");
        a.duration_ms = 10;
        a.from_cache = true;
        let mut b = sample("repo");
        b.duration_ms = 20;
        b.from_cache = false;
        collector.record(a);
        collector.record(b);
        let snapshot = collector.snapshot();
        let (_, agg) = snapshot
            .by_query_type
            .iter()
            .find(|(qt, _)| *qt == QueryType::GetDependencies)
            .unwrap();
        assert_eq!(agg.count, 2);
        assert_eq!(agg.avg_ms, 15.0);
        assert_eq!(agg.cache_hit_rate, 0.5);
    }
}
