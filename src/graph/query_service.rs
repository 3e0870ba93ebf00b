/// Graph Query Service (C3, §4.4): the user-facing query surface sitting
/// over a `GraphAdapter`, with a bounded LRU+TTL cache and metrics.
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::timeout;

use super::adapter::{clamp_depth, ContextSpec, DependencyAnalysisSpec, GraphAdapter};
use super::cache::{QueryCache, DEFAULT_CAPACITY, DEFAULT_TTL};
use super::error::GraphServiceError;
use super::types::{
    impact_score, ArchitectureNode, ArchitectureResult, DependencyResult, Direction, ImpactAnalysis, PathResult,
    QueryMetadata,
};
use crate::metrics::{GraphQueryRecord, MetricsCollector, QueryType};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct DependenciesArgs {
    pub entity_type: String,
    pub entity_path: String,
    pub repository: String,
    pub depth: u8,
    pub include_transitive: bool,
    pub relationship_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathArgs {
    pub from_entity: String,
    pub to_entity: String,
    pub repository: String,
    pub max_hops: u8,
    pub relationship_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureDetailLevel {
    Packages,
    Modules,
    Files,
    Entities,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchitectureArgs {
    pub repository: String,
    pub scope: Option<String>,
    pub detail_level: ArchitectureDetailLevel,
    pub include_external: bool,
}

pub struct GraphQueryService {
    adapter: Arc<dyn GraphAdapter>,
    cache: QueryCache<serde_json::Value>,
    metrics: Arc<MetricsCollector>,
    timeout: Duration,
}

impl GraphQueryService {
    pub fn new(adapter: Arc<dyn GraphAdapter>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            adapter,
            cache: QueryCache::new(DEFAULT_CAPACITY, DEFAULT_TTL),
            metrics,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn clear_cache_for_repository(&self, repository: &str) {
        self.cache.clear_for_repository(repository);
    }

    pub async fn get_dependencies(&self, args: DependenciesArgs) -> Result<DependencyResult, GraphServiceError> {
        self.get_dependencies_with_direction(args, Direction::DependsOn, QueryType::GetDependencies, "getDependencies")
            .await
    }

    /// Dependents are queried with the reverse direction (§4.4's symmetric
    /// contract), not by re-running the dependencies query and re-labelling
    /// the result — the two must diverge for entities with both incoming
    /// and outgoing edges.
    pub async fn get_dependents(&self, args: DependenciesArgs) -> Result<(DependencyResult, ImpactAnalysis), GraphServiceError> {
        let result = self
            .get_dependencies_with_direction(args, Direction::DependedOnBy, QueryType::GetDependents, "getDependents")
            .await?;
        let direct = result.direct.len();
        let transitive = result.transitive.as_ref().map(|t| t.len()).unwrap_or(0);
        let impact = ImpactAnalysis {
            direct_impact_count: direct,
            transitive_impact_count: transitive,
            impact_score: impact_score(direct, transitive),
        };
        Ok((result, impact))
    }

    async fn get_dependencies_with_direction(
        &self,
        args: DependenciesArgs,
        direction: Direction,
        query_type: QueryType,
        cache_key: &str,
    ) -> Result<DependencyResult, GraphServiceError> {
        let started = Instant::now();
        if !(1..=5).contains(&args.depth) {
            return Err(GraphServiceError::Validation(format!("depth {} out of range [1,5]", args.depth)));
        }
        if let Some(cached) = self.cache.get(cache_key, &args) {
            let mut result: DependencyResult = serde_json::from_value(cached).map_err(|e| GraphServiceError::Validation(e.to_string()))?;
            result.metadata.from_cache = true;
            self.record(query_type, &args.repository, Some(args.depth), result.direct.len(), true, None, started.elapsed());
            return Ok(result);
        }

        let spec = DependencyAnalysisSpec {
            target: format!("{}:{}", args.entity_path, args.repository),
            direction,
            transitive: args.include_transitive,
            max_depth: clamp_depth(args.depth),
        };
        let result = self.run_timed(self.adapter.analyze_dependencies(spec)).await;
        self.finish(&args, started, result, cache_key, query_type)
    }

    pub async fn get_path(&self, args: PathArgs) -> Result<PathResult, GraphServiceError> {
        let started = Instant::now();
        let max_hops = args.max_hops.min(10);
        if let Some(cached) = self.cache.get("getPath", &args) {
            let mut result: PathResult = serde_json::from_value(cached).map_err(|e| GraphServiceError::Validation(e.to_string()))?;
            result.metadata.from_cache = true;
            self.record(QueryType::GetPath, &args.repository, Some(max_hops), result.path.as_ref().map(Vec::len).unwrap_or(0), true, None, started.elapsed());
            return Ok(result);
        }

        let traversal = self
            .run_timed(self.adapter.traverse(&args.from_entity, &args.relationship_types, max_hops, Direction::Both, Some(&args.repository)))
            .await;

        match traversal {
            Ok(traversal) => {
                let path_exists = traversal.nodes.iter().any(|n| n.public_id() == args.to_entity);
                let result = PathResult {
                    path_exists,
                    path: if path_exists { Some(traversal.nodes.iter().map(|n| n.public_id()).collect()) } else { None },
                    metadata: QueryMetadata {
                        query_time_ms: started.elapsed().as_millis() as u64,
                        from_cache: false,
                        repositories_searched: vec![args.repository.clone()],
                        detail_level: None,
                    },
                };
                self.cache.put("getPath", &args, &args.repository, serde_json::to_value(&result).unwrap_or_default());
                self.record(QueryType::GetPath, &args.repository, Some(max_hops), result.path.as_ref().map(Vec::len).unwrap_or(0), false, None, started.elapsed());
                Ok(result)
            }
            Err(err) => {
                self.record(QueryType::GetPath, &args.repository, Some(max_hops), 0, false, Some(err.to_string()), started.elapsed());
                Err(err)
            }
        }
    }

    pub async fn get_architecture(&self, args: ArchitectureArgs) -> Result<ArchitectureResult, GraphServiceError> {
        let started = Instant::now();
        if let Some(cached) = self.cache.get("getArchitecture", &args) {
            let mut result: ArchitectureResult =
                serde_json::from_value(cached).map_err(|e| GraphServiceError::Validation(e.to_string()))?;
            result.metadata.from_cache = true;
            self.record(QueryType::GetArchitecture, &args.repository, None, result.root.children.len(), true, None, started.elapsed());
            return Ok(result);
        }

        let context = self
            .run_timed(self.adapter.get_context(ContextSpec {
                seeds: vec![args.repository.clone()],
                include_context: vec!["imports".into()],
                limit: None,
            }))
            .await;

        match context {
            Ok(context) => {
                let children = context
                    .context
                    .iter()
                    .map(|n| ArchitectureNode {
                        name: n.public_id(),
                        r#type: n.labels()[0].to_lowercase(),
                        path: n.public_id(),
                        children: Vec::new(),
                        metrics: None,
                    })
                    .collect::<Vec<_>>();
                let result = ArchitectureResult {
                    root: ArchitectureNode {
                        name: args.repository.clone(),
                        r#type: "repository".into(),
                        path: args.repository.clone(),
                        children,
                        metrics: None,
                    },
                    inter_module_dependencies: Vec::new(),
                    metadata: QueryMetadata {
                        query_time_ms: started.elapsed().as_millis() as u64,
                        from_cache: false,
                        repositories_searched: vec![args.repository.clone()],
                        detail_level: Some(format!("{:?}", args.detail_level).to_lowercase()),
                    },
                };
                self.cache.put("getArchitecture", &args, &args.repository, serde_json::to_value(&result).unwrap_or_default());
                self.record(QueryType::GetArchitecture, &args.repository, None, result.root.children.len(), false, None, started.elapsed());
                Ok(result)
            }
            Err(err) => {
                self.record(QueryType::GetArchitecture, &args.repository, None, 0, false, Some(err.to_string()), started.elapsed());
                Err(err)
            }
        }
    }

    fn finish(
        &self,
        args: &DependenciesArgs,
        started: Instant,
        result: Result<DependencyResult, GraphServiceError>,
        method: &str,
        query_type: QueryType,
    ) -> Result<DependencyResult, GraphServiceError> {
        match result {
            Ok(mut result) => {
                result.metadata.query_time_ms = started.elapsed().as_millis() as u64;
                result.metadata.repositories_searched = vec![args.repository.clone()];
                self.cache.put(method, args, &args.repository, serde_json::to_value(&result).unwrap_or_default());
                self.record(query_type, &args.repository, Some(args.depth), result.direct.len(), false, None, started.elapsed());
                Ok(result)
            }
            Err(err) => {
                self.record(query_type, &args.repository, Some(args.depth), 0, false, Some(err.to_string()), started.elapsed());
                Err(err)
            }
        }
    }

    async fn run_timed<T, F>(&self, fut: F) -> Result<T, GraphServiceError>
    where
        F: std::future::Future<Output = Result<T, super::error::GraphError>>,
    {
        let elapsed_ms = self.timeout.as_millis() as u64;
        match timeout(self.timeout, fut).await {
            Ok(inner) => inner.map_err(GraphServiceError::from),
            Err(_) => Err(GraphServiceError::Timeout { elapsed_ms }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        query_type: QueryType,
        repository: &str,
        depth: Option<u8>,
        result_count: usize,
        from_cache: bool,
        error: Option<String>,
        elapsed: Duration,
    ) {
        self.metrics.record(GraphQueryRecord {
            query_type,
            timestamp: chrono::Utc::now(),
            duration_ms: elapsed.as_millis() as u64,
            result_count,
            depth: depth.map(u32::from),
            from_cache,
            repository: repository.to_owned(),
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::adapter::{AdapterConfig, AdapterType};

    fn service() -> GraphQueryService {
        let adapter = super::super::adapter::create_graph_adapter(AdapterType::Neo4j, AdapterConfig { uri: "bolt://localhost:0".into(), ..Default::default() });
        GraphQueryService::new(adapter, Arc::new(MetricsCollector::new(100)))
    }

    #[test]
    fn depth_out_of_range_is_rejected_without_reaching_the_adapter() {
        let svc = service();
        let args = DependenciesArgs {
            entity_type: "file".into(),
            entity_path: "src/lib.rs".into(),
            repository: "widgets".into(),
            depth: 6,
            include_transitive: false,
            relationship_types: vec![],
        };
        let result = tokio_test_block(svc.get_dependencies(args));
        assert!(result.is_err());
    }

    fn tokio_test_block<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(fut)
    }
}
