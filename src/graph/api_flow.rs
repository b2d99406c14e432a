// Endpoint -> service -> repository chains

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::Snapshot;
use crate::index::{ApiFlow, ComponentRecord};
use crate::indexer::heuristics::base_type;

/// API flows keyed by normalized endpoint path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiFlowGraph {
    flows: BTreeMap<String, ApiFlow>,
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

impl ApiFlowGraph {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut by_class: HashMap<&str, &ComponentRecord> = HashMap::new();
        for record in snapshot.values() {
            for class in record.class_names() {
                by_class.entry(class).or_insert(record);
            }
        }

        let mut flows: BTreeMap<String, ApiFlow> = BTreeMap::new();
        for record in snapshot.values() {
            for endpoint in &record.api_flow.endpoints {
                let flow = flows.entry(endpoint.path.clone()).or_default();
                push_unique(&mut flow.endpoints, endpoint.clone());

                let controller = endpoint.class.as_str();
                for call in record.api_flow.repository_calls.iter().filter(|c| c.class == controller) {
                    push_unique(&mut flow.repository_calls, call.clone());
                }

                for call in record.api_flow.service_calls.iter().filter(|c| c.class == controller) {
                    push_unique(&mut flow.service_calls, call.clone());

                    // The field type is usually an interface; follow `Type` and `TypeImpl`
                    let service = base_type(&call.service);
                    for candidate in [service.to_string(), format!("{}Impl", service)] {
                        let Some(service_record) = by_class.get(candidate.as_str()) else {
                            continue;
                        };
                        for repo in service_record
                            .api_flow
                            .repository_calls
                            .iter()
                            .filter(|r| r.class == candidate)
                        {
                            push_unique(&mut flow.repository_calls, repo.clone());
                        }
                    }
                }
            }
        }

        Self { flows }
    }

    /// Add a flow under `path`, merging with any flow already there
    pub fn merge(&mut self, path: String, flow: ApiFlow) {
        let entry = self.flows.entry(path).or_default();
        for endpoint in flow.endpoints {
            push_unique(&mut entry.endpoints, endpoint);
        }
        for call in flow.service_calls {
            push_unique(&mut entry.service_calls, call);
        }
        for call in flow.repository_calls {
            push_unique(&mut entry.repository_calls, call);
        }
    }

    pub fn get(&self, path: &str) -> Option<&ApiFlow> {
        self.flows.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ApiFlow)> {
        self.flows.iter()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Flows whose controller, services or repositories are among `names`
    pub fn related_to<'a>(
        &'a self,
        names: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = (&'a String, &'a ApiFlow)> + 'a {
        let mentions = move |name: &str| names.contains(base_type(name));
        self.flows.iter().filter(move |(_, flow)| {
            flow.endpoints.iter().any(|e| mentions(&e.class))
                || flow
                    .service_calls
                    .iter()
                    .any(|s| mentions(&s.class) || mentions(&s.service))
                || flow
                    .repository_calls
                    .iter()
                    .any(|r| mentions(&r.class) || mentions(&r.repository))
        })
    }

    /// Subset of the graph as a standalone value, e.g. for prompt rendering
    pub fn subset<'a>(&self, paths: impl IntoIterator<Item = &'a String>) -> Self {
        let flows = paths
            .into_iter()
            .filter_map(|path| self.flows.get(path).map(|flow| (path.clone(), flow.clone())))
            .collect();
        Self { flows }
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::bank_snapshot;
    use super::*;
    use crate::index::{Endpoint, HttpMethod, RepositoryCall};

    #[test]
    fn test_chain_follows_service_impl() {
        let graph = ApiFlowGraph::build(&bank_snapshot());
        assert_eq!(graph.len(), 2);

        let flow = graph.get("/api/accounts/transfer").unwrap();
        assert_eq!(flow.endpoints.len(), 1);
        assert_eq!(flow.endpoints[0].http_method, HttpMethod::Post);
        assert_eq!(flow.service_calls[0].service, "AccountService");
        assert_eq!(
            flow.repository_calls,
            vec![RepositoryCall {
                class: "AccountServiceImpl".to_string(),
                repository: "AccountRepository".to_string(),
                field: "accountRepository".to_string(),
            }]
        );
    }

    #[test]
    fn test_same_path_merges_and_dedups() {
        let mut snapshot = bank_snapshot();
        let record = snapshot.get_mut("controller/AccountController.java").unwrap();
        let duplicate = record.api_flow.endpoints[0].clone();
        record.api_flow.endpoints.push(duplicate);
        record.api_flow.endpoints.push(Endpoint {
            method: "open".to_string(),
            path: "/api/accounts".to_string(),
            class: "AccountController".to_string(),
            line_number: 30,
            http_method: HttpMethod::Post,
        });

        let graph = ApiFlowGraph::build(&snapshot);
        let flow = graph.get("/api/accounts").unwrap();
        assert_eq!(flow.endpoints.len(), 2);
        assert_eq!(flow.service_calls.len(), 1);
        assert_eq!(flow.repository_calls.len(), 1);
    }

    #[test]
    fn test_related_to() {
        let graph = ApiFlowGraph::build(&bank_snapshot());

        let names: BTreeSet<String> = ["AccountRepository".to_string()].into_iter().collect();
        assert_eq!(graph.related_to(&names).count(), 2);

        let names: BTreeSet<String> = ["LoanController".to_string()].into_iter().collect();
        assert_eq!(graph.related_to(&names).count(), 0);
    }

    #[test]
    fn test_json_shape() {
        let graph = ApiFlowGraph::build(&bank_snapshot());
        let value: serde_json::Value = serde_json::from_str(&graph.to_json_pretty()).unwrap();

        let flow = &value["/api/accounts"];
        assert_eq!(flow["endpoints"][0]["method"], "list");
        assert_eq!(flow["endpoints"][0]["http_method"], "GET");
        assert_eq!(flow["service_calls"][0]["field"], "accountService");
        assert_eq!(flow["repository_calls"][0]["repository"], "AccountRepository");

        let back: ApiFlowGraph = serde_json::from_value(value).unwrap();
        assert_eq!(back, graph);
    }
}
