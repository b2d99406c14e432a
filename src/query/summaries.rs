// Pre-generated summary documents and prompt templates

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::graph::api_flow::ApiFlowGraph;
use crate::graph::matrix::RelationshipMatrix;
use crate::index::artifacts::{API_FLOW_FILE, MATRIX_FILE};
use crate::index::{ApiFlow, Endpoint, FrameworkRole, HttpMethod, RepositoryCall, ServiceCall};
use crate::indexer::heuristics::{request_method_from, role_from_text};

pub const OVERVIEW_FILE: &str = "summary_of_summaries.md";
pub const FILE_SUMMARY_DIR: &str = "file_summaries";
pub const MODULE_SUMMARY_DIR: &str = "module_summaries";
pub const PROMPT_DIR: &str = "llm_prompts";
/// Older summary sets ship their API flows under this name
pub const ENHANCED_API_FLOW_FILE: &str = "enhanced_api_flow.json";

pub const DEFAULT_OVERVIEW: &str = "Application overview not available.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryKind {
    File,
    Module,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub name: String,
    pub kind: SummaryKind,
    pub text: String,
    pub role: FrameworkRole,
    pub path: PathBuf,
}

/// Component name of a file summary: last `_` segment of the stem, `.java` stripped
pub fn component_name(stem: &str) -> &str {
    let last = stem.rsplit('_').next().unwrap_or(stem);
    last.strip_suffix(".java").unwrap_or(last)
}

/// Markdown files in a directory sorted by name; a missing directory is empty
fn markdown_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        warn!("Summary directory not found: {}", dir.display());
        return Vec::new();
    }
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Error reading {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "md"))
        .collect();
    files.sort();
    files
}

fn read_logged(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            error!("Error reading {}: {}", path.display(), e);
            None
        }
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Prompt templates by name (file stem)
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: BTreeMap<String, String>,
}

impl PromptLibrary {
    pub fn load(dir: &Path) -> Self {
        let mut templates = BTreeMap::new();
        for path in markdown_files(dir) {
            if let Some(content) = read_logged(&path) {
                templates.insert(stem(&path), content);
            }
        }
        debug!("Loaded {} prompt templates", templates.len());
        Self { templates }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

/// All summary documents of one summary directory
#[derive(Debug, Clone)]
pub struct SummaryStore {
    dir: PathBuf,
    overview: String,
    summaries: Vec<Summary>,
    prompts: PromptLibrary,
}

impl SummaryStore {
    /// Load everything below `dir`; missing pieces are logged and left empty
    pub fn load(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        info!("Loading summaries from {}", dir.display());

        let overview = match dir.join(OVERVIEW_FILE) {
            path if path.is_file() => read_logged(&path).unwrap_or_else(|| DEFAULT_OVERVIEW.to_string()),
            path => {
                warn!("Application overview not found: {}", path.display());
                DEFAULT_OVERVIEW.to_string()
            }
        };

        let mut summaries = Vec::new();
        for path in markdown_files(&dir.join(FILE_SUMMARY_DIR)) {
            let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if file_name.contains("_flow.md") || file_name.contains("_spring.md") {
                continue;
            }
            let Some(text) = read_logged(&path) else {
                continue;
            };
            let name = component_name(&stem(&path)).to_string();
            summaries.push(Summary {
                role: role_from_text(&name, &text),
                name,
                kind: SummaryKind::File,
                text,
                path,
            });
        }
        let file_count = summaries.len();

        for path in markdown_files(&dir.join(MODULE_SUMMARY_DIR)) {
            let Some(text) = read_logged(&path) else {
                continue;
            };
            let name = stem(&path);
            summaries.push(Summary {
                role: role_from_text(&name, &text),
                name,
                kind: SummaryKind::Module,
                text,
                path,
            });
        }

        let prompts = PromptLibrary::load(&dir.join(PROMPT_DIR));
        info!(
            "Loaded {} file summaries, {} module summaries, {} prompt templates",
            file_count,
            summaries.len() - file_count,
            prompts.len()
        );

        Self {
            dir,
            overview,
            summaries,
            prompts,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn overview(&self) -> &str {
        &self.overview
    }

    /// File summaries first, then module summaries, each sorted by file name
    pub fn summaries(&self) -> &[Summary] {
        &self.summaries
    }

    /// First summary with this name
    pub fn get(&self, name: &str) -> Option<&Summary> {
        self.summaries.iter().find(|s| s.name == name)
    }

    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// API flows shipped with the summaries, in either file name or format
    pub fn load_api_flows(&self) -> ApiFlowGraph {
        for name in [API_FLOW_FILE, ENHANCED_API_FLOW_FILE] {
            let path = self.dir.join(name);
            if path.is_file() {
                return load_api_flow_file(&path);
            }
        }
        warn!("No API flow file in {}", self.dir.display());
        ApiFlowGraph::default()
    }

    pub fn load_matrix(&self) -> RelationshipMatrix {
        let path = self.dir.join(MATRIX_FILE);
        if !path.is_file() {
            warn!("Component relationship matrix not found: {}", path.display());
            return RelationshipMatrix::default();
        }
        let matrix = read_logged(&path)
            .map(|content| RelationshipMatrix::parse_markdown(&content))
            .unwrap_or_default();
        info!("Loaded component relationship matrix with {} components", matrix.len());
        matrix
    }
}

/// Read an API flow file in the native format, or convert the legacy one
pub fn load_api_flow_file(path: &Path) -> ApiFlowGraph {
    let value: Value = match read_logged(path).map(|content| serde_json::from_str(&content)) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            error!("Error loading {}: {}", path.display(), e);
            return ApiFlowGraph::default();
        }
        None => return ApiFlowGraph::default(),
    };

    if is_legacy_format(&value) {
        let graph = convert_legacy_flows(&value);
        debug!("Converted {} legacy API flows from {}", graph.len(), path.display());
        return graph;
    }
    match serde_json::from_value::<ApiFlowGraph>(value) {
        Ok(graph) => graph,
        Err(e) => {
            error!("Error loading {}: {}", path.display(), e);
            ApiFlowGraph::default()
        }
    }
}

fn is_legacy_format(value: &Value) -> bool {
    value.as_object().map_or(false, |flows| {
        flows.values().any(|flow| {
            ["controller", "serviceChain", "repositoryAccess"]
                .iter()
                .any(|key| flow.get(key).is_some())
        })
    })
}

/// Convert `{key: {controller: {file}, serviceChain: [{file}], repositoryAccess: [{file}]}}`.
///
/// Keys look like `"GET /api/users"` or just a path; component names are the
/// file names without `.java`.
pub fn convert_legacy_flows(value: &Value) -> ApiFlowGraph {
    let file_name = |item: &Value| -> Option<String> {
        let file = item.get("file")?.as_str()?;
        let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
        let name = name.strip_suffix(".java").unwrap_or(name);
        (!name.is_empty()).then(|| name.to_string())
    };
    let list = |flow: &Value, key: &str| -> Vec<String> {
        flow.get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(file_name).collect())
            .unwrap_or_default()
    };

    let mut graph = ApiFlowGraph::default();
    let Some(flows) = value.as_object() else {
        return graph;
    };

    for (key, flow) in flows {
        let (http_method, path) = match key.split_once(char::is_whitespace) {
            Some((verb, rest)) if request_method_from(verb) != HttpMethod::Any => {
                (request_method_from(verb), rest.trim().to_string())
            }
            _ => (HttpMethod::Any, key.trim().to_string()),
        };

        let controller = flow.get("controller").and_then(file_name).unwrap_or_default();
        let handler = flow
            .get("controller")
            .and_then(|c| c.get("method"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut converted = ApiFlow::default();
        if !controller.is_empty() {
            converted.endpoints.push(Endpoint {
                method: handler,
                path: path.clone(),
                class: controller.clone(),
                line_number: 0,
                http_method,
            });
        }
        converted.service_calls = list(flow, "serviceChain")
            .into_iter()
            .map(|service| ServiceCall {
                class: controller.clone(),
                service,
                field: String::new(),
            })
            .collect();
        converted.repository_calls = list(flow, "repositoryAccess")
            .into_iter()
            .map(|repository| RepositoryCall {
                class: String::new(),
                repository,
                field: String::new(),
            })
            .collect();

        graph.merge(path, converted);
    }
    graph
}
