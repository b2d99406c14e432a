// Index storage and data model

pub mod artifacts;
pub mod db;
pub mod schema;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A source file known to the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub checksum: String,
    pub last_indexed: i64,
}

/// Kinds of declarations the extractor records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Enum,
    Record,
    AnnotationType,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Enum => "enum",
            SymbolKind::Record => "record",
            SymbolKind::AnnotationType => "annotation_type",
        }
    }
}

/// Architectural role guessed for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkRole {
    Controller,
    Service,
    Repository,
    Model,
    Dto,
    Utility,
    #[default]
    Other,
}

impl FrameworkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameworkRole::Controller => "controller",
            FrameworkRole::Service => "service",
            FrameworkRole::Repository => "repository",
            FrameworkRole::Model => "model",
            FrameworkRole::Dto => "dto",
            FrameworkRole::Utility => "utility",
            FrameworkRole::Other => "other",
        }
    }
}

impl fmt::Display for FrameworkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A class-like declaration (class, interface, enum, record, annotation type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub line_number: usize,
    #[serde(default)]
    pub annotations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub role: FrameworkRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSymbol {
    pub name: String,
    /// Declaring type
    pub class: String,
    pub line_number: usize,
    pub return_type: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl MethodSymbol {
    pub fn signature(&self) -> String {
        format!("{} {}.{}({})", self.return_type, self.class, self.name, self.parameters.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSymbol {
    pub name: String,
    /// Declaring type
    pub class: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub line_number: usize,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// A raw method invocation, resolved later against the whole index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub name: String,
    pub line_number: usize,
}

/// Caller file -> callee symbol, only for callees defined in the index
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
    pub callee_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationArgument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: String,
}

/// An annotation use and the element it is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub name: String,
    pub element: String,
    pub line_number: usize,
    #[serde(default)]
    pub arguments: Vec<AnnotationArgument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    /// `@RequestMapping` without an explicit `method`
    Any,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Any => "ANY",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP route handled by a controller method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Handler method name
    pub method: String,
    pub path: String,
    pub class: String,
    pub line_number: usize,
    pub http_method: HttpMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceCall {
    pub class: String,
    pub service: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryCall {
    pub class: String,
    pub repository: String,
    pub field: String,
}

/// Per-file API surface: endpoints and injected service/repository fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFlow {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub service_calls: Vec<ServiceCall>,
    #[serde(default)]
    pub repository_calls: Vec<RepositoryCall>,
}

/// Everything extracted from one source file; the unit of storage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub role: FrameworkRole,
    #[serde(default)]
    pub classes: Vec<ClassSymbol>,
    #[serde(default)]
    pub methods: Vec<MethodSymbol>,
    #[serde(default)]
    pub fields: Vec<FieldSymbol>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub call_graph: Vec<CallEdge>,
    #[serde(default)]
    pub invocations: Vec<Invocation>,
    #[serde(default)]
    pub annotations: Vec<AnnotationRecord>,
    #[serde(default)]
    pub api_flow: ApiFlow,
}

impl ComponentRecord {
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|c| c.name.as_str())
    }

    /// Simple names of non-wildcard dependencies
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().filter_map(|d| simple_name(d))
    }

    pub fn symbol_count(&self) -> usize {
        self.classes.len() + self.methods.len() + self.fields.len()
    }
}

/// Last segment of a dotted import path; `None` for wildcard imports
pub fn simple_name(import_path: &str) -> Option<&str> {
    let last = import_path.rsplit('.').next()?;
    if last.is_empty() || last == "*" {
        None
    } else {
        Some(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name() {
        assert_eq!(simple_name("com.bank.service.UserService"), Some("UserService"));
        assert_eq!(simple_name("UserService"), Some("UserService"));
        assert_eq!(simple_name("com.bank.model.*"), None);
    }

    #[test]
    fn test_record_json_shape() {
        let record = ComponentRecord {
            package: "com.bank".to_string(),
            fields: vec![FieldSymbol {
                name: "repo".to_string(),
                class: "UserService".to_string(),
                type_name: "UserRepository".to_string(),
                line_number: 7,
                annotations: vec!["Autowired".to_string()],
            }],
            ..Default::default()
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["fields"][0]["type"], "UserRepository");
        assert_eq!(value["role"], "other");
        assert!(value["api_flow"]["endpoints"].as_array().unwrap().is_empty());

        let back: ComponentRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_http_method_serialization() {
        let json = serde_json::to_string(&HttpMethod::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
        assert_eq!(HttpMethod::Any.to_string(), "ANY");
    }
}
