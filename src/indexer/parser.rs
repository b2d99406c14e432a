// Java parser using tree-sitter

use std::collections::BTreeSet;
use thiserror::Error;
use tree_sitter::{Node, Parser as TreeParser, Tree};

use crate::config::IndexingConfig;
use crate::index::{
    AnnotationArgument, AnnotationRecord, ClassSymbol, ComponentRecord, Endpoint, FieldSymbol,
    FrameworkRole, HttpMethod, Invocation, MethodSymbol, RepositoryCall, ServiceCall, SymbolKind,
};
use crate::indexer::heuristics;

/// A file that could not be parsed; the indexer skips it and moves on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error parsing Java file {path}: {message}")]
pub struct ParseError {
    pub path: String,
    pub message: String,
    /// 1-based position of the first ERROR/MISSING node, when there is one
    pub line: Option<usize>,
    pub column: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Indexed(ComponentRecord),
    Excluded { reason: String },
}

/// Settings the extractor needs from the indexing configuration
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub test_dirs: Vec<String>,
    pub test_name_markers: Vec<String>,
    pub external_prefixes: Vec<String>,
}

impl From<&IndexingConfig> for ExtractorSettings {
    fn from(config: &IndexingConfig) -> Self {
        Self {
            test_dirs: config.test_dirs.clone(),
            test_name_markers: config.test_name_markers.clone(),
            external_prefixes: config.external_prefixes.clone(),
        }
    }
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self::from(&IndexingConfig::default())
    }
}

/// Parsed declarations, lowered from the syntax tree before record building
#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Package(String),
    Import(ImportDecl),
    Type(TypeDecl),
    Method(MethodDecl),
    Field(FieldDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub path: String,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub kind: SymbolKind,
    /// Enclosing type names, outermost first; empty for top-level types
    pub scope: Vec<String>,
    pub line: usize,
    pub name_line: usize,
    pub annotations: Vec<AnnotationUse>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub scope: Vec<String>,
    pub line: usize,
    pub name_line: usize,
    pub return_type: String,
    pub parameters: Vec<String>,
    pub annotations: Vec<AnnotationUse>,
    pub invocations: Vec<Invocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub names: Vec<String>,
    pub scope: Vec<String>,
    pub type_name: String,
    pub line: usize,
    pub annotations: Vec<AnnotationUse>,
    pub invocations: Vec<Invocation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationUse {
    /// Simple name, without `@` or package qualifier
    pub name: String,
    pub line: usize,
    pub arguments: Vec<AnnotationValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationValue {
    pub key: Option<String>,
    pub raw: String,
    /// First string literal of the value, unquoted
    pub literal: Option<String>,
}

impl AnnotationUse {
    /// Literal of the positional, `value=` or `path=` argument
    pub fn path_value(&self) -> Option<&str> {
        self.arguments
            .iter()
            .filter(|arg| matches!(arg.key.as_deref(), None | Some("value") | Some("path")))
            .find_map(|arg| arg.literal.as_deref())
    }

    pub fn argument(&self, key: &str) -> Option<&AnnotationValue> {
        self.arguments.iter().find(|arg| arg.key.as_deref() == Some(key))
    }

    fn to_arguments(&self) -> Vec<AnnotationArgument> {
        self.arguments
            .iter()
            .map(|arg| AnnotationArgument {
                key: arg.key.clone(),
                value: arg.literal.clone().unwrap_or_else(|| arg.raw.clone()),
            })
            .collect()
    }
}

fn type_kind(node_kind: &str) -> Option<SymbolKind> {
    match node_kind {
        "class_declaration" => Some(SymbolKind::Class),
        "interface_declaration" => Some(SymbolKind::Interface),
        "enum_declaration" => Some(SymbolKind::Enum),
        "record_declaration" => Some(SymbolKind::Record),
        "annotation_type_declaration" => Some(SymbolKind::AnnotationType),
        _ => None,
    }
}

fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

fn unquote(literal: &str) -> String {
    let trimmed = literal.trim();
    let inner = trimmed
        .strip_prefix("\"\"\"")
        .and_then(|s| s.strip_suffix("\"\"\""))
        .or_else(|| trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(trimmed);
    inner.trim().to_string()
}

pub struct JavaParser {
    settings: ExtractorSettings,
}

impl JavaParser {
    pub fn new(settings: ExtractorSettings) -> Self {
        Self { settings }
    }

    /// Parse one file into a record, or report why it was skipped
    pub fn parse(&self, file_path: &str, content: &str) -> Result<ParseOutcome, ParseError> {
        if heuristics::is_in_test_dir(file_path, &self.settings.test_dirs) {
            return Ok(ParseOutcome::Excluded {
                reason: "file is under a test directory".to_string(),
            });
        }

        let tree = self.parse_tree(file_path, content)?;
        let declarations = self.extract_declarations(&tree, content);

        let has_types = declarations.iter().any(|d| matches!(d, Declaration::Type(_)));
        let record = self.build_record(content, declarations);
        if has_types && record.classes.is_empty() && record.methods.is_empty() {
            return Ok(ParseOutcome::Excluded {
                reason: "file only declares test types".to_string(),
            });
        }

        Ok(ParseOutcome::Indexed(record))
    }

    fn parse_tree(&self, file_path: &str, content: &str) -> Result<Tree, ParseError> {
        let error = |message: String| ParseError {
            path: file_path.to_string(),
            message,
            line: None,
            column: None,
        };

        let mut parser = TreeParser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| error(e.to_string()))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| error("Failed to parse Java code".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(match first_syntax_error(root) {
                Some(node) => {
                    let position = node.start_position();
                    ParseError {
                        line: Some(position.row + 1),
                        column: Some(position.column + 1),
                        ..error(describe_syntax_error(node, content))
                    }
                }
                None => error("syntax error".to_string()),
            });
        }

        Ok(tree)
    }

    /// Lower the tree into declarations, outermost first in source order
    pub fn extract_declarations(&self, tree: &Tree, content: &str) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let root = tree.root_node();

        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_declaration" => {
                    if let Some(name) = self.package_name(child, content) {
                        declarations.push(Declaration::Package(name));
                    }
                }
                "import_declaration" => {
                    if let Some(import) = self.import_decl(child, content) {
                        declarations.push(Declaration::Import(import));
                    }
                }
                kind if type_kind(kind).is_some() => {
                    self.walk_type(child, content, &[], &mut declarations);
                }
                _ => {}
            }
        }

        declarations
    }

    fn walk_type(&self, node: Node, content: &str, scope: &[String], out: &mut Vec<Declaration>) {
        let Some(kind) = type_kind(node.kind()) else {
            return;
        };
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = self.node_text(name_node, content);

        let mut extends = None;
        let mut implements = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match (kind, child.kind()) {
                (_, "superclass") => extends = self.type_names(child, content).into_iter().next(),
                (_, "super_interfaces") => implements.extend(self.type_names(child, content)),
                // Interfaces list their supertypes under `extends`
                (SymbolKind::Interface, "extends_interfaces") => {
                    implements.extend(self.type_names(child, content))
                }
                _ => {}
            }
        }

        out.push(Declaration::Type(TypeDecl {
            name: name.clone(),
            kind,
            scope: scope.to_vec(),
            line: line_of(node),
            name_line: line_of(name_node),
            annotations: self.annotations(node, content),
            extends,
            implements,
        }));

        let mut inner_scope = scope.to_vec();
        inner_scope.push(name);
        if let Some(body) = node.child_by_field_name("body") {
            self.walk_members(body, content, &inner_scope, out);
        }
    }

    fn walk_members(&self, body: Node, content: &str, scope: &[String], out: &mut Vec<Declaration>) {
        let mut cursor = body.walk();
        for member in body.named_children(&mut cursor) {
            match member.kind() {
                "method_declaration" => {
                    if let Some(method) = self.method_decl(member, content, scope) {
                        out.push(Declaration::Method(method));
                    }
                }
                "field_declaration" | "constant_declaration" => {
                    if let Some(field) = self.field_decl(member, content, scope) {
                        out.push(Declaration::Field(field));
                    }
                }
                "enum_body_declarations" => self.walk_members(member, content, scope, out),
                kind if type_kind(kind).is_some() => self.walk_type(member, content, scope, out),
                _ => {}
            }
        }
    }

    fn method_decl(&self, node: Node, content: &str, scope: &[String]) -> Option<MethodDecl> {
        let name_node = node.child_by_field_name("name")?;

        let return_type = node
            .child_by_field_name("type")
            .map(|n| self.node_text(n, content))
            .unwrap_or_else(|| "void".to_string());

        let mut parameters = Vec::new();
        if let Some(params) = node.child_by_field_name("parameters") {
            let mut cursor = params.walk();
            for param in params.named_children(&mut cursor) {
                match param.kind() {
                    "formal_parameter" => {
                        if let Some(type_node) = param.child_by_field_name("type") {
                            parameters.push(self.node_text(type_node, content));
                        }
                    }
                    "spread_parameter" => {
                        let mut inner = param.walk();
                        let type_node = param
                            .named_children(&mut inner)
                            .find(|n| n.kind() != "modifiers" && n.kind() != "variable_declarator");
                        if let Some(type_node) = type_node {
                            parameters.push(format!("{}...", self.node_text(type_node, content)));
                        }
                    }
                    _ => {}
                }
            }
        }

        let invocations = node
            .child_by_field_name("body")
            .map(|body| self.invocations(body, content))
            .unwrap_or_default();

        Some(MethodDecl {
            name: self.node_text(name_node, content),
            scope: scope.to_vec(),
            line: line_of(node),
            name_line: line_of(name_node),
            return_type,
            parameters,
            annotations: self.annotations(node, content),
            invocations,
        })
    }

    fn field_decl(&self, node: Node, content: &str, scope: &[String]) -> Option<FieldDecl> {
        let type_name = self.node_text(node.child_by_field_name("type")?, content);

        let mut names = Vec::new();
        let mut invocations = Vec::new();
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            if let Some(name) = declarator.child_by_field_name("name") {
                names.push(self.node_text(name, content));
            }
            if let Some(value) = declarator.child_by_field_name("value") {
                invocations.extend(self.invocations(value, content));
            }
        }
        if names.is_empty() {
            return None;
        }

        Some(FieldDecl {
            names,
            scope: scope.to_vec(),
            type_name,
            line: line_of(node),
            annotations: self.annotations(node, content),
            invocations,
        })
    }

    fn package_name(&self, node: Node, content: &str) -> Option<String> {
        let mut cursor = node.walk();
        let name = node
            .named_children(&mut cursor)
            .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))?;
        Some(self.node_text(name, content))
    }

    fn import_decl(&self, node: Node, content: &str) -> Option<ImportDecl> {
        let text = self.node_text(node, content);
        let body = text.trim().strip_prefix("import")?.trim_end_matches(';').trim();
        let (is_static, path) = match body.strip_prefix("static") {
            Some(rest) if rest.starts_with(char::is_whitespace) => (true, rest.trim()),
            _ => (false, body),
        };
        let path: String = path.chars().filter(|c| !c.is_whitespace()).collect();
        if path.is_empty() {
            return None;
        }

        Some(ImportDecl { path, is_static })
    }

    /// Type names of a `superclass`/`super_interfaces`/`extends_interfaces` node
    fn type_names(&self, node: Node, content: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "type_list" {
                names.extend(self.type_names(child, content));
            } else {
                names.push(self.node_text(child, content));
            }
        }
        names
    }

    fn annotations(&self, declaration: Node, content: &str) -> Vec<AnnotationUse> {
        let mut cursor = declaration.walk();
        let Some(modifiers) = declaration
            .named_children(&mut cursor)
            .find(|n| n.kind() == "modifiers")
        else {
            return Vec::new();
        };

        let mut annotations = Vec::new();
        let mut cursor = modifiers.walk();
        for node in modifiers.named_children(&mut cursor) {
            if !matches!(node.kind(), "annotation" | "marker_annotation") {
                continue;
            }
            let Some(name_node) = node.child_by_field_name("name") else {
                continue;
            };
            let full_name = self.node_text(name_node, content);
            let name = full_name.rsplit('.').next().unwrap_or(&full_name).to_string();

            let mut arguments = Vec::new();
            if let Some(args) = node.child_by_field_name("arguments") {
                let mut inner = args.walk();
                for arg in args.named_children(&mut inner) {
                    match arg.kind() {
                        "element_value_pair" => {
                            let key = arg
                                .child_by_field_name("key")
                                .map(|k| self.node_text(k, content));
                            if let Some(value) = arg.child_by_field_name("value") {
                                arguments.push(AnnotationValue {
                                    key,
                                    raw: self.node_text(value, content),
                                    literal: self.string_literal(value, content),
                                });
                            }
                        }
                        "line_comment" | "block_comment" => {}
                        _ => arguments.push(AnnotationValue {
                            key: None,
                            raw: self.node_text(arg, content),
                            literal: self.string_literal(arg, content),
                        }),
                    }
                }
            }

            annotations.push(AnnotationUse {
                name,
                line: line_of(node),
                arguments,
            });
        }

        annotations
    }

    /// A plain string literal, or the first one of an array initializer
    fn string_literal(&self, node: Node, content: &str) -> Option<String> {
        match node.kind() {
            "string_literal" => Some(unquote(&self.node_text(node, content))),
            "element_value_array_initializer" => {
                let mut cursor = node.walk();
                let first = node.named_children(&mut cursor).next()?;
                self.string_literal(first, content)
            }
            _ => None,
        }
    }

    /// Method invocations under a node, not descending into nested type declarations
    fn invocations(&self, node: Node, content: &str) -> Vec<Invocation> {
        let mut found = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current.kind() == "method_invocation" {
                if let Some(name) = current.child_by_field_name("name") {
                    found.push(Invocation {
                        name: self.node_text(name, content),
                        line_number: line_of(name),
                    });
                }
            }
            let mut cursor = current.walk();
            for child in current.named_children(&mut cursor) {
                if type_kind(child.kind()).is_none() {
                    stack.push(child);
                }
            }
        }
        found.sort_by(|a, b| (a.line_number, &a.name).cmp(&(b.line_number, &b.name)));
        found
    }

    fn is_test_scope(&self, scope: &[String]) -> bool {
        scope
            .iter()
            .any(|name| heuristics::is_test_name(name, &self.settings.test_name_markers))
    }

    fn is_test_name(&self, name: &str) -> bool {
        heuristics::is_test_name(name, &self.settings.test_name_markers)
    }

    /// Build the record from lowered declarations
    pub fn build_record(&self, content: &str, declarations: Vec<Declaration>) -> ComponentRecord {
        let mut record = ComponentRecord::default();
        let mut types: Vec<TypeDecl> = Vec::new();
        let mut methods: Vec<MethodDecl> = Vec::new();

        for declaration in declarations {
            match declaration {
                Declaration::Package(name) => record.package = name,
                Declaration::Import(import) => {
                    if import.is_static
                        || heuristics::is_external(&import.path, &self.settings.external_prefixes)
                    {
                        continue;
                    }
                    record.dependencies.push(import.path);
                }
                Declaration::Type(decl) => {
                    if self.is_test_scope(&decl.scope) || self.is_test_name(&decl.name) {
                        continue;
                    }
                    let element = decl.name.clone();
                    self.push_annotations(&mut record, &element, &decl.annotations);
                    if decl.scope.is_empty() {
                        let annotation_names: Vec<&str> =
                            decl.annotations.iter().map(|a| a.name.as_str()).collect();
                        let mut supertypes: Vec<&str> = decl.implements.iter().map(String::as_str).collect();
                        supertypes.extend(decl.extends.as_deref());

                        record.classes.push(ClassSymbol {
                            name: decl.name.clone(),
                            kind: decl.kind,
                            line_number: decl.line,
                            annotations: annotation_names.iter().map(|s| s.to_string()).collect(),
                            extends: decl.extends.clone(),
                            implements: decl.implements.clone(),
                            role: heuristics::detect_role(&decl.name, &annotation_names, &supertypes),
                        });
                    }
                    types.push(decl);
                }
                Declaration::Method(decl) => {
                    if self.is_test_scope(&decl.scope) || self.is_test_name(&decl.name) {
                        continue;
                    }
                    let owner = decl.scope.last().cloned().unwrap_or_default();
                    self.push_annotations(&mut record, &format!("{}.{}", owner, decl.name), &decl.annotations);
                    record.invocations.extend(decl.invocations.iter().cloned());
                    record.methods.push(MethodSymbol {
                        name: decl.name.clone(),
                        class: owner,
                        line_number: decl.line,
                        return_type: decl.return_type.clone(),
                        parameters: decl.parameters.clone(),
                        annotations: decl.annotations.iter().map(|a| a.name.clone()).collect(),
                    });
                    methods.push(decl);
                }
                Declaration::Field(decl) => {
                    if self.is_test_scope(&decl.scope) {
                        continue;
                    }
                    let owner = decl.scope.last().cloned().unwrap_or_default();
                    record.invocations.extend(decl.invocations.iter().cloned());
                    for name in &decl.names {
                        self.push_annotations(&mut record, &format!("{}.{}", owner, name), &decl.annotations);
                        record.fields.push(FieldSymbol {
                            name: name.clone(),
                            class: owner.clone(),
                            type_name: decl.type_name.clone(),
                            line_number: decl.line,
                            annotations: decl.annotations.iter().map(|a| a.name.clone()).collect(),
                        });
                        self.push_injection(&mut record, &owner, name, &decl.type_name);
                    }
                }
            }
        }

        record.role = record
            .classes
            .first()
            .map(|c| c.role)
            .unwrap_or(FrameworkRole::Other);
        record.api_flow.endpoints = self.endpoints(content, &types, &methods);
        record.invocations.sort_by(|a, b| (a.line_number, &a.name).cmp(&(b.line_number, &b.name)));
        record
    }

    fn push_annotations(&self, record: &mut ComponentRecord, element: &str, annotations: &[AnnotationUse]) {
        for annotation in annotations {
            record.annotations.push(AnnotationRecord {
                name: annotation.name.clone(),
                element: element.to_string(),
                line_number: annotation.line,
                arguments: annotation.to_arguments(),
            });
        }
    }

    /// Record Service/Repository-typed fields, deduplicated by (class, field, type)
    fn push_injection(&self, record: &mut ComponentRecord, owner: &str, field: &str, type_name: &str) {
        if heuristics::is_service_type(type_name) {
            let call = ServiceCall {
                class: owner.to_string(),
                service: type_name.to_string(),
                field: field.to_string(),
            };
            if !record.api_flow.service_calls.contains(&call) {
                record.api_flow.service_calls.push(call);
            }
        }
        if heuristics::is_repository_type(type_name) {
            let call = RepositoryCall {
                class: owner.to_string(),
                repository: type_name.to_string(),
                field: field.to_string(),
            };
            if !record.api_flow.repository_calls.contains(&call) {
                record.api_flow.repository_calls.push(call);
            }
        }
    }

    fn endpoints(&self, content: &str, types: &[TypeDecl], methods: &[MethodDecl]) -> Vec<Endpoint> {
        let mut endpoints = Vec::new();
        let mut seen = BTreeSet::new();

        for controller in types {
            if !controller
                .annotations
                .iter()
                .any(|a| heuristics::is_controller_annotation(&a.name))
            {
                continue;
            }

            let base_path = controller
                .annotations
                .iter()
                .find(|a| a.name == "RequestMapping")
                .map(|a| self.annotation_path(content, a, controller.line, controller.name_line))
                .unwrap_or_default();

            let mut qualified = controller.scope.clone();
            qualified.push(controller.name.clone());

            for method in methods.iter().filter(|m| m.scope == qualified) {
                for annotation in &method.annotations {
                    let http_method = match heuristics::http_method_for(&annotation.name) {
                        Some(verb) => verb,
                        None if annotation.name == "RequestMapping" => annotation
                            .argument("method")
                            .map(|arg| heuristics::request_method_from(&arg.raw))
                            .unwrap_or(HttpMethod::Any),
                        None => continue,
                    };

                    let method_path = self.annotation_path(content, annotation, method.line, method.name_line);
                    let path = heuristics::join_paths(&base_path, &method_path);

                    if seen.insert((path.clone(), http_method, controller.name.clone(), method.name.clone())) {
                        endpoints.push(Endpoint {
                            method: method.name.clone(),
                            path,
                            class: controller.name.clone(),
                            line_number: method.line,
                            http_method,
                        });
                    }
                }
            }
        }

        endpoints
    }

    /// Path argument of a mapping annotation; the raw-text fallback covers
    /// arguments the tree could not resolve to a literal
    fn annotation_path(&self, content: &str, annotation: &AnnotationUse, first_line: usize, last_line: usize) -> String {
        if let Some(value) = annotation.path_value() {
            return value.to_string();
        }
        let has_path_argument = annotation
            .arguments
            .iter()
            .any(|arg| matches!(arg.key.as_deref(), None | Some("value") | Some("path")));
        if !has_path_argument {
            return String::new();
        }
        heuristics::fallback_annotation_value(content, &annotation.name, first_line, last_line)
            .unwrap_or_default()
    }

    fn node_text(&self, node: Node, content: &str) -> String {
        content[node.byte_range()].to_string()
    }
}

/// First ERROR or MISSING node in document order
fn first_syntax_error(root: Node) -> Option<Node> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

fn describe_syntax_error(node: Node, content: &str) -> String {
    let position = node.start_position();
    let (line, column) = (position.row + 1, position.column + 1);
    if node.is_missing() {
        format!("missing `{}` at line {}, column {}", node.kind(), line, column)
    } else {
        let snippet: String = content[node.byte_range()]
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(40)
            .collect();
        format!("unexpected `{}` at line {}, column {}", snippet.trim(), line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> JavaParser {
        JavaParser::new(ExtractorSettings::default())
    }

    fn indexed(path: &str, source: &str) -> ComponentRecord {
        match parser().parse(path, source).unwrap() {
            ParseOutcome::Indexed(record) => record,
            ParseOutcome::Excluded { reason } => panic!("unexpectedly excluded: {}", reason),
        }
    }

    const ACCOUNT_CONTROLLER: &str = r#"package com.bank.controller;

import com.bank.service.AccountService;
import com.bank.model.*;
import java.util.List;
import org.springframework.web.bind.annotation.*;

@RestController
@RequestMapping("/api/accounts")
public class AccountController {

    @Autowired
    private AccountService accountService;

    @GetMapping
    public List<Account> list() {
        return accountService.findAll();
    }

    @GetMapping("/{id}")
    public Account get(@PathVariable Long id) {
        return accountService.findById(id);
    }

    @RequestMapping(value = "/transfer", method = RequestMethod.POST)
    public void transfer(TransferRequest request, String... notes) {
        accountService.transfer(request);
    }

    @PutMapping(path = {"/{id}/close", "/{id}/shutdown"})
    public void close(Long id) {}
}
"#;

    #[test]
    fn test_simple_endpoint_scenario() {
        let source = r#"
@RestController
@RequestMapping("/a")
class Foo {
    @GetMapping("/b")
    public String bar() { return "x"; }
}
"#;
        let record = indexed("Foo.java", source);
        assert_eq!(record.api_flow.endpoints.len(), 1);

        let endpoint = &record.api_flow.endpoints[0];
        assert_eq!(endpoint.path, "/a/b");
        assert_eq!(endpoint.http_method, HttpMethod::Get);
        assert_eq!(endpoint.class, "Foo");
        assert_eq!(endpoint.method, "bar");
    }

    #[test]
    fn test_controller_record() {
        let record = indexed("src/main/java/com/bank/controller/AccountController.java", ACCOUNT_CONTROLLER);

        assert_eq!(record.package, "com.bank.controller");
        assert_eq!(record.role, FrameworkRole::Controller);
        assert_eq!(record.classes.len(), 1);
        assert_eq!(record.classes[0].name, "AccountController");
        assert_eq!(record.classes[0].line_number, 8);

        // External prefixes are dropped; wildcard imports stay
        assert_eq!(
            record.dependencies,
            vec!["com.bank.service.AccountService", "com.bank.model.*"]
        );

        let paths: Vec<(&str, HttpMethod)> = record
            .api_flow
            .endpoints
            .iter()
            .map(|e| (e.path.as_str(), e.http_method))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("/api/accounts", HttpMethod::Get),
                ("/api/accounts/{id}", HttpMethod::Get),
                ("/api/accounts/transfer", HttpMethod::Post),
                ("/api/accounts/{id}/close", HttpMethod::Put),
            ]
        );

        assert_eq!(
            record.api_flow.service_calls,
            vec![ServiceCall {
                class: "AccountController".to_string(),
                service: "AccountService".to_string(),
                field: "accountService".to_string(),
            }]
        );
    }

    #[test]
    fn test_method_and_field_symbols() {
        let record = indexed("AccountController.java", ACCOUNT_CONTROLLER);

        let names: Vec<&str> = record.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["list", "get", "transfer", "close"]);

        let transfer = &record.methods[2];
        assert_eq!(transfer.class, "AccountController");
        assert_eq!(transfer.return_type, "void");
        assert_eq!(transfer.parameters, vec!["TransferRequest", "String..."]);

        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields[0].type_name, "AccountService");
        assert_eq!(record.fields[0].annotations, vec!["Autowired"]);

        let invoked: Vec<&str> = record.invocations.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(invoked, vec!["findAll", "findById", "transfer"]);
    }

    #[test]
    fn test_annotation_records() {
        let record = indexed("AccountController.java", ACCOUNT_CONTROLLER);

        let mapping = record
            .annotations
            .iter()
            .find(|a| a.name == "RequestMapping" && a.element == "AccountController")
            .unwrap();
        assert_eq!(mapping.arguments[0].value, "/api/accounts");

        let transfer = record
            .annotations
            .iter()
            .find(|a| a.element == "AccountController.transfer")
            .unwrap();
        assert_eq!(transfer.arguments.len(), 2);
        assert_eq!(transfer.arguments[1].key.as_deref(), Some("method"));
        assert_eq!(transfer.arguments[1].value, "RequestMethod.POST");
    }

    #[test]
    fn test_class_count_matches_top_level_types() {
        let source = r#"
package com.bank.model;

public class Account {
    private String iban;

    public static class Builder {
        private String iban;
        public Builder iban(String iban) { this.iban = iban; return this; }
    }

    enum Status { OPEN, CLOSED; public boolean active() { return this == OPEN; } }
}

interface Auditable { void audit(); }

enum Currency { EUR, USD }

record Money(long cents, Currency currency) {}
"#;
        let record = indexed("Account.java", source);

        let classes: Vec<(&str, SymbolKind)> = record.classes.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert_eq!(
            classes,
            vec![
                ("Account", SymbolKind::Class),
                ("Auditable", SymbolKind::Interface),
                ("Currency", SymbolKind::Enum),
                ("Money", SymbolKind::Record),
            ]
        );

        // Nested members belong to the nested type
        let builder_iban = record.methods.iter().find(|m| m.name == "iban").unwrap();
        assert_eq!(builder_iban.class, "Builder");
        let active = record.methods.iter().find(|m| m.name == "active").unwrap();
        assert_eq!(active.class, "Status");
        assert_eq!(record.fields.iter().filter(|f| f.name == "iban").count(), 2);
    }

    #[test]
    fn test_inheritance_and_role() {
        let source = r#"
package com.bank.repository;

import org.springframework.data.jpa.repository.JpaRepository;

public interface AccountStore extends JpaRepository<Account, Long>, Auditable {
    Account findByIban(String iban);
}
"#;
        let record = indexed("AccountStore.java", source);
        assert_eq!(record.classes[0].kind, SymbolKind::Interface);
        assert_eq!(record.classes[0].implements, vec!["JpaRepository<Account, Long>", "Auditable"]);
        assert_eq!(record.role, FrameworkRole::Repository);
        assert!(record.dependencies.is_empty());
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let source = "public class Broken {\n    void m( {\n}\n";
        let err = parser().parse("src/Broken.java", source).unwrap_err();
        assert_eq!(err.path, "src/Broken.java");
        assert!(err.message.contains("line"));
        let line = err.line.expect("error line");
        assert!((1..=4).contains(&line), "unexpected line {}", line);
        assert!(err.column.is_some());
        assert!(err.to_string().starts_with("Error parsing Java file src/Broken.java"));
    }

    #[test]
    fn test_test_exclusion() {
        let source = "class AccountServiceTest { void shouldWork() {} }";
        assert!(matches!(
            parser().parse("AccountServiceTest.java", source).unwrap(),
            ParseOutcome::Excluded { .. }
        ));

        let source = "class Helper { void run() {} }";
        assert!(matches!(
            parser().parse("src/test/java/Helper.java", source).unwrap(),
            ParseOutcome::Excluded { .. }
        ));

        // Test-named members are dropped, the rest is kept
        let source = "class Fixtures { void mockAccount() {} void build() {} }";
        let record = indexed("Fixtures.java", source);
        assert_eq!(record.methods.len(), 2);
        let source = "class Fixtures { void buildMock() {} void build() {} }";
        let record = indexed("Fixtures.java", source);
        assert_eq!(record.methods.len(), 1);
    }

    #[test]
    fn test_service_with_repository_fields() {
        let source = r#"
package com.bank.service;

import com.bank.repository.AccountRepository;

@Service
public class AccountServiceImpl implements AccountService {
    private final AccountRepository accountRepository;
    private final AccountRepository archive, mirror;

    public AccountServiceImpl(AccountRepository accountRepository) {
        this.accountRepository = accountRepository;
    }

    public void transfer(TransferRequest request) {
        accountRepository.save(request.toEntity());
    }
}
"#;
        let record = indexed("AccountServiceImpl.java", source);
        assert_eq!(record.role, FrameworkRole::Service);
        assert!(record.api_flow.endpoints.is_empty());

        let fields: Vec<&str> = record.api_flow.repository_calls.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["accountRepository", "archive", "mirror"]);
        assert!(record.api_flow.repository_calls.iter().all(|c| c.class == "AccountServiceImpl"));

        // Constructors are not methods
        assert_eq!(record.methods.len(), 1);
        let invoked: Vec<&str> = record.invocations.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(invoked, vec!["save", "toEntity"]);
    }

    #[test]
    fn test_request_mapping_without_method_is_any() {
        let source = r#"
@Controller
public class PageController {
    @RequestMapping("/home")
    public String home() { return "home"; }

    public String helper() { return ""; }
}
"#;
        let record = indexed("PageController.java", source);
        assert_eq!(record.api_flow.endpoints.len(), 1);
        assert_eq!(record.api_flow.endpoints[0].path, "/home");
        assert_eq!(record.api_flow.endpoints[0].http_method, HttpMethod::Any);
    }

    #[test]
    fn test_concatenated_path_uses_fallback() {
        let source = r#"
@RestController
@RequestMapping("/api" + "/v1")
public class ReportController {
    @GetMapping(value = "/reports/" + "daily")
    public String daily() { return ""; }

    @PostMapping
    public void create() {}
}
"#;
        let record = indexed("ReportController.java", source);
        let paths: Vec<&str> = record.api_flow.endpoints.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/api/reports", "/api"]);
    }

    #[test]
    fn test_non_controller_mappings_are_ignored() {
        let source = r#"
public class Client {
    @GetMapping("/x")
    public String x() { return ""; }
}
"#;
        let record = indexed("Client.java", source);
        assert!(record.api_flow.endpoints.is_empty());
    }
}
