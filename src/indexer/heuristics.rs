// Best-effort Spring heuristics.
//
// Everything here works on names and raw text, not on resolved types. The
// tests at the bottom pin down both the intended behavior and the known
// blind spots.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::index::{FrameworkRole, HttpMethod};

/// Lines above a declaration searched by the raw-text fallback
const FALLBACK_LOOKBACK: usize = 3;

static ANNOTATION_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@([A-Za-z_][\w.]*)\s*\(\s*(?:(?:value|path)\s*=\s*)?\{?\s*"([^"]*)""#)
        .expect("annotation literal regex")
});

/// Role from the type name alone; `None` when the name says nothing
pub fn role_from_name(name: &str) -> Option<FrameworkRole> {
    if name.contains("Controller") {
        Some(FrameworkRole::Controller)
    } else if name.contains("Service") {
        Some(FrameworkRole::Service)
    } else if name.contains("Repository") {
        Some(FrameworkRole::Repository)
    } else if name.contains("Entity") || name.contains("Model") {
        Some(FrameworkRole::Model)
    } else if name.contains("DTO")
        || name.contains("Dto")
        || name.contains("Input")
        || name.contains("Request")
        || name.contains("Response")
    {
        Some(FrameworkRole::Dto)
    } else if name.contains("Util") || name.contains("Helper") {
        Some(FrameworkRole::Utility)
    } else {
        None
    }
}

/// Role from declaration-level annotation names (simple names, no `@`)
pub fn role_from_annotations<S: AsRef<str>>(annotations: &[S]) -> Option<FrameworkRole> {
    let has = |wanted: &[&str]| {
        annotations
            .iter()
            .any(|a| wanted.iter().any(|w| *w == a.as_ref()))
    };

    if has(&["RestController", "Controller", "ControllerAdvice", "RestControllerAdvice"]) {
        Some(FrameworkRole::Controller)
    } else if has(&["Service"]) {
        Some(FrameworkRole::Service)
    } else if has(&["Repository"]) {
        Some(FrameworkRole::Repository)
    } else if has(&["Entity", "Document", "Table", "Embeddable", "MappedSuperclass"]) {
        Some(FrameworkRole::Model)
    } else {
        None
    }
}

/// Name first, then annotations, then supertypes such as `JpaRepository<User, Long>`
pub fn detect_role<S: AsRef<str>>(name: &str, annotations: &[S], supertypes: &[S]) -> FrameworkRole {
    role_from_name(name)
        .or_else(|| role_from_annotations(annotations))
        .or_else(|| {
            supertypes
                .iter()
                .find_map(|t| role_from_name(base_type(t.as_ref())))
                .filter(|role| matches!(role, FrameworkRole::Repository | FrameworkRole::Service))
        })
        .unwrap_or(FrameworkRole::Other)
}

/// Role of a summarized component whose source is not indexed
pub fn role_from_text(name: &str, content: &str) -> FrameworkRole {
    if let Some(role) = role_from_name(name) {
        return role;
    }
    if content.contains("@Controller") || content.contains("@RestController") {
        FrameworkRole::Controller
    } else if content.contains("@Service") {
        FrameworkRole::Service
    } else if content.contains("@Repository") {
        FrameworkRole::Repository
    } else if content.contains("@Entity") {
        FrameworkRole::Model
    } else {
        FrameworkRole::Other
    }
}

/// Declaration name contains one of the test markers
pub fn is_test_name<S: AsRef<str>>(name: &str, markers: &[S]) -> bool {
    markers.iter().any(|m| !m.as_ref().is_empty() && name.contains(m.as_ref()))
}

/// Some directory segment of the path is a test directory
pub fn is_in_test_dir<S: AsRef<str>>(path: &str, test_dirs: &[S]) -> bool {
    let segments: Vec<&str> = path.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
    let dirs = segments.len().saturating_sub(1);
    segments[..dirs]
        .iter()
        .any(|segment| test_dirs.iter().any(|d| d.as_ref() == *segment))
}

/// Import belongs to a filtered framework namespace
pub fn is_external<S: AsRef<str>>(import_path: &str, prefixes: &[S]) -> bool {
    prefixes.iter().any(|p| import_path.starts_with(p.as_ref()))
}

pub fn is_controller_annotation(name: &str) -> bool {
    matches!(name, "RestController" | "Controller")
}

/// Verb for a method-level mapping annotation; `RequestMapping` is resolved separately
pub fn http_method_for(annotation: &str) -> Option<HttpMethod> {
    match annotation {
        "GetMapping" => Some(HttpMethod::Get),
        "PostMapping" => Some(HttpMethod::Post),
        "PutMapping" => Some(HttpMethod::Put),
        "DeleteMapping" => Some(HttpMethod::Delete),
        "PatchMapping" => Some(HttpMethod::Patch),
        _ => None,
    }
}

/// Verb from a `method = RequestMethod.X` argument; the first listed verb wins
pub fn request_method_from(value: &str) -> HttpMethod {
    value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .find_map(|token| match token {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            _ => None,
        })
        .unwrap_or(HttpMethod::Any)
}

/// Join a class-level base path and a method-level path.
///
/// The result always starts with `/`, never contains `//` and has no trailing
/// `/` unless it is the root path.
pub fn join_paths(base: &str, method: &str) -> String {
    let joined = format!("/{}/{}", base.trim(), method.trim());
    let mut out = String::with_capacity(joined.len());
    let mut previous_slash = false;
    for ch in joined.chars() {
        if ch == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(ch);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Type name without generic arguments or array brackets
pub fn base_type(type_name: &str) -> &str {
    type_name
        .split(['<', '['])
        .next()
        .unwrap_or(type_name)
        .trim()
}

pub fn is_service_type(type_name: &str) -> bool {
    type_name.contains("Service")
}

pub fn is_repository_type(type_name: &str) -> bool {
    type_name.contains("Repository")
}

/// Raw-text fallback for annotation string arguments.
///
/// Searches the lines from `FALLBACK_LOOKBACK` lines above `first_line` down
/// to `last_line` (1-based, inclusive) for `@Name("...")`, `@Name(value = "...")`,
/// `@Name(path = "...")` or `@Name({"...", ...})` and returns the literal
/// closest to the declaration. Known limitations: only the first literal of a
/// concatenation is seen, constants are not resolved, and commented-out
/// annotations in the window still match.
pub fn fallback_annotation_value(
    source: &str,
    annotation: &str,
    first_line: usize,
    last_line: usize,
) -> Option<String> {
    if last_line == 0 {
        return None;
    }
    let start = first_line.saturating_sub(FALLBACK_LOOKBACK).max(1);
    let window: Vec<&str> = source
        .lines()
        .skip(start - 1)
        .take((last_line + 1).saturating_sub(start))
        .collect();
    let text = window.join("\n");

    ANNOTATION_LITERAL
        .captures_iter(&text)
        .filter(|caps| {
            let name = &caps[1];
            name == annotation || name.rsplit('.').next() == Some(annotation)
        })
        .last()
        .map(|caps| caps[2].to_string())
}
