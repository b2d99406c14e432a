// Component relationship matrix

use std::collections::{BTreeMap, BTreeSet};

use super::Snapshot;

const TITLE: &str = "# Component Relationship Matrix";
const HEADER: &str = "| Component | Depends On | Used By |";
const SEPARATOR: &str = "|-----------|------------|---------|";
const EMPTY_CELL: &str = "None";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixRow {
    pub depends_on: BTreeSet<String>,
    pub used_by: BTreeSet<String>,
}

/// Depends-on and used-by sets per class-like symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipMatrix {
    rows: BTreeMap<String, MatrixRow>,
}

impl RelationshipMatrix {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut rows: BTreeMap<String, MatrixRow> = BTreeMap::new();
        for record in snapshot.values() {
            for class in record.class_names() {
                rows.entry(class.to_string())
                    .or_default()
                    .depends_on
                    .extend(record.dependency_names().map(str::to_string));
            }
        }

        let edges: Vec<(String, String)> = rows
            .iter()
            .flat_map(|(component, row)| {
                row.depends_on
                    .iter()
                    .map(move |dep| (dep.clone(), component.clone()))
            })
            .collect();
        for (dependency, user) in edges {
            if let Some(row) = rows.get_mut(&dependency) {
                row.used_by.insert(user);
            }
        }

        Self { rows }
    }

    pub fn get(&self, component: &str) -> Option<&MatrixRow> {
        self.rows.get(component)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MatrixRow)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose component, dependencies or users intersect `names`
    pub fn related_to<'a>(
        &'a self,
        names: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = (&'a String, &'a MatrixRow)> + 'a {
        self.rows.iter().filter(move |(component, row)| {
            names.contains(*component)
                || !row.depends_on.is_disjoint(names)
                || !row.used_by.is_disjoint(names)
        })
    }

    pub fn to_markdown(&self) -> String {
        let cell = |set: &BTreeSet<String>| {
            if set.is_empty() {
                EMPTY_CELL.to_string()
            } else {
                set.iter().cloned().collect::<Vec<_>>().join(", ")
            }
        };

        let mut out = format!("{}\n\n{}\n{}\n", TITLE, HEADER, SEPARATOR);
        for (component, row) in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                component,
                cell(&row.depends_on),
                cell(&row.used_by)
            ));
        }
        out
    }

    /// Read a matrix table back; title, header and separator rows are skipped
    pub fn parse_markdown(content: &str) -> Self {
        let list = |cell: &str| -> BTreeSet<String> {
            cell.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty() && *item != EMPTY_CELL && *item != "-")
                .map(str::to_string)
                .collect()
        };

        let mut rows = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if !line.starts_with('|') {
                continue;
            }
            let cells: Vec<&str> = line.trim_matches('|').split('|').map(str::trim).collect();
            if cells.len() < 3 {
                continue;
            }
            let component = cells[0];
            let is_separator = component.chars().all(|c| c == '-' || c == ':');
            if component.is_empty() || component == "Component" || is_separator {
                continue;
            }
            rows.insert(
                component.to_string(),
                MatrixRow {
                    depends_on: list(cells[1]),
                    used_by: list(cells[2]),
                },
            );
        }

        Self { rows }
    }
}

impl FromIterator<(String, MatrixRow)> for RelationshipMatrix {
    fn from_iter<I: IntoIterator<Item = (String, MatrixRow)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::bank_snapshot;
    use super::*;

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_inverse_mapping() {
        let matrix = RelationshipMatrix::build(&bank_snapshot());
        assert_eq!(matrix.len(), 4);

        let controller = matrix.get("AccountController").unwrap();
        assert_eq!(controller.depends_on, names(&["AccountService"]));
        assert!(controller.used_by.is_empty());

        let service = matrix.get("AccountService").unwrap();
        assert_eq!(service.used_by, names(&["AccountController"]));

        let repo = matrix.get("AccountRepository").unwrap();
        assert_eq!(repo.used_by, names(&["AccountServiceImpl"]));
    }

    #[test]
    fn test_markdown_round_trip() {
        let matrix = RelationshipMatrix::build(&bank_snapshot());
        let markdown = matrix.to_markdown();

        assert!(markdown.starts_with(TITLE));
        assert!(markdown.contains("| AccountController | AccountService | None |"));
        assert_eq!(RelationshipMatrix::parse_markdown(&markdown), matrix);
    }

    #[test]
    fn test_parse_hand_written_table() {
        let content = "# Matrix\n\n| Component | Depends On | Used By |\n|---|---|---|\n\
                       | UserController | UserService, AuditService | |\n\
                       | UserService | UserRepository | UserController |\nsome trailing text\n";
        let matrix = RelationshipMatrix::parse_markdown(content);

        assert_eq!(matrix.len(), 2);
        assert_eq!(
            matrix.get("UserController").unwrap().depends_on,
            names(&["AuditService", "UserService"])
        );
        assert!(matrix.get("UserController").unwrap().used_by.is_empty());
    }

    #[test]
    fn test_related_rows() {
        let matrix = RelationshipMatrix::build(&bank_snapshot());
        let wanted = names(&["AccountService"]);
        let related: Vec<&String> = matrix
            .related_to(&wanted)
            .map(|(component, _)| component)
            .collect();
        assert_eq!(related, vec!["AccountController", "AccountService"]);
    }
}
