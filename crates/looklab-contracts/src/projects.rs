use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::LookError;

pub const NEW_PROJECT_NAME: &str = "New Project";
pub const NEW_PROJECT_CLIENT: &str = "New Client";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectKind {
    Editorial,
    Commercial,
    Social,
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Editorial => "Editorial",
            Self::Commercial => "Commercial",
            Self::Social => "Social",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub client: String,
    pub kind: ProjectKind,
    pub date: NaiveDate,
}

/// In-memory project list, newest first.
#[derive(Debug, Clone, Default)]
pub struct ProjectCatalog {
    projects: Vec<Project>,
}

impl ProjectCatalog {
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    /// The three sample projects a fresh studio starts with.
    pub fn seeded() -> Self {
        let sample = |id: &str,
                      name: &str,
                      client: &str,
                      kind: ProjectKind,
                      (y, m, d): (i32, u32, u32)| {
            NaiveDate::from_ymd_opt(y, m, d).map(|date| Project {
                id: id.to_string(),
                name: name.to_string(),
                client: client.to_string(),
                kind,
                date,
            })
        };
        Self::new(
            [
                sample("p1", "Campagna SS25", "Vogue IT", ProjectKind::Editorial, (2024, 9, 1)),
                sample("p2", "Urban Run", "Nike", ProjectKind::Commercial, (2024, 9, 15)),
                sample("p3", "Serie Food", "Barilla", ProjectKind::Social, (2024, 10, 1)),
            ]
            .into_iter()
            .flatten()
            .collect(),
        )
    }

    pub fn list(&self) -> &[Project] {
        &self.projects
    }

    pub fn first(&self) -> Option<&Project> {
        self.projects.first()
    }

    pub fn get(&self, id: &str) -> Result<&Project, LookError> {
        self.projects
            .iter()
            .find(|project| project.id == id)
            .ok_or_else(|| LookError::UnknownProject(id.to_string()))
    }

    /// Creates and prepends a project; `id_stamp` is usually epoch millis.
    pub fn create(
        &mut self,
        name: &str,
        date: NaiveDate,
        id_stamp: i64,
    ) -> Result<Project, LookError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LookError::InvalidInput(
                "project name must not be empty".to_string(),
            ));
        }
        let mut id = format!("p-{id_stamp}");
        let mut bump = id_stamp;
        while self.projects.iter().any(|project| project.id == id) {
            bump += 1;
            id = format!("p-{bump}");
        }
        let project = Project {
            id,
            name: name.to_string(),
            client: NEW_PROJECT_CLIENT.to_string(),
            kind: ProjectKind::Editorial,
            date,
        };
        self.projects.insert(0, project.clone());
        Ok(project)
    }

    pub fn remove(&mut self, id: &str) -> Result<Project, LookError> {
        let idx = self
            .projects
            .iter()
            .position(|project| project.id == id)
            .ok_or_else(|| LookError::UnknownProject(id.to_string()))?;
        Ok(self.projects.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{ProjectCatalog, ProjectKind};
    use crate::error::ErrorKind;

    #[test]
    fn seeded_catalog_lists_samples_in_order() {
        let catalog = ProjectCatalog::seeded();
        let ids: Vec<&str> = catalog.list().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2", "p3"]);
        assert_eq!(catalog.get("p2").unwrap().client, "Nike");
        assert_eq!(catalog.get("p3").unwrap().kind, ProjectKind::Social);
    }

    #[test]
    fn create_prepends_and_keeps_ids_unique() {
        let mut catalog = ProjectCatalog::seeded();
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let first = catalog.create("  Lookbook  ", date, 1_700_000_000_000).unwrap();
        let second = catalog.create("Lookbook", date, 1_700_000_000_000).unwrap();

        assert_eq!(first.id, "p-1700000000000");
        assert_eq!(first.name, "Lookbook");
        assert_eq!(first.client, "New Client");
        assert_ne!(first.id, second.id);
        assert_eq!(catalog.first().map(|p| p.id.as_str()), Some(second.id.as_str()));
        assert_eq!(
            catalog.create(" ", date, 1).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn remove_unknown_project_fails() {
        let mut catalog = ProjectCatalog::seeded();
        assert_eq!(catalog.remove("p1").unwrap().name, "Campagna SS25");
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.remove("p1").unwrap_err().kind(),
            ErrorKind::UnknownProject
        );
    }
}
