use chrono::{NaiveDate, Utc};
use looklab_contracts::events::EventWriter;
use looklab_contracts::projects::{Project, ProjectCatalog, NEW_PROJECT_NAME};
use looklab_contracts::LookError;
use serde_json::json;
use tracing::info;

use crate::session::LookSession;

/// Project catalog plus the one live session working on the active project.
///
/// `active == None` is "new project" mode: a blank session not yet saved.
/// Every session reset logs under `<root session id>-<epoch>`.
#[derive(Debug)]
pub struct Studio {
    catalog: ProjectCatalog,
    active: Option<String>,
    session: LookSession,
    root_session_id: Option<String>,
}

impl Studio {
    pub fn new(catalog: ProjectCatalog, session: LookSession) -> Self {
        let active = catalog.first().map(|project| project.id.clone());
        let root_session_id = session
            .events()
            .map(|events| events.session_id().to_string());
        Self {
            catalog,
            active,
            session,
            root_session_id,
        }
    }

    pub fn seeded(events: Option<EventWriter>) -> Self {
        let session = match events {
            Some(events) => LookSession::with_events(events),
            None => LookSession::new(),
        };
        Self::new(ProjectCatalog::seeded(), session)
    }

    pub fn catalog(&self) -> &ProjectCatalog {
        &self.catalog
    }

    pub fn active(&self) -> Option<&Project> {
        let id = self.active.as_deref()?;
        self.catalog.get(id).ok()
    }

    pub fn project_name(&self) -> &str {
        self.active()
            .map(|project| project.name.as_str())
            .unwrap_or(NEW_PROJECT_NAME)
    }

    pub fn session(&self) -> &LookSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut LookSession {
        &mut self.session
    }

    /// Switches to `id`, starting from a blank session. Re-selecting the
    /// active project keeps the current work.
    pub fn select_project(&mut self, id: &str) -> Result<&Project, LookError> {
        self.catalog.get(id)?;
        if self.active.as_deref() != Some(id) {
            self.active = Some(id.to_string());
            self.switched("select");
        }
        self.catalog.get(id)
    }

    /// Enters new-project mode with a blank session.
    pub fn new_project(&mut self) {
        self.active = None;
        self.switched("new");
    }

    /// Saves the current work as a new project and makes it active.
    pub fn save_project(&mut self, name: &str) -> Result<Project, LookError> {
        let now = Utc::now();
        self.save_project_at(name, now.date_naive(), now.timestamp_millis())
    }

    pub fn save_project_at(
        &mut self,
        name: &str,
        date: NaiveDate,
        id_stamp: i64,
    ) -> Result<Project, LookError> {
        let project = self.catalog.create(name, date, id_stamp)?;
        self.active = Some(project.id.clone());
        info!(project_id = %project.id, name = %project.name, "project saved");
        self.announce("save");
        Ok(project)
    }

    /// Deleting the active project moves to the next one, or to new-project
    /// mode when the catalog is empty.
    pub fn delete_project(&mut self, id: &str) -> Result<Project, LookError> {
        let removed = self.catalog.remove(id)?;
        if self.active.as_deref() == Some(id) {
            self.active = self.catalog.first().map(|project| project.id.clone());
            self.switched("delete");
        }
        Ok(removed)
    }

    fn switched(&mut self, mode: &str) {
        self.session.reset();
        if let Some(root) = &self.root_session_id {
            let session_id = format!("{root}-{}", self.session.epoch());
            self.session.rekey_events(&session_id);
        }
        info!(project_id = ?self.active, mode, "project switched");
        self.announce(mode);
    }

    fn announce(&self, mode: &str) {
        self.session.emit(
            "project_switched",
            json!({ "project_id": self.active, "mode": mode }),
        );
    }
}
