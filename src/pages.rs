// Dashboard pages as an explicit, caller-supplied table
//
// Pages are plain values handed to PageRegistry at startup. There is no
// global registry and no self-registration on load; whoever builds the app
// decides exactly which pages exist.
use thiserror::Error;

use crate::registry::{ExperimentRegistry, RegistryError};
use crate::settings::ProjectSettings;
use crate::state::db::DbConnection;
use crate::state::users::{self, UserError};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("duplicate page route: {0}")]
    DuplicateRoute(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    User(#[from] UserError),
}

pub type PageResult<T> = Result<T, PageError>;

/// Everything a page may draw on, borrowed from the running app.
pub struct PageContext<'a> {
    pub settings: &'a ProjectSettings,
    pub db: &'a DbConnection,
    pub experiments: &'a ExperimentRegistry,
}

pub trait Page {
    /// Stable route identifier, e.g. `/experiments`.
    fn route(&self) -> &str;
    fn title(&self) -> &str;
    /// Render the page body as plain text for the CLI overview.
    fn render(&self, ctx: &PageContext) -> PageResult<String>;
}

pub type PageCtor = fn() -> Box<dyn Page>;

pub struct PageRegistry {
    pages: Vec<Box<dyn Page>>,
}

impl std::fmt::Debug for PageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageRegistry")
            .field(
                "routes",
                &self.pages.iter().map(|p| p.route()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PageRegistry {
    /// Build a registry from an explicit constructor table. Order is
    /// preserved; duplicate routes are rejected.
    pub fn with_pages(ctors: &[PageCtor]) -> PageResult<Self> {
        let mut pages: Vec<Box<dyn Page>> = Vec::with_capacity(ctors.len());
        for ctor in ctors {
            let page = ctor();
            if pages.iter().any(|p| p.route() == page.route()) {
                return Err(PageError::DuplicateRoute(page.route().to_string()));
            }
            pages.push(page);
        }
        Ok(Self { pages })
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Page> {
        self.pages.iter().map(|p| p.as_ref())
    }

    pub fn get(&self, route: &str) -> Option<&dyn Page> {
        self.pages
            .iter()
            .find(|p| p.route() == route)
            .map(|p| p.as_ref())
    }
}

/// The built-in page set.
pub fn default_pages() -> Vec<PageCtor> {
    vec![
        || Box::new(HomePage),
        || Box::new(ExperimentsPage),
        || Box::new(UsersPage),
    ]
}

struct HomePage;

impl Page for HomePage {
    fn route(&self) -> &str {
        "/"
    }

    fn title(&self) -> &str {
        "Home"
    }

    fn render(&self, ctx: &PageContext) -> PageResult<String> {
        let experiments = ctx.experiments.list_experiments()?;
        Ok(format!(
            "Project: {}\nCreated: {}\nExperiments: {}",
            ctx.settings.name,
            ctx.settings.created_at.to_rfc3339(),
            experiments.len()
        ))
    }
}

struct ExperimentsPage;

impl Page for ExperimentsPage {
    fn route(&self) -> &str {
        "/experiments"
    }

    fn title(&self) -> &str {
        "Experiments"
    }

    fn render(&self, ctx: &PageContext) -> PageResult<String> {
        let mut out = String::new();
        for name in ctx.experiments.list_experiments()? {
            out.push_str(&name);
            out.push('\n');
            for run in ctx.experiments.list_runs(&name)? {
                let created = run
                    .created_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                out.push_str(&format!("  {}  {:<9}  {}\n", run.id, run.status, created));
            }
        }
        if out.is_empty() {
            out.push_str("(no experiments yet)");
        }
        Ok(out)
    }
}

struct UsersPage;

impl Page for UsersPage {
    fn route(&self) -> &str {
        "/users"
    }

    fn title(&self) -> &str {
        "Users"
    }

    fn render(&self, ctx: &PageContext) -> PageResult<String> {
        Ok(format!("Accounts: {}", users::count_users(ctx.db)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::db::init_db_in_memory;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_duplicate_routes_rejected() {
        let ctors: Vec<PageCtor> = vec![|| Box::new(HomePage), || Box::new(HomePage)];
        let err = PageRegistry::with_pages(&ctors).unwrap_err();
        assert!(matches!(err, PageError::DuplicateRoute(ref r) if r == "/"));
    }

    #[test]
    fn test_lookup_and_order() {
        let registry = PageRegistry::with_pages(&default_pages()).unwrap();
        let routes: Vec<&str> = registry.iter().map(|p| p.route()).collect();
        assert_eq!(routes, vec!["/", "/experiments", "/users"]);
        assert_eq!(registry.get("/experiments").unwrap().title(), "Experiments");
        assert!(registry.get("/missing").is_none());
    }

    #[test]
    fn test_pages_render_from_context() {
        let dir = tempdir().unwrap();
        let settings = ProjectSettings::new("copynet");
        let db = init_db_in_memory().unwrap();
        let experiments = ExperimentRegistry::new(dir.path());
        experiments
            .create_run("greetings", &json!({"model": {"type": "copynet_seq2seq"}}))
            .unwrap();

        crate::state::users::create_user(&db, "admin", "some secret").unwrap();

        let ctx = PageContext {
            settings: &settings,
            db: &db,
            experiments: &experiments,
        };

        let registry = PageRegistry::with_pages(&default_pages()).unwrap();
        let home = registry.get("/").unwrap().render(&ctx).unwrap();
        assert!(home.contains("Project: copynet"));
        assert!(home.contains("Experiments: 1"));

        let experiments_page = registry.get("/experiments").unwrap().render(&ctx).unwrap();
        assert!(experiments_page.contains("greetings"));
        assert!(experiments_page.contains("run_001"));

        let users_page = registry.get("/users").unwrap().render(&ctx).unwrap();
        assert_eq!(users_page, "Accounts: 1");
    }
}
