//! Request routing.
//!
//! Maps request paths onto the gateway's handlers.

use percent_encoding::percent_decode_str;

/// `{user}/{project}` pair taken from the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoute {
    pub user: String,
    pub project: String,
}

impl ProjectRoute {
    /// Store key of the project: `user/project`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.user, self.project)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/ows/{user}/{project}` or `/api/map/ows/{user}/{project}`.
    Ows(ProjectRoute),
    /// `/api/map/capabilities/{user}/{project}`.
    LayerCapabilities(ProjectRoute),
    Health,
    NotFound,
}

impl Route {
    #[must_use]
    pub fn resolve(path: &str) -> Self {
        if path == "/health" || path == "/.well-known/health" {
            return Self::Health;
        }

        let Some(rest) = path.strip_prefix('/') else {
            return Self::NotFound;
        };
        let segments: Vec<&str> = rest.split('/').collect();

        match segments.as_slice() {
            ["ows", user, project] | ["api", "map", "ows", user, project] => {
                project_route(user, project).map_or(Self::NotFound, Self::Ows)
            }
            ["api", "map", "capabilities", user, project] => {
                project_route(user, project).map_or(Self::NotFound, Self::LayerCapabilities)
            }
            _ => Self::NotFound,
        }
    }
}

fn project_route(user: &str, project: &str) -> Option<ProjectRoute> {
    Some(ProjectRoute {
        user: segment(user)?,
        project: segment(project)?,
    })
}

/// Decodes one path segment; rejects anything that could escape the project directory.
fn segment(raw: &str) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    let invalid = decoded.is_empty()
        || decoded == "."
        || decoded == ".."
        || decoded.contains(['/', '\\', '\0']);
    if invalid { None } else { Some(decoded.into_owned()) }
}
