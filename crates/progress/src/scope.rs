//! Student and staff parameterizations of the submission stream.
//!
//! A [`StreamScope`] decides three things for an adapter: which topic
//! path to subscribe to, whether the caller may open it at all, and who
//! owns the submission a frame talks about.
//!
//! The staff role gate here only avoids pointless connection attempts.
//! The server checks roles again on upgrade and remains the authority.

use std::collections::HashMap;

use fitchfork_core::roles::ModuleRole;
use fitchfork_core::types::DbId;

use crate::messages::SubmissionStatusFrame;
use crate::store::Owner;

/// Inputs the caller supplies; any of them may still be unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamContext {
    pub token: Option<String>,
    pub module_id: Option<DbId>,
    pub assignment_id: Option<DbId>,
    pub user_id: Option<DbId>,
}

impl StreamContext {
    /// Bearer token, if present and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Answers role questions about the current caller.
pub trait RoleAuthority: Send + Sync {
    fn is_admin(&self) -> bool;

    fn module_role(&self, module_id: DbId) -> Option<ModuleRole>;
}

/// Fixed role table, e.g. loaded once from the `/me` endpoint.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    admin: bool,
    roles: HashMap<DbId, ModuleRole>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admin() -> Self {
        Self {
            admin: true,
            roles: HashMap::new(),
        }
    }

    pub fn with_role(mut self, module_id: DbId, role: ModuleRole) -> Self {
        self.roles.insert(module_id, role);
        self
    }
}

impl RoleAuthority for StaticRoles {
    fn is_admin(&self) -> bool {
        self.admin
    }

    fn module_role(&self, module_id: DbId) -> Option<ModuleRole> {
        self.roles.get(&module_id).copied()
    }
}

/// One flavour of submission stream.
pub trait StreamScope: Send + Sync + 'static {
    /// Short name used in logs.
    const NAME: &'static str;

    /// Topic path below the WebSocket base, or `None` while a required id is missing.
    fn topic_path(&self, ctx: &StreamContext) -> Option<String>;

    /// Client-side role gate.
    fn permits(&self, _ctx: &StreamContext, _authority: &dyn RoleAuthority) -> bool {
        true
    }

    /// Owner of the submission `frame` refers to. `None` means the frame
    /// lacks data this scope requires and must not be merged.
    fn owner(&self, frame: &SubmissionStatusFrame, ctx: &StreamContext) -> Option<Owner>;
}

/// The caller's own submissions for one assignment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StudentScope;

impl StreamScope for StudentScope {
    const NAME: &'static str = "student";

    fn topic_path(&self, ctx: &StreamContext) -> Option<String> {
        let (module_id, assignment_id, user_id) = (ctx.module_id?, ctx.assignment_id?, ctx.user_id?);
        Some(format!(
            "modules/{module_id}/assignments/{assignment_id}/submissions/{user_id}"
        ))
    }

    fn owner(&self, _frame: &SubmissionStatusFrame, ctx: &StreamContext) -> Option<Owner> {
        ctx.user_id.map(|user_id| Owner {
            user_id,
            username: None,
        })
    }
}

/// Every submission of an assignment, for module staff.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaffScope;

impl StreamScope for StaffScope {
    const NAME: &'static str = "staff";

    fn topic_path(&self, ctx: &StreamContext) -> Option<String> {
        let (module_id, assignment_id) = (ctx.module_id?, ctx.assignment_id?);
        Some(format!(
            "modules/{module_id}/assignments/{assignment_id}/submissions/staff"
        ))
    }

    fn permits(&self, ctx: &StreamContext, authority: &dyn RoleAuthority) -> bool {
        if authority.is_admin() {
            return true;
        }
        ctx.module_id
            .and_then(|m| authority.module_role(m))
            .map_or(false, ModuleRole::can_watch_all_submissions)
    }

    fn owner(&self, frame: &SubmissionStatusFrame, _ctx: &StreamContext) -> Option<Owner> {
        frame.user_id.map(|user_id| Owner {
            user_id,
            username: frame.user_username.clone(),
        })
    }
}
