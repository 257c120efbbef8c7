use tracing::warn;

use crate::models::credential::Role;

const DEMO_ADMIN_EMAIL: &str = "admin@example.com";

/// Picks the session role. A role supplied by the backend always wins.
///
/// Without one, an email containing "admin" (case-sensitive) or equal to the
/// demo admin address is treated as an admin. That fallback is display logic
/// only: the backend enforces authorization on every admin endpoint.
pub fn derive_role(email: &str, supplied: Option<Role>) -> Role {
    if let Some(role) = supplied {
        return role;
    }
    if email.contains("admin") || email == DEMO_ADMIN_EMAIL {
        warn!("Backend supplied no role; granting admin view from email heuristic");
        Role::Admin
    } else {
        Role::User
    }
}
