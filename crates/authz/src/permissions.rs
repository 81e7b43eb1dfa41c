//! Permission extraction and the casting-agency permission catalog.

use std::collections::BTreeSet;

use crate::claims::VerifiedClaims;

/// Set of granted permission strings.
pub type PermissionSet = BTreeSet<String>;

/// `GET /actors`
pub const GET_ACTORS: &str = "get:actors";
/// `GET /movies`
pub const GET_MOVIES: &str = "get:movies";
/// `POST /actors`
pub const POST_ACTORS: &str = "post:actors";
/// `POST /movies`
pub const POST_MOVIES: &str = "post:movies";
/// `PATCH /actors/<id>`
pub const PATCH_ACTORS: &str = "patch:actors";
/// `PATCH /movies/<id>`
pub const PATCH_MOVIES: &str = "patch:movies";
/// `DELETE /actors/<id>`
pub const DELETE_ACTORS: &str = "delete:actors";
/// `DELETE /movies/<id>`
pub const DELETE_MOVIES: &str = "delete:movies";

/// Every permission a route in the API can require.
pub const ALL_PERMISSIONS: &[&str] = &[
    GET_ACTORS,
    GET_MOVIES,
    POST_ACTORS,
    POST_MOVIES,
    PATCH_ACTORS,
    PATCH_MOVIES,
    DELETE_ACTORS,
    DELETE_MOVIES,
];

/// Returns the permissions granted by verified claims.
///
/// An absent `permissions` claim yields an empty set; the guard's membership
/// check then rejects the request.
#[must_use]
pub fn extract_permissions(claims: &VerifiedClaims) -> PermissionSet {
    claims.permissions().cloned().unwrap_or_default()
}

/// Roles configured at the identity provider.
///
/// Roles never appear in tokens; the provider expands them into the
/// `permissions` claim. This mapping mirrors that configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Can view actors and movies.
    CastingAssistant,
    /// Assistant permissions, plus add/delete actors and modify actors or movies.
    CastingDirector,
    /// Director permissions, plus add/delete movies.
    ExecutiveProducer,
}

impl Role {
    /// All roles, least privileged first.
    pub const ALL: [Role; 3] = [Role::CastingAssistant, Role::CastingDirector, Role::ExecutiveProducer];

    /// Display name as configured at the identity provider.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Role::CastingAssistant => "Casting Assistant",
            Role::CastingDirector => "Casting Director",
            Role::ExecutiveProducer => "Executive Producer",
        }
    }

    /// Permissions this role is granted.
    #[must_use]
    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            Role::CastingAssistant => &[GET_ACTORS, GET_MOVIES],
            Role::CastingDirector => &[
                GET_ACTORS,
                GET_MOVIES,
                POST_ACTORS,
                DELETE_ACTORS,
                PATCH_ACTORS,
                PATCH_MOVIES,
            ],
            Role::ExecutiveProducer => ALL_PERMISSIONS,
        }
    }

    /// Returns true if the role grants `permission`.
    #[must_use]
    pub fn grants(self, permission: &str) -> bool {
        self.permissions().contains(&permission)
    }
}
