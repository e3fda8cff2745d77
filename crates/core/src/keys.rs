//! Well-known keys, names and identifiers.
//!
//! These strings are part of the stored data format and of the permission
//! object namespace; changing any of them breaks existing ledgers.

// ---------------------------------------------------------------------------
// Service keys
// ---------------------------------------------------------------------------

/// Document type, stored upper-case.
pub const DOC_TYPE_KEY: &str = "docType";
/// Schema version the asset conforms to.
pub const VERSION_KEY: &str = "xxx_version";
/// Primary id of every asset except identities.
pub const UUID_KEY: &str = "uuid";
/// Primary id of identity assets.
pub const FINGERPRINT_KEY: &str = "fingerprint";

/// Keys a client patch may never contain.
pub const SERVICE_KEYS: [&str; 4] = [DOC_TYPE_KEY, VERSION_KEY, UUID_KEY, FINGERPRINT_KEY];

// ---------------------------------------------------------------------------
// Built-in assets
// ---------------------------------------------------------------------------

pub const IDENTITY_ASSET: &str = "identity";
pub const ROLE_ASSET: &str = "role";

/// Id of the role that bypasses every permission check.
pub const SUPERUSER_ROLE_ID: &str = "a00a1f64-01a1-4153-b22e-35cf7026ba7e";
pub const SUPERUSER_ROLE_NAME: &str = "Superuser";

pub const ROLES_KEY: &str = "roles";
pub const GRANTS_KEY: &str = "grants";
pub const OVERRIDES_KEY: &str = "overrides";
pub const IS_ENABLED_KEY: &str = "is_enabled";
pub const IS_SYSTEM_KEY: &str = "is_system";
pub const NAME_KEY: &str = "name";

pub const OBJECT_KEY: &str = "object";
pub const SUBJECT_KEY: &str = "subject";
pub const ACTION_KEY: &str = "action";
pub const EFFECT_KEY: &str = "effect";

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

/// Schema description prefix marking a plain reference: `REF-><name>`.
pub const REF_PREFIX: &str = "REF->";
/// Schema description prefix marking an entity reference (`<name>:<id>`).
pub const ENTITY_REF_PREFIX: &str = "ENTITYREF";

// ---------------------------------------------------------------------------
// Queries and outputs
// ---------------------------------------------------------------------------

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const RESULT_KEY: &str = "result";
pub const BOOKMARK_KEY: &str = "bookmark";

// ---------------------------------------------------------------------------
// Permission namespace
// ---------------------------------------------------------------------------

pub const REGISTRY_OBJECT_PREFIX: &str = "/registry/";
pub const SINGLETON_OBJECT_PREFIX: &str = "/singleton/";
pub const FUNCTION_INVOKE_OBJECT_PREFIX: &str = "/function/invoke/";
pub const FUNCTION_QUERY_OBJECT_PREFIX: &str = "/function/query/";

/// Actions understood by the engine itself. Anything else is a custom grant.
pub mod action {
    pub const READ: &str = "read";
    pub const READ_DIRECT: &str = "read_direct";
    pub const CREATE: &str = "create";
    pub const CREATE_DIRECT: &str = "create_direct";
    pub const CREATE_SYSTEM: &str = "create_system";
    pub const UPDATE: &str = "update";
    pub const UPDATE_DIRECT: &str = "update_direct";
    pub const UPDATE_SYSTEM: &str = "update_system";
    pub const DELETE: &str = "delete";
    pub const DELETE_DIRECT: &str = "delete_direct";
    pub const QUERY_DIRECT: &str = "query_direct";
    pub const EXECUTE: &str = "execute";
    pub const UPSERT: &str = "upsert";
    pub const MIGRATE: &str = "migrate";
    pub const GET_HISTORY: &str = "get_history";

    /// Grants the access overview reports outside `custom_grants`.
    pub const STANDARD: [&str; 5] = [CREATE, READ, UPDATE, DELETE, EXECUTE];
}

// ---------------------------------------------------------------------------
// Built-in functions
// ---------------------------------------------------------------------------

pub const FN_MY_ACCESS: &str = "myAccess";
pub const FN_IDENTITY_ACCESS: &str = "identityAccess";
pub const FN_UPSERT_REGISTRIES: &str = "upsertRegistries";
pub const FN_UPSERT_SINGLETONS: &str = "upsertSingletons";

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// State key holding the fingerprint of the pending initial manager.
pub const INIT_MANAGER_STATE_KEY: &str = "INIT_MANAGER";
pub const INIT_MANAGER_KEY: &str = "init_manager";
pub const INIT_REGISTRIES_KEY: &str = "registries";
pub const INIT_SINGLETONS_KEY: &str = "singletons";
