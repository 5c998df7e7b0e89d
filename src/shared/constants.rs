/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: usize = 100;

// =============================================================================
// DOCUMENT COLLECTIONS
// =============================================================================

/// Role-tagged profile records, keyed by account id
pub const USERS_COLLECTION: &str = "users";

/// Citizen reports
pub const REPORTS_COLLECTION: &str = "reports";

/// Field the report change feed is ordered on (newest first)
pub const CREATED_AT_FIELD: &str = "createdAt";

pub const UPDATED_AT_FIELD: &str = "updatedAt";

// =============================================================================
// SUBMISSION RULES
// =============================================================================

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Coordinates used when a report only carries a free-text address
pub const DEFAULT_LATITUDE: f64 = 40.7128;
pub const DEFAULT_LONGITUDE: f64 = -74.0060;

/// Id prefix for optimistic mirror entries not yet confirmed by the backend
pub const LOCAL_ID_PREFIX: &str = "local-";
