//! Storage key constants.

/// Storage keys used by the client.
///
/// These names match the keys the backend-issued redirect populates and must
/// not change without a migration.
pub struct StorageKeys;

impl StorageKeys {
    /// Opaque authentication token
    pub const TOKEN: &'static str = "token";

    /// JSON-serialized user profile, or a raw string fallback when the
    /// redirect carried unstructured user data
    pub const USER_INFO: &'static str = "userInfo";
}
