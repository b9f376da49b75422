//! # Innate Primitives
//!
//! Hardcoded constants for the Arbor tree engine.
//!
//! These values are compiled into the binary and are immutable at runtime.

// =============================================================================
// VIEWS
// =============================================================================

/// The view that applies regardless of the view a check asks for.
pub const VIEW_ANY: &str = "any";

/// Checks in this view are never evaluated on Group or Cluster.
pub const VIEW_LOCAL: &str = "local";

// =============================================================================
// CONSTRAINT EVALUATION
// =============================================================================

/// Constraint value that matches any value as long as key and view match.
pub const VALUE_DEFINED: &str = "@defined";

/// System property disabling every check of its view.
pub const DISABLE_ALL_MONITORING: &str = "disable_all_monitoring";

/// System property disabling the checks spawned by one check configuration.
/// Its value is the configuration id.
pub const DISABLE_CHECK_CONFIGURATION: &str = "disable_check_configuration";

/// Native constraint keys.
pub const NATIVE_ENVIRONMENT: &str = "environment";
pub const NATIVE_OBJECT_TYPE: &str = "object_type";
pub const NATIVE_OBJECT_STATE: &str = "object_state";
pub const NATIVE_HARDWARE_NODE: &str = "hardware_node";

/// Key selecting a service by name in a service constraint.
pub const SERVICE_KEY_NAME: &str = "name";

/// Keys selecting an oncall duty in an oncall constraint.
pub const ONCALL_KEY_ID: &str = "id";
pub const ONCALL_KEY_NAME: &str = "name";

// =============================================================================
// SPECIFICATION LIMITS
// =============================================================================

/// Repository names must be between these bounds (inclusive).
pub const REPOSITORY_NAME_MIN: usize = 4;
pub const REPOSITORY_NAME_MAX: usize = 128;

/// Bucket names must be between these bounds (inclusive).
pub const BUCKET_NAME_MIN: usize = 4;
pub const BUCKET_NAME_MAX: usize = 512;

/// Group, cluster and node names share one bound.
pub const ENTITY_NAME_MIN: usize = 1;
pub const ENTITY_NAME_MAX: usize = 256;

// =============================================================================
// CHANNELS
// =============================================================================

/// Suggested capacity for the action and error channels.
///
/// A full channel blocks the producing tree operation until the consumer
/// drains it.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
