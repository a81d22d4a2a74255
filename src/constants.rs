/// Source tag constants to ensure consistency across the codebase.
/// Event identity hashes include the source tag, so these values must never
/// change once events have been stored under them.

// Event provider source tags (used in CLI, config and stored records)
pub const BANDSINTOWN_SOURCE: &str = "bandsintown";
pub const TICKETMASTER_SOURCE: &str = "ticketmaster";

// Reference services
pub const MUSICBRAINZ_SOURCE: &str = "musicbrainz";
pub const COUNTRIESNOW_SOURCE: &str = "countriesnow";

// Default endpoints, overridable through config.toml
pub const MUSICBRAINZ_BASE_URL: &str = "https://musicbrainz.org/ws/2";
pub const BANDSINTOWN_BASE_URL: &str = "https://rest.bandsintown.com";
pub const TICKETMASTER_BASE_URL: &str = "https://app.ticketmaster.com/discovery/v2";
pub const COUNTRIESNOW_BASE_URL: &str = "https://countriesnow.space/api/v0.1";

/// Get all supported event provider source tags
pub fn supported_providers() -> Vec<&'static str> {
    vec![BANDSINTOWN_SOURCE, TICKETMASTER_SOURCE]
}
