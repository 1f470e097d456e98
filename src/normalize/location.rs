//! Location canonicalization.

/// Canonicalizes a location by removing all whitespace and lowercasing.
///
/// `"East US"`, `"eastus"` and `" EASTUS "` all map to `"eastus"`.
#[must_use]
pub fn canonical_location(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_variants_collapse() {
        for variant in ["East US", "eastus", "EastUS", " EAST  us\t"] {
            assert_eq!(canonical_location(variant), "eastus", "{variant:?}");
        }
    }

    #[test]
    fn test_distinct_locations_stay_distinct() {
        assert_ne!(canonical_location("West US"), canonical_location("West US 2"));
    }
}
