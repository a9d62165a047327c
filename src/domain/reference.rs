/// Which internal resource a gateway reference string names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Booking,
    Purchase,
}

/// A parsed gateway reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceRef {
    fn booking(id: &str) -> Option<Self> {
        (!id.is_empty()).then(|| Self {
            kind: ResourceKind::Booking,
            id: id.to_owned(),
        })
    }

    fn purchase(id: &str) -> Option<Self> {
        (!id.is_empty()).then(|| Self {
            kind: ResourceKind::Purchase,
            id: id.to_owned(),
        })
    }
}

/// Resolves the free-form reference the gateway echoes back to us.
///
/// Prefixes are matched longest-first; anything without a recognized prefix
/// is a bare booking id. Returns `None` for empty references and for
/// prefixes with nothing after them.
pub fn resolve(raw: &str) -> Option<ResourceRef> {
    let raw = raw.trim();
    if let Some(id) = raw.strip_prefix("booking:purchase:") {
        ResourceRef::purchase(id)
    } else if let Some(id) = raw.strip_prefix("purchase:") {
        ResourceRef::purchase(id)
    } else if let Some(id) = raw.strip_prefix("credit_") {
        ResourceRef::purchase(id)
    } else if let Some(id) = raw.strip_prefix("booking:") {
        ResourceRef::booking(id)
    } else {
        ResourceRef::booking(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase(id: &str) -> Option<ResourceRef> {
        Some(ResourceRef {
            kind: ResourceKind::Purchase,
            id: id.to_owned(),
        })
    }

    fn booking(id: &str) -> Option<ResourceRef> {
        Some(ResourceRef {
            kind: ResourceKind::Booking,
            id: id.to_owned(),
        })
    }

    #[test]
    fn purchase_prefixes_win_over_booking_prefix() {
        assert_eq!(resolve("booking:purchase:abc"), purchase("abc"));
        assert_eq!(resolve("purchase:abc"), purchase("abc"));
        assert_eq!(resolve("credit_abc"), purchase("abc"));
    }

    #[test]
    fn booking_prefix_and_bare_ids_resolve_to_bookings() {
        assert_eq!(resolve("booking:abc"), booking("abc"));
        assert_eq!(resolve("abc-123"), booking("abc-123"));
    }

    #[test]
    fn empty_and_prefix_only_references_resolve_to_none() {
        assert_eq!(resolve(""), None);
        assert_eq!(resolve("   "), None);
        assert_eq!(resolve("booking:"), None);
        assert_eq!(resolve("purchase:"), None);
        assert_eq!(resolve("credit_"), None);
        assert_eq!(resolve("booking:purchase:"), None);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(resolve("  booking:abc "), booking("abc"));
    }
}
