//! Registry of active link partners.
//!
//! Resolves the authenticated identity of a caller (the client-certificate
//! subject DN forwarded by the TLS-terminating layer) to exactly one link
//! partner, and holds the per-partner delivery configuration. The registry is
//! an explicit, injected component; it is populated from the deployment
//! configuration at startup and may be mutated at runtime as partners are
//! enabled or disabled.

use dashmap::DashMap;

use crate::domain::{LinkPartner, LinkPartnerName};

/// Concurrent registry keyed by normalized certificate DN, with a secondary
/// index by partner name.
pub struct LinkPartnerRegistry {
    by_dn: DashMap<String, LinkPartner>,
    dn_by_name: DashMap<LinkPartnerName, String>,
}

/// DNs arrive with inconsistent casing and spacing depending on which TLS
/// stack produced them; compare a canonical form.
fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|part| part.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

impl LinkPartnerRegistry {
    pub fn new() -> Self {
        Self {
            by_dn: DashMap::new(),
            dn_by_name: DashMap::new(),
        }
    }

    /// Build a registry pre-populated with the configured partners.
    pub fn from_partners(partners: &[LinkPartner]) -> Self {
        let registry = Self::new();
        for partner in partners {
            registry.register(partner.clone());
        }
        registry
    }

    /// Register a partner. A partner re-registering under the same name
    /// replaces its previous entry.
    pub fn register(&self, partner: LinkPartner) {
        let dn = normalize_dn(&partner.certificate_dn);
        if let Some((_, old_dn)) = self.dn_by_name.remove(&partner.name) {
            self.by_dn.remove(&old_dn);
        }
        self.dn_by_name.insert(partner.name.clone(), dn.clone());
        tracing::info!(
            partner = %partner.name,
            mode = ?partner.mode,
            "Registered link partner"
        );
        self.by_dn.insert(dn, partner);
    }

    /// Remove a partner by name. Returns the removed entry, if any.
    pub fn deregister(&self, name: &LinkPartnerName) -> Option<LinkPartner> {
        let (_, dn) = self.dn_by_name.remove(name)?;
        let removed = self.by_dn.remove(&dn).map(|(_, partner)| partner);
        if removed.is_some() {
            tracing::info!(partner = %name, "Deregistered link partner");
        }
        removed
    }

    /// Resolve an authenticated certificate DN to a partner.
    pub fn lookup(&self, certificate_dn: &str) -> Option<LinkPartner> {
        self.by_dn
            .get(&normalize_dn(certificate_dn))
            .map(|entry| entry.value().clone())
    }

    /// Look up a partner's configuration by name.
    pub fn get_by_name(&self, name: &LinkPartnerName) -> Option<LinkPartner> {
        let dn = self.dn_by_name.get(name)?;
        self.by_dn.get(dn.value()).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_dn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_dn.is_empty()
    }
}

impl Default for LinkPartnerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LinkMode;

    fn partner(name: &str, dn: &str) -> LinkPartner {
        LinkPartner {
            name: LinkPartnerName::from(name),
            certificate_dn: dn.to_string(),
            mode: LinkMode::Pull,
            push_url: None,
        }
    }

    #[test]
    fn test_lookup_normalizes_dn() {
        let registry = LinkPartnerRegistry::new();
        registry.register(partner("backend-1", "CN=Backend 1, O=Test, C=EU"));

        let found = registry.lookup("cn=backend 1,o=test,c=eu");
        assert_eq!(found.unwrap().name, LinkPartnerName::from("backend-1"));
    }

    #[test]
    fn test_unknown_dn_is_rejected() {
        let registry = LinkPartnerRegistry::new();
        registry.register(partner("backend-1", "CN=Backend 1"));
        assert!(registry.lookup("CN=Intruder").is_none());
    }

    #[test]
    fn test_reregister_replaces_previous_dn() {
        let registry = LinkPartnerRegistry::new();
        registry.register(partner("backend-1", "CN=Old"));
        registry.register(partner("backend-1", "CN=New"));

        assert!(registry.lookup("CN=Old").is_none());
        assert!(registry.lookup("CN=New").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_deregister() {
        let registry = LinkPartnerRegistry::new();
        registry.register(partner("backend-1", "CN=Backend 1"));

        let removed = registry.deregister(&LinkPartnerName::from("backend-1"));
        assert!(removed.is_some());
        assert!(registry.lookup("CN=Backend 1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_get_by_name() {
        let registry = LinkPartnerRegistry::from_partners(&[
            partner("backend-1", "CN=Backend 1"),
            partner("gateway", "CN=Gateway"),
        ]);

        let found = registry.get_by_name(&LinkPartnerName::from("gateway"));
        assert_eq!(found.unwrap().certificate_dn, "CN=Gateway");
    }
}
