//! Remote-to-local account resolution
//!
//! Bank accounts arrive with provider-controlled names ("Revolut LT12 3456",
//! "Conto BancoPosta"). Transactions need to land on the account the user
//! actually tracks. Resolution order:
//!
//! 1. explicit user mapping stored for the remote uid, always wins
//! 2. brand keywords: the remote label and a local account name hitting the
//!    same brand group ("bancoposta" and "postepay" are both Poste)
//! 3. fuzzy containment between the remote and local names, either
//!    direction, local names shorter than 3 characters excluded
//! 4. the remote uid itself; uids are unique where display names are not,
//!    so two unmapped accounts never collapse into one pseudo-account

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{LocalAccount, RemoteAccount};
use crate::store::TransactionStore;

/// Brand keyword groups
///
/// Two names referring to the same institution under different product
/// labels resolve to each other through their shared group. Loadable from
/// TOML so deployments can extend the table without a rebuild.
#[derive(Debug, Clone, Deserialize)]
pub struct BrandTable {
    brands: BTreeMap<String, Vec<String>>,
}

impl Default for BrandTable {
    fn default() -> Self {
        let mut brands = BTreeMap::new();
        let mut add = |name: &str, keywords: &[&str]| {
            brands.insert(
                name.to_string(),
                keywords.iter().map(|k| k.to_string()).collect(),
            );
        };
        add("revolut", &["revolut"]);
        add("paypal", &["paypal"]);
        add("bbva", &["bbva"]);
        add("poste", &["poste", "bancoposta", "postepay"]);
        add("n26", &["n26"]);
        add("intesa", &["intesa", "sanpaolo"]);
        add("crypto", &["binance", "coinbase", "kraken", "crypto"]);
        Self { brands }
    }
}

impl BrandTable {
    /// Parse a table from TOML:
    ///
    /// ```toml
    /// [brands]
    /// poste = ["poste", "bancoposta", "postepay"]
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("invalid brand table: {}", e)))
    }

    /// Keywords of the first brand any of whose keywords appear in `label`.
    fn matching_brand(&self, label: &str) -> Option<&[String]> {
        let label = label.to_lowercase();
        self.brands
            .values()
            .find(|keywords| keywords.iter().any(|k| label.contains(k.as_str())))
            .map(|v| v.as_slice())
    }
}

pub struct AccountResolver {
    store: Arc<dyn TransactionStore>,
    brands: BrandTable,
}

impl AccountResolver {
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            store,
            brands: BrandTable::default(),
        }
    }

    pub fn with_brands(mut self, brands: BrandTable) -> Self {
        self.brands = brands;
        self
    }

    /// Resolve a remote account to the local account transactions should be
    /// booked against. Falls back to the remote uid, never fails to name an
    /// account.
    pub async fn resolve(
        &self,
        remote: &RemoteAccount,
        locals: &[LocalAccount],
    ) -> Result<String> {
        if let Some(mapped) = self.store.mapping_for(&remote.uid).await? {
            return Ok(mapped);
        }

        let remote_label = match &remote.aspsp_name {
            Some(aspsp) => format!("{} {}", remote.name, aspsp),
            None => remote.name.clone(),
        };

        if let Some(keywords) = self.brands.matching_brand(&remote_label) {
            if let Some(local) = locals.iter().find(|l| {
                let name = l.name.to_lowercase();
                keywords.iter().any(|k| name.contains(k.as_str()))
            }) {
                debug!(remote = %remote.uid, local = %local.id, "resolved via brand keywords");
                return Ok(local.id.clone());
            }
        }

        let remote_name = remote.name.to_lowercase();
        if let Some(local) = locals.iter().find(|l| {
            let name = l.name.to_lowercase();
            name.len() >= 3 && (remote_name.contains(&name) || name.contains(&remote_name))
        }) {
            debug!(remote = %remote.uid, local = %local.id, "resolved via name containment");
            return Ok(local.id.clone());
        }

        debug!(remote = %remote.uid, "no local match, using remote uid");
        Ok(remote.uid.clone())
    }

    /// Persist an explicit mapping; subsequent resolutions short-circuit.
    pub async fn set_mapping(&self, remote_uid: &str, local_account: &str) -> Result<()> {
        self.store.set_mapping(remote_uid, local_account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn remote(uid: &str, name: &str, aspsp: Option<&str>) -> RemoteAccount {
        RemoteAccount {
            uid: uid.to_string(),
            name: name.to_string(),
            aspsp_name: aspsp.map(String::from),
        }
    }

    fn local(id: &str, name: &str) -> LocalAccount {
        LocalAccount {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_explicit_mapping_wins() {
        let store = Arc::new(MemoryStore::new());
        let resolver = AccountResolver::new(store);
        resolver.set_mapping("uid-1", "cash").await.unwrap();

        let locals = vec![local("revolut", "Revolut")];
        let resolved = resolver
            .resolve(&remote("uid-1", "Revolut Main", None), &locals)
            .await
            .unwrap();
        assert_eq!(resolved, "cash");
    }

    #[tokio::test]
    async fn test_brand_keywords_bridge_product_names() {
        let resolver = AccountResolver::new(Arc::new(MemoryStore::new()));
        let locals = vec![local("pp", "PostePay"), local("rev", "Revolut")];

        // "BancoPosta" and "PostePay" share the poste brand group
        let resolved = resolver
            .resolve(&remote("uid-1", "Conto BancoPosta", None), &locals)
            .await
            .unwrap();
        assert_eq!(resolved, "pp");
    }

    #[tokio::test]
    async fn test_brand_match_uses_aspsp_name() {
        let resolver = AccountResolver::new(Arc::new(MemoryStore::new()));
        let locals = vec![local("rev", "Revolut")];

        let resolved = resolver
            .resolve(&remote("uid-1", "Main LT12", Some("Revolut Bank UAB")), &locals)
            .await
            .unwrap();
        assert_eq!(resolved, "rev");
    }

    #[tokio::test]
    async fn test_fuzzy_containment() {
        let resolver = AccountResolver::new(Arc::new(MemoryStore::new()));
        let locals = vec![local("che", "Checking")];

        let resolved = resolver
            .resolve(&remote("uid-1", "Checking EUR", None), &locals)
            .await
            .unwrap();
        assert_eq!(resolved, "che");
    }

    #[tokio::test]
    async fn test_short_local_names_never_fuzzy_match() {
        let resolver = AccountResolver::new(Arc::new(MemoryStore::new()));
        let locals = vec![local("n", "N")];

        // "N" appears in the remote name but is too short to trust
        let resolved = resolver
            .resolve(&remote("uid-1", "Nameless Bank", None), &locals)
            .await
            .unwrap();
        assert_eq!(resolved, "uid-1");
    }

    #[tokio::test]
    async fn test_fallback_is_remote_uid() {
        let resolver = AccountResolver::new(Arc::new(MemoryStore::new()));
        let resolved = resolver
            .resolve(&remote("uid-1", "Mystery", None), &[])
            .await
            .unwrap();
        assert_eq!(resolved, "uid-1");

        let resolved = resolver
            .resolve(&remote("uid-2", "", None), &[])
            .await
            .unwrap();
        assert_eq!(resolved, "uid-2");
    }

    #[tokio::test]
    async fn test_unmapped_accounts_with_same_name_stay_distinct() {
        let resolver = AccountResolver::new(Arc::new(MemoryStore::new()));

        // Providers reuse display names across accounts; the uids differ
        let first = resolver
            .resolve(&remote("uid-1", "Main EUR", None), &[])
            .await
            .unwrap();
        let second = resolver
            .resolve(&remote("uid-2", "Main EUR", None), &[])
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(first, "uid-1");
        assert_eq!(second, "uid-2");
    }

    #[test]
    fn test_brand_table_from_toml() {
        let table = BrandTable::from_toml_str(
            r#"
            [brands]
            mybank = ["mybank", "my-bank"]
            "#,
        )
        .unwrap();
        assert!(table.matching_brand("MY-BANK Premium").is_some());
        assert!(table.matching_brand("Revolut").is_none());

        assert!(BrandTable::from_toml_str("not toml [").is_err());
    }
}
