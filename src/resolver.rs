//! Effective-company resolution.
//!
//! An entity assigned to a client is scoped to that client's company, which
//! lives in another table. Restricted internal sessions need it resolved
//! before visibility can be decided, and the lookup is I/O, so it runs as
//! an async side call off the reconcile loop; the result is joined back in
//! as a plain [`CompanyDirectory`] before the synchronous store mutation.

use std::collections::HashMap;
use std::future::Future;

use crate::error::Result;

/// Pre-resolved client → company mappings for one reconcile step.
///
/// A client id absent from the directory stays unresolved and the entity
/// fails closed to not-visible.
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    companies: HashMap<String, String>,
}

impl CompanyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client_id: impl Into<String>, company_id: impl Into<String>) {
        self.companies.insert(client_id.into(), company_id.into());
    }

    pub fn get(&self, client_id: &str) -> Option<&str> {
        self.companies.get(client_id).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }
}

impl FromIterator<(String, String)> for CompanyDirectory {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            companies: iter.into_iter().collect(),
        }
    }
}

/// Looks up the company a client belongs to.
///
/// `Ok(None)` means the client has no company; `Err` means the lookup
/// itself failed. Both leave the directory without an entry, and the
/// affected entity fails closed.
pub trait CompanyResolver: Send + Sync + 'static {
    fn resolve_company(
        &self,
        client_id: &str,
    ) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// In-memory resolver over a fixed mapping.
///
/// The production implementation wraps the directory service; this one
/// backs tests and single-tenant deployments where the mapping is known
/// up front.
#[derive(Debug, Clone, Default)]
pub struct StaticCompanyResolver {
    companies: HashMap<String, String>,
}

impl StaticCompanyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(
        mut self,
        client_id: impl Into<String>,
        company_id: impl Into<String>,
    ) -> Self {
        self.companies.insert(client_id.into(), company_id.into());
        self
    }
}

impl CompanyResolver for StaticCompanyResolver {
    async fn resolve_company(&self, client_id: &str) -> Result<Option<String>> {
        Ok(self.companies.get(client_id).cloned())
    }
}
