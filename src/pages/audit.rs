// Audit Logs - newest trigger-recorded change first

use crate::backend::{fetch, Backend, Query};
use crate::entities::audit::AUDIT_VIEW;
use crate::entities::AuditEntry;
use crate::error::BackendResult;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
}

impl AuditPage {
    pub fn load(backend: &dyn Backend) -> BackendResult<Self> {
        let entries = fetch(
            backend,
            AUDIT_VIEW,
            &Query::new().select("*").order("performed_at", false),
        )?;
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::FakeBackend;
    use serde_json::json;

    #[test]
    fn test_entries_newest_first() {
        let backend = FakeBackend::new().with_table(
            AUDIT_VIEW,
            vec![
                json!({ "id": 1, "action": "INSERT", "performed_at": "2025-03-01T08:00:00Z" }),
                json!({ "id": 2, "action": "DELETE", "username": "ania",
                        "performed_at": "2025-03-02T08:00:00Z", "changed_fields": [] }),
            ],
        );
        let page = AuditPage::load(&backend).unwrap();
        assert_eq!(page.entries[0].id, json!(2));
        assert_eq!(page.entries[0].actor(), "ania");
        assert_eq!(page.entries[0].changed_summary(), "-");
        assert_eq!(page.entries[1].actor(), "—");
    }
}
