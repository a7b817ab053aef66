//! Users and backup-contact chains.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result};
use crate::store::UserStore;
use crate::types::User;

pub struct ContactService {
    users: Arc<dyn UserStore>,
}

impl ContactService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub fn get_user(&self, id: &str) -> Result<User> {
        self.users.get(id)?.ok_or_else(|| Error::not_found("User", id))
    }

    /// Create or replace a user's profile. Assignments are kept as stored.
    pub fn save_user(&self, mut user: User) -> Result<User> {
        if user.id.trim().is_empty() {
            return Err(Error::validation("id", "must not be empty"));
        }
        if let Some(existing) = self.users.get(&user.id)? {
            user.assigned_backup_contact_ids = existing.assigned_backup_contact_ids;
            user.assigned_worker_ids = existing.assigned_worker_ids;
        } else {
            user.assigned_backup_contact_ids.clear();
            user.assigned_worker_ids.clear();
        }
        self.users.upsert(&user)?;
        Ok(user)
    }

    /// Replace a worker's escalation chain. Order is priority order.
    pub fn assign_backup_contacts(&self, worker_id: &str, contact_ids: &[String]) -> Result<User> {
        let mut seen = HashSet::new();
        for id in contact_ids {
            if id == worker_id {
                return Err(Error::validation(
                    "backupContactIds",
                    "a worker cannot be their own backup contact",
                ));
            }
            if !seen.insert(id.as_str()) {
                return Err(Error::validation(
                    "backupContactIds",
                    format!("duplicate contact {}", id),
                ));
            }
        }

        self.users.assign_backup_contacts(worker_id, contact_ids)?;
        info!(
            worker_id = %worker_id,
            contacts = contact_ids.len(),
            "Backup contacts assigned"
        );
        self.get_user(worker_id)
    }

    /// The worker's contacts in chain order, skipping ids that no longer resolve.
    pub fn backup_contacts(&self, worker_id: &str) -> Result<Vec<User>> {
        let worker = self.get_user(worker_id)?;
        let mut contacts = Vec::with_capacity(worker.assigned_backup_contact_ids.len());
        for id in &worker.assigned_backup_contact_ids {
            if let Some(contact) = self.users.get(id)? {
                contacts.push(contact);
            }
        }
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::UserRole;

    fn service() -> ContactService {
        let service = ContactService::new(Arc::new(InMemoryStore::new()));
        for (id, role) in [
            ("w1", UserRole::Worker),
            ("c1", UserRole::BackupContact),
            ("c2", UserRole::BackupContact),
            ("s1", UserRole::Supervisor),
        ] {
            service.save_user(User::new(id, role, id, "Test")).unwrap();
        }
        service
    }

    #[test]
    fn test_assign_keeps_order_and_inverse() {
        let service = service();
        let worker = service
            .assign_backup_contacts("w1", &["c2".into(), "c1".into()])
            .unwrap();
        assert_eq!(worker.assigned_backup_contact_ids, vec!["c2", "c1"]);
        assert_eq!(service.get_user("c1").unwrap().assigned_worker_ids, vec!["w1"]);

        let names: Vec<String> = service
            .backup_contacts("w1")
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(names, vec!["c2", "c1"]);

        service
            .assign_backup_contacts("w1", &["s1".into()])
            .unwrap();
        assert!(service.get_user("c1").unwrap().assigned_worker_ids.is_empty());
        assert_eq!(service.get_user("s1").unwrap().assigned_worker_ids, vec!["w1"]);
    }

    #[test]
    fn test_assign_rejects_bad_chains() {
        let service = service();
        assert!(service
            .assign_backup_contacts("w1", &["c1".into(), "c1".into()])
            .unwrap_err()
            .is_validation());
        assert!(service
            .assign_backup_contacts("w1", &["w1".into()])
            .unwrap_err()
            .is_validation());
        assert!(service
            .assign_backup_contacts("w1", &["ghost".into()])
            .unwrap_err()
            .is_not_found());
        assert!(service
            .assign_backup_contacts("ghost", &["c1".into()])
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_save_user_preserves_assignments() {
        let service = service();
        service.assign_backup_contacts("w1", &["c1".into()]).unwrap();

        let updated = service
            .save_user(User::new("w1", UserRole::Worker, "Wendy", "Worker").with_phone("5551234567"))
            .unwrap();
        assert_eq!(updated.assigned_backup_contact_ids, vec!["c1"]);
        assert_eq!(updated.phone.as_deref(), Some("5551234567"));
    }
}
