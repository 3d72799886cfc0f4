/// The signed-in user's session record
use log::warn;

use crate::error::StoreError;
use crate::models::UserInfo;
use crate::store::KeyValueStore;

pub const SESSION_KEY: &str = "userInfo";

/// Explicit session context handed to each view
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: UserInfo,
}

impl Session {
    /// Load the session. Missing means signed out; unreadable content is
    /// cleared and also means signed out.
    pub fn load(store: &dyn KeyValueStore) -> Option<Session> {
        let raw = store.get(SESSION_KEY)?;
        match serde_json::from_str::<UserInfo>(&raw) {
            Ok(user) => Some(Session { user }),
            Err(e) => {
                warn!("Invalid session record, signing out: {}", e);
                if let Err(e) = store.remove(SESSION_KEY) {
                    warn!("Failed to clear session record: {}", e);
                }
                None
            }
        }
    }

    pub fn sign_out(store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.remove(SESSION_KEY)
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin
    }

    pub fn display_name(&self) -> &str {
        self.user
            .username
            .as_deref()
            .or(self.user.email.as_deref())
            .unwrap_or("unknown user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;

    #[test]
    fn session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();
        assert_eq!(Session::load(&store), None);

        let session = Session {
            user: UserInfo {
                is_admin: false,
                username: Some("ana".into()),
                email: Some("ana@example.com".into()),
                device_id: Some("dev-1".into()),
            },
        };
        store
            .set(SESSION_KEY, &serde_json::to_string(&session.user).unwrap())
            .unwrap();

        let loaded = Session::load(&store).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.display_name(), "ana");
        assert!(!loaded.is_admin());

        Session::sign_out(&store).unwrap();
        assert_eq!(Session::load(&store), None);
    }

    #[test]
    fn corrupt_session_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();
        store.set(SESSION_KEY, "not json").unwrap();

        assert_eq!(Session::load(&store), None);
        assert_eq!(store.get(SESSION_KEY), None);
    }

    #[test]
    fn accepts_records_written_by_the_web_client() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();
        store
            .set(SESSION_KEY, r#"{"isAdmin":true,"email":"admin@example.com","profilePicture":"data:..."}"#)
            .unwrap();

        let session = Session::load(&store).unwrap();
        assert!(session.is_admin());
        assert_eq!(session.display_name(), "admin@example.com");
    }
}
