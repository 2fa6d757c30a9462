//! Session credential lookup port
//!
//! The sign-in flow lives outside this crate; the dispatcher only reads the
//! signed-in user so outbound commands can carry a `userId`.

use serde::Deserialize;

/// Storage key constants shared with the sign-in flow.
pub mod session_keys {
    pub const SIGNED_IN: &str = "isSignedIn";
    pub const USER_INFO: &str = "userInfo";
}

/// Read-only key/value session storage.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Signed-in user as stored by the sign-in flow.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub user_id: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
}

impl SessionIdentity {
    /// The signed-in user, if the session says there is one.
    ///
    /// Any non-empty sign-in flag other than `"false"` counts as signed in,
    /// matching what the sign-in flow writes. Unreadable user info is logged
    /// and treated as anonymous.
    pub fn lookup(store: &dyn SessionStore) -> Option<Self> {
        let signed_in = store.get(session_keys::SIGNED_IN)?;
        let signed_in = signed_in.trim();
        if signed_in.is_empty() || signed_in.eq_ignore_ascii_case("false") {
            return None;
        }

        let raw = store.get(session_keys::USER_INFO)?;
        match serde_json::from_str::<SessionIdentity>(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(error = %e, "Stored user info is unreadable, sending commands anonymously");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn store_with(signed_in: Option<&'static str>, user_info: Option<&'static str>) -> MockSessionStore {
        let mut store = MockSessionStore::new();
        store
            .expect_get()
            .with(eq(session_keys::SIGNED_IN))
            .returning(move |_| signed_in.map(String::from));
        store
            .expect_get()
            .with(eq(session_keys::USER_INFO))
            .returning(move |_| user_info.map(String::from));
        store
    }

    #[test]
    fn signed_in_user_is_read() {
        let store = store_with(
            Some("true"),
            Some(r#"{"userId":"mabel","id":"42","location":"Ranch","avatar":"a.png","points":7}"#),
        );
        let identity = SessionIdentity::lookup(&store).unwrap();
        assert_eq!(identity.user_id, "mabel");
        assert_eq!(identity.points, Some(7));
    }

    #[test]
    fn anonymous_when_not_signed_in() {
        assert!(SessionIdentity::lookup(&store_with(None, Some(r#"{"userId":"x"}"#))).is_none());
        assert!(SessionIdentity::lookup(&store_with(Some("false"), Some(r#"{"userId":"x"}"#))).is_none());
        assert!(SessionIdentity::lookup(&store_with(Some("true"), None)).is_none());
    }

    #[test]
    fn unreadable_user_info_is_anonymous() {
        assert!(SessionIdentity::lookup(&store_with(Some("true"), Some("{oops"))).is_none());
    }
}
