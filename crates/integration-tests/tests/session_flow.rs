//! Sign-up, login and logout against the fake class server.
//!
//! Each test starts its own server on an ephemeral port and stores the
//! session in a temporary directory.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use classbook_client::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use classbook_client::{ClientError, FileStore, KeyValueStore, SessionManager};
use classbook_integration_tests::FakeClassServer;
use secrecy::SecretString;
use tempfile::TempDir;

const PASSWORD: &str = "correct horse";

struct Harness {
    server: FakeClassServer,
    dir: TempDir,
    session: SessionManager,
}

impl Harness {
    async fn start() -> Self {
        let server = FakeClassServer::start().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let session = SessionManager::from_config(&server.client_config(dir.path().join("session.json"))).unwrap();
        Self {
            server,
            dir,
            session,
        }
    }

    fn store(&self) -> FileStore {
        FileStore::new(self.dir.path().join("session.json"))
    }

    async fn stored(&self, key: &str) -> Option<String> {
        self.store().get(key).await.unwrap()
    }
}

fn password() -> SecretString {
    SecretString::from(PASSWORD)
}

#[tokio::test]
async fn test_signup_then_login() {
    let h = Harness::start().await;

    let created = h
        .session
        .signup("Ada Lovelace", "ada@example.com", &password())
        .await
        .unwrap();
    assert_eq!(created.name, "Ada Lovelace");
    assert_eq!(h.stored(ACCESS_TOKEN_KEY).await, None);

    let user = h.session.login("ada@example.com", &password()).await.unwrap();
    assert_eq!(user.id, created.id);
    assert!(h.session.is_authenticated().await.unwrap());
}

#[tokio::test]
async fn test_signup_short_name_never_reaches_server() {
    let h = Harness::start().await;

    let err = h
        .session
        .signup("A", "a@b.com", &password())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(err.to_string(), "invalid name: must be at least 2 characters");
    assert!(h.server.requests().is_empty());
}

#[tokio::test]
async fn test_duplicate_signup_is_rejected() {
    let h = Harness::start().await;
    let _ = h.server.add_user("Ada", "ada@example.com", PASSWORD);

    let err = h
        .session
        .signup("Ada", "ada@example.com", &password())
        .await
        .unwrap_err();
    match err {
        ClientError::AuthenticationFailed(message) => {
            assert_eq!(message, "Email already registered");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_login_then_authenticated_call_carries_bearer() {
    let h = Harness::start().await;
    let user_id = h.server.add_user("Ada", "ada@example.com", PASSWORD);

    let user = h.session.login("ada@example.com", &password()).await.unwrap();
    assert_eq!(user.id.as_i64(), user_id);

    let token = h.stored(ACCESS_TOKEN_KEY).await.unwrap();
    assert!(h.stored(REFRESH_TOKEN_KEY).await.is_some());
    assert!(h.stored(USER_KEY).await.is_some());

    let api = classbook_client::ClassesApi::new(h.session.clone());
    api.list_classes().await.unwrap();

    let lists = h.server.requests_to("/class/list");
    assert_eq!(lists.len(), 1);
    assert_eq!(
        lists[0].authorization.as_deref(),
        Some(format!("Bearer {token}").as_str())
    );

    let logins = h.server.requests_to("/auth/login");
    assert_eq!(logins[0].authorization, None);
}

#[tokio::test]
async fn test_wrong_password_leaves_no_session() {
    let h = Harness::start().await;
    let _ = h.server.add_user("Ada", "ada@example.com", PASSWORD);

    let err = h
        .session
        .login("ada@example.com", &SecretString::from("wrong password"))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::AuthenticationFailed(_)));
    assert!(!h.session.is_authenticated().await.unwrap());
    assert!(!h.store().path().exists());
}

#[tokio::test]
async fn test_logout_notifies_server_and_clears_store() {
    let h = Harness::start().await;
    let user_id = h.server.add_user("Ada", "ada@example.com", PASSWORD);
    h.session.login("ada@example.com", &password()).await.unwrap();

    h.session.logout().await.unwrap();

    assert_eq!(h.server.logged_out(), vec![user_id]);
    for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
        assert_eq!(h.stored(key).await, None, "{key} survived logout");
    }
}

#[tokio::test]
async fn test_logout_clears_store_when_server_is_gone() {
    let h = Harness::start().await;
    let _ = h.server.add_user("Ada", "ada@example.com", PASSWORD);
    h.session.login("ada@example.com", &password()).await.unwrap();

    let Harness {
        server,
        dir,
        session,
    } = h;
    drop(server);

    session.logout().await.unwrap();

    let store = FileStore::new(dir.path().join("session.json"));
    for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
        assert_eq!(store.get(key).await.unwrap(), None);
    }
}

#[tokio::test]
async fn test_session_survives_restart() {
    let h = Harness::start().await;
    let _ = h.server.add_user("Ada", "ada@example.com", PASSWORD);
    h.session.login("ada@example.com", &password()).await.unwrap();

    let restarted = SessionManager::from_config(
        &h.server.client_config(h.dir.path().join("session.json")),
    )
    .unwrap();

    let status = restarted.status().await.unwrap();
    assert!(status.authenticated);
    assert_eq!(status.user.map(|user| user.name), Some("Ada".to_string()));
}

#[tokio::test]
async fn test_logout_recovers_from_corrupt_session_file() {
    let h = Harness::start().await;
    std::fs::write(
        h.store().path(),
        r#"{"version":1,"entries":{"accessToken":"t""#,
    )
    .unwrap();
    assert!(h.session.status().await.is_err());

    h.session.logout().await.unwrap();

    assert!(h.server.requests().is_empty());
    assert_eq!(h.stored(ACCESS_TOKEN_KEY).await, None);
    assert!(!h.session.is_authenticated().await.unwrap());
}
