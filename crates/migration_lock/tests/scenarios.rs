use std::sync::Arc;

use chrono::{Duration, Utc};
use migration_lock::*;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use warp::{http::StatusCode, Filter, Reply};

const SECRET: &str = "s3cret";
const ADMIN: &str = "admin-token";

struct Site {
    coordinator: Coordinator,
    store: MemConfigStore,
    content: MemContentSource,
    /// Statements the host handed to its database, after the gate.
    executed: Arc<Mutex<Vec<String>>>,
}

impl Site {
    fn new() -> Self {
        migration_lock_trace::test_run();
        let store = MemConfigStore::new();
        let content = MemContentSource::default();
        content.put(ContentRow {
            id: 1,
            title: "Hello world".into(),
            guid: "https://example.org/?p=1".into(),
            content: "Welcome.".into(),
        });
        let mut config = LockConfig::new(SECRET);
        config.admin_token = Some(SharedSecret::new(ADMIN));
        let coordinator = Coordinator::new(
            config,
            SiteSettings::default(),
            Arc::new(store.clone()),
            Arc::new(content.clone()),
        )
        .unwrap();
        Self {
            coordinator,
            store,
            content,
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn options(&self, json: &str) {
        self.store.update_option(DEFAULT_OPTIONS_KEY, json).unwrap();
    }

    fn arm_for_an_hour(&self) {
        self.coordinator
            .lock_store()
            .arm((Utc::now() + Duration::hours(1)).timestamp())
            .unwrap();
    }

    /// A host page that records a view counter update and reads the posts.
    fn filter(&self) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
        let executed = self.executed.clone();
        let host = maintenance(self.coordinator.clone())
            .map(move |view: PageView| {
                let mut executed = executed.lock();
                for sql in [
                    "INSERT INTO stats (page) VALUES ('/')",
                    "SELECT * FROM posts ORDER BY id DESC",
                ] {
                    executed.push(view.lock().intercept(sql).statement().to_string());
                }
                view.render("<html><body><h1>Hello world</h1></body></html>".into())
                    .into_response()
            })
            .boxed();
        routes(self.coordinator.clone(), host)
    }
}

async fn body(res: &warp::http::Response<warp::hyper::body::Bytes>) -> String {
    String::from_utf8(res.body().to_vec()).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn unlocked_site_serves_normal_content() {
    let site = Site::new();
    site.options(r#"{"migration_active":false}"#);

    let res = warp::test::request().path("/").reply(&site.filter()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page = body(&res).await;
    assert!(page.contains("Hello world"));
    assert!(!page.contains("Website Under Maintenance"));
    assert_eq!(
        *site.executed.lock(),
        vec![
            "INSERT INTO stats (page) VALUES ('/')".to_string(),
            "SELECT * FROM posts ORDER BY id DESC".to_string(),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn visitors_get_the_maintenance_page() {
    let site = Site::new();
    site.options(r#"{"maintenance_mode":true}"#);
    site.arm_for_an_hour();

    let res = warp::test::request().path("/").reply(&site.filter()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page = body(&res).await;
    assert!(page.contains("Website Under Maintenance"));
    assert!(!page.contains("Hello world"));
    // the page never ran
    assert!(site.executed.lock().is_empty());

    // and writes made in that state are neutralized
    let lock = site.coordinator.request(BypassSignals::default());
    assert!(lock.intercept("INSERT INTO posts (title) VALUES ('x')").is_neutralized());
}

#[tokio::test(flavor = "multi_thread")]
async fn administrators_get_the_site_with_a_banner() {
    let site = Site::new();
    site.options(r#"{"maintenance_mode":true}"#);
    site.arm_for_an_hour();

    let res = warp::test::request()
        .path("/")
        .header("authorization", format!("Bearer {}", ADMIN))
        .reply(&site.filter())
        .await;
    let page = body(&res).await;
    assert!(page.contains("Hello world"));
    assert!(page.contains("Maintenance Mode"));
    assert_eq!(
        *site.executed.lock(),
        vec![
            Dialect::Sqlite.noop_statement().to_string(),
            "SELECT * FROM posts ORDER BY id DESC".to_string(),
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn orchestrator_writes_through_the_lock() {
    let site = Site::new();
    site.arm_for_an_hour();

    let res = warp::test::request()
        .path("/")
        .header(LOCK_HEADER, SECRET)
        .reply(&site.filter())
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        site.executed.lock()[0],
        "INSERT INTO stats (page) VALUES ('/')"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn control_api_round_trip_through_the_site() {
    let site = Site::new();
    let filter = site.filter();
    let unlock_at = Utc::now().timestamp() + 600;

    let res = warp::test::request()
        .path(&format!(
            "{}?action=enable&timeout={}",
            DEFAULT_CONTROL_ROUTE, unlock_at
        ))
        .header(LOCK_HEADER, SECRET)
        .reply(&filter)
        .await;
    let json: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(json["lockActive"], true);
    assert_eq!(json["lockTimeout"], unlock_at);

    // another request handler sees it through the shared store
    assert!(site
        .coordinator
        .request(BypassSignals::default())
        .is_lock_active());

    // disabling is possible while locked
    let res = warp::test::request()
        .path(&format!("{}?action=disable", DEFAULT_CONTROL_ROUTE))
        .header(LOCK_HEADER, SECRET)
        .reply(&filter)
        .await;
    let json: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(json["disableResult"], true);
    assert_eq!(json["lockActive"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn options_stay_writable_while_locked() {
    let site = Site::new();
    site.options(r#"{"migration_active":true}"#);
    let lock = site.coordinator.request(BypassSignals::default());
    assert!(lock.is_lock_active());
    let sql = "UPDATE options SET value = '{}' WHERE name = 'migration_options'";
    assert_eq!(lock.intercept(sql), Intercepted::Pass(sql));
}

#[tokio::test(flavor = "multi_thread")]
async fn checksum_tracks_content_drift() {
    let site = Site::new();
    let filter = site.filter();
    let get = || {
        warp::test::request()
            .path(DEFAULT_CHECKSUM_ROUTE)
            .header(CHECKSUM_HEADER, "1")
            .reply(&filter)
    };

    let a = get().await;
    let b = get().await;
    assert_eq!(a.body(), b.body());

    site.content.put(ContentRow {
        id: 1,
        title: "Hello world".into(),
        guid: "https://example.org/?p=1".into(),
        content: "Welcome back.".into(),
    });
    let c = get().await;
    assert_ne!(a.body(), c.body());

    // without the header the host answers
    let res = warp::test::request()
        .path(DEFAULT_CHECKSUM_ROUTE)
        .reply(&filter)
        .await;
    assert!(body(&res).await.contains("Hello world"));
}
